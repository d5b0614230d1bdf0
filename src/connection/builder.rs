use super::config::ConnectionConfig;
use super::manager::{ConnectionManager, EventReceiver, Inner};
use crate::infrastructure::{CredentialInjector, CredentialSource};
use crate::types::{Result, StreamError};
use crate::websocket::{Connector, WebSocketConnector};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Builder for [`ConnectionManager`] that validates configuration and wires
/// collaborators.
pub struct ConnectionManagerBuilder {
    config: ConnectionConfig,
    connector: Option<Arc<dyn Connector>>,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl ConnectionManagerBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            connector: None,
            credentials: None,
        }
    }

    /// Use a custom connector instead of the WebSocket one
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Credential accessor, read once per connect attempt
    pub fn credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    /// Build the manager and the receiver its events are delivered on.
    ///
    /// Must be called from within a tokio runtime; the manager spawns its
    /// timers and sessions on that runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if the configuration is invalid or no
    /// runtime is available, and [`StreamError::UrlParse`] for a malformed
    /// target.
    pub fn build(self) -> Result<(ConnectionManager, EventReceiver)> {
        self.config.validate()?;

        let runtime = Handle::try_current().map_err(|_| {
            StreamError::Config("connection manager must be built inside a tokio runtime".into())
        })?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector));

        let (inner, events) = Inner::new(
            self.config,
            connector,
            CredentialInjector::new(self.credentials),
            runtime,
        );

        Ok((ConnectionManager::from_inner(inner), events))
    }
}
