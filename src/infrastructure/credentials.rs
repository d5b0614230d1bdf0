use crate::types::BEARER_PROTOCOL_PREFIX;
use std::sync::Arc;

/// Supplies the current bearer token, or `None` when there is none.
///
/// Owned by the authentication layer; the streaming client only reads it, once
/// per connect attempt, so token rotation is picked up on the next handshake.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn bearer_token(&self) -> Option<String> {
        self()
    }
}

/// What happened to the credential during one injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// A `bearer.<token>` protocol was appended
    Attached,
    /// Injection was requested but the source had no token
    Missing,
    /// Injection was not requested
    Skipped,
}

/// Attaches the bearer credential to the sub-protocol list of a handshake.
///
/// The token never goes into the URL path or query string.
#[derive(Clone, Default)]
pub struct CredentialInjector {
    source: Option<Arc<dyn CredentialSource>>,
}

impl CredentialInjector {
    pub fn new(source: Option<Arc<dyn CredentialSource>>) -> Self {
        Self { source }
    }

    /// Build the protocol list for one connect attempt.
    pub fn protocols(&self, base: &[String], inject: bool) -> (Vec<String>, CredentialStatus) {
        let mut protocols = base.to_vec();
        if !inject {
            return (protocols, CredentialStatus::Skipped);
        }

        let token = self
            .source
            .as_ref()
            .and_then(|source| source.bearer_token())
            .filter(|token| !token.is_empty());

        match token {
            Some(token) => {
                protocols.push(format!("{BEARER_PROTOCOL_PREFIX}{token}"));
                (protocols, CredentialStatus::Attached)
            }
            None => {
                tracing::warn!("No bearer token available, connecting without credentials");
                (protocols, CredentialStatus::Missing)
            }
        }
    }
}

impl std::fmt::Debug for CredentialInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialInjector")
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Whether a protocol token carries a credential and must not be logged.
pub fn is_credential_protocol(protocol: &str) -> bool {
    protocol.starts_with(BEARER_PROTOCOL_PREFIX)
}
