use super::credentials::CredentialSource;
use crate::consumers::{AlertEvent, EventHistory};
use crate::types::{Result, StreamError};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Polls the node event history endpoint over HTTP.
///
/// `GET {endpoint}?since=<unix ms>[&node=<id>]`, answered with a JSON array of
/// the same records the live feed pushes.
pub struct HttpEventHistory {
    endpoint: Url,
    client: reqwest::Client,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl HttpEventHistory {
    pub fn new(endpoint: &str, credentials: Option<Arc<dyn CredentialSource>>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StreamError::Config(format!(
                "history endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
            credentials,
        })
    }

    /// Build the poll URL for a `since` timestamp and optional node filter
    pub fn request_url(&self, since_ms: i64, node: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("since", &since_ms.to_string());
            if let Some(node) = node {
                query.append_pair("node", node);
            }
        }
        url
    }
}

#[async_trait]
impl EventHistory for HttpEventHistory {
    async fn fetch_since(&self, since_ms: i64, node: Option<&str>) -> Result<Vec<AlertEvent>> {
        let url = self.request_url(since_ms, node);
        let mut request = self.client.get(url);

        if let Some(token) = self
            .credentials
            .as_ref()
            .and_then(|source| source.bearer_token())
        {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let events = response.json::<Vec<AlertEvent>>().await?;

        tracing::debug!("Fetched {} historical events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_carries_since_and_node() {
        let history = HttpEventHistory::new("https://panel.example/api/events", None).unwrap();
        assert_eq!(
            history.request_url(1_700_000_000_000, None).as_str(),
            "https://panel.example/api/events?since=1700000000000"
        );
        assert_eq!(
            history.request_url(5, Some("node-1")).as_str(),
            "https://panel.example/api/events?since=5&node=node-1"
        );
    }

    #[test]
    fn test_request_url_keeps_existing_query() {
        let history =
            HttpEventHistory::new("https://panel.example/api/events?kind=alert", None).unwrap();
        assert_eq!(
            history.request_url(5, None).as_str(),
            "https://panel.example/api/events?kind=alert&since=5"
        );
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        assert!(matches!(
            HttpEventHistory::new("wss://panel.example/api/events", None),
            Err(StreamError::Config(_))
        ));
        assert!(matches!(
            HttpEventHistory::new("not a url", None),
            Err(StreamError::UrlParse(_))
        ));
    }
}
