use crate::types::{Result, StreamError};
use url::Url;

/// A validated `ws://` or `wss://` stream target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    url: Url,
}

impl TargetAddress {
    /// Accept a direct stream URL.
    pub fn parse(address: &str) -> Result<Self> {
        let url = Url::parse(address)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(StreamError::Config(format!(
                "stream target must use ws or wss, got '{}'",
                other
            ))),
        }
    }

    /// Derive the stream target for `path` from the page origin serving the
    /// dashboard: `https` pages stream over `wss`, `http` pages over `ws`.
    pub fn from_page(origin: &str, path: &str) -> Result<Self> {
        let origin = Url::parse(origin)?;
        let scheme = match origin.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(StreamError::Config(format!(
                    "page origin must be http or https, got '{}'",
                    other
                )));
            }
        };

        let mut url = origin.join(path)?;
        url.set_scheme(scheme)
            .map_err(|_| StreamError::Config(format!("cannot stream from '{}'", origin)))?;
        url.set_fragment(None);

        Ok(Self { url })
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_page_streams_over_wss() {
        let target =
            TargetAddress::from_page("https://panel.example", "/api/nodes/3/logs/ws").unwrap();
        assert_eq!(target.as_str(), "wss://panel.example/api/nodes/3/logs/ws");
        assert!(target.is_secure());
        assert_eq!(target.host(), Some("panel.example"));
    }

    #[test]
    fn test_plain_page_streams_over_ws() {
        let target = TargetAddress::from_page("http://10.0.0.2:8080/", "events/ws").unwrap();
        assert_eq!(target.as_str(), "ws://10.0.0.2:8080/events/ws");
        assert!(!target.is_secure());
    }

    #[test]
    fn test_rejects_unknown_schemes() {
        assert!(matches!(
            TargetAddress::from_page("ftp://panel.example", "/ws"),
            Err(StreamError::Config(_))
        ));
        assert!(matches!(
            TargetAddress::parse("https://panel.example/ws"),
            Err(StreamError::Config(_))
        ));
        assert!(matches!(
            TargetAddress::parse("panel.example/ws"),
            Err(StreamError::UrlParse(_))
        ));
    }

    #[test]
    fn test_parse_accepts_stream_urls() {
        let target = TargetAddress::parse("wss://node-1.example/ws/logs").unwrap();
        assert_eq!(target.to_string(), "wss://node-1.example/ws/logs");
    }
}
