//! `ws://` and `wss://` URL parsing.

use ::url::Url;

use crate::error::{Error, Result};

/// The parts of a WebSocket URL needed to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// Host name or address, without brackets.
    pub host: String,
    /// Port, defaulted from the scheme.
    pub port: u16,
    /// Request target: path plus `?query`.
    pub resource: String,
    /// `true` for `wss://`.
    pub use_ssl: bool,
}

impl WsUrl {
    /// Parse a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for other schemes, a missing host, or a URL
    /// that does not parse.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;
        let use_ssl = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(Error::Config(format!(
                    "WebSocket URL scheme must be \"ws:\" or \"wss:\", got \"{other}:\""
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("WebSocket URL has no host: {input}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        let port = url.port().unwrap_or(if use_ssl { 443 } else { 80 });

        let mut resource = match url.path() {
            "" => "/".to_owned(),
            path => path.to_owned(),
        };
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            host,
            port,
            resource,
            use_ssl,
        })
    }
}

impl std::str::FromStr for WsUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let url = WsUrl::parse("ws://example.com").unwrap();
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 80);
        assert_eq!(url.resource, "/");
        assert!(!url.use_ssl);

        let url = WsUrl::parse("wss://example.com").unwrap();
        assert_eq!(url.port, 443);
        assert!(url.use_ssl);
    }

    #[test]
    fn test_parse_port_path_and_query() {
        let url = WsUrl::parse("ws://localhost:8000/chat/room?id=1&x=y").unwrap();
        assert_eq!(url.host, "localhost");
        assert_eq!(url.port, 8000);
        assert_eq!(url.resource, "/chat/room?id=1&x=y");
    }

    #[test]
    fn test_parse_ipv6_host() {
        let url = WsUrl::parse("ws://[::1]:9000/").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 9000);
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(matches!(
            WsUrl::parse("http://example.com"),
            Err(Error::Config(_))
        ));
        assert!(matches!(WsUrl::parse("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_str() {
        let url: WsUrl = "wss://example.com:8443/a".parse().unwrap();
        assert_eq!(url.port, 8443);
        assert_eq!(url.resource, "/a");
    }
}
