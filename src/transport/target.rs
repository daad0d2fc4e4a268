//! Where a session connects to, derived from its `ws://` / `wss://` URL.

use url::{Host, Url};

use crate::error::ConnectError;

/// Parsed connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host to resolve and, for `wss`, the TLS server name. IPv6 literals
    /// are stored without brackets.
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// Request target: path plus query.
    pub resource: String,
    /// `Host` header value; carries the port only when it is not the default.
    pub host_header: String,
}

impl Target {
    /// Validate and decompose a WebSocket URL.
    ///
    /// Does not touch the network; name resolution happens on the session loop.
    ///
    /// # Errors
    ///
    /// - `ConnectError::InvalidUrl` if the URL does not parse
    /// - `ConnectError::UnsupportedScheme` for anything but `ws`/`wss`
    /// - `ConnectError::MissingHost` if there is no host
    /// - `ConnectError::TlsUnavailable` for `wss` without TLS support compiled in
    pub fn parse(input: &str) -> Result<Self, ConnectError> {
        let url = Url::parse(input.trim()).map_err(|e| ConnectError::InvalidUrl(e.to_string()))?;

        let tls = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(ConnectError::UnsupportedScheme(other.to_string())),
        };

        if tls && !cfg!(feature = "tls-rustls") {
            return Err(ConnectError::TlsUnavailable);
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(ConnectError::MissingHost),
        };
        let host_str = url.host_str().ok_or(ConnectError::MissingHost)?;

        let default_port = if tls { 443 } else { 80 };
        let port = url.port().unwrap_or(default_port);
        let host_header = if port == default_port {
            host_str.to_string()
        } else {
            format!("{host_str}:{port}")
        };

        let resource = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(Self {
            host,
            port,
            tls,
            resource,
            host_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_url_defaults() {
        let target = Target::parse("ws://example.com").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);
        assert!(!target.tls);
        assert_eq!(target.resource, "/");
        assert_eq!(target.host_header, "example.com");
    }

    #[test]
    fn test_port_path_and_query() {
        let target = Target::parse("ws://127.0.0.1:9001/chat/room?token=abc&v=1").unwrap();
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.port, 9001);
        assert_eq!(target.resource, "/chat/room?token=abc&v=1");
        assert_eq!(target.host_header, "127.0.0.1:9001");
    }

    #[test]
    fn test_ipv6_host() {
        let target = Target::parse("ws://[::1]:8080/").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.host_header, "[::1]:8080");
    }

    #[cfg(feature = "tls-rustls")]
    #[test]
    fn test_secure_url() {
        let target = Target::parse("wss://gateway.example.com/?v=10").unwrap();
        assert!(target.tls);
        assert_eq!(target.port, 443);
        assert_eq!(target.resource, "/?v=10");
    }

    #[cfg(not(feature = "tls-rustls"))]
    #[test]
    fn test_secure_url_without_tls() {
        assert_eq!(
            Target::parse("wss://gateway.example.com/"),
            Err(ConnectError::TlsUnavailable)
        );
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert_eq!(
            Target::parse("http://example.com/"),
            Err(ConnectError::UnsupportedScheme("http".into()))
        );
        assert!(matches!(
            Target::parse("ftp://example.com/"),
            Err(ConnectError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            Target::parse("not a url"),
            Err(ConnectError::InvalidUrl(_))
        ));
        assert!(matches!(
            Target::parse(""),
            Err(ConnectError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejects_missing_host() {
        assert!(matches!(
            Target::parse("ws://"),
            Err(ConnectError::InvalidUrl(_) | ConnectError::MissingHost)
        ));
    }
}
