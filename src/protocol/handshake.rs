//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! The client side builds the upgrade request and verifies the server's
//! `101 Switching Protocols` answer. The server side (request parsing and
//! response writing) is kept for in-process peers.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Only protocol version spoken by this crate.
pub const WS_VERSION: u8 = 13;

/// Lowercased header map. Security-critical names may be rejected when repeated.
fn parse_headers<'a, I>(
    lines: I,
    security_headers: Option<&[&str]>,
) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name_lower = name.trim().to_lowercase();

            if let Some(sec_headers) = security_headers {
                if sec_headers.contains(&name_lower.as_str()) && headers.contains_key(&name_lower) {
                    return Err(Error::InvalidHandshake(format!(
                        "Duplicate header: {}",
                        name.trim()
                    )));
                }
            }

            headers.insert(name_lower, value.trim().to_string());
        }
    }

    Ok(headers)
}

fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

fn require<'h>(headers: &'h HashMap<String, String>, name: &str, display: &str) -> Result<&'h String> {
    headers
        .get(name)
        .ok_or_else(|| Error::InvalidHandshake(format!("Missing {display} header")))
}

fn check_upgrade_headers(headers: &HashMap<String, String>) -> Result<()> {
    let upgrade = require(headers, "upgrade", "Upgrade")?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Upgrade header: {upgrade}"
        )));
    }

    let connection = require(headers, "connection", "Connection")?;
    if !connection.to_lowercase().contains("upgrade") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Connection header: {connection}"
        )));
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use rsws_bridge::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Generate a fresh Sec-WebSocket-Key: 16 random bytes, base64-encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Offset just past the `\r\n\r\n` that ends an HTTP head, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Upgrade request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// Path plus query, e.g. `/chat?room=1`.
    pub resource: String,
    /// Host header value, including a non-default port.
    pub host: String,
    /// The Sec-WebSocket-Key sent to the server.
    pub key: String,
}

impl ClientRequest {
    /// Build a request with a freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if no key could be generated.
    pub fn new(resource: impl Into<String>, host: impl Into<String>) -> Result<Self> {
        Ok(Self {
            resource: resource.into(),
            host: host.into(),
            key: generate_key()?,
        })
    }

    /// Write the HTTP request to a buffer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if the resource or host contains CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("Request-Target", &self.resource)?;
        validate_header_value("Host", &self.host)?;

        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.resource).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(format!("Sec-WebSocket-Version: {WS_VERSION}\r\n").as_bytes());
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// The accept value a conforming server must answer with.
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.key)
    }
}

/// Parsed WebSocket handshake request from client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request path (e.g., "/chat").
    pub path: String,
    /// The Host header value.
    pub host: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// The Sec-WebSocket-Version (should be 13).
    pub version: u8,
    /// The Sec-WebSocket-Protocol values (optional).
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// Parse a WebSocket handshake request from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] for a malformed request line, a
    /// method other than `GET`, a version other than `HTTP/1.1`, or missing
    /// upgrade headers.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        }
        if parts[0] != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {}",
                parts[0]
            )));
        }
        if !parts[2].starts_with("HTTP/1.1") {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {}",
                parts[2]
            )));
        }

        let security_headers = [
            "host",
            "upgrade",
            "connection",
            "sec-websocket-key",
            "sec-websocket-version",
        ];
        let headers = parse_headers(lines, Some(&security_headers))?;
        check_upgrade_headers(&headers)?;

        let host = require(&headers, "host", "Host")?.clone();
        let key = require(&headers, "sec-websocket-key", "Sec-WebSocket-Key")?.clone();
        let version_str = require(&headers, "sec-websocket-version", "Sec-WebSocket-Version")?;
        let version: u8 = version_str
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version_str}")))?;

        let protocols = headers
            .get("sec-websocket-protocol")
            .map(|p| p.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            path: parts[1].to_string(),
            host,
            key,
            version,
            protocols,
        })
    }

    /// Validate the handshake request according to RFC 6455.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the version is not 13, the key
    /// does not decode to 16 bytes, or the host is empty.
    pub fn validate(&self) -> Result<()> {
        if self.version != WS_VERSION {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                self.version
            )));
        }

        match BASE64.decode(&self.key) {
            Ok(decoded) if decoded.len() == 16 => {}
            Ok(decoded) => {
                return Err(Error::InvalidHandshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    decoded.len()
                )));
            }
            Err(_) => {
                return Err(Error::InvalidHandshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64".into(),
                ));
            }
        }

        if self.host.is_empty() {
            return Err(Error::InvalidHandshake(
                "Host header cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Parse a handshake request with size limit.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if data exceeds max_size
    /// - Other handshake errors as per `parse()`
    pub fn parse_with_limit(data: &[u8], max_size: usize) -> Result<Self> {
        if data.len() > max_size {
            return Err(Error::HandshakeTooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        Self::parse(data)
    }
}

/// WebSocket handshake response from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol (optional).
    pub protocol: Option<String>,
    /// Extensions the server claims to have negotiated.
    pub extensions: Vec<String>,
}

impl HandshakeResponse {
    /// Create a handshake response from a validated request.
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: req.protocols.first().cloned(),
            extensions: Vec::new(),
        }
    }

    /// Write the HTTP response to a buffer.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if protocol or extensions contain CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());

        if let Some(ref proto) = self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }

        for ext in &self.extensions {
            validate_header_value("Sec-WebSocket-Extensions", ext)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Extensions: {ext}\r\n").as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a WebSocket handshake response from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the status is not `101`, or the
    /// upgrade headers or `Sec-WebSocket-Accept` are missing.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines, None)?;
        check_upgrade_headers(&headers)?;

        let accept = require(&headers, "sec-websocket-accept", "Sec-WebSocket-Accept")?.clone();
        let protocol = headers.get("sec-websocket-protocol").cloned();
        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            accept,
            protocol,
            extensions,
        })
    }

    /// Check the response against the request that produced it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the accept value does not match
    /// the request key, or the server negotiated an extension or subprotocol
    /// that was never offered.
    pub fn verify(&self, request: &ClientRequest) -> Result<()> {
        if self.accept != request.expected_accept() {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: {}",
                self.accept
            )));
        }
        if !self.extensions.is_empty() {
            return Err(Error::InvalidHandshake(format!(
                "Server negotiated unrequested extensions: {}",
                self.extensions.join(", ")
            )));
        }
        if let Some(ref proto) = self.protocol {
            return Err(Error::InvalidHandshake(format!(
                "Server selected unrequested subprotocol: {proto}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const RFC_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn rfc_request() -> ClientRequest {
        ClientRequest {
            resource: "/chat".into(),
            host: "server.example.com".into(),
            key: RFC_KEY.into(),
        }
    }

    #[test]
    fn test_compute_accept_key_rfc_example() {
        // RFC 6455 Section 1.3 example
        assert_eq!(compute_accept_key(RFC_KEY), RFC_ACCEPT);
    }

    #[test]
    fn test_generated_keys_are_16_bytes_and_distinct() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_eq!(BASE64.decode(&a).unwrap().len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_client_request_write() {
        let mut buf = Vec::new();
        rfc_request().write(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(text.contains("Host: server.example.com\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_client_request_rejects_crlf() {
        let req = ClientRequest {
            resource: "/x\r\nEvil: 1".into(),
            ..rfc_request()
        };
        assert!(matches!(
            req.write(&mut Vec::new()),
            Err(Error::InvalidHeaderValue { .. })
        ));
    }

    #[test]
    fn test_client_request_is_accepted_by_server_parser() {
        let client = ClientRequest::new("/ws?token=abc", "localhost:9001").unwrap();
        let mut buf = Vec::new();
        client.write(&mut buf).unwrap();

        let req = HandshakeRequest::parse(&buf).unwrap();
        req.validate().unwrap();
        assert_eq!(req.path, "/ws?token=abc");
        assert_eq!(req.host, "localhost:9001");

        let resp = HandshakeResponse::from_request(&req);
        let mut out = Vec::new();
        resp.write(&mut out).unwrap();
        HandshakeResponse::parse(&out).unwrap().verify(&client).unwrap();
    }

    #[test]
    fn test_verify_rejects_wrong_accept() {
        let resp = HandshakeResponse {
            accept: "bm90IHRoZSByaWdodCBrZXk=".into(),
            protocol: None,
            extensions: vec![],
        };
        assert!(matches!(
            resp.verify(&rfc_request()),
            Err(Error::InvalidHandshake(msg)) if msg.contains("mismatch")
        ));
    }

    #[test]
    fn test_verify_rejects_unrequested_extension() {
        let resp = HandshakeResponse {
            accept: RFC_ACCEPT.into(),
            protocol: None,
            extensions: vec!["permessage-deflate".into()],
        };
        assert!(resp.verify(&rfc_request()).is_err());
    }

    #[test]
    fn test_parse_response() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";

        let resp = HandshakeResponse::parse(response).unwrap();
        assert_eq!(resp.accept, RFC_ACCEPT);
        resp.verify(&rfc_request()).unwrap();
    }

    #[test]
    fn test_parse_response_rejects_non_101() {
        let response = b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n";
        assert!(matches!(
            HandshakeResponse::parse(response),
            Err(Error::InvalidHandshake(msg)) if msg.contains("403")
        ));
    }

    #[test]
    fn test_response_missing_accept() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";

        let err = HandshakeResponse::parse(response).unwrap_err();
        assert!(
            matches!(err, Error::InvalidHandshake(msg) if msg.contains("Sec-WebSocket-Accept"))
        );
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"HTTP/1.1 101\r\n\r\n"), Some(16));
        assert_eq!(find_header_end(b"HTTP/1.1 101\r\n\r\n\x81\x00"), Some(16));
        assert_eq!(find_header_end(b"HTTP/1.1 101\r\n"), None);
    }

    #[test]
    fn test_parse_request_missing_key() {
        let request = b"GET /chat HTTP/1.1\r\n\
            Host: server.example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";

        let err = HandshakeRequest::parse(request).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("Sec-WebSocket-Key")));
    }

    #[test]
    fn test_validate_request() {
        let valid_req = HandshakeRequest {
            path: "/chat".to_string(),
            host: "example.com".to_string(),
            key: RFC_KEY.to_string(),
            version: 13,
            protocols: vec![],
        };
        assert!(valid_req.validate().is_ok());

        let short_key = HandshakeRequest {
            key: "c2hvcnQ=".to_string(),
            ..valid_req.clone()
        };
        assert!(short_key.validate().is_err());

        let old_version = HandshakeRequest {
            version: 8,
            ..valid_req
        };
        assert!(old_version.validate().is_err());
    }

    #[test]
    fn test_duplicate_host_header_rejected() {
        let request = b"GET / HTTP/1.1\r\n\
Host: example.com\r\n\
Host: evil.com\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\r\n";

        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(msg)) if msg.contains("Duplicate")
        ));
    }

    #[test]
    fn test_handshake_too_large() {
        let large_data = vec![b'A'; 10000];
        let result = HandshakeRequest::parse_with_limit(&large_data, 8192);
        assert!(matches!(result, Err(Error::HandshakeTooLarge { .. })));
    }

    #[test]
    fn test_crlf_in_protocol_rejected() {
        let response = HandshakeResponse {
            accept: RFC_ACCEPT.to_string(),
            protocol: Some("chat\r\nX-Injected: evil".to_string()),
            extensions: vec![],
        };
        let result = response.write(&mut Vec::new());
        assert!(matches!(result, Err(Error::InvalidHeaderValue { .. })));
    }
}
