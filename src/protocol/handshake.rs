//! Client side of the WebSocket opening handshake (RFC 6455 Section 4.1).

use std::collections::HashMap;
use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use url::{Host, Url};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsprobe::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// A parsed `ws://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    /// TCP port. Defaults to 80.
    pub port: u16,
    /// Request target: path plus optional query. Defaults to `/`.
    pub path: String,
}

impl Endpoint {
    /// Parse a `ws://host[:port][/path][?query]` URI.
    ///
    /// The path and query are normalized (percent-encoded) and any fragment
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEndpoint` for unparsable URIs, other schemes
    /// (including `wss://`), user info or a missing host.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let invalid = |detail: &str| Error::InvalidEndpoint(format!("{}: {}", uri, detail));

        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "ws" => {}
            "wss" => return Err(invalid("TLS endpoints are not supported")),
            _ => return Err(invalid("expected a ws:// URI")),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("user info is not supported"));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(invalid("missing host")),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(Self { host, port, path })
    }

    /// Value for the `Host` header.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == 80 {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}{}", self.authority(), self.path)
    }
}

/// Parse HTTP header lines into a map keyed by lowercase name.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// The client half of one opening handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    key: String,
}

impl ClientHandshake {
    /// Start a handshake with a fresh key of 16 bytes from the OS RNG.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the OS cannot supply random bytes.
    pub fn new() -> Result<Self> {
        let mut nonce = [0u8; 16];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| Error::Io(format!("no randomness for handshake key: {}", e)))?;
        Ok(Self::with_key(BASE64.encode(nonce)))
    }

    /// Start a handshake with a caller-chosen key.
    #[must_use]
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The `Sec-WebSocket-Key` sent to the server.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the HTTP upgrade request for `endpoint`.
    pub fn write_request(&self, endpoint: &Endpoint, buf: &mut Vec<u8>) {
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", endpoint.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", endpoint.authority()).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        buf.extend_from_slice(b"\r\n");
    }

    /// Check the server's response against this handshake.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the accept key does not match or
    /// the server negotiated an extension that was never offered.
    pub fn verify(&self, response: &HandshakeResponse) -> Result<()> {
        let expected = compute_accept_key(&self.key);
        if response.accept != expected {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {}, got {}",
                expected, response.accept
            )));
        }
        if !response.extensions.is_empty() {
            return Err(Error::InvalidHandshake(format!(
                "Server negotiated unrequested extensions: {}",
                response.extensions.join(", ")
            )));
        }
        Ok(())
    }
}

/// The parts of a `101 Switching Protocols` response the client checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// `Sec-WebSocket-Accept`.
    pub accept: String,
    /// Extension tokens from `Sec-WebSocket-Extensions`, if any.
    pub extensions: Vec<String>,
}

impl HandshakeResponse {
    /// Parse the head of the server's upgrade response.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandshake` unless the bytes are a UTF-8 HTTP/1.1 `101`
    /// response carrying `Upgrade: websocket`, a `Connection` header that
    /// lists `upgrade`, and a `Sec-WebSocket-Accept` header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let invalid = |detail: String| Error::InvalidHandshake(detail);

        let text = std::str::from_utf8(data)
            .map_err(|_| invalid("response head is not UTF-8".into()))?;
        let mut lines = text.lines();
        let status = lines.next().unwrap_or_default();
        if !status.starts_with("HTTP/1.1 101") {
            let status = if status.is_empty() { "nothing" } else { status };
            return Err(invalid(format!("expected a 101 response, got {}", status)));
        }

        let headers = parse_headers(lines);
        let header = |name: &str| {
            headers
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| invalid(format!("response lacks a {} header", name)))
        };

        let upgrade = header("upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(invalid(format!("upgrade to {} instead of websocket", upgrade)));
        }
        let connection = header("connection")?;
        if !connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        {
            return Err(invalid(format!("connection header is {}", connection)));
        }
        let accept = header("sec-websocket-accept")?.to_string();

        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|value| value.split(',').map(|token| token.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self { accept, extensions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_accept_key_rfc_example() {
        // RFC 6455 Section 1.3 example
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_parse_default_endpoint() {
        let endpoint = Endpoint::parse("ws://localhost:5000/ws").unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 5000);
        assert_eq!(endpoint.path, "/ws");
        assert_eq!(endpoint.authority(), "localhost:5000");
        assert_eq!(endpoint.to_string(), "ws://localhost:5000/ws");
    }

    #[test]
    fn test_parse_endpoint_defaults() {
        let endpoint = Endpoint::parse("ws://sim.example.com").unwrap();
        assert_eq!(endpoint.port, 80);
        assert_eq!(endpoint.path, "/");
        assert_eq!(endpoint.authority(), "sim.example.com");

        let endpoint = Endpoint::parse("WS://sim.example.com?room=1#frag").unwrap();
        assert_eq!(endpoint.path, "/?room=1");
    }

    #[test]
    fn test_parse_normalizes_request_target() {
        let endpoint = Endpoint::parse("ws://Sim.Example.com:5000/sim ws?who=a b#top").unwrap();
        assert_eq!(endpoint.host, "sim.example.com");
        assert_eq!(endpoint.path, "/sim%20ws?who=a%20b");

        let endpoint = Endpoint::parse("ws://localhost:80/ws").unwrap();
        assert_eq!(endpoint.port, 80);
        assert_eq!(endpoint.authority(), "localhost");
    }

    #[test]
    fn test_parse_ipv6_endpoint() {
        let endpoint = Endpoint::parse("ws://[::1]:9001/ws").unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 9001);
        assert_eq!(endpoint.authority(), "[::1]:9001");
    }

    #[test]
    fn test_parse_endpoint_rejects() {
        for uri in [
            "wss://localhost/ws",
            "http://localhost/ws",
            "localhost:5000/ws",
            "ws://:5000/ws",
            "ws://localhost:notaport/ws",
            "ws://user@localhost/ws",
            "ws://[::1/ws",
            "ws://user:secret@localhost/ws",
            "not a uri",
        ] {
            assert!(
                matches!(Endpoint::parse(uri), Err(Error::InvalidEndpoint(_))),
                "{} should be rejected",
                uri
            );
        }
    }

    #[test]
    fn test_request_format() {
        let endpoint = Endpoint::parse("ws://localhost:5000/ws").unwrap();
        let handshake = ClientHandshake::with_key("dGhlIHNhbXBsZSBub25jZQ==");
        let mut buf = Vec::new();
        handshake.write_request(&endpoint, &mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("GET /ws HTTP/1.1\r\n"));
        assert!(text.contains("Host: localhost:5000\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_random_keys_are_16_bytes() {
        let a = ClientHandshake::new().unwrap();
        let b = ClientHandshake::new().unwrap();
        assert_eq!(BASE64.decode(a.key()).unwrap().len(), 16);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_parse_and_verify_response() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";
        let parsed = HandshakeResponse::parse(response).unwrap();
        let handshake = ClientHandshake::with_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert!(handshake.verify(&parsed).is_ok());

        let other = ClientHandshake::with_key("AQIDBAUGBwgJCgsMDQ4PEA==");
        assert!(matches!(
            other.verify(&parsed),
            Err(Error::InvalidHandshake(msg)) if msg.contains("mismatch")
        ));
    }

    #[test]
    fn test_response_wrong_status() {
        let response = b"HTTP/1.1 404 Not Found\r\n\r\n";
        let result = HandshakeResponse::parse(response);
        assert!(matches!(result, Err(Error::InvalidHandshake(msg)) if msg.contains("101")));
    }

    #[test]
    fn test_response_missing_accept() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";
        let result = HandshakeResponse::parse(response);
        assert!(
            matches!(result, Err(Error::InvalidHandshake(msg)) if msg.contains("sec-websocket-accept"))
        );
    }

    #[test]
    fn test_response_connection_tokens() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            upgrade: WebSocket\r\n\
            connection: keep-alive, Upgrade\r\n\
            sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";
        assert!(HandshakeResponse::parse(response).is_ok());

        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: close\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";
        assert!(HandshakeResponse::parse(response).is_err());
    }

    #[test]
    fn test_unrequested_extension_rejected() {
        let response = HandshakeResponse {
            accept: compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            extensions: vec!["permessage-deflate".into()],
        };
        let handshake = ClientHandshake::with_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert!(handshake.verify(&response).is_err());
    }
}
