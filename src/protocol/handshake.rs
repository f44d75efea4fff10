//! Opening handshake: upgrade detection, key extraction, accept token.
//!
//! Only the `Sec-WebSocket-Key` / `Sec-WebSocket-Accept` exchange is
//! implemented. No subprotocols, no extensions, and the `Upgrade` and
//! `Connection` request headers are not checked.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing (RFC 6455 §1.3).
pub const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Request header carrying the client nonce.
pub const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Marks the end of the request head.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Method tokens accepted as the start of an HTTP request line.
const METHODS: [&[u8]; 9] = [
    b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"CONNECT", b"OPTIONS", b"TRACE", b"PATCH",
];

/// Reasons an upgrade request is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// No `Sec-WebSocket-Key` header in the request head.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// The key header is present but unusable.
    #[error("malformed Sec-WebSocket-Key header: {0}")]
    MalformedKey(String),

    /// The request head is not valid UTF-8.
    #[error("request head is not valid utf-8")]
    InvalidEncoding,

    /// The request line is not terminated by CRLF, so no header section
    /// can follow it.
    #[error("request line is not terminated by CRLF")]
    MalformedRequestLine,

    /// The header terminator did not arrive within the read limit.
    #[error("request head exceeds {limit} bytes")]
    RequestTooLarge {
        /// Maximum number of buffered bytes.
        limit: usize,
    },

    /// The header terminator did not arrive before the handshake deadline.
    #[error("request head not completed within {}ms", .waited.as_millis())]
    Timeout {
        /// How long the partial head was buffered.
        waited: std::time::Duration,
    },
}

/// How the bytes buffered before the handshake should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstPayload {
    /// Starts with an HTTP method token followed by a space.
    Upgrade,
    /// Too short to tell: a strict prefix of some `METHOD ` token.
    Undecided,
    /// Anything else; relayed as a plain message.
    Message,
}

/// Classifies the bytes received on a connection that has not upgraded.
#[must_use]
pub fn classify(payload: &[u8]) -> FirstPayload {
    let mut undecided = false;
    for method in METHODS {
        let token_len = method.len() + 1;
        if payload.starts_with(method) && payload.get(method.len()) == Some(&b' ') {
            return FirstPayload::Upgrade;
        }
        let prefix_of_token = payload.len() < token_len
            && payload
                .iter()
                .zip(method.iter().chain(std::iter::once(&b' ')))
                .all(|(got, want)| got == want);
        undecided |= prefix_of_token;
    }
    if undecided && !payload.is_empty() {
        FirstPayload::Undecided
    } else {
        FirstPayload::Message
    }
}

/// Returns `true` if `payload` starts with an HTTP method token followed
/// by a space.
#[must_use]
pub fn is_upgrade_request(payload: &[u8]) -> bool {
    classify(payload) == FirstPayload::Upgrade
}

/// Checks that a buffered request line, once complete, ends in CRLF.
///
/// An unterminated line passes; it may still be arriving.
///
/// # Errors
///
/// Returns [`HandshakeError::MalformedRequestLine`] if the first line
/// feed is not preceded by a carriage return.
pub fn check_request_line(buffer: &[u8]) -> Result<(), HandshakeError> {
    let Some(lf) = buffer.iter().position(|&b| b == b'\n') else {
        return Ok(());
    };
    let before = lf.checked_sub(1).and_then(|i| buffer.get(i));
    if before == Some(&b'\r') {
        Ok(())
    } else {
        Err(HandshakeError::MalformedRequestLine)
    }
}

/// Returns the length of the request head including the blank line, or
/// `None` if the terminator has not been received yet.
#[must_use]
pub fn head_len(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Locates the `Sec-WebSocket-Key` value in a request head.
///
/// Header names are compared ASCII case-insensitively. The value is the
/// trimmed text after the first `": "` separator.
///
/// # Errors
///
/// [`HandshakeError::MissingKey`] if no such header exists,
/// [`HandshakeError::MalformedKey`] if it has no `": "` separator or an
/// empty value.
pub fn extract_key(head: &str) -> Result<&str, HandshakeError> {
    for line in head.split("\r\n").skip(1) {
        if line.is_empty() {
            break;
        }
        let name = line.split_once(':').map_or(line, |(name, _)| name);
        if !name.trim().eq_ignore_ascii_case(KEY_HEADER) {
            continue;
        }
        let Some((_, value)) = line.split_once(": ") else {
            return Err(HandshakeError::MalformedKey(
                "missing \": \" separator".to_string(),
            ));
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(HandshakeError::MalformedKey("empty value".to_string()));
        }
        return Ok(value);
    }
    Err(HandshakeError::MissingKey)
}

/// Computes `base64(SHA-1(key + GUID))`.
#[must_use]
pub fn accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Builds the `101 Switching Protocols` response for an accept token.
#[must_use]
pub fn switching_protocols(token: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {token}\r\n\
         \r\n"
    )
}

/// Processes a complete request head and returns the response to send.
///
/// # Errors
///
/// Returns a [`HandshakeError`] if the head is not UTF-8 or carries no
/// usable key. The caller must close the connection.
pub fn respond(head: &[u8]) -> Result<String, HandshakeError> {
    let head = std::str::from_utf8(head).map_err(|_| HandshakeError::InvalidEncoding)?;
    let key = extract_key(head)?;
    Ok(switching_protocols(&accept_token(key)))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn request_with(headers: &str) -> String {
        format!("GET /chat HTTP/1.1\r\nHost: localhost:8765\r\n{headers}\r\n")
    }

    #[test]
    fn rfc_sample_vector() {
        assert_eq!(accept_token(SAMPLE_KEY), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn token_agrees_with_tungstenite() {
        for key in [SAMPLE_KEY, "x3JJHMbDL1EzLkh9GBhXDw==", "AQIDBAUGBwgJCgsMDQ4PEC=="] {
            let expected =
                tokio_tungstenite::tungstenite::handshake::derive_accept_key(key.as_bytes());
            assert_eq!(accept_token(key), expected);
        }
    }

    #[test]
    fn detects_request_lines() {
        assert!(is_upgrade_request(b"GET / HTTP/1.1\r\n"));
        assert!(is_upgrade_request(b"OPTIONS * HTTP/1.1\r\n"));
        assert!(!is_upgrade_request(b"hello"));
        assert!(!is_upgrade_request(b"GETTING started"));
        assert!(!is_upgrade_request(b"GET"));
        assert!(!is_upgrade_request(b""));
    }

    #[test]
    fn short_method_prefix_is_undecided() {
        assert_eq!(classify(b"GE"), FirstPayload::Undecided);
        assert_eq!(classify(b"GET"), FirstPayload::Undecided);
        assert_eq!(classify(b"OPTIONS"), FirstPayload::Undecided);
        assert_eq!(classify(b"P"), FirstPayload::Undecided);
        assert_eq!(classify(b"GET "), FirstPayload::Upgrade);
        assert_eq!(classify(b"GEX"), FirstPayload::Message);
        assert_eq!(classify(b"hi"), FirstPayload::Message);
        assert_eq!(classify(b"GETTING started"), FirstPayload::Message);
    }

    #[test]
    fn request_line_must_end_in_crlf() {
        assert_eq!(check_request_line(b"GET / HTTP/1.1"), Ok(()));
        assert_eq!(check_request_line(b"GET / HTTP/1.1\r\nHost"), Ok(()));
        assert_eq!(
            check_request_line(b"GET x\n"),
            Err(HandshakeError::MalformedRequestLine)
        );
        assert_eq!(
            check_request_line(b"GET milk please\nmore"),
            Err(HandshakeError::MalformedRequestLine)
        );
    }

    #[test]
    fn head_len_finds_blank_line() {
        assert_eq!(head_len(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
        assert_eq!(head_len(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
        assert_eq!(head_len(b"GET / HTTP/1.1\r\n\r\nhello"), Some(18));
    }

    #[test]
    fn extracts_trimmed_key() {
        let req = request_with(&format!("Sec-WebSocket-Key: {SAMPLE_KEY}  \r\n"));
        assert_eq!(extract_key(&req), Ok(SAMPLE_KEY));
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let req = request_with(&format!("sec-websocket-key: {SAMPLE_KEY}\r\n"));
        assert_eq!(extract_key(&req), Ok(SAMPLE_KEY));
    }

    #[test]
    fn missing_key_is_rejected() {
        let req = request_with("Upgrade: websocket\r\n");
        assert_eq!(extract_key(&req), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn key_without_separator_is_malformed() {
        let req = request_with(&format!("Sec-WebSocket-Key:{SAMPLE_KEY}\r\n"));
        assert!(matches!(
            extract_key(&req),
            Err(HandshakeError::MalformedKey(_))
        ));
    }

    #[test]
    fn empty_key_is_malformed() {
        let req = request_with("Sec-WebSocket-Key:    \r\n");
        assert!(matches!(
            extract_key(&req),
            Err(HandshakeError::MalformedKey(_))
        ));
    }

    #[test]
    fn headers_after_blank_line_are_ignored() {
        let req = format!("GET / HTTP/1.1\r\n\r\nSec-WebSocket-Key: {SAMPLE_KEY}\r\n");
        assert_eq!(extract_key(&req), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn respond_builds_fixed_shape_response() {
        let req = request_with(&format!("Sec-WebSocket-Key: {SAMPLE_KEY}\r\n"));
        let Ok(response) = respond(req.as_bytes()) else {
            panic!("valid request rejected");
        };
        assert_eq!(
            response,
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[test]
    fn respond_rejects_invalid_utf8() {
        let head = b"GET / HTTP/1.1\r\nX: \xff\xfe\r\n\r\n";
        assert_eq!(respond(head), Err(HandshakeError::InvalidEncoding));
    }
}
