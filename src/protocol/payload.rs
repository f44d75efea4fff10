//! Payload decoding for relayed messages.

use crate::error::RelayError;

/// Text substituted for payloads that are not valid UTF-8.
pub const NON_TEXT_PLACEHOLDER: &str = "Received non-text data";

/// Decodes a payload as UTF-8 text.
///
/// # Errors
///
/// Returns [`RelayError::Decode`] if the bytes are not valid UTF-8.
pub fn decode_text(payload: &[u8]) -> Result<String, RelayError> {
    std::str::from_utf8(payload)
        .map(str::to_owned)
        .map_err(|e| RelayError::Decode {
            valid_up_to: e.valid_up_to(),
        })
}

/// Decodes a payload, substituting [`NON_TEXT_PLACEHOLDER`] when it is
/// not text.
#[must_use]
pub fn text_or_placeholder(payload: &[u8]) -> String {
    decode_text(payload).unwrap_or_else(|err| {
        tracing::warn!(error = %err, len = payload.len(), "substituting placeholder for binary payload");
        NON_TEXT_PLACEHOLDER.to_string()
    })
}
