#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! # `nodebridge-codec` — Payload Codec
//!
//! The UI runtime can only hand text across the bridge, while the embedded
//! node consumes and produces raw protobuf bytes. This crate converts between
//! the two representations:
//!
//! - [`decode`] turns the text-safe wire form (standard, padded base64) into
//!   the raw bytes sent to the node.
//! - [`encode`] turns node response bytes back into text for the UI.
//!
//! Decoding never panics: malformed input of any shape is reported as a
//! [`DecodeError`]. For every byte sequence `b`, `decode(&encode(&b)) == b`.
//!
//! ## Example
//! ```
//! let text = codec::encode(b"\x08\x01");
//! assert_eq!(text, "CAE=");
//! assert_eq!(codec::decode(&text).expect("valid base64").as_ref(), b"\x08\x01");
//! assert!(codec::decode("not base64!").is_err());
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

/// Type alias for codec results.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// A text payload could not be decoded into bytes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid base64 payload: {reason}")]
pub struct DecodeError {
    /// Human readable description of what was wrong with the input.
    pub reason: String,
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self { DecodeError { reason: err.to_string() } }
}

/// Decodes a base64 text payload into raw request bytes.
///
/// The empty string decodes to an empty payload, which is how the UI sends
/// requests whose protobuf message has no fields set.
///
/// # Errors
///
/// Returns [`DecodeError`] if `text` is not valid standard base64.
pub fn decode(text: &str) -> Result<Bytes> {
    let raw = STANDARD.decode(text.as_bytes())?;
    Ok(Bytes::from(raw))
}

/// Encodes raw response bytes as base64 text.
pub fn encode(bytes: &[u8]) -> String { STANDARD.encode(bytes) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty() {
        let decoded = decode("").expect("empty string is valid base64");
        assert!(decoded.is_empty());
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for input in ["%%%", "abc", "====", "CAE", "C A E="] {
            let err = decode(input).expect_err("input should not decode");
            assert!(!err.reason.is_empty(), "missing reason for {:?}", input);
        }
    }

    #[test]
    fn test_known_vector() {
        // lnrpc.GetInfoRequest{} is empty, WalletBalanceRequest{account: "default"}
        // serializes to field 1 length-delimited.
        let request = b"\x0a\x07default";
        assert_eq!(encode(request), "CgdkZWZhdWx0");
        assert_eq!(decode("CgdkZWZhdWx0").expect("decodes").as_ref(), request);
    }
}
