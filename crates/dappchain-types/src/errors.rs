//! Decode error types.

use thiserror::Error;

/// Bytes or text did not match the expected schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Protobuf decoding failed.
    #[error("Malformed {message}: {reason}")]
    Malformed {
        /// Name of the message being decoded.
        message: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },

    /// A required nested field was absent.
    #[error("Missing field {field} in {message}")]
    MissingField {
        /// Name of the message being decoded.
        message: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },

    /// Local address had the wrong length.
    #[error("Invalid local address length: expected {expected}, got {actual}")]
    InvalidAddressLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Address text was not `<chain_id>:0x<hex>`.
    #[error("Invalid address string: {0}")]
    InvalidAddressString(String),

    /// Enumeration value outside the known range.
    #[error("Unknown {kind} value {value}")]
    UnknownEnumValue {
        /// Enumeration name.
        kind: &'static str,
        /// Received value.
        value: i64,
    },

    /// Text encoding (JSON, base64, hex) failed.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

impl DecodeError {
    /// Wrap a protobuf decode failure.
    pub fn malformed(message: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            message,
            reason: err.to_string(),
        }
    }
}
