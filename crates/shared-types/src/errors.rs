//! # Error Types
//!
//! Decoding errors shared by the subsystems.

use thiserror::Error;

/// Failure to decode a chain payload.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The payload bytes did not decode.
    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// A required attachment was missing.
    #[error("Missing {0}")]
    Missing(&'static str),
}

/// Decodes a bincode payload, naming it in the error.
pub fn decode<T: serde::de::DeserializeOwned>(what: &'static str, data: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(data).map_err(|e| CodecError::Malformed {
        what,
        reason: e.to_string(),
    })
}

/// Bincode encoding of an in-memory value.
pub fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).unwrap_or_default()
}
