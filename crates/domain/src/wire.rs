//! Typed binary framing for the agent data plane.
//!
//! Each WebSocket binary frame carries exactly one bincode-encoded record.
//! The first record on a data connection is the column-name list; every
//! subsequent record is one row of [`ScalarValue`]s. Both ends share the
//! `ScalarValue` enum, so the stream is self-describing at the type level.

use thiserror::Error;

use crate::models::value::ScalarValue;

/// Errors produced while encoding or decoding data-plane records.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("wire encoding failed: {0}")]
    Encode(#[source] bincode::Error),

    #[error("wire decoding failed: {0}")]
    Decode(#[source] bincode::Error),
}

/// Encodes the column-name record that opens a data stream.
pub fn encode_columns(columns: &[String]) -> Result<Vec<u8>, WireError> {
    bincode::serialize(columns).map_err(WireError::Encode)
}

/// Decodes the column-name record.
pub fn decode_columns(frame: &[u8]) -> Result<Vec<String>, WireError> {
    bincode::deserialize(frame).map_err(WireError::Decode)
}

/// Encodes a single row record.
pub fn encode_row(values: &[ScalarValue]) -> Result<Vec<u8>, WireError> {
    bincode::serialize(values).map_err(WireError::Encode)
}

/// Decodes a single row record.
pub fn decode_row(frame: &[u8]) -> Result<Vec<ScalarValue>, WireError> {
    bincode::deserialize(frame).map_err(WireError::Decode)
}
