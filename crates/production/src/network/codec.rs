//! Frame encoding and decoding for the peer transport.

use bytes::Bytes;
use thiserror::Error;
use veriqo_core::Envelope;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Encode an envelope into one frame payload.
pub fn encode_frame(envelope: &Envelope) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}

/// Decode one frame payload into an envelope.
pub fn decode_frame(data: &[u8]) -> Result<Envelope, CodecError> {
    if data.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    Ok(serde_json::from_slice(data)?)
}
