//! Error types for the protocol layer.
//!
//! Each crate in Procura defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in the shape of the data,
//! not in networking or session bookkeeping.

/// Errors that can occur while decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The token isn't in compact `header.payload.signature` form, or its
    /// payload segment isn't valid base64url.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The bytes were well-formed but didn't match the expected type
    /// (for example a token payload without an `exp` claim).
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}
