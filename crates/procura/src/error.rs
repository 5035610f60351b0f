//! Unified error type for the Procura client.

use procura_protocol::ProtocolError;
use procura_session::{STORAGE_FAILURE_MESSAGE, SessionError, StoreError};
use procura_transport::{ApiError, UNEXPECTED_RESPONSE_MESSAGE};

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `procura` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impl, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ProcuraError {
    /// A token that couldn't be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A remote call failed (rejected, unreachable, bad body).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A session operation failed (no session, storage, login guard).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The client configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProcuraError {
    /// The string the UI should display for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
            Self::Protocol(_) => UNEXPECTED_RESPONSE_MESSAGE.to_string(),
            Self::Store(_) => STORAGE_FAILURE_MESSAGE.to_string(),
            Self::Config(e) => e.to_string(),
        }
    }
}
