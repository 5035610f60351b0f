//! Error types for the session layer.

use procura_protocol::ProtocolError;
use procura_transport::{ApiError, UNEXPECTED_RESPONSE_MESSAGE};

use crate::session::{LOGIN_IN_PROGRESS_MESSAGE, STORAGE_FAILURE_MESSAGE};

/// Errors from the durable credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying filesystem (or keychain) call failed.
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Keys become file names, so they're restricted to a safe alphabet.
    #[error("invalid credential key {0:?}")]
    InvalidKey(String),
}

/// Errors that can occur while changing session state.
///
/// Most of these never reach the UI as-is: `login` folds them into a
/// [`LoginOutcome`](crate::LoginOutcome) via [`SessionError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server handed us a token we can't read (no `exp`, bad base64...).
    #[error("unusable token: {0}")]
    Token(#[from] ProtocolError),

    /// The server issued a token that is already past its expiry.
    #[error("token already expired")]
    TokenExpired,

    /// The token couldn't be persisted or cleared.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A login call is already in flight.
    #[error("login already in progress")]
    LoginInProgress,

    /// The operation needs a signed-in user.
    #[error("no active session")]
    NoSession,
}

impl SessionError {
    /// The string the UI should display for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(e) => e.user_message(),
            Self::Token(_) | Self::TokenExpired => {
                UNEXPECTED_RESPONSE_MESSAGE.to_string()
            }
            Self::Store(_) => STORAGE_FAILURE_MESSAGE.to_string(),
            Self::LoginInProgress => LOGIN_IN_PROGRESS_MESSAGE.to_string(),
            Self::NoSession => {
                procura_transport::SESSION_EXPIRED_MESSAGE.to_string()
            }
        }
    }
}
