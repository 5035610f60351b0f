/// User-facing text for failures that never reached the server.
pub const CONNECTION_MESSAGE: &str = "Error de conexión.";

/// User-facing text for a 2xx whose body we couldn't use.
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "Respuesta inesperada del servidor.";

/// User-facing text shown when the server revoked the session.
pub const SESSION_EXPIRED_MESSAGE: &str =
    "Tu sesión ha expirado. Inicia sesión nuevamente.";

/// Errors that can occur talking to the remote API.
///
/// The variants follow how the session layer must react, not how HTTP
/// failed: an `Unauthorized` ends the session, a `Rejected` is shown to
/// the user verbatim, a `Network` error gets a generic connectivity text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// 401 or 403 on a call made with the session token.
    #[error("unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-2xx. `message` is the server's text when it sent
    /// one, otherwise a per-operation fallback.
    #[error("{message} (HTTP {status})")]
    Rejected { status: u16, message: String },

    /// The request never got a response (DNS, refused, timeout...).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered 2xx but the body wasn't what we expected.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// The string the UI should display for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            Self::Unauthorized { .. } => SESSION_EXPIRED_MESSAGE.to_string(),
            Self::Network(_) => CONNECTION_MESSAGE.to_string(),
            Self::Decode(_) => UNEXPECTED_RESPONSE_MESSAGE.to_string(),
        }
    }
}
