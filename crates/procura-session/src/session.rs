//! Session types: configuration, lifecycle phases and the snapshot the UI
//! renders from.

use std::time::{Duration, SystemTime};

use procura_protocol::{Profile, Role, Token};

/// How long the app may sit in the background before the session ends.
pub const DEFAULT_BACKGROUND_GRACE: Duration = Duration::from_secs(15 * 60);

/// The single key the session token is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "userToken";

/// Returned by `login` while another login is still running.
pub const LOGIN_IN_PROGRESS_MESSAGE: &str = "Ya hay un inicio de sesión en curso.";

/// Returned by `login` when the token can't be written to the device.
pub const STORAGE_FAILURE_MESSAGE: &str =
    "No se pudo guardar la sesión en el dispositivo.";

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Sensible defaults are provided; override just the fields you care about
/// with struct update syntax:
///
/// ```rust
/// use std::time::Duration;
/// use procura_session::SessionConfig;
///
/// let config = SessionConfig {
///     background_grace: Duration::from_secs(60),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.storage_key, "userToken");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time allowed in the background before a forced logout.
    /// Default: 15 minutes.
    pub background_grace: Duration,

    /// Credential-store key holding the token. Default: `"userToken"`.
    pub storage_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            background_grace: DEFAULT_BACKGROUND_GRACE,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecyclePhase / SessionState
// ---------------------------------------------------------------------------

/// Whether the host app is visible, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    #[default]
    Foreground,
    Background,
}

/// The session state machine, derived from credential presence and
/// lifecycle phase:
///
/// ```text
///                login ok                 OS: background
///   NoSession ───────────→ ActiveForeground ─────────────→ ActiveBackground
///       ↑                        ↑   │                          │  │
///       │                        │   │ expiry / logout / 401    │  │
///       ├────────────────────────┼───┘                          │  │
///       │                        └──── OS: foreground + refresh ┘  │
///       └──────── grace elapsed / expiry / refresh failed ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token, no timers armed.
    NoSession,
    /// Token present, expiry timer armed.
    ActiveForeground,
    /// Token present, expiry timer and grace timer both armed.
    ActiveBackground,
}

/// Why a session ended. Broadcast once per ended session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// The token reached its `exp`. The UI shows a "session expired" notice.
    Expired,
    /// The app stayed in the background longer than the grace period.
    GraceElapsed,
    /// The server answered 401/403 to an authenticated call.
    Revoked,
    /// Refreshing the token on resume failed.
    RefreshFailed,
    /// The user signed out.
    LoggedOut,
}

impl SessionNotice {
    /// `true` for everything the user didn't ask for.
    pub fn is_forced(&self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

// ---------------------------------------------------------------------------
// LoginOutcome
// ---------------------------------------------------------------------------

/// What `login` hands back to the form: never an error type, just whether
/// it worked and, if not, the text to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl LoginOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// An immutable view of the session, published on every change.
///
/// UI code subscribes to these instead of touching the manager's state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub token: Option<Token>,
    /// `None` until the profile fetch succeeds, even with a valid token.
    pub user: Option<Profile>,
    pub phase: LifecyclePhase,
    /// `true` from startup until the stored token has been loaded.
    pub is_session_loading: bool,
    /// `true` only while a login call is in flight.
    pub is_login_loading: bool,
}

impl SessionSnapshot {
    pub fn state(&self) -> SessionState {
        match (&self.token, self.phase) {
            (None, _) => SessionState::NoSession,
            (Some(_), LifecyclePhase::Foreground) => SessionState::ActiveForeground,
            (Some(_), LifecyclePhase::Background) => SessionState::ActiveBackground,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// The user's role: from the profile when it has arrived, otherwise
    /// from the token claim, so role-gated screens can be decided offline.
    pub fn role(&self) -> Option<&Role> {
        self.user
            .as_ref()
            .map(|u| &u.role)
            .or_else(|| self.token.as_ref().and_then(Token::role))
    }

    /// Always derived from the current token, never stored separately.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.token.as_ref().map(Token::expires_at)
    }
}
