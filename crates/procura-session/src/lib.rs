//! Client session management for Procura.
//!
//! This crate owns the answer to "is the user signed in, as whom, and for
//! how much longer":
//!
//! 1. **Credentials**: the bearer token, persisted through a
//!    [`CredentialStore`] so it survives restarts
//! 2. **Expiry**: a timer armed from the token's own `exp` claim that
//!    ends the session the moment the server would start rejecting it
//! 3. **Background grace**: a second timer that ends the session if the
//!    app stays in the background too long, and a silent token refresh
//!    when it comes back in time
//!
//! # How it fits in the stack
//!
//! ```text
//! UI / platform lifecycle (above)  ← reads snapshots, reports Foreground/Background
//!     ↕
//! Session Layer (this crate)  ← SessionManager: state machine + timers
//!     ↕
//! Transport Layer (below)  ← AuthApi / ProfileApi over HTTP
//! ```

mod error;
mod manager;
mod session;
mod store;
mod timer;

pub use error::{SessionError, StoreError};
pub use manager::SessionManager;
pub use session::{
    DEFAULT_BACKGROUND_GRACE, DEFAULT_STORAGE_KEY, LOGIN_IN_PROGRESS_MESSAGE,
    LifecyclePhase, LoginOutcome, STORAGE_FAILURE_MESSAGE, SessionConfig,
    SessionNotice, SessionSnapshot, SessionState,
};
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use timer::{ArmedTimers, TimerKind};
