//! # Procura
//!
//! Client library for the Procura procurement-manual service.
//!
//! Procura keeps the signed-in session honest on a device that sleeps,
//! loses network and gets killed in the background: the token's own
//! expiry ends the session on time, fifteen minutes in the background
//! ends it too, and coming back sooner silently refreshes the token. The
//! app reads a reactive [`SessionSnapshot`](procura_session::SessionSnapshot)
//! and never touches the token itself.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use procura::prelude::*;
//!
//! # async fn run() -> Result<(), ProcuraError> {
//! procura::init_tracing();
//!
//! let client = ProcuraClient::builder()
//!     .api_url("https://manuales.example.org")
//!     .storage_dir("/var/lib/procura")
//!     .build()?;
//! client.hydrate().await;
//!
//! // Wire the platform's lifecycle callbacks to this sender.
//! let lifecycle = client.lifecycle();
//! lifecycle.send(LifecyclePhase::Background).await.ok();
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{
    ClientSession, ClientStore, LifecycleSender, ProcuraClient,
    ProcuraClientBuilder,
};
pub use config::{
    ClientConfig, ConfigError, ENV_API_URL, ENV_GRACE_SECS,
    ENV_REQUEST_TIMEOUT_SECS, ENV_STORAGE_DIR,
};
pub use error::ProcuraError;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything an app usually needs, in one import.
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientStore, LifecycleSender, ProcuraClient,
        ProcuraError,
    };
    pub use procura_protocol::{Profile, ProfileUpdate, Role, Token, UserSummary};
    pub use procura_session::{
        FileStore, LifecyclePhase, LoginOutcome, MemoryStore, SessionNotice,
        SessionSnapshot, SessionState,
    };
}
