//! `ProcuraClient` builder and wiring.
//!
//! This is the entry point for an app using Procura. It ties the layers
//! together: HTTP client → session manager → background tasks that feed
//! it rejection and lifecycle events.

use std::path::PathBuf;
use std::time::Duration;

use procura_protocol::{Profile, ProfileUpdate, Role, RoleChange, UserSummary};
use procura_session::{
    CredentialStore, FileStore, LifecyclePhase, LoginOutcome, MemoryStore,
    SessionConfig, SessionManager, SessionNotice, SessionSnapshot, SessionState,
    StoreError,
};
use procura_transport::{AccountApi, HttpApiClient};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::info;

use crate::{ClientConfig, ProcuraError};

/// Lifecycle events buffered before `send` starts waiting.
const LIFECYCLE_CAPACITY: usize = 32;

/// Where the host platform reports foreground/background transitions.
pub type LifecycleSender = mpsc::Sender<LifecyclePhase>;

/// The session manager as wired by [`ProcuraClient`].
pub type ClientSession = SessionManager<HttpApiClient, HttpApiClient, ClientStore>;

/// The credential store picked from [`ClientConfig::storage_dir`].
#[derive(Debug, Clone)]
pub enum ClientStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl CredentialStore for ClientStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::File(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.set(key, value).await,
            Self::File(store) => store.set(key, value).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.delete(key).await,
            Self::File(store) => store.delete(key).await,
        }
    }
}

/// Builder for configuring and starting a Procura client.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), procura::ProcuraError> {
/// use procura::prelude::*;
///
/// let client = ProcuraClient::builder()
///     .config(ClientConfig::from_env()?)
///     .build()?;
/// client.hydrate().await;
///
/// let outcome = client.login("ana@example.com", "secret").await;
/// if let Some(message) = outcome.error {
///     eprintln!("{message}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct ProcuraClientBuilder {
    config: ClientConfig,
    store: Option<ClientStore>,
}

impl ProcuraClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            store: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_url(mut self, url: &str) -> Self {
        self.config.api_url = url.to_string();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn background_grace(mut self, grace: Duration) -> Self {
        self.config.background_grace = grace;
        self
    }

    /// Persists the token under `dir` instead of keeping it in memory.
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = Some(dir.into());
        self
    }

    /// Uses `store` regardless of `storage_dir`. Handy for tests and for
    /// platforms that supply their own keychain-backed store.
    pub fn store(mut self, store: ClientStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Validates the config and starts the client.
    ///
    /// Spawns the rejection listener and the lifecycle driver, so it must
    /// be called from inside a Tokio runtime. The stored session is *not*
    /// loaded yet: call [`ProcuraClient::hydrate`] when the UI is ready to
    /// show a loading state.
    pub fn build(self) -> Result<ProcuraClient, ProcuraError> {
        let config = self.config.validated()?;

        let (rejections_tx, rejections_rx) = mpsc::unbounded_channel();
        let api = HttpApiClient::with_timeout(&config.api_url, config.request_timeout)?
            .on_unauthorized(rejections_tx);

        let store = self.store.unwrap_or_else(|| match &config.storage_dir {
            Some(dir) => ClientStore::File(FileStore::new(dir)),
            None => ClientStore::Memory(MemoryStore::new()),
        });

        let session = SessionManager::new(
            api.clone(),
            api.clone(),
            store,
            SessionConfig {
                background_grace: config.background_grace,
                storage_key: config.storage_key.clone(),
            },
        );
        let _ = session.watch_rejections(rejections_rx);

        let (lifecycle, lifecycle_rx) = mpsc::channel(LIFECYCLE_CAPACITY);
        let _ = session.drive_lifecycle(lifecycle_rx);

        info!(
            api = %api.base_url(),
            persistent = config.storage_dir.is_some(),
            grace_secs = config.background_grace.as_secs(),
            "Procura client ready"
        );
        Ok(ProcuraClient {
            api,
            session,
            lifecycle,
            config,
        })
    }
}

impl Default for ProcuraClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured client: session state plus the account API.
///
/// Session operations are forwarded to the [`ClientSession`]; account
/// operations that need the session token go through
/// [`SessionManager::authorized`], so a 401/403 on any of them ends the
/// session.
pub struct ProcuraClient {
    api: HttpApiClient,
    session: ClientSession,
    lifecycle: LifecycleSender,
    config: ClientConfig,
}

impl ProcuraClient {
    /// Creates a new builder.
    pub fn builder() -> ProcuraClientBuilder {
        ProcuraClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn api(&self) -> &HttpApiClient {
        &self.api
    }

    /// A sender for OS lifecycle events. Events are applied in order by a
    /// background task; the client keeps working after senders are dropped.
    pub fn lifecycle(&self) -> LifecycleSender {
        self.lifecycle.clone()
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub async fn hydrate(&self) {
        self.session.hydrate().await;
    }

    pub async fn login(&self, email: &str, password: &str) -> LoginOutcome {
        self.session.login(email, password).await
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    pub async fn refresh_user(&self) {
        self.session.refresh_user().await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.session.notices()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The signed-in user's profile, if it has been fetched.
    pub fn user(&self) -> Option<Profile> {
        self.session.snapshot().user
    }

    // -----------------------------------------------------------------------
    // Registration and password recovery (no session needed)
    // -----------------------------------------------------------------------

    /// Registration step 1. Returns the temporary token for step 2.
    pub async fn register_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ProcuraError> {
        Ok(self.api.register_credentials(email, password).await?)
    }

    /// Registration step 2.
    pub async fn register_profile(
        &self,
        temp_token: &str,
        profile: &ProfileUpdate,
    ) -> Result<(), ProcuraError> {
        Ok(self.api.register_profile(temp_token, profile).await?)
    }

    pub async fn verify_account(&self, verification_token: &str) -> Result<(), ProcuraError> {
        Ok(self.api.verify_account(verification_token).await?)
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ProcuraError> {
        Ok(self.api.forgot_password(email).await?)
    }

    /// Returns the reset token for [`reset_password`](Self::reset_password).
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<String, ProcuraError> {
        Ok(self.api.verify_otp(email, otp).await?)
    }

    pub async fn reset_password(
        &self,
        reset_token: &str,
        password: &str,
    ) -> Result<(), ProcuraError> {
        Ok(self.api.reset_password(reset_token, password).await?)
    }

    // -----------------------------------------------------------------------
    // Account (session token)
    // -----------------------------------------------------------------------

    /// Saves the profile, then re-fetches it so the snapshot reflects the
    /// server's copy.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ProcuraError> {
        let api = &self.api;
        self.session
            .authorized(|token| async move { api.update_profile(token.as_str(), update).await })
            .await?;
        self.session.refresh_user().await;
        Ok(())
    }

    /// Checks the current password before letting the user pick a new one.
    pub async fn verify_password(&self, current_password: &str) -> Result<(), ProcuraError> {
        let api = &self.api;
        self.session
            .authorized(|token| async move {
                api.verify_password(token.as_str(), current_password).await
            })
            .await?;
        Ok(())
    }

    pub async fn change_password(&self, new_password: &str) -> Result<(), ProcuraError> {
        let api = &self.api;
        self.session
            .authorized(|token| async move {
                api.change_password(token.as_str(), new_password).await
            })
            .await?;
        Ok(())
    }

    /// Admin only; the server answers 403 otherwise, which ends the session.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, ProcuraError> {
        let api = &self.api;
        Ok(self
            .session
            .authorized(|token| async move { api.list_users(token.as_str()).await })
            .await?)
    }

    /// Admin only.
    pub async fn update_user_role(&self, email: &str, role: Role) -> Result<(), ProcuraError> {
        let api = &self.api;
        let change = RoleChange {
            email: email.to_string(),
            new_role: role,
        };
        let change = &change;
        self.session
            .authorized(|token| async move { api.update_user_role(token.as_str(), change).await })
            .await?;
        Ok(())
    }
}
