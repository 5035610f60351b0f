//! The session manager: the single owner of the signed-in session.
//!
//! Everything the UI needs to know about authentication lives here:
//! the current token (and its decoded expiry), the user's profile, the
//! app's lifecycle phase and the two timers that can end the session on
//! their own.
//!
//! # Concurrency note
//!
//! `SessionManager` is a cheap handle around an `Arc`. All mutable state
//! sits behind one `tokio::sync::Mutex`, so every transition (a login
//! completing, a timer firing, the app going to the background) is applied
//! atomically with respect to the others. Network calls are made *without*
//! the lock held, and their results are only applied if the token they were
//! made with is still the current one. That check is what keeps a slow
//! refresh or profile fetch from resurrecting a session that ended while it
//! was in flight.
//!
//! Timer tasks and listener tasks hold a `Weak` reference. Dropping the
//! last handle drops the state, which aborts any armed timer.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use procura_protocol::{Profile, Token};
use procura_transport::{
    ApiError, AuthApi, AuthRejection, ProfileApi, SESSION_EXPIRED_MESSAGE,
};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::CredentialStore;
use crate::timer::{ArmedTimers, TimerKind, TimerSlot};
use crate::{
    LifecyclePhase, LoginOutcome, SessionConfig, SessionError, SessionNotice,
    SessionSnapshot, SessionState,
};

/// Lagging notice subscribers lose the oldest notices beyond this.
const NOTICE_CAPACITY: usize = 16;

/// Mutable session state. Only ever touched with the lock held.
struct Inner {
    token: Option<Token>,
    user: Option<Profile>,
    phase: LifecyclePhase,
    session_loading: bool,
    login_in_flight: bool,
    refresh_in_flight: bool,
    hydrated: bool,
    expiry: TimerSlot,
    grace: TimerSlot,
}

impl Inner {
    fn new() -> Self {
        Self {
            token: None,
            user: None,
            phase: LifecyclePhase::Foreground,
            // Until `hydrate` has looked at storage, "no token" doesn't
            // yet mean "signed out".
            session_loading: true,
            login_in_flight: false,
            refresh_in_flight: false,
            hydrated: false,
            expiry: TimerSlot::new(TimerKind::Expiry),
            grace: TimerSlot::new(TimerKind::Grace),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token.clone(),
            user: self.user.clone(),
            phase: self.phase,
            is_session_loading: self.session_loading,
            is_login_loading: self.login_in_flight,
        }
    }

    /// Whether `raw` is the current session token.
    fn holds(&self, raw: &str) -> bool {
        self.token.as_ref().is_some_and(|t| t.as_str() == raw)
    }
}

struct Shared<A, P, S> {
    auth: A,
    profile: P,
    store: S,
    config: SessionConfig,
    inner: Mutex<Inner>,
    snapshot: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<SessionNotice>,
}

/// Owns the session and enforces both ways it can time out.
///
/// ## Lifecycle
///
/// ```text
/// hydrate() / login() ──→ [ActiveForeground] ←──── on_lifecycle(Foreground)
///                              │       ▲              + refresh
///            expiry / logout() │       │                  │
///            / 401             │   on_lifecycle(Background)
///                              ▼       │                  │
///                         [NoSession] ←── grace / expiry ── [ActiveBackground]
/// ```
///
/// The UI reads state through [`subscribe`](Self::subscribe) (a `watch`
/// channel that always holds the latest [`SessionSnapshot`]) and learns
/// *why* a session ended through [`notices`](Self::notices).
pub struct SessionManager<A, P, S> {
    shared: Arc<Shared<A, P, S>>,
}

// Manual impl: a derive would require `A: Clone, P: Clone, S: Clone`.
impl<A, P, S> Clone for SessionManager<A, P, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, P, S> SessionManager<A, P, S>
where
    A: AuthApi,
    P: ProfileApi,
    S: CredentialStore,
{
    /// Creates a manager with no session. Call [`hydrate`](Self::hydrate)
    /// once at startup to pick up a token persisted by a previous run;
    /// until then the snapshot reports `is_session_loading`.
    pub fn new(auth: A, profile: P, store: S, config: SessionConfig) -> Self {
        let inner = Inner::new();
        let (snapshot, _) = watch::channel(inner.snapshot());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                auth,
                profile,
                store,
                config,
                inner: Mutex::new(inner),
                snapshot,
                notices,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// The auth backend, for account calls that sit outside the session
    /// state machine.
    pub fn auth(&self) -> &A {
        &self.shared.auth
    }

    /// The latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// A receiver for "why did the session end" events.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.shared.notices.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.shared.snapshot.borrow().state()
    }

    /// Deadlines of the timers currently armed.
    pub async fn armed_timers(&self) -> ArmedTimers {
        let inner = self.shared.inner.lock().await;
        ArmedTimers {
            expiry: inner.expiry.deadline(),
            grace: inner.grace.deadline(),
        }
    }

    // -----------------------------------------------------------------------
    // Hydration
    // -----------------------------------------------------------------------

    /// Loads the persisted token, once per process.
    ///
    /// `is_session_loading` is `true` from construction until this
    /// returns. A stored token that can't be decoded or is already expired
    /// is deleted rather than restored. A usable one arms the expiry timer and triggers a profile
    /// fetch, exactly as if the user had just logged in.
    pub async fn hydrate(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.hydrated {
            return;
        }
        inner.hydrated = true;
        if inner.token.is_some() {
            debug!("session already active; skipping hydration");
            inner.session_loading = false;
            self.publish(&inner);
            return;
        }

        let restored = self.load_stored_token().await;
        if let Some(token) = &restored {
            info!(
                expires_in_secs = token.remaining_at(SystemTime::now()).as_secs(),
                "restored session from storage"
            );
            self.install(&mut inner, token.clone());
            self.publish(&inner);
        }
        drop(inner);

        if let Some(token) = restored {
            // Failures are logged inside; a revoked token ends the session.
            let _ = self.load_profile(&token).await;
        }

        let mut inner = self.shared.inner.lock().await;
        inner.session_loading = false;
        self.publish(&inner);
    }

    async fn load_stored_token(&self) -> Option<Token> {
        let key = &self.shared.config.storage_key;
        let raw = match self.shared.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "could not read stored token");
                return None;
            }
        };

        match Token::parse(raw) {
            Ok(token) if !token.is_expired_at(SystemTime::now()) => {
                return Some(token);
            }
            Ok(_) => info!("stored token has expired; discarding it"),
            Err(e) => warn!(error = %e, "stored token is unreadable; discarding it"),
        }
        if let Err(e) = self.shared.store.delete(key).await {
            warn!(error = %e, "failed to delete stale stored token");
        }
        None
    }

    // -----------------------------------------------------------------------
    // Login / logout
    // -----------------------------------------------------------------------

    /// Exchanges credentials for a session.
    ///
    /// Never fails loudly: every problem is folded into the returned
    /// [`LoginOutcome`], and any failure leaves the manager in
    /// [`SessionState::NoSession`] with nothing in storage. A failed
    /// *profile* fetch after a successful login does not fail the login;
    /// the session just has no `user` yet.
    pub async fn login(&self, email: &str, password: &str) -> LoginOutcome {
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.login_in_flight {
                debug!("login rejected; another one is in flight");
                return LoginOutcome::failure(
                    SessionError::LoginInProgress.user_message(),
                );
            }
            inner.login_in_flight = true;
            self.publish(&inner);
        }

        let outcome = match self.establish(email, password).await {
            Ok(token) => match self.load_profile(&token).await {
                Err(e) if e.is_unauthorized() => {
                    LoginOutcome::failure(SESSION_EXPIRED_MESSAGE)
                }
                _ => LoginOutcome::success(),
            },
            Err(e) => {
                warn!(error = %e, "login failed");
                self.end_session(SessionNotice::LoggedOut).await;
                LoginOutcome::failure(e.user_message())
            }
        };

        let mut inner = self.shared.inner.lock().await;
        inner.login_in_flight = false;
        self.publish(&inner);
        outcome
    }

    /// Calls the API, validates the token and makes it the session's.
    async fn establish(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Token, SessionError> {
        let raw = self.shared.auth.login(email, password).await?;
        let token = Token::parse(raw)?;
        if token.is_expired_at(SystemTime::now()) {
            return Err(SessionError::TokenExpired);
        }

        let mut inner = self.shared.inner.lock().await;
        self.shared
            .store
            .set(&self.shared.config.storage_key, token.as_str())
            .await?;
        inner.user = None;
        self.install(&mut inner, token.clone());
        self.publish(&inner);

        info!(
            role = token.role().map(|r| r.as_str()).unwrap_or("unknown"),
            expires_in_secs = token.remaining_at(SystemTime::now()).as_secs(),
            "logged in"
        );
        Ok(token)
    }

    /// Ends the session at the user's request.
    ///
    /// Idempotent: a second call clears storage again and does nothing else.
    pub async fn logout(&self) {
        self.end_session(SessionNotice::LoggedOut).await;
    }

    /// Forced logout after the server rejected the session token.
    pub async fn on_unauthorized(&self) {
        self.end_session(SessionNotice::Revoked).await;
    }

    /// Re-fetches the profile for the current token.
    ///
    /// A failure leaves `user` as it was. Only a 401/403 ends the session.
    pub async fn refresh_user(&self) {
        let Some(token) = self.current_token() else {
            debug!("refresh_user without a session");
            return;
        };
        let _ = self.load_profile(&token).await;
    }

    /// Runs `call` with the current token, forcing a logout if the server
    /// rejects it.
    ///
    /// For account calls made outside the session manager:
    ///
    /// ```rust,ignore
    /// session
    ///     .authorized(|token| async move {
    ///         api.change_password(token.as_str(), "new-secret").await
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    /// [`SessionError::NoSession`] without a session, otherwise whatever
    /// the call returned.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, SessionError>
    where
        F: FnOnce(Token) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self.current_token().ok_or(SessionError::NoSession)?;
        match call(token.clone()).await {
            Err(e) if e.is_unauthorized() => {
                self.end_session_for(token.as_str(), SessionNotice::Revoked)
                    .await;
                Err(e.into())
            }
            result => result.map_err(SessionError::from),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Feeds an OS lifecycle transition into the state machine.
    ///
    /// - `Background` arms the grace timer (re-arming it if it was armed).
    /// - `Foreground` cancels the grace timer and, when returning from the
    ///   background with a session, refreshes the token once. This call
    ///   returns after the refresh has been applied.
    pub async fn on_lifecycle(&self, phase: LifecyclePhase) {
        let mut inner = self.shared.inner.lock().await;
        let previous = std::mem::replace(&mut inner.phase, phase);
        debug!(?previous, ?phase, "lifecycle transition");

        match phase {
            LifecyclePhase::Background => {
                if inner.token.is_some() {
                    self.arm_grace(&mut inner);
                }
                self.publish(&inner);
            }
            LifecyclePhase::Foreground => {
                inner.grace.cancel();
                let resume = previous == LifecyclePhase::Background
                    && !inner.refresh_in_flight;
                let stale = if resume { inner.token.clone() } else { None };
                if stale.is_some() {
                    inner.refresh_in_flight = true;
                }
                self.publish(&inner);
                drop(inner);

                if let Some(stale) = stale {
                    self.resume_refresh(stale).await;
                }
            }
        }
    }

    /// Swaps `stale` for a fresh token, or ends the session.
    ///
    /// Every failure is treated the same way, whether the token had
    /// already expired or the network was down.
    async fn resume_refresh(&self, stale: Token) {
        let result = self.exchange(&stale).await;

        let mut inner = self.shared.inner.lock().await;
        inner.refresh_in_flight = false;
        if !inner.holds(stale.as_str()) {
            debug!("session changed while refreshing; discarding result");
            return;
        }

        match result {
            Ok(fresh) => {
                if let Err(e) = self
                    .shared
                    .store
                    .set(&self.shared.config.storage_key, fresh.as_str())
                    .await
                {
                    warn!(error = %e, "failed to persist refreshed token");
                }
                self.arm_expiry(&mut inner, &fresh);
                info!(
                    expires_in_secs =
                        fresh.remaining_at(SystemTime::now()).as_secs(),
                    "token refreshed on resume"
                );
                inner.token = Some(fresh);
                self.publish(&inner);
            }
            Err(e) => {
                warn!(error = %e, "refresh on resume failed; ending session");
                let ended = self.clear(&mut inner).await;
                drop(inner);
                self.finish(ended, SessionNotice::RefreshFailed).await;
            }
        }
    }

    async fn exchange(&self, stale: &Token) -> Result<Token, SessionError> {
        if stale.is_expired_at(SystemTime::now()) {
            return Err(SessionError::TokenExpired);
        }
        let raw = self.shared.auth.refresh(stale.as_str()).await?;
        let fresh = Token::parse(raw)?;
        if fresh.is_expired_at(SystemTime::now()) {
            return Err(SessionError::TokenExpired);
        }
        Ok(fresh)
    }

    // -----------------------------------------------------------------------
    // Background tasks
    // -----------------------------------------------------------------------

    /// Spawns a task that forces a logout for every [`AuthRejection`]
    /// reported by the HTTP client. A rejection for a token that is no
    /// longer current is ignored. Ends when the sending side is dropped.
    pub fn watch_rejections(
        &self,
        mut rejections: mpsc::UnboundedReceiver<AuthRejection>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            while let Some(rejection) = rejections.recv().await {
                let Some(shared) = weak.upgrade() else { break };
                warn!(
                    status = rejection.status,
                    path = %rejection.path,
                    "server rejected the session token"
                );
                let manager = SessionManager { shared };
                manager
                    .end_session_for(&rejection.token, SessionNotice::Revoked)
                    .await;
            }
        })
    }

    /// Spawns a task that applies lifecycle events in the order they were
    /// sent. Ends when every sender is dropped.
    pub fn drive_lifecycle(
        &self,
        mut events: mpsc::Receiver<LifecyclePhase>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            while let Some(phase) = events.recv().await {
                let Some(shared) = weak.upgrade() else { break };
                let manager = SessionManager { shared };
                manager.on_lifecycle(phase).await;
            }
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn current_token(&self) -> Option<Token> {
        self.shared.snapshot.borrow().token.clone()
    }

    fn publish(&self, inner: &Inner) {
        self.shared.snapshot.send_replace(inner.snapshot());
    }

    /// Makes `token` current and arms the timers a fresh session needs.
    fn install(&self, inner: &mut Inner, token: Token) {
        self.arm_expiry(inner, &token);
        if inner.phase == LifecyclePhase::Background
            && inner.grace.deadline().is_none()
        {
            self.arm_grace(inner);
        }
        inner.token = Some(token);
    }

    /// A token already past `exp` gets a zero-length timer, which fires
    /// on the next scheduler turn.
    fn arm_expiry(&self, inner: &mut Inner, token: &Token) {
        let after = token.remaining_at(SystemTime::now());
        let weak = Arc::downgrade(&self.shared);
        inner.expiry.arm(after, move |generation| {
            timer_fired(weak, TimerKind::Expiry, generation)
        });
    }

    fn arm_grace(&self, inner: &mut Inner) {
        let after = self.shared.config.background_grace;
        let weak = Arc::downgrade(&self.shared);
        inner.grace.arm(after, move |generation| {
            timer_fired(weak, TimerKind::Grace, generation)
        });
    }

    async fn on_timer_fired(&self, kind: TimerKind, generation: u64) {
        let mut inner = self.shared.inner.lock().await;
        let slot = match kind {
            TimerKind::Expiry => &mut inner.expiry,
            TimerKind::Grace => &mut inner.grace,
        };
        if !slot.claim(generation) {
            debug!(?kind, generation, "ignoring superseded timer");
            return;
        }

        let notice = match kind {
            TimerKind::Expiry => SessionNotice::Expired,
            TimerKind::Grace => SessionNotice::GraceElapsed,
        };
        let ended = self.clear(&mut inner).await;
        drop(inner);
        self.finish(ended, notice).await;
    }

    /// Fetches the profile for `token` and stores it if `token` is still
    /// the session's. A 401/403 ends that session.
    async fn load_profile(&self, token: &Token) -> Result<(), ApiError> {
        match self.shared.profile.get_profile(token.as_str()).await {
            Ok(profile) => {
                let mut inner = self.shared.inner.lock().await;
                if inner.holds(token.as_str()) {
                    debug!(role = %profile.role, "profile loaded");
                    inner.user = Some(profile);
                    self.publish(&inner);
                } else {
                    debug!("discarding profile fetched for a replaced token");
                }
                Ok(())
            }
            Err(e) if e.is_unauthorized() => {
                self.end_session_for(token.as_str(), SessionNotice::Revoked).await;
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "profile fetch failed; keeping session");
                Err(e)
            }
        }
    }

    async fn end_session(&self, notice: SessionNotice) {
        let mut inner = self.shared.inner.lock().await;
        let ended = self.clear(&mut inner).await;
        drop(inner);
        self.finish(ended, notice).await;
    }

    /// Like `end_session`, but only if `token` is still current. Used when
    /// a rejection arrives for a call made with a specific token.
    async fn end_session_for(&self, token: &str, notice: SessionNotice) {
        let mut inner = self.shared.inner.lock().await;
        if !inner.holds(token) {
            debug!(?notice, "rejection for a replaced token ignored");
            return;
        }
        let ended = self.clear(&mut inner).await;
        drop(inner);
        self.finish(ended, notice).await;
    }

    /// Cancels both timers, clears memory (publishing right away) and then
    /// storage. Returns the token that was current, if any.
    async fn clear(&self, inner: &mut Inner) -> Option<Token> {
        inner.expiry.cancel();
        inner.grace.cancel();
        inner.refresh_in_flight = false;
        inner.user = None;
        let ended = inner.token.take();
        self.publish(inner);

        if let Err(e) = self
            .shared
            .store
            .delete(&self.shared.config.storage_key)
            .await
        {
            warn!(error = %e, "failed to clear stored token");
        }
        ended
    }

    /// Announces the end of a session and tells the server. Does nothing
    /// when there was no session to end.
    async fn finish(&self, ended: Option<Token>, notice: SessionNotice) {
        let Some(token) = ended else { return };

        if notice.is_forced() {
            warn!(?notice, "session ended");
        } else {
            info!("logged out");
        }
        // No subscribers is fine.
        let _ = self.shared.notices.send(notice);

        if let Err(e) = self.shared.auth.logout(token.as_str()).await {
            warn!(error = %e, "server logout failed; local session already cleared");
        }
    }
}

async fn timer_fired<A, P, S>(
    shared: Weak<Shared<A, P, S>>,
    kind: TimerKind,
    generation: u64,
) where
    A: AuthApi,
    P: ProfileApi,
    S: CredentialStore,
{
    if let Some(shared) = shared.upgrade() {
        let manager = SessionManager { shared };
        manager.on_timer_fired(kind, generation).await;
    }
}
