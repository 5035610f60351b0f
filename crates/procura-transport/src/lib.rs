//! Remote API abstraction layer for Procura.
//!
//! Provides the [`AuthApi`], [`ProfileApi`] and [`AccountApi`] traits the
//! session layer talks to, and an HTTP implementation of all three.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpApiClient`] via `reqwest`
//!
//! # Why traits?
//!
//! The session manager only needs "something that can log in, refresh and
//! fetch a profile". Putting those operations behind traits lets tests
//! script the server's answers without a network, and lets the app swap
//! in a different backend without touching session code.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "http")]
mod http;

pub use error::{
    ApiError, CONNECTION_MESSAGE, SESSION_EXPIRED_MESSAGE,
    UNEXPECTED_RESPONSE_MESSAGE,
};
#[cfg(feature = "http")]
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpApiClient};

use std::fmt;
use std::future::Future;

use procura_protocol::{Profile, ProfileUpdate, RoleChange, UserSummary};

/// Emitted whenever the server rejects the session token with 401/403.
///
/// The HTTP client pushes these onto a channel so a single listener can
/// end the session, regardless of which screen or service made the call.
/// `token` is the credential the rejected call carried: a late rejection
/// for a token that has since been replaced must not end the new session.
///
/// `Debug` leaves the token out.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthRejection {
    pub status: u16,
    /// Request path relative to the API root, e.g. `/user/profile`.
    pub path: String,
    pub token: String,
}

impl fmt::Debug for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRejection")
            .field("status", &self.status)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Sending half of the rejection channel.
pub type RejectionSender = tokio::sync::mpsc::UnboundedSender<AuthRejection>;

/// Credential exchange with the auth service.
///
/// # Trait bounds
///
/// - `Send + Sync` → the API can be shared across async tasks (timer
///   tasks call `refresh`/`logout` from wherever Tokio schedules them).
/// - `'static` → it lives as long as the session manager holding it.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchanges credentials for a bearer token.
    ///
    /// # Errors
    /// - [`ApiError::Rejected`]: wrong email/password (server text inside)
    /// - [`ApiError::Network`]: the server couldn't be reached
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Exchanges a still-valid token for a new one with a later expiry.
    ///
    /// A 401/403 comes back as [`ApiError::Rejected`] and is not reported
    /// to the rejection listener: the caller decides how the session ends.
    fn refresh(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Asks the server to invalidate `token`. Best-effort: callers clear
    /// local state whatever this returns.
    fn logout(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Read access to the signed-in user's profile.
pub trait ProfileApi: Send + Sync + 'static {
    fn get_profile(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Profile, ApiError>> + Send;
}

/// Account flows that don't touch the session state machine: registration,
/// password recovery, profile edits and role administration.
///
/// Calls that take `token` use the session token and therefore go through
/// the unauthorized interceptor; `temp_token`/`reset_token` are
/// single-purpose tokens and do not.
pub trait AccountApi: Send + Sync + 'static {
    /// Registration step 1. Returns the temporary token for step 2.
    fn register_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Registration step 2.
    fn register_profile(
        &self,
        temp_token: &str,
        profile: &ProfileUpdate,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Confirms the account with the token from the verification e-mail.
    fn verify_account(
        &self,
        verification_token: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Sends a one-time code to `email`. The server's real reason for a
    /// failure is never surfaced (it would reveal whether the account
    /// exists).
    fn forgot_password(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Trades the one-time code for a reset token.
    fn verify_otp(
        &self,
        email: &str,
        otp: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn reset_password(
        &self,
        reset_token: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn update_profile(
        &self,
        token: &str,
        profile: &ProfileUpdate,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn verify_password(
        &self,
        token: &str,
        current_password: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn change_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Admin only.
    fn list_users(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<UserSummary>, ApiError>> + Send;

    /// Admin only.
    fn update_user_role(
        &self,
        token: &str,
        change: &RoleChange,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
