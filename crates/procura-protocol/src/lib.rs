//! Wire protocol for the Procura client.
//!
//! This crate defines the "language" the client and the manual-generation
//! service speak:
//!
//! - **Types** ([`LoginRequest`], [`TokenResponse`], [`Profile`], [`Role`],
//!   [`Envelope`], etc.): the JSON bodies that travel over HTTP.
//! - **Tokens** ([`Token`], [`Claims`]): reading the expiry and role
//!   embedded in a bearer token without a network round trip.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer doesn't know about HTTP or sessions. It only knows
//! how the bytes are shaped.
//!
//! ```text
//! Transport (HTTP) → Protocol (typed bodies, claims) → Session (timers, state)
//! ```

mod error;
mod token;
mod types;

pub use error::ProtocolError;
pub use token::{Claims, MAX_EXP_SECS, Token};
pub use types::{
    Envelope, ErrorBody, LoginRequest, Profile, ProfileUpdate,
    ResetTokenResponse, Role, RoleChange, TempTokenResponse, TokenResponse,
    UserSummary,
};
