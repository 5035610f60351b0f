//! Reading claims out of a bearer token without verifying it.
//!
//! The server issues compact JWTs (`header.payload.signature`). The client
//! never checks the signature (the server does that on every request), but
//! it does need two claims *before* any network call completes:
//!
//! - `exp`: when the token dies, so the session can arm its expiry timer.
//! - `rol`: the account tier, so role-gated screens can be decided
//!   immediately instead of waiting for the profile fetch.
//!
//! Decoding is pure and offline: split on `.`, base64url-decode the middle
//! segment, parse it as JSON.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Role};

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Latest `exp` accepted: 9999-12-31T23:59:59Z. Anything later can't be
/// added to `UNIX_EPOCH` on every platform.
pub const MAX_EXP_SECS: u64 = 253_402_300_799;

/// The subset of the token payload the client cares about.
///
/// `exp` is mandatory: a token without an expiry can't be scheduled, so
/// we treat it as undecodable rather than "valid forever".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, in seconds since the Unix epoch.
    pub exp: u64,

    /// Account tier. The server writes `rol`; `role` is accepted too.
    #[serde(rename = "rol", alias = "role", default)]
    pub role: Option<Role>,

    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    /// Decodes the payload segment of a compact token.
    ///
    /// # Errors
    /// - [`ProtocolError::MalformedToken`]: not three non-empty segments,
    ///   or the payload isn't base64url.
    ///   Also an `exp` past [`MAX_EXP_SECS`].
    /// - [`ProtocolError::Decode`]: the payload isn't JSON or lacks `exp`.
    pub fn decode(token: &str) -> Result<Self, ProtocolError> {
        let mut segments = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(ProtocolError::MalformedToken(
                "expected three dot-separated segments".into(),
            ));
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(ProtocolError::MalformedToken("empty segment".into()));
        }

        // Some issuers pad the segments; the compact form says they
        // shouldn't, so strip `=` and decode unpadded.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ProtocolError::MalformedToken(e.to_string()))?;

        let claims: Self = serde_json::from_slice(&bytes)?;
        if claims.exp > MAX_EXP_SECS {
            return Err(ProtocolError::MalformedToken(format!(
                "exp {} is out of range",
                claims.exp
            )));
        }
        Ok(claims)
    }

    /// The absolute instant after which the server rejects the token.
    ///
    /// Hand-built claims with an `exp` past [`MAX_EXP_SECS`] are read as
    /// expiring at that limit.
    pub fn expires_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.exp.min(MAX_EXP_SECS))
    }

    /// `true` once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at()
    }

    /// Time left until expiry, saturating at zero for tokens already dead.
    pub fn remaining_at(&self, now: SystemTime) -> Duration {
        self.expires_at()
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A raw bearer credential paired with its decoded claims.
///
/// Holding both together means the expiry can never drift from the
/// string it came from: the only way to get a `Token` is [`Token::parse`].
///
/// `Debug` prints the claims but never the credential itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    claims: Claims,
}

impl Token {
    /// Decodes `raw` and keeps it alongside its claims.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        let claims = Claims::decode(&raw)?;
        Ok(Self { raw, claims })
    }

    /// The credential as sent in `Authorization: Bearer ...`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn role(&self) -> Option<&Role> {
        self.claims.role.as_ref()
    }

    pub fn expires_at(&self) -> SystemTime {
        self.claims.expires_at()
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.claims.is_expired_at(now)
    }

    pub fn remaining_at(&self, now: SystemTime) -> Duration {
        self.claims.remaining_at(now)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an unsigned compact token around `payload`.
    fn token_with(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn test_decode_reads_exp_role_and_email() {
        let raw = token_with(serde_json::json!({
            "exp": 1_900_000_000u64,
            "rol": "Admin",
            "email": "ana@example.com"
        }));

        let claims = Claims::decode(&raw).expect("should decode");

        assert_eq!(claims.exp, 1_900_000_000);
        assert_eq!(claims.role, Some(Role::Admin));
        assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_decode_accepts_role_alias() {
        let raw = token_with(serde_json::json!({ "exp": 10, "role": "Usuario Gratis" }));

        let claims = Claims::decode(&raw).unwrap();

        assert_eq!(claims.role, Some(Role::Free));
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let raw = token_with(serde_json::json!({ "exp": 10 }));
        let mut parts: Vec<String> = raw.split('.').map(str::to_string).collect();
        parts[1].push_str("==");

        let claims = Claims::decode(&parts.join(".")).unwrap();

        assert_eq!(claims.exp, 10);
    }

    #[test]
    fn test_decode_wrong_segment_count_is_malformed() {
        for raw in ["", "abc", "a.b", "a.b.c.d", "a..c"] {
            assert!(
                matches!(Claims::decode(raw), Err(ProtocolError::MalformedToken(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_decode_bad_base64_is_malformed() {
        let result = Claims::decode("aGVhZGVy.***.c2ln");

        assert!(matches!(result, Err(ProtocolError::MalformedToken(_))));
    }

    #[test]
    fn test_decode_missing_exp_is_decode_error() {
        let raw = token_with(serde_json::json!({ "rol": "Admin" }));

        assert!(matches!(Claims::decode(&raw), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_expiry_helpers() {
        let claims = Claims {
            exp: 1_000,
            role: None,
            email: None,
        };
        let before = UNIX_EPOCH + Duration::from_secs(400);
        let after = UNIX_EPOCH + Duration::from_secs(1_500);

        assert!(!claims.is_expired_at(before));
        assert!(claims.is_expired_at(after));
        assert_eq!(claims.remaining_at(before), Duration::from_secs(600));
        assert_eq!(claims.remaining_at(after), Duration::ZERO);
    }

    #[test]
    fn test_decode_rejects_exp_past_year_9999() {
        let raw = token_with(serde_json::json!({ "exp": u64::MAX }));

        assert!(matches!(
            Claims::decode(&raw),
            Err(ProtocolError::MalformedToken(_))
        ));
        assert!(Token::parse(raw).is_err());
    }

    #[test]
    fn test_far_future_exp_is_usable() {
        let raw = token_with(serde_json::json!({ "exp": MAX_EXP_SECS }));
        let token = Token::parse(raw).expect("year 9999 is still in range");

        let now = SystemTime::now();
        assert!(!token.is_expired_at(now));
        assert!(token.remaining_at(now) > Duration::from_secs(7_000 * 365 * 86_400));

        // Built by hand, bypassing decode.
        let claims = Claims {
            exp: u64::MAX,
            role: None,
            email: None,
        };
        assert_eq!(
            claims.expires_at(),
            UNIX_EPOCH + Duration::from_secs(MAX_EXP_SECS)
        );
    }

    #[test]
    fn test_token_debug_hides_credential() {
        let raw = token_with(serde_json::json!({ "exp": 10 }));
        let token = Token::parse(raw.clone()).unwrap();

        let printed = format!("{token:?}");

        assert!(!printed.contains(&raw));
        assert!(printed.contains("exp: 10"));
        assert_eq!(token.as_str(), raw);
    }
}
