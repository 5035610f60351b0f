//! JSON bodies exchanged with the manual-generation service.
//!
//! The server speaks Spanish field names (`Nombre`, `Apellido`, `Rol`...).
//! We keep idiomatic English names on the Rust side and let
//! `#[serde(rename = "...")]` translate at the boundary, so nothing above
//! this module ever sees the wire spelling.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Auth bodies
// ---------------------------------------------------------------------------

/// Body of `POST /auth/login`.
///
/// `Debug` is implemented by hand so the password never ends up in a log
/// line by accident.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body returned by login and refresh: a freshly issued bearer token.
///
/// `token` is optional because a 2xx without it is a protocol violation
/// the caller must report ("unexpected response"), not a decode panic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Body returned by `POST /auth/verify-otp`: a short-lived token that
/// authorizes exactly one password reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetTokenResponse {
    #[serde(default, rename = "resetToken")]
    pub reset_token: Option<String>,
}

/// Body returned by `POST /auth/register/credentials`: a token that only
/// authorizes the second registration step (submitting the profile).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TempTokenResponse {
    #[serde(default, rename = "tempToken")]
    pub temp_token: Option<String>,
}

/// Error payload the server attaches to non-2xx responses.
///
/// Most endpoints use `message`; a few older ones use `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// The human-readable text, preferring `message` over `error`.
    /// Blank strings count as absent.
    pub fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.error.as_deref().filter(|e| !e.trim().is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The `{ success, data, message, error }` wrapper most user endpoints
/// return.
///
/// Every field may be absent. No `#[serde(default)]` here: on `data` it
/// would demand `T: Default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope<T> {
    pub success: Option<bool>,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwraps the payload.
    ///
    /// Returns the server's error text when `success` is explicitly
    /// `false` or when there is no `data` at all.
    pub fn into_data(self) -> Result<T, String> {
        match (self.success, self.data) {
            (Some(false), _) | (_, None) => Err(self
                .error
                .or(self.message)
                .unwrap_or_else(|| "unexpected response from server".to_string())),
            (_, Some(data)) => Ok(data),
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The account tier the server assigns to a user.
///
/// Roles arrive as free-form strings ("Admin", "Usuario Pago",
/// "Usuario Gratis"). Unknown values are preserved in `Other` instead of
/// failing the whole profile decode, so a new server-side role never
/// locks users out of the app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Paid,
    Free,
    Other(String),
}

impl Role {
    /// Wire spelling of [`Role::Admin`].
    pub const ADMIN: &'static str = "Admin";
    /// Wire spelling of [`Role::Paid`].
    pub const PAID: &'static str = "Usuario Pago";
    /// Wire spelling of [`Role::Free`].
    pub const FREE: &'static str = "Usuario Gratis";

    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => Self::ADMIN,
            Self::Paid => Self::PAID,
            Self::Free => Self::FREE,
            Self::Other(s) => s,
        }
    }

    /// Only admins may list users and change their roles.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Everything except the free tier unlocks the assistant, PRO
    /// manuals and personalised support.
    pub fn has_paid_features(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::ADMIN => Self::Admin,
            Self::PAID => Self::Paid,
            Self::FREE => Self::Free,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// The user profile returned by `GET /user/profile`.
///
/// Optional contact fields come back as missing, `null` or `""`
/// depending on how the account was created; all three decode to `None`
/// so "not provided" has exactly one representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(rename = "Nombre")]
    pub name: String,
    #[serde(rename = "Apellido")]
    pub surname: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Rol")]
    pub role: Role,
    #[serde(
        rename = "Telefono",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone: Option<String>,
    #[serde(
        rename = "Institucion",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub institution: Option<String>,
    #[serde(
        rename = "Cargo",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
}

impl Profile {
    /// "Nombre Apellido", trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname).trim().to_string()
    }
}

/// Body of `PUT /user/profile`. Email and role are not editable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    #[serde(rename = "Nombre")]
    pub name: String,
    #[serde(rename = "Apellido")]
    pub surname: String,
    #[serde(rename = "Telefono", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "Institucion", skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(rename = "Cargo", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One row of the admin user list (`GET /user/admin/users`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    #[serde(rename = "Usuario")]
    pub email: String,
    #[serde(rename = "Nombre", default)]
    pub name: String,
    #[serde(rename = "Apellido", default)]
    pub surname: String,
    #[serde(rename = "Rol")]
    pub role: Role,
}

/// Body of `PUT /user/admin/role`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleChange {
    pub email: String,
    #[serde(rename = "newRole")]
    pub new_role: Role,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_decodes_spanish_field_names() {
        let json = r#"{
            "Nombre": "Ana",
            "Apellido": "Pérez",
            "Email": "ana@example.com",
            "Rol": "Usuario Pago",
            "Telefono": "0414-5550000",
            "Institucion": "Alcaldía",
            "Cargo": "Analista"
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.name, "Ana");
        assert_eq!(profile.surname, "Pérez");
        assert_eq!(profile.role, Role::Paid);
        assert_eq!(profile.institution.as_deref(), Some("Alcaldía"));
        assert_eq!(profile.full_name(), "Ana Pérez");
    }

    #[test]
    fn test_profile_blank_optional_fields_become_none() {
        // Missing, null and "" all mean "not provided".
        let json = r#"{
            "Nombre": "Luis",
            "Apellido": "Gómez",
            "Email": "luis@example.com",
            "Rol": "Usuario Gratis",
            "Telefono": "",
            "Institucion": null
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.phone, None);
        assert_eq!(profile.institution, None);
        assert_eq!(profile.title, None);
    }

    #[test]
    fn test_profile_missing_required_field_fails() {
        let json = r#"{ "Nombre": "Luis", "Email": "luis@example.com", "Rol": "Admin" }"#;

        assert!(serde_json::from_str::<Profile>(json).is_err());
    }

    #[test]
    fn test_role_known_and_unknown_values() {
        assert_eq!(Role::from("Admin"), Role::Admin);
        assert_eq!(Role::from("Usuario Gratis"), Role::Free);
        assert_eq!(
            Role::from("Auditor"),
            Role::Other("Auditor".to_string())
        );
        // Unknown roles keep their original spelling on the way out.
        assert_eq!(String::from(Role::from("Auditor")), "Auditor");
    }

    #[test]
    fn test_role_gates() {
        assert!(Role::Admin.is_admin());
        assert!(!Role::Paid.is_admin());
        assert!(Role::Admin.has_paid_features());
        assert!(Role::Paid.has_paid_features());
        assert!(!Role::Free.has_paid_features());
    }

    #[test]
    fn test_role_change_serializes_wire_names() {
        let change = RoleChange {
            email: "ana@example.com".into(),
            new_role: Role::Paid,
        };

        let value = serde_json::to_value(&change).unwrap();

        assert_eq!(
            value,
            serde_json::json!({ "email": "ana@example.com", "newRole": "Usuario Pago" })
        );
    }

    #[test]
    fn test_login_request_debug_redacts_password() {
        let req = LoginRequest {
            email: "ana@example.com".into(),
            password: "hunter2".into(),
        };

        let printed = format!("{req:?}");

        assert!(printed.contains("ana@example.com"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_error_body_prefers_message_then_error() {
        let both = ErrorBody {
            message: Some("Credenciales inválidas.".into()),
            error: Some("ignored".into()),
        };
        let only_error = ErrorBody {
            message: Some("  ".into()),
            error: Some("Usuario no encontrado".into()),
        };

        assert_eq!(both.text(), Some("Credenciales inválidas."));
        assert_eq!(only_error.text(), Some("Usuario no encontrado"));
        assert_eq!(ErrorBody::default().text(), None);
    }

    #[test]
    fn test_envelope_into_data() {
        let ok: Envelope<u32> =
            serde_json::from_str(r#"{ "success": true, "data": 7 }"#).unwrap();
        let failed: Envelope<u32> =
            serde_json::from_str(r#"{ "success": false, "error": "nope" }"#).unwrap();
        let empty: Envelope<u32> = serde_json::from_str(r#"{}"#).unwrap();

        assert_eq!(ok.into_data(), Ok(7));
        assert_eq!(failed.into_data(), Err("nope".to_string()));
        assert!(empty.into_data().is_err());
    }

    #[test]
    fn test_envelope_of_profile_without_data() {
        // `Profile` has no `Default`; a missing `data` must still decode.
        let missing: Envelope<Profile> =
            serde_json::from_str(r#"{ "success": false, "message": "Sin perfil" }"#).unwrap();
        let wrapped: Envelope<Profile> = serde_json::from_str(
            r#"{ "success": true, "data": {
                "Nombre": "Ana", "Apellido": "Pérez",
                "Email": "ana@example.com", "Rol": "Admin"
            } }"#,
        )
        .unwrap();

        assert_eq!(missing.data, None);
        assert_eq!(missing.into_data(), Err("Sin perfil".to_string()));
        assert_eq!(wrapped.into_data().unwrap().role, Role::Admin);
    }
}
