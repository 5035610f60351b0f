//! HTTP implementation of the API traits using `reqwest`.

use std::time::Duration;

use procura_protocol::{
    Envelope, ErrorBody, LoginRequest, Profile, ProfileUpdate,
    ResetTokenResponse, RoleChange, TempTokenResponse, TokenResponse,
    UserSummary,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::{
    AccountApi, ApiError, AuthApi, AuthRejection, ProfileApi, RejectionSender,
    UNEXPECTED_RESPONSE_MESSAGE,
};

/// Applied when the caller doesn't pick a timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which credential, if any, rides along with a request.
#[derive(Clone, Copy)]
enum Bearer<'a> {
    /// Anonymous endpoints (login, registration step 1, password recovery).
    None,
    /// The session token. 401/403 here means the session is dead and is
    /// reported to the rejection listener.
    Session(&'a str),
    /// A single-purpose token (registration, reset), or the session token
    /// on refresh and logout. The caller owns the outcome of a rejection,
    /// so it isn't reported.
    Detached(&'a str),
}

/// Talks to the manual-generation service over HTTPS.
///
/// Cheap to clone: `reqwest::Client` is an `Arc` around a connection pool.
#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: String,
    rejections: Option<RejectionSender>,
}

impl HttpApiClient {
    /// Creates a client for the service at `api_url` (without the `/api`
    /// suffix) with [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new(api_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(api_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{}/api", api_url.trim_end_matches('/')),
            rejections: None,
        })
    }

    /// Reports every 401/403 on a session-authenticated call to `sender`.
    pub fn on_unauthorized(mut self, sender: RejectionSender) -> Self {
        self.rejections = Some(sender);
        self
    }

    /// The resolved API root, e.g. `https://host/api`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request and returns the body of a 2xx response.
    ///
    /// `fallback` is what the user sees when the server rejects the call
    /// without an explanation of its own.
    async fn execute(
        &self,
        path: &str,
        request: RequestBuilder,
        bearer: Bearer<'_>,
        fallback: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let request = match bearer {
            Bearer::None => request,
            Bearer::Session(token) | Bearer::Detached(token) => {
                request.bearer_auth(token)
            }
        };

        let response = request.send().await.map_err(|e| {
            tracing::debug!(path, error = %e, "request failed");
            ApiError::Network(e.to_string())
        })?;
        let status = response.status();

        if let (
            Bearer::Session(token),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN,
        ) = (bearer, status)
        {
            tracing::warn!(path, status = status.as_u16(), "session token rejected");
            if let Some(tx) = &self.rejections {
                // The listener may already be gone during shutdown.
                let _ = tx.send(AuthRejection {
                    status: status.as_u16(),
                    path: path.to_string(),
                    token: token.to_string(),
                });
            }
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.text().map(str::to_string))
                .unwrap_or_else(|| fallback.to_string());
            tracing::debug!(path, status = status.as_u16(), %message, "request rejected");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body.to_vec())
    }

    /// `execute` for endpoints whose success body we only care about when
    /// it explicitly says `success: false`.
    async fn execute_unit(
        &self,
        path: &str,
        request: RequestBuilder,
        bearer: Bearer<'_>,
        fallback: &str,
    ) -> Result<(), ApiError> {
        let body = self.execute(path, request, bearer, fallback).await?;
        match serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
            Ok(envelope) if envelope.success == Some(false) => {
                Err(ApiError::Rejected {
                    status: 200,
                    message: envelope
                        .error
                        .or(envelope.message)
                        .unwrap_or_else(|| fallback.to_string()),
                })
            }
            // Empty bodies and non-envelope bodies are plain successes.
            _ => Ok(()),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn required(value: Option<String>, what: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Decode(format!("{UNEXPECTED_RESPONSE_MESSAGE} (missing {what})")))
}

/// `GET /user/profile` has shipped both bare and wrapped in an envelope.
/// `Bare` is tried first: its required fields make it fail on an envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileBody {
    Bare(Profile),
    Wrapped(Envelope<Profile>),
}

impl AuthApi for HttpApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let path = "/auth/login";
        let request = self.client.post(self.url(path)).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        let body = self
            .execute(path, request, Bearer::None, "Credenciales inválidas.")
            .await?;
        let response: TokenResponse = decode(&body)?;
        required(response.token, "token")
    }

    async fn refresh(&self, token: &str) -> Result<String, ApiError> {
        let path = "/auth/refresh-token";
        let request = self.client.post(self.url(path));
        let body = self
            .execute(path, request, Bearer::Detached(token), "No se pudo renovar la sesión.")
            .await?;
        let response: TokenResponse = decode(&body)?;
        required(response.token, "token")
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let path = "/auth/logout";
        let request = self.client.post(self.url(path));
        match self
            .execute(path, request, Bearer::Detached(token), "Error al cerrar sesión.")
            .await
        {
            // Servers without a logout endpoint have nothing to invalidate.
            Err(ApiError::Rejected { status: 404, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

impl ProfileApi for HttpApiClient {
    async fn get_profile(&self, token: &str) -> Result<Profile, ApiError> {
        let path = "/user/profile";
        let request = self.client.get(self.url(path));
        let body = self
            .execute(path, request, Bearer::Session(token), "Error al obtener el perfil.")
            .await?;
        match decode::<ProfileBody>(&body)? {
            ProfileBody::Bare(profile) => Ok(profile),
            ProfileBody::Wrapped(envelope) => {
                envelope.into_data().map_err(ApiError::Decode)
            }
        }
    }
}

impl AccountApi for HttpApiClient {
    async fn register_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let path = "/auth/register/credentials";
        let request = self
            .client
            .post(self.url(path))
            .json(&json!({ "email": email, "password": password }));
        let body = self
            .execute(path, request, Bearer::None, "Error al registrar credenciales.")
            .await?;
        let response: TempTokenResponse = decode(&body)?;
        required(response.temp_token, "tempToken")
    }

    async fn register_profile(
        &self,
        temp_token: &str,
        profile: &ProfileUpdate,
    ) -> Result<(), ApiError> {
        let path = "/auth/register/profile";
        let request = self.client.post(self.url(path)).json(profile);
        self.execute_unit(path, request, Bearer::Detached(temp_token), "Error al registrar el perfil.")
            .await
    }

    async fn verify_account(&self, verification_token: &str) -> Result<(), ApiError> {
        let path = "/auth/verify-account";
        let request = self
            .client
            .post(self.url(path))
            .json(&json!({ "token": verification_token }));
        self.execute_unit(path, request, Bearer::None, "Error al verificar la cuenta.")
            .await
    }

    async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let path = "/auth/forgot-password";
        let request = self
            .client
            .post(self.url(path))
            .json(&json!({ "email": email }));
        match self.execute_unit(path, request, Bearer::None, "Ocurrió un error.").await {
            Err(ApiError::Rejected { status, .. }) => Err(ApiError::Rejected {
                status,
                message: "Ocurrió un error.".to_string(),
            }),
            other => other,
        }
    }

    async fn verify_otp(&self, email: &str, otp: &str) -> Result<String, ApiError> {
        let path = "/auth/verify-otp";
        let request = self
            .client
            .post(self.url(path))
            .json(&json!({ "email": email, "otp": otp }));
        let body = self
            .execute(path, request, Bearer::None, "Código incorrecto o expirado.")
            .await?;
        let response: ResetTokenResponse = decode(&body)?;
        required(response.reset_token, "resetToken")
    }

    async fn reset_password(&self, reset_token: &str, password: &str) -> Result<(), ApiError> {
        let path = "/auth/reset-password";
        let request = self
            .client
            .post(self.url(path))
            .json(&json!({ "password": password }));
        self.execute_unit(path, request, Bearer::Detached(reset_token), "Error al cambiar la contraseña.")
            .await
    }

    async fn update_profile(&self, token: &str, profile: &ProfileUpdate) -> Result<(), ApiError> {
        let path = "/user/profile";
        let request = self.client.put(self.url(path)).json(profile);
        self.execute_unit(path, request, Bearer::Session(token), "Error al actualizar el perfil.")
            .await
    }

    async fn verify_password(&self, token: &str, current_password: &str) -> Result<(), ApiError> {
        let path = "/user/password/verify";
        let request = self
            .client
            .post(self.url(path))
            .json(&json!({ "currentPassword": current_password }));
        self.execute_unit(path, request, Bearer::Session(token), "La contraseña es incorrecta.")
            .await
    }

    async fn change_password(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let path = "/user/password/change";
        let request = self
            .client
            .put(self.url(path))
            .json(&json!({ "newPassword": new_password }));
        self.execute_unit(path, request, Bearer::Session(token), "Error al cambiar la contraseña.")
            .await
    }

    async fn list_users(&self, token: &str) -> Result<Vec<UserSummary>, ApiError> {
        let path = "/user/admin/users";
        let request = self.client.get(self.url(path));
        let body = self
            .execute(path, request, Bearer::Session(token), "Error al obtener todos los usuarios")
            .await?;
        decode::<Envelope<Vec<UserSummary>>>(&body)?
            .into_data()
            .map_err(ApiError::Decode)
    }

    async fn update_user_role(&self, token: &str, change: &RoleChange) -> Result<(), ApiError> {
        let path = "/user/admin/role";
        let request = self.client.put(self.url(path)).json(change);
        self.execute_unit(path, request, Bearer::Session(token), "Error al actualizar el rol de un usuario")
            .await
    }
}
