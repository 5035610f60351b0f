//! Integration tests for the HTTP client.
//!
//! Each test starts an `httpmock` server so the whole path is exercised:
//! URL building, JSON bodies, bearer headers, status mapping and the
//! unauthorized interceptor.

#![cfg(feature = "http")]

use httpmock::prelude::*;
use procura_protocol::{Role, RoleChange};
use procura_transport::{
    AccountApi, ApiError, AuthApi, AuthRejection, CONNECTION_MESSAGE,
    HttpApiClient, ProfileApi,
};
use serde_json::json;
use tokio::sync::mpsc;

fn client_for(server: &MockServer) -> HttpApiClient {
    HttpApiClient::new(&server.base_url()).unwrap()
}

fn profile_json() -> serde_json::Value {
    json!({
        "Nombre": "Ana",
        "Apellido": "Pérez",
        "Email": "ana@example.com",
        "Rol": "Usuario Pago"
    })
}

// =========================================================================
// login()
// =========================================================================

#[tokio::test]
async fn test_login_success_returns_token_and_posts_credentials() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/login")
                .header_missing("Authorization")
                .json_body(json!({ "email": "ana@example.com", "password": "secret" }));
            then.status(200).json_body(json!({ "token": "a.b.c" }));
        })
        .await;
    let client = client_for(&server);

    let token = client.login("ana@example.com", "secret").await.expect("should log in");

    assert_eq!(token, "a.b.c");
    login.assert_async().await;
}

#[tokio::test]
async fn test_login_bad_credentials_surfaces_server_message() {
    // A 401 on login is a credential error, not a revoked session.
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/login");
            then.status(401)
                .json_body(json!({ "message": "Correo o contraseña incorrectos." }));
        })
        .await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = client_for(&server).on_unauthorized(tx);

    let err = client.login("ana@example.com", "wrong").await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Rejected {
            status: 401,
            message: "Correo o contraseña incorrectos.".into()
        }
    );
    assert!(rx.try_recv().is_err(), "no rejection event for login");
}

#[tokio::test]
async fn test_login_error_without_body_uses_fallback() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/login");
            then.status(500).json_body(json!({}));
        })
        .await;
    let client = client_for(&server);

    let err = client.login("a@b.c", "x").await.unwrap_err();

    assert_eq!(err.user_message(), "Credenciales inválidas.");
}

#[tokio::test]
async fn test_login_success_without_token_is_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/login");
            then.status(200).json_body(json!({ "ok": true }));
        })
        .await;
    let client = client_for(&server);

    let err = client.login("a@b.c", "x").await.unwrap_err();

    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_login_unreachable_server_is_network_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = HttpApiClient::new(&format!("http://{addr}")).unwrap();

    let err = client.login("a@b.c", "x").await.unwrap_err();

    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(err.user_message(), CONNECTION_MESSAGE);
}

// =========================================================================
// refresh() / logout()
// =========================================================================

#[tokio::test]
async fn test_refresh_attaches_bearer_token() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/refresh-token")
                .header("Authorization", "Bearer old.token.value");
            then.status(200).json_body(json!({ "token": "new.token.value" }));
        })
        .await;
    let client = client_for(&server);

    let token = client.refresh("old.token.value").await.unwrap();

    assert_eq!(token, "new.token.value");
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_refresh_rejected_is_left_to_the_caller() {
    // The session manager reports a failed resume refresh itself, so the
    // interceptor must stay quiet here.
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/refresh-token");
            then.status(401).json_body(json!({ "message": "Token expirado" }));
        })
        .await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = client_for(&server).on_unauthorized(tx);

    let err = client.refresh("old").await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Rejected {
            status: 401,
            message: "Token expirado".into()
        }
    );
    assert!(rx.try_recv().is_err(), "refresh must not report a rejection");
}

#[tokio::test]
async fn test_logout_missing_endpoint_is_success() {
    // No mocks: every request gets a 404.
    let server = MockServer::start_async().await;
    let client = client_for(&server);

    client.logout("tok").await.expect("404 on logout is fine");
}

#[tokio::test]
async fn test_logout_unauthorized_is_not_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/logout");
            then.status(401).json_body(json!({}));
        })
        .await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = client_for(&server).on_unauthorized(tx);

    let result = client.logout("tok").await;

    assert!(result.is_err());
    assert!(rx.try_recv().is_err(), "logout must not loop back into logout");
}

// =========================================================================
// get_profile()
// =========================================================================

#[tokio::test]
async fn test_get_profile_accepts_bare_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/user/profile")
                .header("Authorization", "Bearer tok");
            then.status(200).json_body(profile_json());
        })
        .await;
    let client = client_for(&server);

    let profile = client.get_profile("tok").await.unwrap();

    assert_eq!(profile.email, "ana@example.com");
    assert_eq!(profile.role, Role::Paid);
}

#[tokio::test]
async fn test_get_profile_accepts_envelope_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/user/profile");
            then.status(200)
                .json_body(json!({ "success": true, "data": profile_json() }));
        })
        .await;
    let client = client_for(&server);

    let profile = client.get_profile("tok").await.unwrap();

    assert_eq!(profile.full_name(), "Ana Pérez");
}

#[tokio::test]
async fn test_get_profile_forbidden_reports_rejection_with_token() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/user/profile");
            then.status(403).json_body(json!({ "message": "forbidden" }));
        })
        .await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = client_for(&server).on_unauthorized(tx);

    let err = client.get_profile("tok").await.unwrap_err();

    assert!(err.is_unauthorized());
    let rejection = rx.try_recv().unwrap();
    assert_eq!(
        rejection,
        AuthRejection {
            status: 403,
            path: "/user/profile".into(),
            token: "tok".into(),
        }
    );
    assert!(!format!("{rejection:?}").contains("token"), "Debug leaves the token out");
}

// =========================================================================
// AccountApi
// =========================================================================

#[tokio::test]
async fn test_forgot_password_hides_server_reason() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/forgot-password");
            then.status(404).json_body(json!({ "message": "El usuario no existe" }));
        })
        .await;
    let client = client_for(&server);

    let err = client.forgot_password("nobody@example.com").await.unwrap_err();

    assert_eq!(err.user_message(), "Ocurrió un error.");
}

#[tokio::test]
async fn test_verify_otp_then_reset_password_uses_reset_token() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/verify-otp");
            then.status(200).json_body(json!({ "resetToken": "reset.tok.en" }));
        })
        .await;
    let reset = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/reset-password")
                .header("Authorization", "Bearer reset.tok.en");
            then.status(200).json_body(json!({ "success": true }));
        })
        .await;
    let client = client_for(&server);

    let reset_token = client.verify_otp("ana@example.com", "123456").await.unwrap();
    client.reset_password(&reset_token, "n3w-pass").await.unwrap();

    reset.assert_async().await;
}

#[tokio::test]
async fn test_change_password_success_false_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/user/password/change");
            then.status(200).json_body(json!({
                "success": false,
                "error": "La contraseña no cumple los requisitos"
            }));
        })
        .await;
    let client = client_for(&server);

    let err = client.change_password("tok", "short").await.unwrap_err();

    assert_eq!(err.user_message(), "La contraseña no cumple los requisitos");
}

#[tokio::test]
async fn test_list_users_and_update_role() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/user/admin/users");
            then.status(200).json_body(json!({ "success": true, "data": [
                { "Usuario": "ana@example.com", "Nombre": "Ana", "Apellido": "Pérez", "Rol": "Usuario Gratis" }
            ]}));
        })
        .await;
    let role_change = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/user/admin/role")
                .json_body(json!({ "email": "ana@example.com", "newRole": "Usuario Pago" }));
            then.status(200).json_body(json!({ "success": true }));
        })
        .await;
    let client = client_for(&server);

    let users = client.list_users("admin-tok").await.unwrap();
    client
        .update_user_role(
            "admin-tok",
            &RoleChange {
                email: users[0].email.clone(),
                new_role: Role::Paid,
            },
        )
        .await
        .unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].role, Role::Free);
    role_change.assert_async().await;
}
