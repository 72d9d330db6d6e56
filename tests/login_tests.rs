//! Login flow against a local mock auth service

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::time::Duration;

use ecg_clinic::auth::{AuthError, AuthSource, Authenticator, HttpAuthBackend};
use ecg_clinic::config::Config;
use ecg_clinic::session::{keys, SessionState};
use ecg_clinic::{Dashboard, DashboardError, Screen, Tab};

async fn login_handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"] == "carol@clinic.org" && body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({
                "token": "tok-123",
                "user": { "fullName": "Dr. Carol", "name": "carol" }
            })),
        )
    } else if body["email"] == "locked@clinic.org" {
        (StatusCode::FORBIDDEN, Json(json!({})))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid credentials" })),
        )
    }
}

/// Start a server on an ephemeral port; returns its base URL
async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Replies in the clinic backend's `{status, data | error}` envelope
async fn enveloped_login_handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"] == "dana@clinic.org" && body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "data": {
                    "accessToken": "jwt-abc",
                    "refreshToken": "refresh-abc",
                    "tokenType": "Bearer",
                    "expiresIn": 900,
                    "user": { "fullName": "Dr. Dana" }
                }
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "error",
                "error": { "code": "AUTH_FAILED", "message": "Bad password" }
            })),
        )
    }
}

async fn spawn_enveloped_auth_service() -> String {
    spawn_server(Router::new().route("/api/auth/login", post(enveloped_login_handler))).await
}

async fn spawn_auth_service() -> String {
    spawn_server(Router::new().route("/api/auth/login", post(login_handler))).await
}

/// Base URL where nothing is listening
async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn authenticator(base_url: &str, demo_fallback: bool) -> Authenticator {
    let backend = HttpAuthBackend::new(base_url, Duration::from_secs(5)).unwrap();
    Authenticator::new(Box::new(backend), demo_fallback)
}

fn config(base_url: &str, demo_fallback: bool) -> Config {
    Config {
        api_base_url: base_url.to_string(),
        demo_fallback,
        request_timeout_secs: 5,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_remote_login_success() {
    let base = spawn_auth_service().await;
    let outcome = authenticator(&base, true)
        .login("carol@clinic.org", "secret")
        .await
        .unwrap();

    assert_eq!(outcome.source, AuthSource::Remote);
    assert_eq!(outcome.token.as_deref(), Some("tok-123"));
    assert_eq!(outcome.display_name(), "Dr. Carol");
}

#[tokio::test]
async fn test_remote_rejection_does_not_fall_back() {
    let base = spawn_auth_service().await;
    // Demo credentials are only consulted when the service is unreachable
    let err = authenticator(&base, true)
        .login("doctor1@example.com", "pass123")
        .await
        .unwrap_err();

    match err {
        AuthError::Rejected(message) => assert_eq!(message, "Invalid credentials"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejection_without_message() {
    let base = spawn_auth_service().await;
    let err = authenticator(&base, true)
        .login("locked@clinic.org", "whatever")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid email or password");
}

#[tokio::test]
async fn test_enveloped_login_success() {
    let base = spawn_enveloped_auth_service().await;
    let mut dash = Dashboard::from_config(&config(&base, false)).unwrap();

    let name = dash.login("dana@clinic.org", "secret").await.unwrap();
    assert_eq!(name, "Dr. Dana");
    assert_eq!(dash.session().auth_token(), Some("jwt-abc"));
}

#[tokio::test]
async fn test_enveloped_rejection_shows_server_reason() {
    let base = spawn_enveloped_auth_service().await;
    let err = authenticator(&base, true)
        .login("dana@clinic.org", "wrong")
        .await
        .unwrap_err();

    match err {
        AuthError::Rejected(message) => assert_eq!(message, "Bad password"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_service_uses_demo_list() {
    let base = unreachable_url().await;
    let outcome = authenticator(&base, true)
        .login("doctor1@example.com", "pass123")
        .await
        .unwrap();

    assert_eq!(outcome.source, AuthSource::DemoFallback);
    assert_eq!(outcome.display_name(), "Dr. Alice");
}

#[tokio::test]
async fn test_unreachable_service_without_match() {
    let base = unreachable_url().await;
    let err = authenticator(&base, true)
        .login("doctor1@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unreachable));
}

#[tokio::test]
async fn test_unreachable_service_with_fallback_disabled() {
    let base = unreachable_url().await;
    let err = authenticator(&base, false)
        .login("doctor1@example.com", "pass123")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_non_json_reply_counts_as_unreachable() {
    let app = Router::new().route("/api/auth/login", post(|| async { "<html>maintenance</html>" }));
    let base = spawn_server(app).await;

    let outcome = authenticator(&base, true)
        .login("doctor2@example.com", "password")
        .await
        .unwrap();
    assert_eq!(outcome.source, AuthSource::DemoFallback);
    assert_eq!(outcome.display_name(), "Dr. Bob");
}

#[tokio::test]
async fn test_dashboard_session_from_remote_login() {
    let base = spawn_auth_service().await;
    let mut dash = Dashboard::from_config(&config(&base, false)).unwrap();

    let name = dash.login("carol@clinic.org", "secret").await.unwrap();
    assert_eq!(name, "Dr. Carol");
    assert_eq!(dash.screen(), Screen::Tab(Tab::Welcome));

    let session = dash.session();
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(session.auth_token(), Some("tok-123"));
    assert_eq!(session.storage().get(keys::USER_EMAIL), Some("carol@clinic.org"));
    assert_eq!(session.storage().get(keys::IS_LOGGED_IN), Some("true"));
}

#[tokio::test]
async fn test_dashboard_failed_login_stays_logged_out() {
    let base = spawn_auth_service().await;
    let mut dash = Dashboard::from_config(&config(&base, true)).unwrap();

    let err = dash.login("carol@clinic.org", "nope").await.unwrap_err();
    assert!(matches!(err, DashboardError::Auth(AuthError::Rejected(_))));
    assert_eq!(dash.session().state(), SessionState::LoggedOut);

    // A corrected attempt still works
    dash.login("carol@clinic.org", "secret").await.unwrap();
    assert!(dash.session().is_logged_in());
}

#[test]
fn test_dashboard_rejects_bad_base_url() {
    let result = Dashboard::from_config(&config("ftp://clinic", true));
    assert!(matches!(result, Err(DashboardError::Config(_))));
}
