//! Doctor login
//!
//! Login first goes to the clinic's auth service (`POST /api/auth/login`). When
//! the service cannot be reached, the credentials are checked against a small
//! built-in demo list instead. The demo list is plaintext and exists for offline
//! demos only; `Config::demo_fallback = false` turns it off, and an unreachable
//! service is then reported as such.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Login path relative to the API base URL
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Message shown when the service rejects credentials without saying why
const DEFAULT_REJECTION: &str = "Invalid email or password";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please fill in all fields")]
    MissingFields,

    #[error("{0}")]
    Rejected(String),

    #[error("Unable to connect to server and invalid credentials.")]
    Unreachable,

    #[error("Authentication service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Failure to obtain a usable answer from the auth service
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User object returned by the auth service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of a login response, successful or not.
///
/// The clinic backend wraps replies in an envelope:
/// `{"status":"success","data":{"accessToken":..,"user":..}}` on success and
/// `{"status":"error","error":{"code":..,"message":..}}` on failure. Flat bodies
/// (`{"token":..,"user":..}` / `{"message":..}`) are accepted as well.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default, alias = "accessToken")]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<AuthPayload>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// `data` member of an enveloped success reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(default, alias = "token")]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// `error` member of an enveloped failure reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LoginResponse {
    /// Access token, flat or inside `data`
    pub fn access_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|d| d.access_token.as_deref()))
            .filter(|t| !t.is_empty())
    }

    /// User profile, flat or inside `data`
    pub fn profile(&self) -> Option<&UserProfile> {
        self.user
            .as_ref()
            .or_else(|| self.data.as_ref().and_then(|d| d.user.as_ref()))
    }

    /// Why the service refused: `error.message` first, then a top-level `message`
    pub fn rejection_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .or(self.message.as_deref())
            .filter(|m| !m.is_empty())
    }
}

/// What the auth service said about a login attempt
#[derive(Debug, Clone)]
pub enum LoginReply {
    Accepted(LoginResponse),
    Rejected { status: u16, message: Option<String> },
}

/// Remote side of the login flow
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginReply, TransportError>;
}

/// Auth service reached over HTTP
#[derive(Debug)]
pub struct HttpAuthBackend {
    http_client: reqwest::Client,
    login_url: String,
}

impl HttpAuthBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))?;

        let login_url = format!("{}{}", base_url.trim_end_matches('/'), LOGIN_PATH);
        info!("Auth backend configured: {}", login_url);

        Ok(Self {
            http_client,
            login_url,
        })
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> Result<LoginReply, TransportError> {
        let response = self
            .http_client
            .post(&self.login_url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Login response: HTTP {} ({} bytes)", status, body.len());

        // An undecodable body counts as not reaching the service
        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        if status.is_success() {
            Ok(LoginReply::Accepted(parsed))
        } else {
            Ok(LoginReply::Rejected {
                status: status.as_u16(),
                message: parsed.rejection_message().map(str::to_string),
            })
        }
    }
}

/// Built-in offline credential
#[derive(Debug, Clone, Copy)]
pub struct DemoCredential {
    pub email: &'static str,
    pub password: &'static str,
    pub full_name: &'static str,
}

/// Offline demo accounts. Never enable these outside a demo.
pub const DEMO_CREDENTIALS: &[DemoCredential] = &[
    DemoCredential {
        email: "doctor1@example.com",
        password: "pass123",
        full_name: "Dr. Alice",
    },
    DemoCredential {
        email: "doctor2@example.com",
        password: "password",
        full_name: "Dr. Bob",
    },
];

fn find_demo_credential(email: &str, password: &str) -> Option<&'static DemoCredential> {
    DEMO_CREDENTIALS
        .iter()
        .find(|c| c.email == email && c.password == password)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    Remote,
    DemoFallback,
}

/// A successful login, ready to become a session
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub email: String,
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub source: AuthSource,
}

impl LoginOutcome {
    pub fn display_name(&self) -> String {
        resolve_display_name(self.user.as_ref(), Some(&self.email))
    }
}

/// `fullName`, then `name`, then the login email, then "Doctor"
pub fn resolve_display_name(user: Option<&UserProfile>, email: Option<&str>) -> String {
    let non_empty = |s: &Option<String>| s.as_deref().filter(|v| !v.is_empty()).map(str::to_string);
    user.and_then(|u| non_empty(&u.full_name).or_else(|| non_empty(&u.name)))
        .or_else(|| email.filter(|e| !e.is_empty()).map(str::to_string))
        .unwrap_or_else(|| "Doctor".to_string())
}

/// Runs the login flow against a backend, with the optional demo fallback
pub struct Authenticator {
    backend: Box<dyn AuthBackend>,
    demo_fallback: bool,
}

impl Authenticator {
    pub fn new(backend: Box<dyn AuthBackend>, demo_fallback: bool) -> Self {
        if demo_fallback {
            warn!("Demo credential fallback is enabled; do not use in production");
        }
        Self {
            backend,
            demo_fallback,
        }
    }

    pub fn demo_fallback(&self) -> bool {
        self.demo_fallback
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        match self.backend.login(&request).await {
            Ok(LoginReply::Accepted(response)) => {
                info!("Login accepted by auth service for {}", email);
                Ok(LoginOutcome {
                    email: email.to_string(),
                    user: response.profile().cloned(),
                    token: response.access_token().map(str::to_string),
                    source: AuthSource::Remote,
                })
            }
            Ok(LoginReply::Rejected { status, message }) => {
                info!("Login rejected by auth service (HTTP {})", status);
                Err(AuthError::Rejected(
                    message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
                ))
            }
            Err(e) => self.fall_back(email, password, e),
        }
    }

    fn fall_back(
        &self,
        email: &str,
        password: &str,
        cause: TransportError,
    ) -> Result<LoginOutcome, AuthError> {
        if !self.demo_fallback {
            warn!("Auth service unreachable: {}", cause);
            return Err(AuthError::ServiceUnavailable(cause.to_string()));
        }

        warn!("Auth service unreachable ({}), checking demo credentials", cause);
        match find_demo_credential(email, password) {
            Some(credential) => {
                info!("Login accepted by demo fallback for {}", email);
                Ok(LoginOutcome {
                    email: email.to_string(),
                    user: Some(UserProfile {
                        full_name: Some(credential.full_name.to_string()),
                        name: None,
                    }),
                    token: None,
                    source: AuthSource::DemoFallback,
                })
            }
            None => Err(AuthError::Unreachable),
        }
    }
}
