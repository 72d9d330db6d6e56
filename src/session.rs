use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{resolve_display_name, LoginOutcome, UserProfile};

/// Storage keys, shared with the web frontend's session storage layout
pub mod keys {
    pub const IS_LOGGED_IN: &str = "isLoggedIn";
    pub const USER_EMAIL: &str = "userEmail";
    pub const USER: &str = "user";
    pub const AUTH_TOKEN: &str = "authToken";
}

/// Session lifecycle. `Terminated` is final; a new dashboard starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
    Terminated,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("A login is already in progress")]
    LoginPending,
}

/// Key/value storage that lives exactly as long as one dashboard
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    items: HashMap<String, String>,
}

impl SessionStorage {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.items.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.items.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Tracks the logged-in doctor for one dashboard
#[derive(Debug)]
pub struct SessionManager {
    state: SessionState,
    storage: SessionStorage,
    login_pending: bool,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: SessionState::LoggedOut,
            storage: SessionStorage::default(),
            login_pending: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::LoggedIn
    }

    /// True while a login request is in flight
    pub fn is_busy(&self) -> bool {
        self.login_pending
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Mark a login attempt as started; refuses overlapping attempts
    pub fn begin_login(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::LoggedOut {
            return Err(SessionError::InvalidTransition(format!(
                "Cannot log in from state {:?}",
                self.state
            )));
        }
        if self.login_pending {
            return Err(SessionError::LoginPending);
        }
        self.login_pending = true;
        Ok(())
    }

    /// Login attempt finished without a session
    pub fn abort_login(&mut self) {
        self.login_pending = false;
    }

    /// LoggedOut -> LoggedIn
    pub fn establish(&mut self, outcome: &LoginOutcome) -> Result<(), SessionError> {
        self.login_pending = false;
        if self.state != SessionState::LoggedOut {
            return Err(SessionError::InvalidTransition(format!(
                "Cannot establish a session from state {:?}",
                self.state
            )));
        }

        if let Some(ref token) = outcome.token {
            self.storage.set(keys::AUTH_TOKEN, token.as_str());
        }
        if let Some(ref user) = outcome.user {
            match serde_json::to_string(user) {
                Ok(json) => self.storage.set(keys::USER, json),
                Err(e) => warn!("Failed to serialize user profile: {}", e),
            }
        }
        self.storage.set(keys::USER_EMAIL, outcome.email.as_str());
        self.storage.set(keys::IS_LOGGED_IN, "true");

        self.state = SessionState::LoggedIn;
        info!(
            "Session established for {} via {:?}",
            outcome.email, outcome.source
        );
        Ok(())
    }

    /// LoggedIn -> Terminated, clearing all stored session data
    pub fn logout(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::LoggedIn {
            return Err(SessionError::InvalidTransition(format!(
                "Cannot log out from state {:?}",
                self.state
            )));
        }

        for key in [keys::AUTH_TOKEN, keys::USER, keys::USER_EMAIL, keys::IS_LOGGED_IN] {
            self.storage.remove(key);
        }
        self.state = SessionState::Terminated;
        info!("Session terminated");
        Ok(())
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.storage.get(keys::AUTH_TOKEN)
    }

    /// Name shown in the header and welcome banner
    pub fn display_name(&self) -> String {
        let email = self.storage.get(keys::USER_EMAIL);
        match self.storage.get(keys::USER) {
            Some(json) => match serde_json::from_str::<UserProfile>(json) {
                Ok(user) => resolve_display_name(Some(&user), email),
                Err(_) => resolve_display_name(None, email),
            },
            None => resolve_display_name(None, email),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
