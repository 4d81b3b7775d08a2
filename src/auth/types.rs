//! Auth types: users, sessions, events, and the gateway trait.
//!
//! Wire shapes follow the GoTrue REST API: a session is the token response
//! (`access_token`, `refresh_token`, `expires_in`, `expires_at`, `user`) and a
//! user carries free-form `user_metadata` where the marketplace role lives.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by auth gateway operations. Backend messages are carried
/// verbatim so callers can show them to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The HTTP request never produced a response (DNS, TLS, timeout).
    #[error("auth request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The backend response body could not be decoded.
    #[error("auth response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AuthError {
    /// True when the backend rejected the bearer token itself, meaning the
    /// session is already gone on the server side.
    #[must_use]
    pub fn is_session_missing(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403 | 404, .. })
    }
}

// =============================================================================
// ROLE
// =============================================================================

/// Marketplace role stored in the user's metadata at sign-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Consumer,
    Farmer,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consumer => "consumer",
            Self::Farmer => "farmer",
        }
    }

    /// Resolve a raw metadata value. Missing or unrecognized values fall back
    /// to [`Role::Consumer`].
    #[must_use]
    pub fn from_metadata(raw: Option<&str>) -> Self {
        match raw {
            Some("farmer") => Self::Farmer,
            _ => Self::Consumer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consumer" => Ok(Self::Consumer),
            "farmer" => Ok(Self::Farmer),
            other => Err(format!("unknown role '{other}' (expected 'consumer' or 'farmer')")),
        }
    }
}

// =============================================================================
// USER
// =============================================================================

/// User record as returned by the auth backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Set by the backend once the email address has been verified.
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Map<String, serde_json::Value>,
}

impl User {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        Role::from_metadata(self.user_metadata.get("role").and_then(|v| v.as_str()))
    }

    #[must_use]
    pub fn email_or_id(&self) -> String {
        self.email.clone().unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// An authenticated session: token pair, expiry, and the owning user.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix seconds. Absent when the session was installed from raw tokens.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl Session {
    /// True once `now` (unix seconds) has reached the recorded expiry.
    /// Sessions without an expiry are treated as live.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Fill `expires_at` from `expires_in` when the backend only sent the latter.
    pub(crate) fn stamp_expiry(&mut self, now: i64) {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now + secs);
        }
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Result of a sign-up call. The backend returns a session only when it
/// confirms the account immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: Option<User>,
    pub session: Option<Session>,
}

impl SignUpOutcome {
    /// True when the account still needs its email verified.
    #[must_use]
    pub fn awaiting_confirmation(&self) -> bool {
        !self.session.as_ref().is_some_and(|s| s.user.is_confirmed())
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Auth-state change pushed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

impl AuthEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed(_) => "TOKEN_REFRESHED",
        }
    }
}

// =============================================================================
// GATEWAY TRAIT
// =============================================================================

/// Operations delegated to the external auth backend.
///
/// Implemented by [`super::GatewayClient`] over HTTP and by in-memory fakes
/// in tests. Errors pass through unmodified and nothing is retried.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, role: Role) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The user behind the held session, fetched fresh from the backend.
    async fn get_current_user(&self) -> Result<Option<User>, AuthError>;

    /// The held session with an up-to-date user record, refreshed first if
    /// its access token has expired.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Install a token pair (e.g. from a deep link) as the active session.
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, AuthError>;

    /// Subscribe to auth-state changes. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
