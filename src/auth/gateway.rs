//! HTTP gateway to the hosted auth backend (GoTrue REST API).
//!
//! DESIGN
//! ======
//! The gateway is the only owner of the session. It keeps the current
//! session in memory, publishes `AuthEvent`s on a broadcast channel whenever
//! the session is installed, refreshed, or cleared, and otherwise adds no
//! logic: backend errors are returned as-is and nothing is retried.
//! Response parsing lives in pure functions for testability.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::types::{AuthApi, AuthError, AuthEvent, Role, Session, SignUpOutcome, User};
use crate::config::AppConfig;

const AUTH_PATH: &str = "/auth/v1";
const EVENT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    redirect_to: String,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl GatewayClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &AppConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            base_url: format!("{}{AUTH_PATH}", config.supabase_url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            redirect_to: config.email_redirect_to.clone(),
            session: RwLock::new(None),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn publish(&self, event: AuthEvent) {
        debug!(event = event.name(), subscribers = self.events.receiver_count(), "auth event");
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    async fn current(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn store(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, AuthError> {
        let response = request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::Api { status: status.as_u16(), message: api_error_message(status, &text) });
        }
        Ok(text)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, AuthError> {
        let text = self
            .execute(self.http.get(self.url("user")).bearer_auth(access_token))
            .await?;
        serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let text = self
            .execute(
                self.http
                    .post(self.url("token"))
                    .query(&[("grant_type", "refresh_token")])
                    .json(&serde_json::json!({ "refresh_token": refresh_token })),
            )
            .await?;
        let session = parse_session(&text, now_unix())?;
        info!(user_id = %session.user.id, "session refreshed");
        self.store(Some(session.clone())).await;
        self.publish(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }
}

#[async_trait::async_trait]
impl AuthApi for GatewayClient {
    async fn sign_up(&self, email: &str, password: &str, role: Role) -> Result<SignUpOutcome, AuthError> {
        let text = self
            .execute(
                self.http
                    .post(self.url("signup"))
                    .query(&[("redirect_to", self.redirect_to.as_str())])
                    .json(&serde_json::json!({
                        "email": email,
                        "password": password,
                        "data": { "role": role.as_str() },
                    })),
            )
            .await?;

        let outcome = parse_sign_up(&text, now_unix())?;
        info!(
            %role,
            session = outcome.session.is_some(),
            awaiting_confirmation = outcome.awaiting_confirmation(),
            "sign-up accepted"
        );
        if let Some(session) = &outcome.session {
            self.store(Some(session.clone())).await;
            self.publish(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let text = self
            .execute(
                self.http
                    .post(self.url("token"))
                    .query(&[("grant_type", "password")])
                    .json(&serde_json::json!({ "email": email, "password": password })),
            )
            .await?;

        let session = parse_session(&text, now_unix())?;
        info!(user_id = %session.user.id, "signed in");
        self.store(Some(session.clone())).await;
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.current().await {
            let result = self
                .execute(self.http.post(self.url("logout")).bearer_auth(&session.access_token))
                .await;
            match result {
                Ok(_) => {}
                // EDGE: the backend already forgot this session; clear locally anyway.
                Err(e) if e.is_session_missing() => {
                    warn!(error = %e, "logout rejected; session already gone server-side");
                }
                Err(e) => return Err(e),
            }
        }
        self.store(None).await;
        info!("signed out");
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_current_user(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.current().await else {
            return Ok(None);
        };
        self.fetch_user(&session.access_token).await.map(Some)
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(mut session) = self.current().await else {
            return Ok(None);
        };
        if session.is_expired_at(now_unix()) {
            session = self.refresh(&session.refresh_token).await?;
        }

        session.user = self.fetch_user(&session.access_token).await?;
        let mut guard = self.session.write().await;
        // EDGE: a concurrent sign-out or token swap wins over this stale snapshot.
        if let Some(held) = guard.as_mut().filter(|held| held.access_token == session.access_token) {
            held.user = session.user.clone();
        }
        Ok(Some(session))
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, AuthError> {
        match self.fetch_user(access_token).await {
            Ok(user) => {
                let session = Session {
                    access_token: access_token.to_owned(),
                    refresh_token: refresh_token.to_owned(),
                    token_type: "bearer".to_owned(),
                    expires_in: None,
                    expires_at: None,
                    user,
                };
                info!(user_id = %session.user.id, confirmed = session.user.is_confirmed(), "session installed from tokens");
                self.store(Some(session.clone())).await;
                self.publish(AuthEvent::SignedIn(session.clone()));
                Ok(session)
            }
            // EDGE: a stale access token can still be traded via its refresh token.
            Err(AuthError::Api { status: 401, .. }) => {
                debug!("access token rejected; trying refresh token");
                self.refresh(refresh_token).await
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn parse_session(text: &str, now: i64) -> Result<Session, AuthError> {
    let mut session: Session = serde_json::from_str(text).map_err(|e| AuthError::Parse(e.to_string()))?;
    session.stamp_expiry(now);
    Ok(session)
}

/// Sign-up answers with a full session when the account is auto-confirmed,
/// and with the bare user (or `{ "user": ... }`) when email confirmation is
/// pending.
pub(crate) fn parse_sign_up(text: &str, now: i64) -> Result<SignUpOutcome, AuthError> {
    let value: Value = serde_json::from_str(text).map_err(|e| AuthError::Parse(e.to_string()))?;

    if value.get("access_token").is_some_and(|v| !v.is_null()) {
        let session = parse_session(text, now)?;
        return Ok(SignUpOutcome { user: Some(session.user.clone()), session: Some(session) });
    }

    let user_value = match value.get("user") {
        Some(user) if user.is_object() => user.clone(),
        _ => value,
    };
    let user = if user_value.get("id").is_some() {
        Some(serde_json::from_value::<User>(user_value).map_err(|e| AuthError::Parse(e.to_string()))?)
    } else {
        None
    };
    Ok(SignUpOutcome { user, session: None })
}

/// Pull the human-readable message out of a backend error body.
pub(crate) fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        ["msg", "error_description", "message", "error"]
            .iter()
            .find_map(|key| v.get(key).and_then(Value::as_str))
            .map(str::to_owned)
    });

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_owned(),
        None => status
            .canonical_reason()
            .map_or_else(|| status.as_u16().to_string(), str::to_owned),
    }
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
