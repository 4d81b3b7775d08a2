//! In-memory auth backend and fixtures shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::{AuthApi, AuthError, AuthEvent, Role, Session, SignUpOutcome, User};

pub fn user(role: Option<&str>, confirmed: bool) -> User {
    let mut user_metadata = serde_json::Map::new();
    if let Some(role) = role {
        user_metadata.insert("role".into(), serde_json::json!(role));
    }
    User {
        id: Uuid::nil(),
        email: Some("user@example.com".into()),
        email_confirmed_at: confirmed.then(|| "2025-01-01T00:00:00Z".to_owned()),
        user_metadata,
    }
}

pub fn session(confirmed: bool) -> Session {
    Session {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        token_type: "bearer".into(),
        expires_in: Some(3600),
        expires_at: None,
        user: user(Some("farmer"), confirmed),
    }
}

pub fn backend_down() -> AuthError {
    AuthError::Request("connection refused".into())
}

// =============================================================================
// MockAuth
// =============================================================================

/// Scriptable `AuthApi`. Holds at most one session and counts calls.
pub struct MockAuth {
    session: Mutex<Option<Session>>,
    failing_lookups: AtomicUsize,
    sign_up_error: Mutex<Option<AuthError>>,
    sign_in_error: Mutex<Option<AuthError>>,
    set_session_error: Mutex<Option<AuthError>>,
    lookup_delay: Mutex<Option<Duration>>,
    pub sign_up_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub get_session_calls: AtomicUsize,
    pub set_session_calls: AtomicUsize,
    events: broadcast::Sender<AuthEvent>,
}

impl MockAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(None),
            failing_lookups: AtomicUsize::new(0),
            sign_up_error: Mutex::new(None),
            sign_in_error: Mutex::new(None),
            set_session_error: Mutex::new(None),
            lookup_delay: Mutex::new(None),
            sign_up_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            get_session_calls: AtomicUsize::new(0),
            set_session_calls: AtomicUsize::new(0),
            events,
        }
    }

    pub fn with_session(session: Session) -> Self {
        let mock = Self::new();
        *mock.session.lock().unwrap() = Some(session);
        mock
    }

    /// Mark the held session's user as confirmed, as the backend would after
    /// the email link is clicked.
    pub fn confirm_email(&self) {
        if let Some(session) = self.session.lock().unwrap().as_mut() {
            session.user.email_confirmed_at = Some("2025-01-01T00:00:00Z".into());
        }
    }

    /// Make the next `n` session lookups fail.
    pub fn fail_next_lookups(&self, n: usize) {
        self.failing_lookups.store(n, Ordering::SeqCst);
    }

    /// Make `get_session` answer late. The held session is read before the
    /// delay, so the answer can be stale by the time it arrives.
    pub fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_sign_in(&self, err: AuthError) {
        *self.sign_in_error.lock().unwrap() = Some(err);
    }

    pub fn fail_sign_up(&self, err: AuthError) {
        *self.sign_up_error.lock().unwrap() = Some(err);
    }

    pub fn fail_set_session(&self, err: AuthError) {
        *self.set_session_error.lock().unwrap() = Some(err);
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn take_lookup_failure(&self) -> bool {
        self.failing_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl AuthApi for MockAuth {
    async fn sign_up(&self, email: &str, _password: &str, role: Role) -> Result<SignUpOutcome, AuthError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.sign_up_error.lock().unwrap().clone();
        if let Some(err) = scripted {
            return Err(err);
        }
        let mut pending = user(Some(role.as_str()), false);
        pending.email = Some(email.to_owned());
        // Pending confirmation: the backend returns the user only and no
        // session is held.
        Ok(SignUpOutcome { user: Some(pending), session: None })
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.sign_in_error.lock().unwrap().clone();
        if let Some(err) = scripted {
            return Err(err);
        }
        let mut session = session(true);
        session.user.email = Some(email.to_owned());
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.session.lock().unwrap() = None;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_current_user(&self) -> Result<Option<User>, AuthError> {
        if self.take_lookup_failure() {
            return Err(backend_down());
        }
        Ok(self.session.lock().unwrap().as_ref().map(|s| s.user.clone()))
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_lookup_failure() {
            return Err(backend_down());
        }
        let held = self.session.lock().unwrap().clone();
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(held)
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, AuthError> {
        self.set_session_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.set_session_error.lock().unwrap().clone();
        if let Some(err) = scripted {
            return Err(err);
        }
        let mut session = session(true);
        session.access_token = access_token.to_owned();
        session.refresh_token = refresh_token.to_owned();
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
