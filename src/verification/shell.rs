//! Shared shell state and the one place signals are applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::machine::{Observer, ShellState, Signal, VerificationState, transition};
use crate::auth::{AuthApi, Session, User};
use crate::notice::Notice;
use crate::router::{Screen, route};

/// Owner of `ShellState`. All observers go through [`Shell::apply`]; the lock
/// is held only for the synchronous transition, never across an await.
pub struct Shell {
    state: Mutex<ShellState>,
    status: watch::Sender<VerificationState>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Shell {
    /// Create a shell in the starting (loading) state. Notices produced by
    /// transitions arrive on the returned receiver in order.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(VerificationState::Idle);
        let shell = Self { state: Mutex::new(ShellState::starting()), status, notices };
        (Arc::new(shell), rx)
    }

    fn lock(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a signal and publish its effects. Returns the resulting
    /// verification state.
    pub fn apply(&self, signal: Signal) -> VerificationState {
        let label = signal_label(&signal);
        let (before, after, notices) = {
            let mut state = self.lock();
            let before = state.verification;
            let notices = transition(&mut state, signal);
            (before, state.verification, notices)
        };

        if before == after {
            debug!(signal = label, state = ?after, "signal applied");
        } else {
            info!(signal = label, from = ?before, to = ?after, "verification state changed");
        }
        self.status.send_if_modified(|current| {
            let changed = *current != after;
            *current = after;
            changed
        });
        for notice in notices {
            if self.notices.send(notice).is_err() {
                warn!(signal = label, "notice receiver dropped");
            }
        }
        after
    }

    /// Feed the outcome of a session lookup from `via`.
    pub fn observe_session(&self, session: Option<Session>, via: Observer) -> VerificationState {
        self.observe_user(session.map(|s| s.user), via)
    }

    pub fn observe_user(&self, user: Option<User>, via: Observer) -> VerificationState {
        match user {
            Some(user) if user.is_confirmed() => self.apply(Signal::Confirmed { user, via }),
            other => self.apply(Signal::SessionObserved(other)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ShellState {
        self.lock().clone()
    }

    #[must_use]
    pub fn verification(&self) -> VerificationState {
        self.lock().verification
    }

    #[must_use]
    pub fn screen(&self) -> Screen {
        let state = self.lock();
        route(state.user.as_ref(), state.loading)
    }

    /// Receiver that wakes whenever the verification state changes.
    #[must_use]
    pub fn watch_verification(&self) -> watch::Receiver<VerificationState> {
        self.status.subscribe()
    }

    /// Startup user check. A failed lookup is logged and treated as signed
    /// out; loading always ends.
    pub async fn bootstrap(&self, api: &dyn AuthApi) {
        let user = match api.get_current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "startup user check failed");
                None
            }
        };
        self.apply(Signal::SessionObserved(user));
    }
}

fn signal_label(signal: &Signal) -> &'static str {
    match signal {
        Signal::SignUpPending => "sign_up_pending",
        Signal::Confirmed { via: Observer::AuthEvent, .. } => "confirmed:auth_event",
        Signal::Confirmed { via: Observer::Poll, .. } => "confirmed:poll",
        Signal::Confirmed { via: Observer::DeepLink, .. } => "confirmed:deep_link",
        Signal::Confirmed { via: Observer::Local, .. } => "confirmed:local",
        Signal::SessionObserved(_) => "session_observed",
        Signal::SignedOut => "signed_out",
        Signal::Acknowledged => "acknowledged",
        Signal::ObserverFailed(_) => "observer_failed",
        Signal::Inform(_) => "inform",
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;
