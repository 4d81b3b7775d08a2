//! Verification state machine and its single transition function.
//!
//! Observers never write shell state directly. Each produces a `Signal`, and
//! `transition` applies it to `ShellState`, returning the notices to show.
//! Re-applying a confirmation is harmless: only the step into `Verified`
//! emits the acknowledgment.

use crate::auth::User;
use crate::notice::Notice;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerificationState {
    #[default]
    Idle,
    /// A sign-up is waiting for its email link to be clicked. The poll only
    /// queries the backend in this state.
    Waiting,
    /// Confirmation observed; the acknowledgment is showing.
    Verified,
}

/// Which observer produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observer {
    AuthEvent,
    Poll,
    DeepLink,
    /// The app itself (startup check, form submission, user action).
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A sign-up succeeded without an immediately confirmed email.
    SignUpPending,
    /// A session with a confirmed user was observed.
    Confirmed { user: User, via: Observer },
    /// A session lookup finished without proof of confirmation. Carries the
    /// user seen, if any.
    SessionObserved(Option<User>),
    SignedOut,
    /// The user dismissed the success acknowledgment.
    Acknowledged,
    /// An observer could not reach the backend or failed to process input.
    ObserverFailed(Notice),
    /// Informational message that leaves state alone.
    Inform(Notice),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellState {
    pub user: Option<User>,
    pub loading: bool,
    pub verification: VerificationState,
}

impl ShellState {
    /// Initial state at app start: loading until the first user lookup ends.
    #[must_use]
    pub fn starting() -> Self {
        Self { user: None, loading: true, verification: VerificationState::Idle }
    }
}

/// Apply `signal` to `state`, returning the notices the transition produced.
pub fn transition(state: &mut ShellState, signal: Signal) -> Vec<Notice> {
    use VerificationState::{Idle, Verified, Waiting};

    match signal {
        Signal::SignUpPending => {
            state.verification = Waiting;
            Vec::new()
        }
        // The poll only runs for a pending sign-up; a lookup that lands after
        // the wait ended (sign-out, another observer) is stale.
        Signal::Confirmed { via: Observer::Poll, .. } if state.verification != Waiting => Vec::new(),
        Signal::Confirmed { user, via } => {
            state.user = Some(user);
            state.loading = false;
            // A plain sign-in while idle is not a verification; a deep link
            // is, even on a cold start where nothing was waiting.
            let verifies = match state.verification {
                Waiting => true,
                Idle => via == Observer::DeepLink,
                Verified => false,
            };
            if verifies {
                state.verification = Verified;
                vec![Notice::verification_success()]
            } else {
                Vec::new()
            }
        }
        Signal::SessionObserved(user) => {
            state.user = user;
            state.loading = false;
            Vec::new()
        }
        Signal::SignedOut => {
            state.user = None;
            state.loading = false;
            if state.verification == Waiting {
                state.verification = Idle;
            }
            Vec::new()
        }
        Signal::Acknowledged => {
            if state.verification == Verified {
                state.verification = Idle;
            }
            Vec::new()
        }
        Signal::ObserverFailed(notice) | Signal::Inform(notice) => vec![notice],
    }
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
