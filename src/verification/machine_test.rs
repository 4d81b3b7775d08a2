use super::*;
use crate::notice::NoticeKind;
use crate::test_helpers::user;

fn waiting() -> ShellState {
    let mut state = ShellState::starting();
    transition(&mut state, Signal::SessionObserved(None));
    transition(&mut state, Signal::SignUpPending);
    state
}

fn confirmed(via: Observer) -> Signal {
    Signal::Confirmed { user: user(Some("farmer"), true), via }
}

#[test]
fn starting_state_is_loading_and_idle() {
    let state = ShellState::starting();
    assert!(state.loading);
    assert!(state.user.is_none());
    assert_eq!(state.verification, VerificationState::Idle);
}

#[test]
fn sign_up_pending_enters_waiting() {
    let state = waiting();
    assert_eq!(state.verification, VerificationState::Waiting);
    assert!(!state.loading);
}

#[test]
fn confirmation_while_waiting_acknowledges_once() {
    let mut state = waiting();

    let first = transition(&mut state, confirmed(Observer::AuthEvent));
    let second = transition(&mut state, confirmed(Observer::Poll));

    assert_eq!(first, vec![Notice::verification_success()]);
    assert!(second.is_empty());
    assert_eq!(state.verification, VerificationState::Verified);
    assert!(state.user.is_some());
}

#[test]
fn confirmation_order_does_not_matter() {
    let mut state = waiting();
    let first = transition(&mut state, confirmed(Observer::Poll));
    let second = transition(&mut state, confirmed(Observer::AuthEvent));
    assert_eq!(first.len() + second.len(), 1);
}

#[test]
fn plain_sign_in_while_idle_does_not_acknowledge() {
    let mut state = ShellState::starting();
    let notices = transition(&mut state, confirmed(Observer::AuthEvent));
    assert!(notices.is_empty());
    assert_eq!(state.verification, VerificationState::Idle);
    assert!(state.user.is_some());
    assert!(!state.loading);
}

#[test]
fn deep_link_confirmation_from_cold_start_acknowledges() {
    let mut state = ShellState::starting();
    let notices = transition(&mut state, confirmed(Observer::DeepLink));
    assert_eq!(notices[0].kind, NoticeKind::VerificationSuccess);
    assert_eq!(state.verification, VerificationState::Verified);
}

#[test]
fn acknowledged_returns_to_idle_and_never_rewaits() {
    let mut state = waiting();
    transition(&mut state, confirmed(Observer::Poll));
    transition(&mut state, Signal::Acknowledged);
    assert_eq!(state.verification, VerificationState::Idle);

    // Late duplicate from another observer stays quiet.
    let late = transition(&mut state, confirmed(Observer::AuthEvent));
    assert!(late.is_empty());
    assert_eq!(state.verification, VerificationState::Idle);
}

#[test]
fn acknowledged_outside_verified_is_noop() {
    let mut state = waiting();
    transition(&mut state, Signal::Acknowledged);
    assert_eq!(state.verification, VerificationState::Waiting);
}

#[test]
fn unconfirmed_session_keeps_waiting() {
    let mut state = waiting();
    let notices = transition(&mut state, Signal::SessionObserved(Some(user(None, false))));
    assert!(notices.is_empty());
    assert_eq!(state.verification, VerificationState::Waiting);
    assert!(state.user.is_some());
}

#[test]
fn observer_failure_warns_and_keeps_state() {
    let mut state = waiting();
    let before = state.clone();
    let notices = transition(&mut state, Signal::ObserverFailed(Notice::warning("Check Failed", "down")));
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Warning);
    assert_eq!(state, before);
}

#[test]
fn sign_out_clears_user_and_wait() {
    let mut state = waiting();
    transition(&mut state, Signal::SessionObserved(Some(user(None, false))));
    transition(&mut state, Signal::SignedOut);
    assert!(state.user.is_none());
    assert_eq!(state.verification, VerificationState::Idle);
}

#[test]
fn sign_out_leaves_pending_acknowledgment() {
    let mut state = waiting();
    transition(&mut state, confirmed(Observer::DeepLink));
    transition(&mut state, Signal::SignedOut);
    assert_eq!(state.verification, VerificationState::Verified);
}

#[test]
fn new_sign_up_after_verification_waits_again() {
    let mut state = waiting();
    transition(&mut state, confirmed(Observer::Poll));
    transition(&mut state, Signal::SignUpPending);
    assert_eq!(state.verification, VerificationState::Waiting);
}

#[test]
fn poll_confirmation_outside_waiting_is_stale() {
    let mut state = waiting();
    transition(&mut state, Signal::SignedOut);

    let notices = transition(&mut state, confirmed(Observer::Poll));
    assert!(notices.is_empty());
    assert!(state.user.is_none());
    assert_eq!(state.verification, VerificationState::Idle);

    let mut verified = waiting();
    transition(&mut verified, confirmed(Observer::AuthEvent));
    transition(&mut verified, Signal::SignedOut);
    transition(&mut verified, confirmed(Observer::Poll));
    assert!(verified.user.is_none());
}
