//! The three verification observers and their joint disposer.
//!
//! DESIGN
//! ======
//! `Watchers::arm` subscribes to auth events, takes ownership of the
//! deep-link receiver, and starts the poll, each as its own task. Every
//! observer turns what it sees into a `Signal` for `Shell::apply`; none of
//! them touch state directly.
//!
//! The poll sleeps on the shell's verification watch while nothing is
//! waiting, so it only ticks (and only queries the backend) between a
//! sign-up and the first observed confirmation.
//!
//! TEARDOWN
//! ========
//! One `CancellationToken` stops all three tasks. Each task releases its own
//! listener on exit: the event receiver is dropped (unsubscribe), the
//! deep-link receiver is closed, and the interval is dropped. Teardown is
//! idempotent; dropping `Watchers` without calling it releases too.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::machine::{Observer, Signal, VerificationState};
use super::shell::Shell;
use crate::auth::{AuthApi, AuthError, AuthEvent};
use crate::config::AppConfig;
use crate::deep_link::{LinkKind, LinkPatterns, extract_tokens};
use crate::notice::Notice;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub patterns: LinkPatterns,
    pub poll_interval: Duration,
}

impl WatchConfig {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self { patterns: LinkPatterns::from_config(config), poll_interval: config.poll_interval() }
    }
}

/// Disposer for the armed observers.
pub struct Watchers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Watchers {
    /// Arm all observers. `initial_url` is the link the app was launched
    /// with, handled before any later link.
    #[must_use]
    pub fn arm(
        shell: Arc<Shell>,
        api: Arc<dyn AuthApi>,
        links: mpsc::Receiver<String>,
        initial_url: Option<String>,
        config: WatchConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        // Subscribe before spawning so no event between arm and first poll is lost.
        let events = api.subscribe();

        let handles = vec![
            tokio::spawn(auth_event_loop(Arc::clone(&shell), events, cancel.clone())),
            tokio::spawn(deep_link_loop(
                Arc::clone(&shell),
                Arc::clone(&api),
                links,
                initial_url,
                config.patterns,
                cancel.clone(),
            )),
            tokio::spawn(poll_loop(shell, api, config.poll_interval, cancel.clone())),
        ];

        info!(poll_interval_ms = config.poll_interval.as_millis(), "verification watchers armed");
        Self { cancel, handles }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop all observers and wait for them to release their listeners.
    pub async fn teardown(mut self) {
        self.release();
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "verification watcher panicked");
                }
            }
        }
        info!("verification watchers released");
    }

    /// Returns false when already released.
    fn release(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

impl Drop for Watchers {
    fn drop(&mut self) {
        if self.release() {
            debug!("verification watchers released on drop");
        }
    }
}

// =============================================================================
// AUTH EVENTS
// =============================================================================

async fn auth_event_loop(shell: Arc<Shell>, mut events: broadcast::Receiver<AuthEvent>, cancel: CancellationToken) {
    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = events.recv() => received,
        };

        match received {
            Ok(AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session)) => {
                debug!(user_id = %session.user.id, confirmed = session.user.is_confirmed(), "auth event: session");
                shell.observe_session(Some(session), Observer::AuthEvent);
            }
            Ok(AuthEvent::SignedOut) => {
                debug!("auth event: signed out");
                shell.apply(Signal::SignedOut);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth event listener lagged");
            }
            Err(RecvError::Closed) => {
                debug!("auth event source closed");
                break;
            }
        }
    }
}

// =============================================================================
// POLL
// =============================================================================

async fn poll_loop(shell: Arc<Shell>, api: Arc<dyn AuthApi>, every: Duration, cancel: CancellationToken) {
    let mut status = shell.watch_verification();

    loop {
        let armed = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            armed = async { status.wait_for(|s| *s == VerificationState::Waiting).await.is_ok() } => armed,
        };
        if !armed {
            return;
        }
        debug!("verification poll armed");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; the first check is one interval out.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if shell.verification() != VerificationState::Waiting {
                break;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = poll_once(&shell, api.as_ref()) => {}
            }
            if shell.verification() != VerificationState::Waiting {
                break;
            }
        }
        debug!("verification poll disarmed");
    }
}

async fn poll_once(shell: &Shell, api: &dyn AuthApi) {
    debug!("checking session for email verification");
    match api.get_session().await {
        Ok(Some(session)) if session.user.is_confirmed() => {
            info!(user_id = %session.user.id, "email verification detected via poll");
            shell.apply(Signal::Confirmed { user: session.user, via: Observer::Poll });
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "verification poll failed; still waiting");
            shell.apply(Signal::ObserverFailed(Notice::warning(
                "Verification Check Failed",
                format!("Could not check your verification status ({e}). Still waiting..."),
            )));
        }
    }
}

// =============================================================================
// DEEP LINKS
// =============================================================================

async fn deep_link_loop(
    shell: Arc<Shell>,
    api: Arc<dyn AuthApi>,
    mut links: mpsc::Receiver<String>,
    initial_url: Option<String>,
    patterns: LinkPatterns,
    cancel: CancellationToken,
) {
    let mut pending = initial_url;

    loop {
        let url = match pending.take() {
            Some(url) => url,
            None => {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    next = links.recv() => next,
                };
                let Some(url) = next else {
                    debug!("deep-link source closed");
                    break;
                };
                url
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = handle_link(&shell, api.as_ref(), &patterns, &url) => {}
        }
    }

    links.close();
}

/// Route one deep link. Failures become notices; state is left alone.
pub async fn handle_link(shell: &Shell, api: &dyn AuthApi, patterns: &LinkPatterns, url: &str) {
    let result = match patterns.classify(url) {
        LinkKind::Unrecognized => {
            debug!("ignoring unrecognized deep link");
            return;
        }
        LinkKind::AuthCallback => {
            info!("auth callback deep link received");
            shell.apply(Signal::Inform(Notice::info(
                "Processing Verification",
                "Please wait while we verify your email...",
            )));
            process_callback(shell, api, url).await
        }
        LinkKind::VerifiedMarker => {
            info!("verification marker deep link received");
            process_verified_marker(shell, api).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "deep link handling failed");
        let notice = if matches!(e, AuthError::Parse(_)) {
            Notice::error("Error", "There was an issue processing the verification link. Please try again.")
        } else {
            Notice::error("Verification Error", "There was an issue verifying your account. Please try again.")
        };
        shell.apply(Signal::ObserverFailed(notice));
    }
}

async fn process_callback(shell: &Shell, api: &dyn AuthApi, url: &str) -> Result<(), AuthError> {
    let tokens = extract_tokens(url);
    debug!(
        access_token = tokens.access_token.is_some(),
        refresh_token = tokens.refresh_token.is_some(),
        flow_type = tokens.flow_type.as_deref().unwrap_or(""),
        "tokens extracted from deep link"
    );

    if let Some((access, refresh)) = tokens.pair() {
        let session = api.set_session(access, refresh).await?;
        shell.observe_session(Some(session), Observer::DeepLink);
        return Ok(());
    }

    debug!("no tokens in deep link; checking current session");
    match api.get_session().await? {
        Some(session) => {
            shell.observe_session(Some(session), Observer::DeepLink);
        }
        None => {
            shell.apply(Signal::Inform(Notice::info(
                "Verification",
                "Email verification completed. You can now log in with your credentials.",
            )));
        }
    }
    Ok(())
}

async fn process_verified_marker(shell: &Shell, api: &dyn AuthApi) -> Result<(), AuthError> {
    let session = api.get_session().await?;
    shell.observe_session(session, Observer::DeepLink);
    Ok(())
}

#[cfg(test)]
#[path = "watchers_test.rs"]
mod tests;
