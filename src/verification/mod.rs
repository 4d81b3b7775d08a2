//! Email verification across three observers.
//!
//! ARCHITECTURE
//! ============
//! `machine` holds the pure state machine, `shell` owns the live state and
//! publishes notices, and `watchers` runs the auth-event, poll, and
//! deep-link observers that feed it. Whichever observer sees a confirmed
//! user first triggers the single acknowledgment; the rest are no-ops.

pub mod machine;
pub mod shell;
pub mod watchers;

pub use machine::{Observer, ShellState, Signal, VerificationState, transition};
pub use shell::Shell;
pub use watchers::{WatchConfig, Watchers, handle_link};
