//! Auth gateway: the client side of the hosted auth backend.
//!
//! ARCHITECTURE
//! ============
//! `AuthApi` is the seam the rest of the crate depends on. `GatewayClient`
//! implements it over HTTP; tests substitute an in-memory fake. The gateway
//! owns the session exclusively and announces every change as an
//! `AuthEvent`.

pub mod gateway;
pub mod types;

pub use gateway::GatewayClient;
pub use types::{AuthApi, AuthError, AuthEvent, Role, Session, SignUpOutcome, User};
