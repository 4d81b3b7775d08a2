//! FarmConnect PH app shell: authentication, role routing, and email
//! verification against a hosted auth backend.

pub mod auth;
pub mod config;
pub mod deep_link;
pub mod form;
pub mod notice;
pub mod router;
pub mod verification;

#[cfg(test)]
mod test_helpers;
