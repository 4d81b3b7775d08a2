//! Login / sign-up form: local validation and submission.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::auth::{AuthApi, Role};
use crate::notice::Notice;

const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\S+@\S+\.\S+").unwrap_or_else(|e| panic!("invalid built-in email pattern: {e}"))
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormMode {
    #[default]
    Login,
    SignUp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl FieldErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none()
    }
}

/// What a submission produced, for the shell to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation failed; nothing was sent.
    Invalid(FieldErrors),
    SignedIn(Notice),
    /// Account created. `awaiting_verification` is false only when the
    /// backend confirmed the email immediately.
    SignedUp { notice: Notice, awaiting_verification: bool },
    /// The backend rejected the request; its message is in the notice.
    Failed(Notice),
}

impl SubmitOutcome {
    #[must_use]
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Self::Invalid(_) => None,
            Self::SignedIn(notice) | Self::SignedUp { notice, .. } | Self::Failed(notice) => Some(notice),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthForm {
    pub mode: FormMode,
    pub role: Role,
    /// Set when no verification watcher will run after sign-up, so the
    /// success notice must not promise automatic detection.
    pub detached: bool,
    email: String,
    password: String,
    errors: FieldErrors,
}

impl AuthForm {
    #[must_use]
    pub fn new(mode: FormMode) -> Self {
        Self { mode, ..Self::default() }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Editing a field clears that field's error.
    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
        self.errors.email = None;
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
        self.errors.password = None;
    }

    /// Clear inputs and errors, e.g. after the account has been verified.
    pub fn reset(&mut self) {
        self.email.clear();
        self.password.clear();
        self.errors = FieldErrors::default();
    }

    /// Check both fields and record per-field errors. Returns true when the
    /// form may be submitted.
    pub fn validate(&mut self) -> bool {
        self.errors = validate_fields(&self.email, &self.password);
        self.errors.is_empty()
    }

    /// Validate, then make exactly one backend call for the current mode.
    pub async fn submit(&mut self, api: &dyn AuthApi) -> SubmitOutcome {
        if !self.validate() {
            return SubmitOutcome::Invalid(self.errors.clone());
        }

        match self.mode {
            FormMode::Login => match api.sign_in(&self.email, &self.password).await {
                Ok(session) => {
                    info!(user_id = %session.user.id, "login submitted");
                    SubmitOutcome::SignedIn(Notice::info(
                        "Success",
                        format!("Welcome back, {}!", session.user.email_or_id()),
                    ))
                }
                Err(e) => {
                    warn!(error = %e, "login failed");
                    SubmitOutcome::Failed(Notice::error("Login Failed", e.to_string()))
                }
            },
            FormMode::SignUp => match api.sign_up(&self.email, &self.password, self.role).await {
                Ok(outcome) => {
                    let awaiting_verification = outcome.awaiting_confirmation();
                    info!(role = %self.role, awaiting_verification, "sign-up submitted");
                    let body = match (awaiting_verification, self.detached) {
                        (true, false) => {
                            "Account created! Please check your email and click the verification link to activate \
                             your account. The app will automatically detect when you've verified your email."
                        }
                        (true, true) => {
                            "Account created! Please check your email and click the verification link to activate \
                             your account, then sign in."
                        }
                        (false, _) => "Account created! You are now signed in.",
                    };
                    SubmitOutcome::SignedUp { notice: Notice::info("Success", body), awaiting_verification }
                }
                Err(e) => {
                    warn!(error = %e, "sign-up failed");
                    SubmitOutcome::Failed(Notice::error("Sign Up Failed", e.to_string()))
                }
            },
        }
    }
}

#[must_use]
pub fn validate_fields(email: &str, password: &str) -> FieldErrors {
    let email = if email.trim().is_empty() {
        Some("Email is required".to_owned())
    } else if !EMAIL_SHAPE.is_match(email) {
        Some("Please enter a valid email".to_owned())
    } else {
        None
    };

    // Length is counted in UTF-16 units, as the mobile client measures it.
    let password = if password.trim().is_empty() {
        Some("Password is required".to_owned())
    } else if password.encode_utf16().count() < MIN_PASSWORD_LEN {
        Some(format!("Password must be at least {MIN_PASSWORD_LEN} characters"))
    } else {
        None
    };

    FieldErrors { email, password }
}

#[cfg(test)]
#[path = "form_test.rs"]
mod tests;
