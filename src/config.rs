//! Application configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_APP_SCHEME: &str = "farmconnect-ph";
pub const DEFAULT_EMAIL_REDIRECT_TO: &str = "https://devstreamlogica.github.io/farmconnect-ph/auth-callback.html";
pub const DEFAULT_AUTH_REDIRECT_HOST: &str = "devstreamlogica.github.io";
pub const DEFAULT_VERIFICATION_POLL_MS: u64 = 2000;
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTH_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: &'static str },
    #[error("config parse failed: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for AuthTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_AUTH_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_AUTH_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Backend project URL, without trailing slash.
    pub supabase_url: String,
    /// Public (anon) API key sent as the `apikey` header.
    pub anon_key: String,
    /// Custom URL scheme the app registers for deep links.
    pub app_scheme: String,
    /// Hosted page the confirmation email links to.
    pub email_redirect_to: String,
    /// Host of the hosted redirect page; links containing it are auth callbacks.
    pub redirect_host: String,
    pub poll_interval_ms: u64,
    pub timeouts: AuthTimeouts,
}

impl AppConfig {
    /// Config with every optional setting at its default.
    #[must_use]
    pub fn new(supabase_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into().trim_end_matches('/').to_owned(),
            anon_key: anon_key.into(),
            app_scheme: DEFAULT_APP_SCHEME.to_owned(),
            email_redirect_to: DEFAULT_EMAIL_REDIRECT_TO.to_owned(),
            redirect_host: DEFAULT_AUTH_REDIRECT_HOST.to_owned(),
            poll_interval_ms: DEFAULT_VERIFICATION_POLL_MS,
            timeouts: AuthTimeouts::default(),
        }
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `APP_SCHEME`: default `farmconnect-ph`
    /// - `EMAIL_REDIRECT_TO`: hosted confirmation bridge page
    /// - `AUTH_REDIRECT_HOST`: host of the bridge page
    /// - `VERIFICATION_POLL_MS`: default 2000, must be non-zero
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the poll
    /// interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let supabase_url = std::env::var("SUPABASE_URL").map_err(|_| ConfigError::Missing { var: "SUPABASE_URL" })?;
        let anon_key =
            std::env::var("SUPABASE_ANON_KEY").map_err(|_| ConfigError::Missing { var: "SUPABASE_ANON_KEY" })?;
        Self::from_env_with(supabase_url, anon_key)
    }

    /// Like [`AppConfig::from_env`], with the required values supplied by
    /// the caller (CLI flags). Optional settings still come from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting config fails validation.
    pub fn from_env_with(supabase_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(supabase_url, anon_key);
        if let Ok(scheme) = std::env::var("APP_SCHEME") {
            config.app_scheme = scheme;
        }
        if let Ok(redirect) = std::env::var("EMAIL_REDIRECT_TO") {
            config.email_redirect_to = redirect;
        }
        if let Ok(host) = std::env::var("AUTH_REDIRECT_HOST") {
            config.redirect_host = host;
        }
        config.poll_interval_ms = env_parse("VERIFICATION_POLL_MS", DEFAULT_VERIFICATION_POLL_MS);
        config.timeouts = AuthTimeouts {
            request_secs: env_parse("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_AUTH_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_AUTH_CONNECT_TIMEOUT_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error for empty required values or a zero poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supabase_url.trim().is_empty() {
            return Err(ConfigError::Missing { var: "SUPABASE_URL" });
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::Missing { var: "SUPABASE_ANON_KEY" });
        }
        if self.app_scheme.is_empty() || self.app_scheme.contains("://") {
            return Err(ConfigError::Invalid(format!("invalid APP_SCHEME: {}", self.app_scheme)));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("VERIFICATION_POLL_MS must be greater than zero".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
