//! Deep-link token extraction and callback classification.
//!
//! Tokens are pulled out by pattern scan rather than URL parsing: the hosted
//! bridge page may put them in the query or the fragment, and callers only
//! need the first `name=value` occurrence. Absence is never an error.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::AppConfig;

static ACCESS_TOKEN: LazyLock<Regex> = LazyLock::new(|| compile(r"access_token=([^&]+)"));
static REFRESH_TOKEN: LazyLock<Regex> = LazyLock::new(|| compile(r"refresh_token=([^&]+)"));
// Anchored to a parameter boundary so `token_type=bearer` is not read as the flow type.
static FLOW_TYPE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:^|[?#&])type=([^&]+)"));

const VERIFIED_MARKER: &str = "auth-callback?verified=true";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

fn first_capture(re: &Regex, url: &str) -> Option<String> {
    re.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

// =============================================================================
// TOKENS
// =============================================================================

/// Values found in a deep-link URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Flow type reported by the backend (`signup`, `recovery`, ...).
    pub flow_type: Option<String>,
}

impl LinkTokens {
    /// Both tokens, when the link carried a complete pair.
    #[must_use]
    pub fn pair(&self) -> Option<(&str, &str)> {
        Some((self.access_token.as_deref()?, self.refresh_token.as_deref()?))
    }
}

/// Scan `url` for `access_token=`, `refresh_token=`, and `type=` values.
#[must_use]
pub fn extract_tokens(url: &str) -> LinkTokens {
    LinkTokens {
        access_token: first_capture(&ACCESS_TOKEN, url),
        refresh_token: first_capture(&REFRESH_TOKEN, url),
        flow_type: first_capture(&FLOW_TYPE, url),
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `<scheme>://auth/callback` or the hosted redirect page.
    AuthCallback,
    /// `<scheme>://auth-callback?verified=true`.
    VerifiedMarker,
    Unrecognized,
}

/// The URL patterns routed to the verification handler. Matching is
/// case-sensitive substring search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPatterns {
    callback: String,
    scheme_prefix: String,
    redirect_host: String,
}

impl LinkPatterns {
    #[must_use]
    pub fn new(scheme: &str, redirect_host: &str) -> Self {
        Self {
            callback: format!("{scheme}://auth/callback"),
            scheme_prefix: format!("{scheme}://"),
            redirect_host: redirect_host.to_owned(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.app_scheme, &config.redirect_host)
    }

    #[must_use]
    pub fn classify(&self, url: &str) -> LinkKind {
        if url.contains(&self.callback) || (!self.redirect_host.is_empty() && url.contains(&self.redirect_host)) {
            LinkKind::AuthCallback
        } else if url.contains(&self.scheme_prefix) && url.contains(VERIFIED_MARKER) {
            LinkKind::VerifiedMarker
        } else {
            LinkKind::Unrecognized
        }
    }
}

#[cfg(test)]
#[path = "deep_link_test.rs"]
mod tests;
