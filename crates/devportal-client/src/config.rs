//! Client configuration loaded from `DEVPORTAL_*` environment variables.

use std::time::Duration;

use devportal_core::cache::DEFAULT_CACHE_TTL;

use crate::error::PortalError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1/token";

/// What to do when the backend rejects a request with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnauthorizedPolicy {
    /// Clear caches and sign out of both backend and identity provider.
    #[default]
    SignOut,
    /// Try one silent re-login with a fresh identity token and replay the
    /// request once; sign out if that fails too.
    RefreshThenSignOut,
}

impl std::str::FromStr for UnauthorizedPolicy {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sign-out" | "signout" | "logout" => Ok(Self::SignOut),
            "refresh" | "refresh-then-sign-out" => Ok(Self::RefreshThenSignOut),
            other => Err(PortalError::Config(format!(
                "unknown unauthorized policy '{other}', expected 'sign-out' or 'refresh'"
            ))),
        }
    }
}

/// Settings for one portal client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,
    /// Lifetime of cached reads. Default: 90 seconds.
    pub cache_ttl: Duration,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
    pub unauthorized_policy: UnauthorizedPolicy,
    /// Web API key of the identity project, needed for refresh-token sign-in.
    pub identity_api_key: Option<String>,
    pub token_endpoint: String,
    /// Pause between issuance steps. Default: none.
    pub issuance_pacing: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            cache_ttl: DEFAULT_CACHE_TTL,
            timeout: None,
            unauthorized_policy: UnauthorizedPolicy::default(),
            identity_api_key: None,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_owned(),
            issuance_pacing: Duration::ZERO,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Config` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, PortalError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Config` if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PortalError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let base_url = var("DEVPORTAL_URL")
            .unwrap_or(defaults.base_url)
            .trim_end_matches('/')
            .to_owned();

        let cache_ttl = match var("DEVPORTAL_CACHE_TTL_SECS") {
            Some(v) => Duration::from_secs(parse_number("DEVPORTAL_CACHE_TTL_SECS", &v)?),
            None => defaults.cache_ttl,
        };

        let timeout = var("DEVPORTAL_TIMEOUT_SECS")
            .map(|v| parse_number("DEVPORTAL_TIMEOUT_SECS", &v))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let unauthorized_policy = var("DEVPORTAL_UNAUTHORIZED_POLICY")
            .map(|v| v.parse::<UnauthorizedPolicy>())
            .transpose()?
            .unwrap_or_default();

        let issuance_pacing = var("DEVPORTAL_ISSUANCE_PACING_MS")
            .map(|v| parse_number("DEVPORTAL_ISSUANCE_PACING_MS", &v))
            .transpose()?
            .map_or(Duration::ZERO, Duration::from_millis);

        Ok(Self {
            base_url,
            cache_ttl,
            timeout,
            unauthorized_policy,
            identity_api_key: var("DEVPORTAL_FIREBASE_API_KEY"),
            token_endpoint: var("DEVPORTAL_TOKEN_ENDPOINT").unwrap_or(defaults.token_endpoint),
            issuance_pacing,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, PortalError> {
    value
        .trim()
        .parse()
        .map_err(|_| PortalError::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}
