//! Client configuration.

use crate::request::header_safe;
use rustc_hash::FxHashMap;
use std::time::Duration;

/// Name of the cookie the bearer token is stored under.
pub const TOKEN_COOKIE_NAME: &str = "wpt";

/// How the static fetch decides that a token has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryCheck {
    /// Expired only when `now_ms == expiration * 1000`.
    ///
    /// In practice this almost never fires; it is kept as the default until
    /// the intended comparison is confirmed.
    #[default]
    Exact,
    /// Expired when `now_ms >= expiration * 1000`.
    AtOrAfter,
}

impl ExpiryCheck {
    /// Returns true if a token expiring at `expiration_secs` is expired at `now_ms`.
    pub fn is_expired(self, now_ms: i64, expiration_secs: i64) -> bool {
        let expiration_ms = expiration_secs.saturating_mul(1000);
        match self {
            Self::Exact => now_ms == expiration_ms,
            Self::AtOrAfter => now_ms >= expiration_ms,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the GraphQL endpoint.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Headers sent with every request. `Authorization` is never taken from here.
    pub headers: FxHashMap<String, String>,
    /// Total number of times a request may be sent when its responses keep
    /// carrying GraphQL errors. Every errored response triggers one refresh.
    pub auth_attempts: u32,
    /// Expiry comparison used by the static fetch.
    pub expiry_check: ExpiryCheck,
    /// Cookie name used by cookie-backed token stores.
    pub token_cookie: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            headers: FxHashMap::default(),
            auth_attempts: 2,
            expiry_check: ExpiryCheck::default(),
            token_cookie: TOKEN_COOKIE_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates a new config with a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a default header. Control characters are removed from both parts.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(header_safe(&key.into()), header_safe(&value.into()));
        self
    }

    /// Sets how many times a request may be sent. Values below 1 are raised to 1.
    pub fn auth_attempts(mut self, attempts: u32) -> Self {
        self.auth_attempts = attempts.max(1);
        self
    }

    /// Sets the expiry comparison used by the static fetch.
    pub fn expiry_check(mut self, check: ExpiryCheck) -> Self {
        self.expiry_check = check;
        self
    }

    /// Sets the token cookie name.
    pub fn token_cookie(mut self, name: impl Into<String>) -> Self {
        self.token_cookie = name.into();
        self
    }
}
