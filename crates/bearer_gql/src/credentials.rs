//! Login credentials.
//!
//! Credentials are always injected; nothing in this crate embeds a
//! username or password.

use crate::error::{ClientError, ClientResult};
use std::fmt;

/// Environment variable holding the login username.
pub const USERNAME_ENV: &str = "GQL_API_USERNAME";
/// Environment variable holding the login password.
pub const PASSWORD_ENV: &str = "GQL_API_PASSWORD";

/// A username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials for the login mutation.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> ClientResult<Credentials>;
}

/// Fixed credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self(Credentials::new(username, password))
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> ClientResult<Credentials> {
        Ok(self.0.clone())
    }
}

/// Credentials read from environment variables on every login.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    username_var: String,
    password_var: String,
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(USERNAME_ENV, PASSWORD_ENV)
    }
}

impl EnvCredentials {
    /// Reads credentials from the given variables.
    pub fn new(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Self {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }

    fn var(name: &str) -> ClientResult<String> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(ClientError::config(format!(
                "Missing credential: set {name}"
            ))),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> ClientResult<Credentials> {
        Ok(Credentials {
            username: Self::var(&self.username_var)?,
            password: Self::var(&self.password_var)?,
        })
    }
}
