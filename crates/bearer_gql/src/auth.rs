//! Token acquisition and remote expiry lookup.

use crate::credentials::CredentialProvider;
use crate::error::{ClientError, ClientResult};
use crate::request::Request;
use crate::token::TokenStore;
use crate::transport::Transport;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Login mutation returning a fresh bearer token.
pub const LOGIN_MUTATION: &str = "mutation GetToken($username: String!, $password: String!) {
  login(input: { username: $username, password: $password }) {
    authToken
  }
}";

/// Query returning the expiration of the token it is sent with.
pub const USER_EXPIRATION_QUERY: &str =
    "query UserExpiredToken($id: ID!, $idType: UserNodeIdTypeEnum) {
  user(id: $id, idType: $idType) {
    jwtAuthExpiration
  }
}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    login: Option<LoginPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpirationData {
    user: Option<ExpirationUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpirationUser {
    #[serde(default)]
    jwt_auth_expiration: Option<serde_json::Value>,
}

/// Seconds since the epoch from a number or a numeric string.
fn expiration_seconds(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Obtains tokens with the injected credentials and persists them.
#[derive(Clone)]
pub struct Authenticator {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    credentials: Arc<dyn CredentialProvider>,
}

impl Authenticator {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transport,
            tokens,
            credentials,
        }
    }

    /// Logs in, stores the returned token and returns it.
    ///
    /// The login request never carries an `Authorization` header. Failures
    /// are returned as auth errors and nothing is stored.
    pub async fn refresh(&self) -> ClientResult<String> {
        let creds = self.credentials.credentials()?;
        debug!(username = %creds.username, "Requesting a new token");

        let mut request = Request::new(LOGIN_MUTATION).operation_name("GetToken");
        request.variables = Some(serde_json::json!({
            "username": creds.username,
            "password": creds.password,
        }));

        let response = self.transport.send(request).await.map_err(|e| {
            warn!("Login request failed: {}", e);
            ClientError::auth("Login request failed").with_source(e)
        })?;

        let data: LoginData = response.decode().map_err(|e| {
            warn!("Login rejected: {}", e);
            ClientError::auth(format!("Login rejected: {}", e.message)).with_source(e)
        })?;

        let token = data
            .login
            .and_then(|login| login.auth_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ClientError::auth("Login response has no authToken"))?;

        self.tokens.set(&token)?;
        info!("Stored refreshed token");
        Ok(token)
    }

    /// Looks up the expiration (seconds since the epoch) of `token` for `user_id`.
    ///
    /// Returns `None` when the server reports no expiration.
    pub async fn token_expiration(&self, token: &str, user_id: &str) -> ClientResult<Option<i64>> {
        let mut request = Request::new(USER_EXPIRATION_QUERY)
            .operation_name("UserExpiredToken")
            .bearer(token);
        request.variables = Some(serde_json::json!({
            "id": user_id,
            "idType": "USERNAME",
        }));

        let data: ExpirationData = self.transport.send(request).await?.decode()?;
        Ok(data
            .user
            .and_then(|user| user.jwt_auth_expiration)
            .as_ref()
            .and_then(expiration_seconds))
    }

    /// Username the expiry lookup runs against.
    pub fn username(&self) -> ClientResult<String> {
        self.credentials.credentials().map(|c| c.username)
    }
}
