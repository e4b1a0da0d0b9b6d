//! Fetch strategies.
//!
//! Every strategy builds a fresh [`Request`](crate::request::Request) per
//! call and attaches `Authorization: Bearer <token>` only when the
//! descriptor asks for it, so concurrent calls never see each other's
//! credentials.
//!
//! When a token-bearing request made by [`Fetcher::fetch_data`] comes back
//! with a GraphQL `errors` field, the token is refreshed. The request is
//! re-sent with the fresh token while attempts remain
//! ([`ClientConfig::auth_attempts`]); once they run out the last errored
//! response is returned as-is.

use crate::auth::Authenticator;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::{ClientError, ClientResult};
use crate::request::{RequestDescriptor, Response};
use crate::token::{MemoryTokenStore, TokenStore};
use crate::transport::{default_transport, Transport};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs request descriptors against a GraphQL endpoint.
#[derive(Clone)]
pub struct Fetcher {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    auth: Authenticator,
    clock: Arc<dyn Clock>,
}

impl Fetcher {
    /// Starts building a fetcher.
    pub fn builder(config: ClientConfig) -> FetcherBuilder {
        FetcherBuilder {
            config,
            transport: None,
            tokens: None,
            credentials: None,
            clock: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the token store.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Returns the authenticator.
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Logs in again and stores the new token.
    pub async fn refresh(&self) -> ClientResult<String> {
        self.auth.refresh().await
    }

    /// Sends the request once with the stored token (if requested).
    ///
    /// No refresh happens here; this is the building block the other
    /// strategies share.
    pub async fn fetch(&self, descriptor: &RequestDescriptor) -> ClientResult<Response> {
        let token = self.stored_token(descriptor)?;
        self.send_with(descriptor, token.as_deref()).await
    }

    /// Imperative fetch.
    ///
    /// Transport failures are returned as `Err`. A GraphQL error envelope on
    /// a token-bearing request triggers one refresh per errored response and
    /// a re-send while attempts remain. With a single attempt the refresh
    /// still happens but the original response is returned.
    pub async fn fetch_data(&self, descriptor: &RequestDescriptor) -> ClientResult<Response> {
        let token = self.stored_token(descriptor)?;
        self.send_with_refresh(descriptor, token).await
    }

    /// Static-context fetch with an already known `token`.
    ///
    /// Before sending, the token's remote expiration is compared with the
    /// clock using [`ClientConfig::expiry_check`]; an expired token is
    /// replaced by a refreshed one. The request itself is sent once: an
    /// errored response is returned without another refresh. A failing
    /// expiry lookup is returned as the error and nothing is sent.
    pub async fn fetch_static(
        &self,
        descriptor: &RequestDescriptor,
        token: &str,
    ) -> ClientResult<Response> {
        let token = if descriptor.use_token {
            Some(self.ensure_fresh(token).await?)
        } else {
            None
        };
        self.send_with(descriptor, token.as_deref()).await
    }

    async fn ensure_fresh(&self, token: &str) -> ClientResult<String> {
        let username = self.auth.username()?;
        let Some(expiration) = self.auth.token_expiration(token, &username).await? else {
            debug!("No remote expiration reported for token");
            return Ok(token.to_string());
        };

        let now = self.clock.now_millis();
        if self.config.expiry_check.is_expired(now, expiration) {
            info!(expiration, now, "Token expired, refreshing before static fetch");
            self.auth.refresh().await
        } else {
            debug!(expiration, now, "Token still valid");
            Ok(token.to_string())
        }
    }

    /// Reads the stored token, but only when the descriptor uses one.
    pub(crate) fn stored_token(
        &self,
        descriptor: &RequestDescriptor,
    ) -> ClientResult<Option<String>> {
        if descriptor.use_token {
            self.tokens.retrieve()
        } else {
            Ok(None)
        }
    }

    pub(crate) async fn send_with(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> ClientResult<Response> {
        if descriptor.use_token && token.is_none() {
            debug!("Request wants a token but none is stored");
        }
        self.transport.send(descriptor.to_request(token)).await
    }

    async fn send_with_refresh(
        &self,
        descriptor: &RequestDescriptor,
        mut token: Option<String>,
    ) -> ClientResult<Response> {
        let attempts = self.config.auth_attempts.max(1);
        let mut attempt = 1;

        loop {
            let response = self.send_with(descriptor, token.as_deref()).await?;
            // A token-less request cannot be fixed by a new token.
            if !response.has_errors() || !descriptor.use_token {
                return Ok(response);
            }

            warn!(attempt, attempts, "GraphQL errors in response, refreshing token");
            let fresh = self.auth.refresh().await?;

            if attempt >= attempts {
                return Ok(response);
            }
            attempt += 1;
            token = Some(fresh);
        }
    }
}

/// Builder for [`Fetcher`].
pub struct FetcherBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    tokens: Option<Arc<dyn TokenStore>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl FetcherBuilder {
    /// Uses a custom transport instead of the one picked from the URL.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses the given token store instead of an in-memory one.
    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the credential provider used for login. Required.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Uses the given clock instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the fetcher.
    pub fn build(self) -> ClientResult<Fetcher> {
        let credentials = self
            .credentials
            .ok_or_else(|| ClientError::config("A credential provider is required"))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None if self.config.url.trim().is_empty() => {
                return Err(ClientError::config("Endpoint URL is required"));
            }
            None => default_transport(&self.config)?,
        };

        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let auth = Authenticator::new(transport.clone(), tokens.clone(), credentials);

        Ok(Fetcher {
            config: self.config,
            transport,
            tokens,
            auth,
            clock,
        })
    }
}
