//! GraphQL fetch adapter with bearer-token storage and refresh.
//!
//! The crate wraps a GraphQL-over-HTTP transport with:
//! - a persistent token store (in memory or in a cookie jar file),
//! - an authenticator that logs in with injected credentials,
//! - three fetch strategies: imperative ([`Fetcher::fetch_data`]),
//!   reactive ([`QueryCache::query`]) and static ([`Fetcher::fetch_static`]).
//!
//! # Example
//!
//! `https://` endpoints are served by the reqwest transport (default feature
//! `reqwest`); plain `http://` endpoints use the built-in TCP client.
//!
//! ```ignore
//! use bearer_gql::{ClientConfig, CookieJarStore, EnvCredentials, Fetcher, RequestDescriptor};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::new("http://localhost:8080/graphql");
//! let fetcher = Fetcher::builder(config.clone())
//!     .token_store(Arc::new(CookieJarStore::new("cookies.json", &config.token_cookie)))
//!     .credentials(Arc::new(EnvCredentials::default()))
//!     .build()?;
//!
//! let posts = fetcher
//!     .fetch_data(&RequestDescriptor::new("query { posts { nodes { id } } }").with_token())
//!     .await?
//!     .into_data()?;
//! ```

pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod reactive;
pub mod request;
#[cfg(feature = "reqwest")]
pub mod reqwest_transport;
pub mod token;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use auth::Authenticator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ClientConfig, ExpiryCheck, TOKEN_COOKIE_NAME};
pub use credentials::{CredentialProvider, Credentials, EnvCredentials, StaticCredentials};
pub use error::{ClientError, ClientResult, ErrorCode};
pub use fetch::{Fetcher, FetcherBuilder};
pub use reactive::{QueryCache, QueryHandle, QueryState};
pub use request::{GraphQLError, Request, RequestDescriptor, Response};
pub use token::{CookieJarStore, MemoryTokenStore, TokenStore};
#[cfg(feature = "reqwest")]
pub use reqwest_transport::ReqwestTransport;
pub use transport::{default_transport, HttpTransport, Transport};
