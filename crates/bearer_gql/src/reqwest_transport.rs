//! HTTPS transport backed by `reqwest` with rustls.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorCode, ResultExt};
use crate::request::{Request, Response, AUTHORIZATION};
use crate::transport::{check_header, decode_reply, HttpReply, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use tracing::debug;

/// Transport that sends requests through a shared [`reqwest::Client`].
///
/// Works for both `http://` and `https://` endpoints.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    url: String,
}

impl ReqwestTransport {
    /// Creates a transport from the client configuration.
    ///
    /// Default headers other than `Authorization` become client defaults.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            if name.eq_ignore_ascii_case(AUTHORIZATION) {
                continue;
            }
            let (name, value) = header_pair(name, value)?;
            defaults.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(defaults)
            .user_agent(concat!("bearer_gql/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_client_err_with(ErrorCode::ConfigError, "Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: config.url.trim().to_string(),
        })
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn header_pair(name: &str, value: &str) -> ClientResult<(HeaderName, HeaderValue)> {
    check_header(name, value)?;
    let invalid = || {
        ClientError::new(
            ErrorCode::InvalidHeader,
            format!("Invalid header {name:?}"),
        )
    };
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((name, value))
}

fn transport_error(err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::timeout()
    } else if err.is_connect() {
        ClientError::new(
            ErrorCode::ConnectionRefused,
            format!("Connection failed: {err}"),
        )
    } else if err.is_builder() {
        ClientError::new(ErrorCode::InvalidUrl, err.to_string())
    } else {
        ClientError::network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> ClientResult<Response> {
        let mut builder = self.client.post(&self.url).json(&request);
        for (name, value) in &request.headers {
            let (name, value) = header_pair(name, value)?;
            builder = builder.header(name, value);
        }

        debug!(
            url = %self.url,
            authorized = request.authorization().is_some(),
            "Sending GraphQL request: {}",
            request.query.chars().take(100).collect::<String>()
        );

        let reply = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = reply.status().as_u16();
        let body = reply
            .text()
            .await
            .map_client_err(ErrorCode::InvalidResponse)?;

        decode_reply(&HttpReply { status, body })
    }
}
