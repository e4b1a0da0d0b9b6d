//! Typed error system for the fetch adapter.
//!
//! Transport failures, authentication failures and storage failures all
//! surface as a [`ClientError`] tagged with an [`ErrorCode`]. GraphQL error
//! envelopes are *not* errors at this level; they travel inside
//! [`Response`](crate::request::Response) until a caller asks for the data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Typed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Network errors
    NetworkError,
    Timeout,
    ConnectionRefused,

    // Protocol errors
    HttpError,
    HttpsNotSupported,
    InvalidUrl,
    InvalidHeader,
    InvalidResponse,

    // GraphQL errors
    ParseError,
    ExecutionError,
    NoData,

    // Serialization errors
    SerializeError,
    DeserializeError,

    // Auth errors
    AuthError,

    // Local state
    StorageError,
    ConfigError,

    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::HttpError => "HTTP_ERROR",
            Self::HttpsNotSupported => "HTTPS_NOT_SUPPORTED",
            Self::InvalidUrl => "INVALID_URL",
            Self::InvalidHeader => "INVALID_HEADER",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::ParseError => "PARSE_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::NoData => "NO_DATA",
            Self::SerializeError => "SERIALIZE_ERROR",
            Self::DeserializeError => "DESERIALIZE_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the failure happened before a GraphQL envelope was read.
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NetworkError
                | Self::Timeout
                | Self::ConnectionRefused
                | Self::HttpError
                | Self::HttpsNotSupported
                | Self::InvalidUrl
                | Self::InvalidResponse
                | Self::ParseError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by every fallible operation in this crate.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct ClientError {
    /// Typed error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Underlying error, if this one wraps another.
    #[source]
    pub source: Option<Box<ClientError>>,
    /// Extension data for debugging.
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

impl ClientError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            extensions: None,
        }
    }

    /// Adds a source error.
    pub fn with_source(mut self, source: ClientError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Adds extension data.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let extensions = self.extensions.get_or_insert_with(HashMap::new);
        if let Ok(v) = serde_json::to_value(value) {
            extensions.insert(key.into(), v);
        }
        self
    }

    // Convenience constructors

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Creates a timeout error.
    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "Request timed out")
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Creates an auth error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthError, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Creates a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializeError, message)
    }

    /// Creates a deserialization error.
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeserializeError, message)
    }

    /// Returns true if this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        self.code.is_transport()
    }
}

impl Serialize for ClientError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ClientError", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref ext) = self.extensions {
            state.serialize_field("extensions", ext)?;
        }
        state.end()
    }
}

/// Type alias for client results.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Result extension for mapping foreign errors with context.
pub trait ResultExt<T> {
    /// Maps the error to a [`ClientError`] with the given code.
    fn map_client_err(self, code: ErrorCode) -> ClientResult<T>;

    /// Maps the error to a [`ClientError`] with the given code and message.
    fn map_client_err_with(self, code: ErrorCode, message: impl Into<String>) -> ClientResult<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn map_client_err(self, code: ErrorCode) -> ClientResult<T> {
        self.map_err(|e| ClientError::new(code, e.to_string()))
    }

    fn map_client_err_with(self, code: ErrorCode, message: impl Into<String>) -> ClientResult<T> {
        self.map_err(|e| {
            ClientError::new(code, message).with_extension("original_error", e.to_string())
        })
    }
}
