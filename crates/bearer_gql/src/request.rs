//! Request descriptors and GraphQL wire types.

use crate::error::{ClientError, ClientResult, ErrorCode};
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// Header carrying the bearer token.
pub const AUTHORIZATION: &str = "Authorization";

/// Returns `value` without control characters (CR, LF and the like).
pub(crate) fn header_safe(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// What a caller asks the fetch strategies to run.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// GraphQL document.
    pub query: String,
    /// Operation variables.
    pub variables: Option<serde_json::Value>,
    /// Attach the stored bearer token.
    pub use_token: bool,
    /// Seed data for the reactive fetch.
    pub initial_data: Option<serde_json::Value>,
}

impl RequestDescriptor {
    /// Creates a descriptor that does not use the token.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            use_token: false,
            initial_data: None,
        }
    }

    /// Sets the variables.
    pub fn variables<V: Serialize>(mut self, variables: V) -> ClientResult<Self> {
        let value = serde_json::to_value(variables)
            .map_err(|e| ClientError::serialize(e.to_string()))?;
        self.variables = Some(value);
        Ok(self)
    }

    /// Sets raw JSON variables.
    pub fn json_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Attaches the stored token to this request.
    pub fn with_token(mut self) -> Self {
        self.use_token = true;
        self
    }

    /// Sets the seed data shown before the first reactive fetch settles.
    pub fn initial_data(mut self, data: serde_json::Value) -> Self {
        self.initial_data = Some(data);
        self
    }

    /// Key identifying equivalent requests. Seed data is not part of it.
    pub fn cache_key(&self) -> String {
        serde_json::json!([self.query, self.variables, self.use_token]).to_string()
    }

    /// Builds the wire request, attaching `token` when one is given.
    pub fn to_request(&self, token: Option<&str>) -> Request {
        let mut request = Request::new(self.query.clone());
        request.variables = self.variables.clone();
        if let Some(token) = token {
            request = request.bearer(token);
        }
        request
    }
}

/// A GraphQL request. Headers are per request and never shared between calls.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(skip)]
    pub headers: FxHashMap<String, String>,
}

impl Request {
    /// Creates a request with no variables and no headers.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
            headers: FxHashMap::default(),
        }
    }

    /// Sets the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    ///
    /// Control characters in `token` are dropped so it cannot end the header
    /// line early.
    pub fn bearer(mut self, token: &str) -> Self {
        self.headers.insert(
            AUTHORIZATION.to_string(),
            format!("Bearer {}", header_safe(token)),
        );
        self
    }

    /// Returns the `Authorization` header, if any.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION))
            .map(|(_, v)| v.as_str())
    }
}

/// A GraphQL response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl Response {
    /// Creates a successful response.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates an errored response with a single message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: Some(vec![GraphQLError::new(message)]),
        }
    }

    /// Returns true if the envelope has an `errors` field.
    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }

    /// Converts an errored envelope into an execution error.
    pub fn error_value(&self) -> Option<ClientError> {
        let errors = self.errors.as_ref()?;
        let message = errors
            .first()
            .map_or_else(|| "GraphQL errors".to_string(), |e| e.message.clone());
        Some(ClientError::new(ErrorCode::ExecutionError, message).with_extension("errors", errors))
    }

    /// Returns the data, or an error if the envelope carries errors or no data.
    pub fn into_data(self) -> ClientResult<serde_json::Value> {
        if let Some(err) = self.error_value() {
            return Err(err);
        }
        self.data
            .ok_or_else(|| ClientError::new(ErrorCode::NoData, "No data in response"))
    }

    /// Decodes the data into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> ClientResult<T> {
        let data = self.into_data()?;
        serde_json::from_value(data).map_err(|e| ClientError::deserialize(e.to_string()))
    }
}

/// A GraphQL error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

impl GraphQLError {
    /// Creates an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}
