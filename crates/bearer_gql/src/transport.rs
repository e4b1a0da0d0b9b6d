//! GraphQL-over-HTTP transport.
//!
//! [`HttpTransport`] speaks plain HTTP/1.1 over tokio sockets. `https://`
//! endpoints go through the reqwest-backed transport (feature `reqwest`,
//! on by default); [`default_transport`] picks one from the endpoint URL.
//! Neither holds per-call state: the `Authorization` header travels inside
//! each [`Request`].

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorCode};
use crate::request::{Request, Response, AUTHORIZATION};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sends GraphQL requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns the decoded envelope.
    ///
    /// A GraphQL error envelope is `Ok`; only failures to obtain an envelope
    /// are `Err`.
    async fn send(&self, request: Request) -> ClientResult<Response>;
}

/// HTTP transport over plain TCP sockets.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    timeout: Duration,
    headers: FxHashMap<String, String>,
}

impl HttpTransport {
    /// Creates a transport from the client configuration.
    pub fn new(config: &ClientConfig) -> Self {
        let headers = config
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(AUTHORIZATION))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            url: config.url.clone(),
            timeout: config.timeout,
            headers,
        }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(
        &self,
        body: &str,
        headers: &FxHashMap<String, String>,
    ) -> ClientResult<HttpReply> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;
        use tokio::time::timeout;

        let target = parse_url(&self.url)?;
        for (key, value) in headers {
            check_header(key, value)?;
        }

        let connect_future = TcpStream::connect(format!("{}:{}", target.host, target.port));
        let mut stream = timeout(self.timeout, connect_future)
            .await
            .map_err(|_| ClientError::timeout())?
            .map_err(|e| {
                ClientError::new(
                    ErrorCode::ConnectionRefused,
                    format!("Connection failed: {e}"),
                )
            })?;

        let mut request = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Content-Type: application/json\r\n\
             Accept: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n",
            target.path,
            target.host_header(),
            body.len()
        );
        for (key, value) in headers {
            request.push_str(&format!("{key}: {value}\r\n"));
        }
        request.push_str("\r\n");
        request.push_str(body);

        timeout(self.timeout, stream.write_all(request.as_bytes()))
            .await
            .map_err(|_| ClientError::timeout())?
            .map_err(|e| ClientError::network(format!("Write failed: {e}")))?;

        let mut response_bytes = Vec::new();
        timeout(self.timeout, stream.read_to_end(&mut response_bytes))
            .await
            .map_err(|_| ClientError::timeout())?
            .map_err(|e| ClientError::network(format!("Read failed: {e}")))?;

        parse_http_response(&response_bytes)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> ClientResult<Response> {
        let mut headers = self.headers.clone();
        for (k, v) in &request.headers {
            headers.insert(k.clone(), v.clone());
        }

        let body =
            serde_json::to_string(&request).map_err(|e| ClientError::serialize(e.to_string()))?;

        debug!(
            url = %self.url,
            authorized = request.authorization().is_some(),
            "Sending GraphQL request: {}",
            request.query.chars().take(100).collect::<String>()
        );

        let reply = self.post(&body, &headers).await?;
        decode_reply(&reply)
    }
}

/// Picks the transport for `config.url`.
///
/// `https://` endpoints need the `reqwest` feature; without it they are
/// handed to [`HttpTransport`], which reports `HttpsNotSupported` on send.
pub fn default_transport(config: &ClientConfig) -> ClientResult<Arc<dyn Transport>> {
    #[cfg(feature = "reqwest")]
    {
        if is_https(&config.url) {
            let transport = crate::reqwest_transport::ReqwestTransport::new(config)?;
            return Ok(Arc::new(transport));
        }
    }
    Ok(Arc::new(HttpTransport::new(config)))
}

fn is_https(url: &str) -> bool {
    url.trim()
        .get(..8)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
}

/// Rejects header lines that would split the request.
pub(crate) fn check_header(name: &str, value: &str) -> ClientResult<()> {
    let breaks = |s: &str| s.contains(['\r', '\n']);
    if name.is_empty() || breaks(name) || breaks(value) {
        return Err(ClientError::new(
            ErrorCode::InvalidHeader,
            format!("Header {name:?} contains a line break"),
        ));
    }
    Ok(())
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HttpReply {
    pub(crate) status: u16,
    pub(crate) body: String,
}

/// Turns an HTTP reply into a GraphQL envelope.
///
/// Non-2xx replies whose body is still a GraphQL envelope with `errors` are
/// returned as that envelope so error-driven refresh sees them.
pub(crate) fn decode_reply(reply: &HttpReply) -> ClientResult<Response> {
    let parsed = serde_json::from_str::<Response>(&reply.body);
    let preview = || reply.body.chars().take(200).collect::<String>();

    if (200..300).contains(&reply.status) {
        return parsed.map_err(|e| {
            ClientError::parse(format!("Failed to parse response: {e}. Body: {}", preview()))
        });
    }

    match parsed {
        Ok(response) if response.has_errors() => Ok(response),
        _ => Err(ClientError::new(
            ErrorCode::HttpError,
            format!("HTTP error: {}", reply.status),
        )
        .with_extension("status", reply.status)
        .with_extension("body", preview())),
    }
}

/// Host, port and path of an endpoint URL.
#[derive(Debug, Clone, PartialEq)]
struct Target {
    host: String,
    port: u16,
    path: String,
}

impl Target {
    fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parses an endpoint URL.
fn parse_url(url: &str) -> ClientResult<Target> {
    let url = url.trim();

    let without_protocol = if is_https(url) {
        return Err(ClientError::new(
            ErrorCode::HttpsNotSupported,
            "HTTPS needs the reqwest transport (enable the `reqwest` feature).",
        ));
    } else if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else {
        url
    };

    let (host_port, path) = match without_protocol.find('/') {
        Some(slash_pos) => (
            &without_protocol[..slash_pos],
            &without_protocol[slash_pos..],
        ),
        None => (without_protocol, "/"),
    };

    if host_port.is_empty() {
        return Err(ClientError::new(
            ErrorCode::InvalidUrl,
            format!("Missing host in URL: {url}"),
        ));
    }

    let (host, port) = match host_port.rfind(':') {
        Some(colon_pos) => {
            let port_str = &host_port[colon_pos + 1..];
            let port = port_str.parse().map_err(|_| {
                ClientError::new(ErrorCode::InvalidUrl, format!("Invalid port: {port_str}"))
            })?;
            (host_port[..colon_pos].to_string(), port)
        }
        None => (host_port.to_string(), 80),
    };

    Ok(Target {
        host,
        port,
        path: path.to_string(),
    })
}

/// Parses a raw HTTP response into status and body.
fn parse_http_response(response: &[u8]) -> ClientResult<HttpReply> {
    let (head_end, sep_len) = find(response, b"\r\n\r\n")
        .map(|i| (i, 4))
        .or_else(|| find(response, b"\n\n").map(|i| (i, 2)))
        .ok_or_else(|| {
            ClientError::new(ErrorCode::InvalidResponse, "Could not find response body")
        })?;

    let head = String::from_utf8_lossy(&response[..head_end]);
    let mut lines = head.lines();

    let status_line = lines
        .next()
        .ok_or_else(|| ClientError::new(ErrorCode::InvalidResponse, "Empty response"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            ClientError::new(
                ErrorCode::InvalidResponse,
                format!("Invalid status line: {status_line}"),
            )
        })?;

    let chunked = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.to_ascii_lowercase().contains("chunked")
        })
    });

    let raw_body = &response[head_end + sep_len..];
    let body = if chunked {
        parse_chunked_body(raw_body)
    } else {
        raw_body.to_vec()
    };

    Ok(HttpReply {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Decodes a chunked transfer encoding body.
fn parse_chunked_body(mut remaining: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();

    while let Some(size_end) = find(remaining, b"\n") {
        let size_line = String::from_utf8_lossy(&remaining[..size_end]);
        // Chunk extensions follow a ';'.
        let size_str = size_line.trim().split(';').next().unwrap_or("").trim();
        let chunk_size = usize::from_str_radix(size_str, 16).unwrap_or(0);
        if chunk_size == 0 {
            break;
        }

        let data_start = size_end + 1;
        if data_start + chunk_size > remaining.len() {
            result.extend_from_slice(&remaining[data_start..]);
            break;
        }

        result.extend_from_slice(&remaining[data_start..data_start + chunk_size]);
        remaining = &remaining[data_start + chunk_size..];

        if remaining.starts_with(b"\r\n") {
            remaining = &remaining[2..];
        } else if remaining.starts_with(b"\n") {
            remaining = &remaining[1..];
        }
    }

    result
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let target = parse_url("http://localhost:4000/graphql").unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, 4000);
        assert_eq!(target.path, "/graphql");
        assert_eq!(target.host_header(), "localhost:4000");

        let target = parse_url("http://example.com/wp/graphql").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);
        assert_eq!(target.path, "/wp/graphql");
        assert_eq!(target.host_header(), "example.com");

        let target = parse_url("example.com").unwrap();
        assert_eq!(target.path, "/");
    }

    #[test]
    fn test_parse_url_rejects_https_and_bad_port() {
        let err = parse_url("https://example.com/graphql").unwrap_err();
        assert_eq!(err.code, ErrorCode::HttpsNotSupported);

        let err = parse_url("http://example.com:abc/graphql").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUrl);

        let err = parse_url("http:///graphql").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUrl);
    }

    #[test]
    fn test_parse_http_response() {
        let response = b"HTTP/1.1 200 OK\r\n\
                         Content-Type: application/json\r\n\
                         \r\n\
                         {\"data\":{\"hello\":\"world\"}}";
        let reply = parse_http_response(response).unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "{\"data\":{\"hello\":\"world\"}}");
    }

    #[test]
    fn test_parse_chunked_response() {
        let response = b"HTTP/1.1 200 OK\r\n\
                         transfer-encoding: chunked\r\n\
                         \r\n\
                         5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n";
        let reply = parse_http_response(response).unwrap();
        assert_eq!(reply.body, "helloworld");
    }

    #[test]
    fn test_parse_invalid_response() {
        let err = parse_http_response(b"garbage").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidResponse);

        let err = parse_http_response(b"HTTP/1.1 OK\r\n\r\n{}").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidResponse);
    }

    #[test]
    fn test_decode_reply_keeps_error_envelope_on_4xx() {
        let reply = HttpReply {
            status: 403,
            body: r#"{"errors":[{"message":"Expired token"}]}"#.to_string(),
        };
        let response = decode_reply(&reply).unwrap();
        assert!(response.has_errors());
    }

    #[test]
    fn test_decode_reply_http_error() {
        let reply = HttpReply {
            status: 502,
            body: "<html>Bad Gateway</html>".to_string(),
        };
        let err = decode_reply(&reply).unwrap_err();
        assert_eq!(err.code, ErrorCode::HttpError);

        let reply = HttpReply {
            status: 200,
            body: "not json".to_string(),
        };
        let err = decode_reply(&reply).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_default_authorization_header_is_dropped() {
        let config = ClientConfig::new("http://localhost/graphql")
            .header("authorization", "Bearer stale")
            .header("X-Client", "test");
        let transport = HttpTransport::new(&config);

        assert!(!transport.headers.contains_key("authorization"));
        assert!(transport.headers.contains_key("X-Client"));
        assert_eq!(transport.url(), "http://localhost/graphql");
    }

    #[test]
    fn test_check_header_rejects_line_breaks() {
        assert!(check_header("X-Client", "cli").is_ok());

        let err = check_header("X-Client", "cli\r\nX-Injected: 1").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidHeader);
        assert!(check_header("X-Bad\n", "v").is_err());
        assert!(check_header("", "v").is_err());
    }

    #[tokio::test]
    async fn test_send_rejects_injected_header_before_connecting() {
        let transport = HttpTransport::new(&ClientConfig::new("http://127.0.0.1:9/graphql"));
        let mut request = Request::new("{ viewer { id } }");
        request
            .headers
            .insert(AUTHORIZATION.to_string(), "Bearer a\r\nX-Injected: 1".to_string());

        let err = transport.send(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidHeader);
    }

    #[test]
    fn test_is_https() {
        assert!(is_https("https://cms.example.com/graphql"));
        assert!(is_https("  HTTPS://cms.example.com/graphql"));
        assert!(!is_https("http://cms.example.com/graphql"));
        assert!(!is_https("cms"));
    }

    #[cfg(feature = "reqwest")]
    #[tokio::test]
    async fn test_default_transport_handles_https() {
        let config = ClientConfig::new("https://127.0.0.1:1/graphql")
            .timeout(Duration::from_secs(5));
        let transport = default_transport(&config).unwrap();

        let err = transport
            .send(Request::new("{ viewer { id } }"))
            .await
            .unwrap_err();
        assert_ne!(err.code, ErrorCode::HttpsNotSupported);
        assert!(err.is_transport());
    }
}
