//! Integration tests for the fetch strategies over the HTTP transport.

use bearer_gql::{
    ClientConfig, CookieJarStore, ErrorCode, Fetcher, FixedClock, MemoryTokenStore, QueryCache,
    RequestDescriptor, StaticCredentials, TokenStore,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POSTS: &str = "query Posts { posts { nodes { id title } } }";

fn fetcher(tokens: Arc<dyn TokenStore>, config: ClientConfig) -> Fetcher {
    Fetcher::builder(config)
        .token_store(tokens)
        .credentials(Arc::new(StaticCredentials::new("editor", "secret")))
        .build()
        .unwrap()
}

fn endpoint(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/graphql", server.uri()))
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "operationName": "GetToken",
            "variables": {"username": "editor", "password": "secret"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"login": {"authToken": token}}})),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer abc"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({"query": POSTS})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"posts": {"nodes": [{"id": "1", "title": "Hello"}]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(CookieJarStore::new(dir.path().join("cookies.json"), "wpt"));
    tokens.set("abc").unwrap();
    let fetcher = fetcher(tokens, endpoint(&server));

    let data = fetcher
        .fetch_data(&RequestDescriptor::new(POSTS).with_token())
        .await
        .unwrap()
        .into_data()
        .unwrap();

    assert_eq!(data["posts"]["nodes"][0]["title"], "Hello");
}

#[tokio::test]
async fn test_fetch_without_token_sends_no_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"posts": {"nodes": []}}})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(CookieJarStore::new(dir.path().join("cookies.json"), "wpt"));
    tokens.set("abc").unwrap();
    let fetcher = fetcher(tokens, endpoint(&server));

    fetcher
        .fetch_data(&RequestDescriptor::new(POSTS))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried() {
    let server = MockServer::start().await;

    // Expired tokens come back as 403 with a GraphQL error envelope.
    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": [{"message": "Expired token"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"posts": {"nodes": []}}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_login(&server, "fresh").await;

    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("cookies.json");
    let tokens = Arc::new(CookieJarStore::new(&jar, "wpt"));
    tokens.set("stale").unwrap();
    let fetcher = fetcher(tokens, endpoint(&server));

    let response = fetcher
        .fetch_data(&RequestDescriptor::new(POSTS).with_token())
        .await
        .unwrap();

    assert!(!response.has_errors());
    let reopened = CookieJarStore::new(&jar, "wpt");
    assert_eq!(reopened.retrieve().unwrap().as_deref(), Some("fresh"));

    let login = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| String::from_utf8_lossy(&r.body).contains("GetToken"))
        .unwrap();
    assert!(login.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_single_attempt_returns_original_error_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Expired token"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_login(&server, "fresh").await;

    let tokens = Arc::new(MemoryTokenStore::with_token("stale"));
    let fetcher = fetcher(tokens.clone(), endpoint(&server).auth_attempts(1));

    let response = fetcher
        .fetch_data(&RequestDescriptor::new(POSTS).with_token())
        .await
        .unwrap();

    assert_eq!(response.errors.unwrap()[0].message, "Expired token");
    assert_eq!(tokens.retrieve().unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let fetcher = fetcher(tokens, endpoint(&server));

    let err = fetcher
        .fetch_data(&RequestDescriptor::new(POSTS))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::HttpError);
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_static_fetch_keeps_past_token_with_exact_check() {
    let server = MockServer::start().await;
    let expiration = 1_700_000_000_i64;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"operationName": "UserExpiredToken"})))
        .and(header("authorization", "Bearer known"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"jwtAuthExpiration": expiration.to_string()}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .and(header("authorization", "Bearer known"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"posts": {"nodes": []}}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::builder(endpoint(&server))
        .credentials(Arc::new(StaticCredentials::new("editor", "secret")))
        .clock(Arc::new(FixedClock::new(expiration * 1000 + 86_400_000)))
        .build()
        .unwrap();

    let response = fetcher
        .fetch_static(&RequestDescriptor::new(POSTS).with_token(), "known")
        .await
        .unwrap();

    assert!(!response.has_errors());
}

#[tokio::test]
async fn test_reactive_query_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"posts": {"nodes": [{"id": "7"}]}}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let cache = QueryCache::new(Arc::new(fetcher(tokens, endpoint(&server))));

    let mut first = cache.query(RequestDescriptor::new(POSTS));
    let mut second = cache.query(RequestDescriptor::new(POSTS));

    let state = first.settled().await;
    assert_eq!(state.data.unwrap()["posts"]["nodes"][0]["id"], "7");
    assert!(!second.settled().await.is_loading());
}

#[cfg(feature = "reqwest")]
#[tokio::test]
async fn test_reqwest_transport_refreshes_and_retries() {
    use bearer_gql::ReqwestTransport;

    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": [{"message": "Expired token"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("posts"))
        .and(header("authorization", "Bearer fresh"))
        .and(header("x-client", "integration"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"posts": {"nodes": []}}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_login(&server, "fresh").await;

    let config = endpoint(&server).header("X-Client", "integration");
    let transport = Arc::new(ReqwestTransport::new(&config).unwrap());
    let tokens = Arc::new(MemoryTokenStore::with_token("stale"));
    let fetcher = Fetcher::builder(config)
        .transport(transport)
        .token_store(tokens.clone())
        .credentials(Arc::new(StaticCredentials::new("editor", "secret")))
        .build()
        .unwrap();

    let data = fetcher
        .fetch_data(&RequestDescriptor::new(POSTS).with_token())
        .await
        .unwrap()
        .into_data()
        .unwrap();

    assert_eq!(data, json!({"posts": {"nodes": []}}));
    assert_eq!(tokens.retrieve().unwrap().as_deref(), Some("fresh"));
}

#[cfg(feature = "reqwest")]
#[tokio::test]
async fn test_reqwest_transport_reports_http_errors() {
    use bearer_gql::{ReqwestTransport, Request, Transport};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&endpoint(&server)).unwrap();
    let err = transport
        .send(Request::new("{ viewer { id } }"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::HttpError);
}
