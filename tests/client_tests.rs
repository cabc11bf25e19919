//! End-to-end client tests against a mock verifier
//!
//! Covers:
//! - the challenge, sign, verify exchange
//! - retry on 5xx and 429, no retry on other statuses
//! - secret filtering and request hints
//! - error mapping for HTTP, decode and network failures

use std::sync::OnceLock;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use challenge_auth::client::ClientConfigBuilder;
use challenge_auth::keys::generate_key_pair;
use challenge_auth::signing::verify_signature;
use challenge_auth::{AuthClient, ClientConfig, Error, HttpErrorKind, RetryPolicy, SharedToken};

const CHALLENGE: &str = "c2lnbi1tZS1vbmNl";

fn key_pair() -> &'static (RsaPrivateKey, RsaPublicKey) {
    static KEYS: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
    KEYS.get_or_init(|| generate_key_pair(2048).unwrap())
}

fn client(
    server: &MockServer,
    configure: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
) -> AuthClient {
    let builder = ClientConfig::builder(server.uri(), "ci-runner")
        .signing_key(key_pair().0.clone())
        .retry(0, Duration::from_millis(10));
    AuthClient::new(configure(builder).build()).unwrap()
}

fn challenge_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "challenge": CHALLENGE,
        "expiresAt": 1_900_000_000,
    }))
}

/// Verifier that checks the signature against the registered public key
fn verifying_responder(request: &Request) -> ResponseTemplate {
    let body: Value = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(_) => return ResponseTemplate::new(400).set_body_json(json!({"error": "bad json"})),
    };
    let signature = body["signature"].as_str().unwrap_or_default();
    let challenge = body["challenge"].as_str().unwrap_or_default();

    match verify_signature(Some(&key_pair().1), challenge, signature) {
        Ok(()) => ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": "tok-123",
            "secretData": {"API_KEY": "k", "DB_PASSWORD": "p"},
        })),
        Err(_) => ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "Invalid signature",
        })),
    }
}

async fn mount_happy_path(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(challenge_response())
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(verifying_responder)
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}

#[tokio::test]
async fn test_full_exchange() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let session = client(&server, |b| b).authenticate().await.unwrap();

    assert_eq!(session.token, "tok-123");
    assert_eq!(session.secret_data.len(), 2);
    assert_eq!(session.secret_data["API_KEY"], "k");
    assert!(session.repo_list.is_empty());

    let requests = server.received_requests().await.unwrap();
    let challenge_body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(challenge_body, json!({"clientId": "ci-runner"}));

    let verify_body: Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(verify_body["clientId"], "ci-runner");
    assert_eq!(verify_body["challenge"], CHALLENGE);
    assert!(verify_body.get("repoUrl").is_none());
    assert!(verify_body.get("includeRepoList").is_none());
}

#[tokio::test]
async fn test_trailing_slash_is_trimmed() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let client = AuthClient::new(
        ClientConfig::builder(format!("{}/", server.uri()), "ci-runner")
            .signing_key(key_pair().0.clone())
            .build(),
    )
    .unwrap();

    assert_eq!(client.base_url(), server.uri());
    assert!(client.authenticate().await.is_ok());
}

#[tokio::test]
async fn test_secret_filter() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let session = client(&server, |b| b.secret_keys(["API_KEY", "MISSING"]))
        .authenticate()
        .await
        .unwrap();

    assert_eq!(session.secret_data.len(), 1);
    assert_eq!(session.secret_data["API_KEY"], "k");
    assert!(!session.secret_data.contains_key("MISSING"));
}

#[tokio::test]
async fn test_hints_are_sent_and_repo_list_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(challenge_response())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .and(body_partial_json(json!({
            "repoUrl": "https://git.example.com/org/repo",
            "grpcEndpoint": "rpc.example.com:443",
            "includeRepoList": true,
            "tunnelUrl": "https://tunnel.example.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": "tok",
            "secretData": {},
            "repoList": ["org/a", "org/b"],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server, |b| {
        b.repo_url("https://git.example.com/org/repo")
            .grpc_endpoint("rpc.example.com:443")
            .include_repo_list(true)
            .tunnel_url("https://tunnel.example.com")
    })
    .authenticate()
    .await
    .unwrap();

    assert_eq!(session.repo_list, vec!["org/a".to_string(), "org/b".to_string()]);
}

#[tokio::test]
async fn test_retry_restarts_from_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_happy_path(&server).await;

    let session = client(&server, |b| b.retry(2, Duration::from_millis(10)))
        .authenticate()
        .await
        .unwrap();

    assert_eq!(session.token, "tok-123");
    assert_eq!(count_requests(&server, "/challenge").await, 3);
    assert_eq!(count_requests(&server, "/verify").await, 1);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "busy"})))
        .mount(&server)
        .await;

    let err = client(&server, |b| b.retry(1, Duration::from_millis(10)))
        .authenticate()
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(count_requests(&server, "/challenge").await, 2);
}

#[tokio::test]
async fn test_verify_failure_retries_whole_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(challenge_response())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(verifying_responder)
        .mount(&server)
        .await;

    let session = client(&server, |b| b.retry(1, Duration::from_millis(10)))
        .authenticate()
        .await
        .unwrap();

    assert_eq!(session.token, "tok-123");
    assert_eq!(count_requests(&server, "/challenge").await, 2);
    assert_eq!(count_requests(&server, "/verify").await, 2);
}

#[tokio::test]
async fn test_explicit_policy_overrides_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server, |b| b.retry(3, Duration::from_millis(10)));
    let err = client.authenticate_with(&RetryPolicy::none()).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(count_requests(&server, "/challenge").await, 1);
}

#[tokio::test]
async fn test_rejected_signature_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(challenge_response())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "Challenge expired",
        })))
        .mount(&server)
        .await;

    let err = client(&server, |b| b.retry(3, Duration::from_millis(10)))
        .authenticate()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unauthorized(ref msg) if msg == "Challenge expired"));
    assert_eq!(count_requests(&server, "/challenge").await, 1);
}

#[tokio::test]
async fn test_http_status_mapping() {
    let cases = [
        (400, HttpErrorKind::BadRequest),
        (401, HttpErrorKind::Unauthorized),
        (404, HttpErrorKind::NotFound),
        (500, HttpErrorKind::InternalServer),
        (418, HttpErrorKind::Other),
    ];

    for (status, expected_kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/challenge"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"error": "Client not found"})),
            )
            .mount(&server)
            .await;

        let err = client(&server, |b| b).authenticate().await.unwrap_err();
        match err {
            Error::Http { status: got, kind, message } => {
                assert_eq!(got, status);
                assert_eq!(kind, expected_kind);
                assert_eq!(message, "Client not found");
            }
            other => panic!("unexpected error for {status}: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_non_retryable_status_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such client"))
        .mount(&server)
        .await;

    let err = client(&server, |b| b.retry(3, Duration::from_millis(10)))
        .authenticate()
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert!(err.to_string().contains("no such client"));
    assert_eq!(count_requests(&server, "/challenge").await, 1);
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = client(&server, |b| b.retry(2, Duration::from_millis(10)))
        .authenticate()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode(_)));
    assert_eq!(count_requests(&server, "/challenge").await, 1);
}

#[tokio::test]
async fn test_timeout_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(challenge_response().set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let err = client(&server, |b| b.timeout(Duration::from_millis(50)))
        .authenticate()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_connection_refused_is_retried() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AuthClient::new(
        ClientConfig::builder(format!("http://{addr}"), "ci-runner")
            .signing_key(key_pair().0.clone())
            .retry(1, Duration::from_millis(10))
            .build(),
    )
    .unwrap();

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let health = client(&server, |b| b).health().await.unwrap();
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn test_authenticate_into_publishes_token() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let token = SharedToken::new();
    let session = client(&server, |b| b).authenticate_into(&token).await.unwrap();

    assert_eq!(token.get().as_deref(), Some(session.token.as_str()));
}

#[tokio::test]
async fn test_concurrent_authentications_run_one_at_a_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/challenge"))
        .respond_with(challenge_response().set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(verifying_responder)
        .mount(&server)
        .await;

    let client = client(&server, |b| b);
    let token = SharedToken::new();
    let start = std::time::Instant::now();

    let (first, second) = tokio::join!(
        client.authenticate_into(&token),
        client.authenticate_into(&token)
    );

    first.unwrap();
    second.unwrap();
    // Overlapping exchanges would finish after roughly one challenge delay
    assert!(start.elapsed() >= Duration::from_millis(400));
    assert_eq!(count_requests(&server, "/challenge").await, 2);
}

#[test]
fn test_authenticate_blocking() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        mount_happy_path(&server).await;
        server
    });

    let session = client(&server, |b| b).authenticate_blocking().unwrap();
    assert_eq!(session.token, "tok-123");
}
