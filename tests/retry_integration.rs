//! Integration tests for the retry executor (C2) against a mock HTTP
//! server, grounded on the teacher's own `tests/download_integration.rs`
//! wiremock style.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ingest_core::config::HttpClientConfig;
use ingest_core::download::retry::retry_with;
use ingest_core::{HttpClient, RetryPolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn retry_with_recovers_after_transient_failures() {
    let server = MockServer::start().await;
    let hits = Arc::new(AtomicUsize::new(0));

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let client = HttpClient::new(&HttpClientConfig::default()).expect("client");
    let policy = RetryPolicy::new(
        5,
        std::time::Duration::from_millis(10),
        std::time::Duration::from_millis(100),
        2.0,
    );
    let url = format!("{}/flaky", server.uri());
    let hits_clone = Arc::clone(&hits);

    let result = retry_with(&policy, "fetch_flaky", "test_source", || {
        hits_clone.fetch_add(1, Ordering::SeqCst);
        client.get_text(&url)
    })
    .await;

    assert_eq!(result.expect("should eventually succeed"), "ok");
    assert_eq!(hits.load(Ordering::SeqCst), 3, "should retry twice before succeeding");
}

#[tokio::test]
async fn retry_with_gives_up_on_permanent_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpClient::new(&HttpClientConfig::default()).expect("client");
    let policy = RetryPolicy::with_max_attempts(5);
    let url = format!("{}/missing", server.uri());

    let result = retry_with(&policy, "fetch_missing", "test_source", || client.get_text(&url)).await;

    assert!(result.is_err());
    let exhausted = result.unwrap_err();
    assert_eq!(exhausted.attempts, 1, "a 404 is permanent and should not be retried");
}
