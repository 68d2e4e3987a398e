//! Query client over HTTP: request shape, status classification and the
//! connection retry ceiling.

mod common;

use common::*;
use portalytics::backend::{HttpTransport, SearchResponse};
use portalytics::{PortalyticsError, QueryClient, RetryCeiling, RetryPolicy, SearchRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_client(base_url: &str, ceiling: RetryCeiling) -> QueryClient {
    let transport = HttpTransport::new(base_url, Duration::from_secs(5));
    QueryClient::new(Arc::new(transport), RetryPolicy::new(ceiling, Duration::ZERO))
}

#[tokio::test]
async fn test_search_posts_to_target_with_pretty_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/workspace/_search"))
        .and(query_param("pretty", "true"))
        .and(body_partial_json(json!({"size": 0, "track_total_hits": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {"total": {"value": 42, "relation": "eq"}, "hits": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = http_client(&server.uri(), RetryCeiling::Limited(0));
    assert_eq!(client.count("workspace", None).await.unwrap(), 42);
}

#[tokio::test]
async fn test_typed_hits_decode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oeh-search-analytics/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(vec![
            click("r1", "parabel", "2024-01-01T00:00:00Z"),
        ])))
        .mount(&server)
        .await;

    let client = http_client(&server.uri(), RetryCeiling::Limited(0));
    let request = SearchRequest::new().size(10);
    let response: SearchResponse<Value> = client.query(ANALYTICS, &request).await.unwrap();
    assert_eq!(response.total(), 1);
    let sources: Vec<&Value> = response.sources().collect();
    assert_eq!(sources[0]["clickedResult"]["id"], "r1");
}

#[tokio::test]
async fn test_rejected_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("parse_exception: bad query"))
        .expect(1)
        .mount(&server)
        .await;

    let client = http_client(&server.uri(), RetryCeiling::Limited(5));
    let err = client
        .query_raw(WORKSPACE, &SearchRequest::new())
        .await
        .unwrap_err();
    match err {
        PortalyticsError::Rejected { status, message, .. } => {
            assert_eq!(status, 400);
            assert!(message.contains("parse_exception"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unavailable_backend_is_retried_until_it_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(Vec::new())))
        .expect(1)
        .mount(&server)
        .await;

    let client = http_client(&server.uri(), RetryCeiling::Limited(2));
    let response: SearchResponse<Value> = client
        .query(ANALYTICS, &SearchRequest::new())
        .await
        .unwrap();
    assert_eq!(response.hits.hits.len(), 0);
}

#[tokio::test]
async fn test_unavailable_backend_exhausts_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let client = http_client(&server.uri(), RetryCeiling::Limited(2));
    let err = client
        .query_raw(ANALYTICS, &SearchRequest::new())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        PortalyticsError::RetriesExhausted { retries: 2, .. }
    ));
}

#[tokio::test]
async fn test_unreachable_host_is_a_connection_failure() {
    // Nothing listens on port 1.
    let client = http_client("http://127.0.0.1:1", RetryCeiling::Limited(1));
    let err = client
        .query_raw(ANALYTICS, &SearchRequest::new())
        .await
        .unwrap_err();
    match err {
        PortalyticsError::RetriesExhausted { retries, target, .. } => {
            assert_eq!(retries, 1);
            assert_eq!(target, ANALYTICS);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unexpected_shape_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": {"hits": "nope"}})))
        .mount(&server)
        .await;

    let client = http_client(&server.uri(), RetryCeiling::Limited(0));
    let err = client
        .query::<Value>(ANALYTICS, &SearchRequest::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PortalyticsError::Decode { .. }));
}

/// K transient failures succeed for every ceiling >= K and fail, after
/// ceiling + 1 attempts, for every ceiling < K.
#[tokio::test]
async fn test_retry_ceiling_against_k_failures() {
    const K: u32 = 3;
    for ceiling in 0..=5u32 {
        let backend = ScriptedBackend::new();
        backend.fail_next(K);
        let client = QueryClient::new(
            backend.clone(),
            RetryPolicy::new(RetryCeiling::Limited(ceiling), Duration::ZERO),
        );

        let outcome = client.query_raw(ANALYTICS, &SearchRequest::new()).await;
        if ceiling >= K {
            assert!(outcome.is_ok(), "ceiling {} should absorb {} failures", ceiling, K);
            assert_eq!(backend.request_count(ANALYTICS), K as usize + 1);
        } else {
            match outcome {
                Err(PortalyticsError::RetriesExhausted { retries, .. }) => {
                    assert_eq!(retries, ceiling)
                }
                other => panic!("ceiling {}: expected RetriesExhausted, got {:?}", ceiling, other),
            }
            assert_eq!(backend.request_count(ANALYTICS), ceiling as usize + 1);
        }
    }
}

#[tokio::test]
async fn test_unbounded_ceiling_keeps_trying() {
    let backend = ScriptedBackend::new();
    backend.fail_next(20);
    let client = QueryClient::new(
        backend.clone(),
        RetryPolicy::new(RetryCeiling::Unbounded, Duration::ZERO),
    );

    assert!(client.query_raw(ANALYTICS, &SearchRequest::new()).await.is_ok());
    assert_eq!(backend.request_count(ANALYTICS), 21);
}

#[tokio::test]
async fn test_retry_counter_resets_after_success() {
    let backend = ScriptedBackend::new();
    let client = QueryClient::new(
        backend.clone(),
        RetryPolicy::new(RetryCeiling::Limited(2), Duration::ZERO),
    );

    for _ in 0..3 {
        backend.fail_next(2);
        assert!(client.query_raw(ANALYTICS, &SearchRequest::new()).await.is_ok());
    }
    assert_eq!(backend.request_count(ANALYTICS), 9);
}
