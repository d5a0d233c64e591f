//! Integration tests for `FetchClient` and `Paginator`.
//!
//! Every test stands up a local `wiremock` server and runs the client on a
//! `ManualClock`, so backoff and rate-limit waits complete instantly while
//! their durations are still recorded for assertions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use grocer_scraper::{
    FetchClient, FetchFailure, FetchOutcome, Identity, IdentityPool, ManualClock, PageStop,
    PaginationConfig, Paginator, RateGovernor, RateLimitConfig, RetryPolicy,
};

const TEST_UA: &str = "grocer-test/0.1";

/// Builds a client with no request spacing and a `{max_attempts, 1s, x2}`
/// retry policy.
fn test_client(clock: &Arc<ManualClock>, max_attempts: u32) -> FetchClient {
    spaced_client(clock, max_attempts, Duration::ZERO)
}

/// Like [`test_client`] with a fixed, jitter-free gap between requests.
fn spaced_client(
    clock: &Arc<ManualClock>,
    max_attempts: u32,
    min_interval: Duration,
) -> FetchClient {
    let rate = RateLimitConfig {
        min_interval,
        jitter: false,
        ..RateLimitConfig::default()
    };
    let governor = RateGovernor::new(rate, clock.clone());
    let retry = RetryPolicy::new(max_attempts, Duration::from_millis(1_000), 2.0).unwrap();
    FetchClient::new(
        Duration::from_secs(5),
        governor,
        IdentityPool::fixed(Identity::new(TEST_UA)),
        retry,
    )
    .expect("failed to build test FetchClient")
}

fn products(ids: &[u32]) -> serde_json::Value {
    let items: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "name": format!("p{id}"), "price": 10}))
        .collect();
    json!({ "products": items })
}

// ---------------------------------------------------------------------------
// Retry and classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limited_then_ok_yields_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/categories"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "a"}])))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 3);
    let outcome = client
        .fetch(&format!("{}/api/categories", server.uri()))
        .await;

    match outcome {
        FetchOutcome::Success(payload) => assert_eq!(payload, json!([{"name": "a"}])),
        other => panic!("expected Success, got {other:?}"),
    }
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1_000)]);
}

#[tokio::test]
async fn forbidden_is_retried_like_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 2).fetch(&server.uri()).await;

    assert!(outcome.is_success(), "expected Success, got {outcome:?}");
}

#[tokio::test]
async fn not_found_is_fatal_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/categories/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "no such category"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 3)
        .fetch(&format!("{}/api/categories/missing", server.uri()))
        .await;

    match outcome {
        FetchOutcome::FatalFailure(FetchFailure::Status {
            status, message, ..
        }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such category");
        }
        other => panic!("expected FatalFailure(Status), got {other:?}"),
    }
    assert!(clock.sleeps().is_empty(), "fatal failures must not back off");
}

#[tokio::test]
async fn server_error_with_html_body_reports_unknown_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 3).fetch(&server.uri()).await;

    match outcome {
        FetchOutcome::FatalFailure(FetchFailure::Status { status, message, .. }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "unknown error");
        }
        other => panic!("expected FatalFailure(Status), got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 3).fetch(&server.uri()).await;

    assert!(
        matches!(outcome, FetchOutcome::FatalFailure(FetchFailure::InvalidJson { .. })),
        "expected InvalidJson, got {outcome:?}"
    );
}

#[tokio::test]
async fn transient_failures_exhaust_after_three_attempts_with_doubling_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 3).fetch(&server.uri()).await;

    assert!(
        matches!(
            outcome,
            FetchOutcome::RetryableFailure(FetchFailure::Blocked { status: 429, .. })
        ),
        "expected RetryableFailure, got {outcome:?}"
    );
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(1_000), Duration::from_millis(2_000)]
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn connection_refused_is_retried_then_surfaced() {
    // Bind and drop a listener to find a port nothing is serving on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 2)
        .fetch(&format!("http://{addr}/api/categories"))
        .await;

    assert!(
        matches!(
            outcome,
            FetchOutcome::RetryableFailure(FetchFailure::Transport { .. })
        ),
        "expected transport RetryableFailure, got {outcome:?}"
    );
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1_000)]);
}

// ---------------------------------------------------------------------------
// Request shape and rate-limit headers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sends_identity_user_agent_accept_and_static_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", TEST_UA))
        .and(header("accept", "application/json"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("x-api-key".to_string(), "secret".to_string());
    let client = test_client(&clock, 1).with_static_headers(&headers).unwrap();

    assert!(client.fetch(&server.uri()).await.is_success());
}

#[tokio::test]
async fn exhausted_budget_header_forces_cool_down_before_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "7"),
        )
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 1);

    assert!(client.fetch(&server.uri()).await.is_success());
    assert_eq!(client.governor().budget().await.remaining, 0);
    assert!(clock.sleeps().is_empty());

    assert!(client.fetch(&server.uri()).await.is_success());
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn rate_limit_headers_on_429_are_observed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-remaining", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let outcome = test_client(&clock, 2).fetch(&server.uri()).await;

    assert!(outcome.is_success());
    // Backoff of 1s, then the 60s default cool-down for the empty budget.
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(1_000), Duration::from_secs(60)]
    );
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_during_backoff_returns_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let client = FetchClient::new(
        Duration::from_secs(5),
        RateGovernor::new(
            RateLimitConfig {
                min_interval: Duration::ZERO,
                jitter: false,
                ..RateLimitConfig::default()
            },
            Arc::new(grocer_scraper::TokioClock),
        ),
        IdentityPool::fixed(Identity::new(TEST_UA)),
        RetryPolicy::new(3, Duration::from_secs(3_600), 2.0).unwrap(),
    )
    .unwrap()
    .with_cancellation(token.clone());

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = client.fetch(&server.uri()).await;

    assert!(matches!(outcome, FetchOutcome::Cancelled), "got {outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(30));
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paginate_collects_until_empty_page() {
    let server = MockServer::start().await;
    for (page, ids) in [("1", [1, 2]), ("2", [3, 4]), ("3", [5, 6])] {
        Mock::given(method("GET"))
            .and(path("/api/categories/dairy"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(products(&ids)))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/categories/dairy"))
        .and(query_param("page", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 1);
    let config = PaginationConfig::default();
    let result = Paginator::new(&client, &config)
        .paginate(&format!("{}/api/categories/dairy", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.items.len(), 6);
    assert_eq!(result.pages_fetched, 4);
    assert!(result.is_complete());
    assert!(!result.is_truncated());
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn paginate_waits_only_the_governor_interval_between_pages() {
    let server = MockServer::start().await;
    for (page, ids) in [("1", vec![1, 2]), ("2", vec![3, 4]), ("3", vec![5, 6]), ("4", vec![])] {
        Mock::given(method("GET"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(products(&ids)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let clock = Arc::new(ManualClock::new());
    let client = spaced_client(&clock, 1, Duration::from_secs(2));
    let config = PaginationConfig::default();
    let result = Paginator::new(&client, &config)
        .paginate(&format!("{}/api/categories/dairy", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.items.len(), 6);
    assert_eq!(result.pages_fetched, 4);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 3]);
}

#[tokio::test]
async fn paginate_cancelled_mid_page_keeps_earlier_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[1, 2])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(products(&[3, 4]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let client = FetchClient::new(
        Duration::from_secs(30),
        RateGovernor::new(
            RateLimitConfig {
                min_interval: Duration::ZERO,
                jitter: false,
                ..RateLimitConfig::default()
            },
            Arc::new(grocer_scraper::TokioClock),
        ),
        IdentityPool::fixed(Identity::new(TEST_UA)),
        RetryPolicy::no_retry(),
    )
    .unwrap()
    .with_cancellation(token.clone());

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let config = PaginationConfig::default();
    let result = Paginator::new(&client, &config)
        .paginate(&format!("{}/api/categories/dairy", server.uri()))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.pages_fetched, 1);
    assert!(result.is_cancelled());
    assert!(matches!(result.stop, PageStop::Cancelled { page: 2 }));
    assert!(result.failure().is_none());
}

#[tokio::test]
async fn paginate_truncates_at_max_pages_without_extra_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/categories/endless"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[1, 2])))
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 1);
    let config = PaginationConfig {
        max_pages: 2,
        ..PaginationConfig::default()
    };
    let result = Paginator::new(&client, &config)
        .paginate(&format!("{}/api/categories/endless", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.items.len(), 4);
    assert!(result.is_truncated());
    assert!(matches!(result.stop, PageStop::Truncated { max_pages: 2 }));
    assert!(result.failure().is_none());
}

#[tokio::test]
async fn paginate_keeps_earlier_pages_when_a_page_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[1, 2])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 3);
    let config = PaginationConfig::default();
    let result = Paginator::new(&client, &config)
        .paginate(&format!("{}/api/categories/dairy", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.items.len(), 2);
    assert!(!result.is_truncated());
    match &result.stop {
        PageStop::Failed {
            page, retryable, ..
        } => {
            assert_eq!(*page, 2);
            assert!(!retryable);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn paginate_preserves_existing_query_and_sends_page_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("sort", "name"))
        .and(query_param("page", "1"))
        .and(query_param("pageSize", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 1);
    let config = PaginationConfig {
        page_size_param: Some("pageSize".to_string()),
        page_size: Some(50),
        ..PaginationConfig::default()
    };
    let result = Paginator::new(&client, &config)
        .paginate(&format!("{}/api/products?sort=name&page=9", server.uri()))
        .await
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.pages_fetched, 1);
}

#[tokio::test]
async fn page_cursor_yields_pages_lazily() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[1])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products(&[])))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = test_client(&clock, 1);
    let config = PaginationConfig::default();
    let paginator = Paginator::new(&client, &config);
    let mut cursor = paginator.cursor(&server.uri()).unwrap();

    let first = cursor.next_page().await.unwrap();
    assert_eq!(first.items.len(), 1);
    assert!(first.has_more);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let second = cursor.next_page().await.unwrap();
    assert!(second.items.is_empty());
    assert!(!second.has_more);

    assert!(cursor.next_page().await.is_none());
    assert!(matches!(cursor.stop(), Some(PageStop::Exhausted)));
    assert_eq!(cursor.pages_fetched(), 2);
}
