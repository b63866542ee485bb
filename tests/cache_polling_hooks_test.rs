//! Cache, polling and hook behavior against a mock server.

use async_trait::async_trait;
use reqkit::cache::cache_key;
use reqkit::prelude::*;
use reqkit::ResponseCache;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, config: RequestOptions) -> Client {
    Client::builder()
        .config(config.with_base_url(server.uri()))
        .cache(ResponseCache::new())
        .build()
}

#[tokio::test]
async fn test_cache_hit_then_single_revalidation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"v": 1})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(
        &mock_server,
        RequestOptions::new()
            .with_cache(true)
            .with_revalidate_cache(Duration::from_millis(50)),
    );

    let first = client.get("/cached", RequestOptions::new()).await.unwrap();
    for _ in 0..3 {
        let again = client.get("/cached", RequestOptions::new()).await.unwrap();
        assert_eq!(again.data(), first.data());
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    mock_server.verify().await;

    let key = cache_key(&Method::GET, &format!("{}/cached", mock_server.uri()));
    assert!(client.cache().contains(&key));
}

#[tokio::test]
async fn test_failed_revalidation_keeps_stale_entry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"v": "fresh"})))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stale"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = client_for(
        &mock_server,
        RequestOptions::new()
            .with_cache(true)
            .with_map_errors(true)
            .with_revalidate_cache(Duration::from_millis(10)),
    );

    client.get("/stale", RequestOptions::new()).await.unwrap();
    client.get("/stale", RequestOptions::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let cached = client.get("/stale", RequestOptions::new()).await.unwrap();
    assert_eq!(cached.data(), Some(json!({"v": "fresh"})));
    assert!(cached.error().is_none());
}

#[tokio::test]
async fn test_shared_cache_is_keyed_by_url_only() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"who": "first"})))
        .mount(&mock_server)
        .await;

    let cache = ResponseCache::new();
    let build = |token: &str| {
        Client::builder()
            .config(
                RequestOptions::new()
                    .with_base_url(mock_server.uri())
                    .with_bearer_token(token)
                    .with_cache(true)
                    .with_revalidate_cache(Duration::from_secs(60)),
            )
            .cache(cache.clone())
            .build()
    };
    let a = build("a");
    let b = build("b");

    a.get("/shared", RequestOptions::new()).await.unwrap();
    let from_b = b.get("/shared", RequestOptions::new()).await.unwrap();
    assert_eq!(from_b.data(), Some(json!({"who": "first"})));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_hooks_rewrite_request_and_map_error() {
    struct Hooks;

    #[async_trait]
    impl RequestHooks for Hooks {
        async fn on_request(
            &self,
            ctx: &mut RequestContext,
        ) -> Result<Option<ContextPatch>, FetchError> {
            ctx.set_headers([("X-Trace", ctx.request_id().to_string())]);
            Ok(Some(ContextPatch::new().header("X-Tenant", "acme")))
        }

        async fn on_error(
            &self,
            ctx: &mut RequestContext,
        ) -> Result<Option<ContextPatch>, FetchError> {
            let status = ctx.error().map(|e| e.status);
            Ok(status.map(|s| ContextPatch::new().error(RequestError::new("Try again later", s))))
        }
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tenant"))
        .and(header("X-Tenant", "acme"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let handle = client_for(
        &mock_server,
        RequestOptions::new().with_hooks(Hooks).with_map_errors(true),
    )
    .get("/tenant", RequestOptions::new())
    .await
    .unwrap();

    let err = handle.error().unwrap();
    assert_eq!(err.message, "Try again later");
    assert_eq!(err.status, reqkit::ErrorStatus::Http(503));

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests[0].headers.contains_key("x-trace"));
}

#[tokio::test]
async fn test_polling_refreshes_result_in_place() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "pending"})))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "done"})))
        .mount(&mock_server)
        .await;

    let handle = client_for(&mock_server, RequestOptions::new())
        .get("/status", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(handle.data(), Some(json!({"state": "pending"})));

    let ticks = Arc::new(AtomicUsize::new(0));
    let seen = ticks.clone();
    handle.on_poll_data_received(move |result| {
        assert_eq!(result.data, Some(json!({"state": "done"})));
        seen.fetch_add(1, Ordering::SeqCst);
    });
    handle.start_polling(Some(Duration::from_millis(20)));
    assert!(handle.is_polling());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop_polling();
    handle.stop_polling();

    assert!(ticks.load(Ordering::SeqCst) >= 1);
    assert_eq!(handle.data(), Some(json!({"state": "done"})));
    assert!(!handle.is_polling());
}

#[tokio::test]
async fn test_stream_to_string_reads_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/text"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
        .mount(&mock_server)
        .await;

    let handle = client_for(&mock_server, RequestOptions::new())
        .get("/text", RequestOptions::new())
        .await
        .unwrap();

    // not JSON: data is empty but the body is still available
    assert!(handle.data().is_none());
    assert!(handle.error().is_none());
    assert_eq!(handle.stream_to_string().unwrap(), "plain text");
    assert!(matches!(
        handle.stream_to_string(),
        Err(FetchError::BodyAlreadyRead)
    ));
}
