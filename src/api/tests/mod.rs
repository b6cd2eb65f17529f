use super::*;
use crate::test_helpers::{FakeProvider, fast_config};
use crate::types::SessionId;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tower::ServiceExt;


/// Orchestrator over a fake provider, tuned for fast tests
fn create_test_orchestrator(provider: FakeProvider) -> Arc<BatchOrchestrator> {
    Arc::new(BatchOrchestrator::with_provider(
        fast_config(),
        Arc::new(provider),
    ))
}

fn router_for(orchestrator: &Arc<BatchOrchestrator>) -> Router {
    create_router(
        Arc::clone(orchestrator),
        Arc::new(orchestrator.config().clone()),
    )
}

async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Submit through the orchestrator and wait until the batch has completed
async fn completed_batch(orchestrator: &BatchOrchestrator, zips: &[&str]) -> SessionId {
    let keys: Vec<String> = zips.iter().map(|z| z.to_string()).collect();
    let id = orchestrator.submit("test-key", &keys).await.unwrap();
    let mut subscription = orchestrator.stream_progress(id).await.unwrap();
    while subscription.next_event().await.is_some() {}
    id
}

#[tokio::test]
async fn test_api_server_spawns_and_stops_on_shutdown() {
    let orchestrator = create_test_orchestrator(FakeProvider::new());

    let mut config = orchestrator.config().clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { start_api_server(orchestrator, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let orchestrator = create_test_orchestrator(FakeProvider::new());
    let app = router_for(&orchestrator);

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let orchestrator = create_test_orchestrator(FakeProvider::new());
    let mut config = orchestrator.config().clone();
    config.api.cors_enabled = false;
    let app = create_router(Arc::clone(&orchestrator), Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let orchestrator = create_test_orchestrator(FakeProvider::new());
    let app = router_for(&orchestrator);

    let response = get(&app, "/api/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
