//! Router tests for the record endpoints.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tether_engine::{ManualClock, Timestamp};
use tether_server::{app, config::Config, AppState};
use tower::ServiceExt;

const START: &str = "2024-01-01T00:00:00Z";

fn config() -> Config {
    Config::new("id".parse().unwrap(), "updatedAt".parse().unwrap())
}

fn router(config: Config) -> (Router, AppState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::parse(START).unwrap()));
    let state = AppState::with_clock(config, clock.clone());
    (app(state.clone()), state, clock)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (router, _, _) = router(config());
    let (status, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["collections"], 0);
    assert_eq!(body["serverTime"], "2024-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn root_names_the_service() {
    let (router, _, _) = router(config());
    let (status, body) = send(&router, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Tether Reference Remote");
}

#[tokio::test]
async fn post_then_pull_returns_the_stamped_record() {
    let (router, _, _) = router(config());

    let (status, stored) =
        send(&router, post("/api/todos", json!({"id": "a", "title": "milk"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["updatedAt"], "2024-01-01T00:00:00.000Z");

    let (status, body) = send(&router, get("/api/todos?after=")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"id": "a", "title": "milk", "updatedAt": "2024-01-01T00:00:00.000Z"}])
    );
}

#[tokio::test]
async fn server_clock_overrides_client_timestamps() {
    let (router, _, clock) = router(config());
    clock.advance(1_000);

    let (_, stored) = send(
        &router,
        post("/api/todos", json!({"id": "a", "updatedAt": "1999-01-01T00:00:00.000Z"})),
    )
    .await;
    assert_eq!(stored["updatedAt"], "2024-01-01T00:00:01.000Z");
}

#[tokio::test]
async fn pull_only_returns_records_after_the_watermark() {
    let (router, _, clock) = router(config());
    send(&router, post("/api/todos", json!({"id": "old"}))).await;
    clock.advance(5_000);
    send(&router, post("/api/todos", json!({"id": "new"}))).await;

    let (_, body) = send(&router, get("/api/todos?after=2024-01-01T00:00:00.000Z")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], "new");

    let (_, body) = send(&router, get("/api/todos?after=2024-01-01T00:00:05.000Z")).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn resubmitting_a_key_updates_in_place() {
    let (router, state, clock) = router(config());
    send(&router, post("/api/todos", json!({"id": "a", "done": false}))).await;
    clock.advance(10);
    send(&router, post("/api/todos", json!({"id": "a", "done": true}))).await;

    assert_eq!(state.table.count("todos"), 1);
    let (_, body) = send(&router, get("/api/todos")).await;
    assert_eq!(body[0]["done"], true);
}

#[tokio::test]
async fn keyless_submission_is_assigned_a_uuid() {
    let (router, _, _) = router(config());
    let (status, stored) = send(&router, post("/api/notes", json!({"body": "hi"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["id"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn non_object_submission_is_a_bad_request() {
    let (router, state, _) = router(config());
    let (status, body) = send(&router, post("/api/todos", json!([1, 2, 3]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("todos"));
    assert_eq!(state.table.count("todos"), 0);
}

#[tokio::test]
async fn malformed_watermark_is_a_bad_request() {
    let (router, _, _) = router(config());
    let (status, _) = send(&router, get("/api/todos?after=soon")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn envelope_wraps_pull_responses() {
    let (router, _, _) = router(config().with_read_envelope("data.items".parse().unwrap()));
    send(&router, post("/api/todos", json!({"id": "a"}))).await;

    let (_, body) = send(&router, get("/api/todos?after=")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"]["items"][0]["id"], "a");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (router, _, _) = router(config());
    let (status, body) = send(&router, post("/nowhere", json!({"id": "a"}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["details"], "/nowhere");
}
