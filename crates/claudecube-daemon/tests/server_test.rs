//! HTTP ingress: routing, response envelopes, and the status endpoint.
//!
//! Per-session event ordering is not enforced here: the hook bridge runs
//! one hook at a time within an agent run, so requests for a given session
//! arrive serially. These tests drive one request at a time accordingly.

mod common;

use common::{build_harness, HarnessOptions};
use serde_json::{json, Value};
use tower::ServiceExt;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use claudecube_daemon::server::router;

async fn collect_body(body: Body) -> Value {
    use http_body_util::BodyExt;
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn pre_tool_use_endpoint_allows_read() {
    let h = build_harness(HarnessOptions::default());
    let app = router(h.state.clone());

    let response = app
        .oneshot(post(
            "/hooks/PreToolUse",
            json!({
                "hook_event_name": "PreToolUse",
                "tool_name": "Read",
                "tool_input": {"file_path": "/x"},
                "session_id": "s1",
                "cwd": "/p",
                "transcript_path": "/t"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = collect_body(response.into_body()).await;
    assert_eq!(
        body["hookSpecificOutput"]["permissionDecision"],
        "allow"
    );
    assert_eq!(
        body["hookSpecificOutput"]["permissionDecisionReason"],
        "Allowed by rule: Allow read-only tools"
    );
}

#[tokio::test]
async fn stop_endpoint_returns_empty_object_on_loop_guard() {
    let h = build_harness(HarnessOptions::default());
    let app = router(h.state.clone());

    let response = app
        .oneshot(post(
            "/hooks/Stop",
            json!({
                "session_id": "s1",
                "cwd": "/p",
                "stop_hook_active": true,
                "last_assistant_message": "Error: x"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = collect_body(response.into_body()).await;
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn lifecycle_endpoints_return_empty_objects() {
    let h = build_harness(HarnessOptions::default());

    for event in ["SessionStart", "Notification", "SessionEnd"] {
        let app = router(h.state.clone());
        let response = app
            .oneshot(post(
                &format!("/hooks/{event}"),
                json!({"session_id": "s1", "cwd": "/p"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = collect_body(response.into_body()).await;
        assert_eq!(body, json!({}), "{event} should return {{}}");
    }
    // SessionEnd deregistered the session.
    assert!(h.registry.get_all().is_empty());
}

#[tokio::test]
async fn status_reports_sessions_and_count() {
    let h = build_harness(HarnessOptions::default());
    h.registry.register("s1", "/proj", None);

    let app = router(h.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = collect_body(response.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["sessions"][0]["sessionId"], "s1");
    assert_eq!(body["sessions"][0]["label"], "testproj");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = build_harness(HarnessOptions::default());
    let app = router(h.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = collect_body(response.into_body()).await;
    assert_eq!(body, json!({"error": "Not found"}));
}

#[tokio::test]
async fn unknown_hook_event_is_404() {
    let h = build_harness(HarnessOptions::default());
    let app = router(h.state.clone());
    let response = app
        .oneshot(post("/hooks/PostToolUse", json!({"session_id": "s1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_500_with_error() {
    let h = build_harness(HarnessOptions::default());
    let app = router(h.state.clone());

    // Valid JSON, wrong shape: tool_name missing.
    let response = app
        .oneshot(post("/hooks/PreToolUse", json!({"session_id": "s1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = collect_body(response.into_body()).await;
    assert!(body["error"].is_string());
}
