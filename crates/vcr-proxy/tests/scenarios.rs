//! Handler-level scenario tests (§8): a full proxy router in front of an
//! in-process mock upstream, driven end-to-end with `reqwest`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use tempfile::tempdir;
use vcr_proxy::config::AppConfig;
use vcr_proxy::state::AppState;

/// Spawns a mock upstream that always returns 201 with a fixed body, and
/// counts how many times it was actually called.
async fn spawn_mock_upstream() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app_calls = calls.clone();

    let app = Router::new().route(
        "/api/v1/users",
        post(move |State(calls): State<Arc<AtomicUsize>>, Json(_body): Json<Value>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (axum::http::StatusCode::CREATED, Json(json!({ "id": 1, "status": "created" })))
            }
        }),
    )
    .with_state(app_calls);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), calls)
}

fn test_state(mode: &str, target: &str, overwrite: bool) -> (AppState, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let mut config = AppConfig::default();
    config.mode = mode.to_string();
    config.cassettes.dir = dir.path().to_string_lossy().to_string();
    config.cassettes.overwrite = overwrite;
    config.targets.insert("/".to_string(), target.to_string());
    (AppState::new(config), dir)
}

async fn spawn_proxy(state: AppState) -> String {
    let app = vcr_proxy::server::build_proxy_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn spy_mode_cold_then_warm() {
    let (upstream_url, calls) = spawn_mock_upstream().await;
    let (state, _dir) = test_state("spy", &upstream_url, false);
    let mode = state.mode.clone();
    let proxy_url = spawn_proxy(state).await;

    let client = reqwest::Client::new();
    let body = json!({ "name": "Alice" });

    let first = client.post(format!("{proxy_url}/api/v1/users")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 201);

    let second = client.post(format!("{proxy_url}/api/v1/users")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 201);

    assert_eq!(calls.load(Ordering::SeqCst), 1, "upstream should only be called once");
    let counters = mode.counters();
    assert_eq!((counters.hits, counters.misses, counters.recorded), (1, 1, 1));
}

#[tokio::test]
async fn body_sensitivity_creates_distinct_cassettes() {
    let (upstream_url, calls) = spawn_mock_upstream().await;
    let (state, dir) = test_state("spy", &upstream_url, false);
    let proxy_url = spawn_proxy(state).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Bob" }))
        .send()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let entries = std::fs::read_dir(dir.path().join("127.0.0.1"))
        .map(|rd| rd.count())
        .unwrap_or(0);
    assert_eq!(entries, 2, "two distinct bodies should produce two cassette files");
}

#[tokio::test]
async fn json_key_order_does_not_affect_matching() {
    let (upstream_url, calls) = spawn_mock_upstream().await;
    let (state, _dir) = test_state("spy", &upstream_url, false);
    let proxy_url = spawn_proxy(state).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{proxy_url}/api/v1/users"))
        .body(r#"{"a":1,"b":2}"#)
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();
    client
        .post(format!("{proxy_url}/api/v1/users"))
        .body(r#"{"b":2,"a":1}"#)
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "reordered keys must hit the same cassette");
}

#[tokio::test]
async fn replay_miss_returns_404_with_fingerprint() {
    let (upstream_url, _calls) = spawn_mock_upstream().await;
    let (state, _dir) = test_state("replay", &upstream_url, false);
    let proxy_url = spawn_proxy(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "cassette_miss");
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
}

/// A mock upstream that waits `delay_ms` before responding, so concurrent
/// callers can be made to overlap deterministically.
async fn spawn_slow_mock_upstream(delay_ms: u64) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app_calls = calls.clone();

    let app = Router::new().route(
        "/api/v1/users",
        post(move |State(calls): State<Arc<AtomicUsize>>, Json(_body): Json<Value>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                (axum::http::StatusCode::CREATED, Json(json!({ "id": 1, "status": "created" })))
            }
        }),
    )
    .with_state(app_calls);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), calls)
}

#[tokio::test]
async fn ignored_body_field_does_not_affect_matching() {
    let (upstream_url, calls) = spawn_mock_upstream().await;
    let (state, dir) = test_state("spy", &upstream_url, false);
    let proxy_url = spawn_proxy(state).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Alice", "request_id": "r1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The route config was auto-created on that first record (§4.3); edit it
    // to ignore `request_id` for matching purposes, bumping its mtime so the
    // store picks up the change.
    let route_path = dir.path().join("_routes/127.0.0.1/POST__api_v1_users.yaml");
    assert!(route_path.exists(), "route config should have been auto-created on first record");
    std::thread::sleep(std::time::Duration::from_millis(50));
    std::fs::write(
        &route_path,
        "route:\n  method: POST\n  path: /api/v1/users\nignore:\n  body_fields:\n    - \"$.request_id\"\n",
    )
    .unwrap();

    client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Alice", "request_id": "r2" }))
        .send()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "differing only in an ignored field must reuse the cassette");
}

#[tokio::test]
async fn concurrent_identical_requests_trigger_one_upstream_call() {
    let (upstream_url, calls) = spawn_slow_mock_upstream(50).await;
    let (state, dir) = test_state("spy", &upstream_url, false);
    let proxy_url = spawn_proxy(state).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let proxy_url = proxy_url.clone();
        handles.push(tokio::spawn(async move {
            reqwest::Client::new()
                .post(format!("{proxy_url}/api/v1/users"))
                .json(&json!({ "name": "Alice" }))
                .send()
                .await
                .unwrap()
        }));
    }

    let mut bodies = Vec::new();
    for h in handles {
        let response = h.await.unwrap();
        assert_eq!(response.status(), 201);
        bodies.push(response.json::<Value>().await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "8 concurrent identical requests should hit upstream once");
    assert!(bodies.iter().all(|b| *b == bodies[0]), "every caller should see the same response");

    let entries = std::fs::read_dir(dir.path().join("127.0.0.1"))
        .map(|rd| rd.filter(|e| e.as_ref().map(|e| e.path().is_file()).unwrap_or(false)).count())
        .unwrap_or(0);
    assert_eq!(entries, 1, "exactly one cassette file should have been written");
}

#[tokio::test]
async fn runtime_mode_switch_is_observed_by_next_request() {
    let (upstream_url, calls) = spawn_mock_upstream().await;
    let (state, _dir) = test_state("record", &upstream_url, false);
    let mode = state.mode.clone();
    let proxy_url = spawn_proxy(state).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    mode.set_mode(vcr_cassette::Mode::Replay);

    let replayed = client
        .post(format!("{proxy_url}/api/v1/users"))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(replayed.status(), 201);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "replay mode must not call upstream again");
}
