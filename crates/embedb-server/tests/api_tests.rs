//! End-to-end API tests against a server bound to an ephemeral port.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use embedb_core::{EmbedbConfig, Engine, NoopEmbedder};
use embedb_server::{build_router, AppState};

/// Boots a server on an ephemeral port and returns its base URL.
async fn spawn_server() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let mut config = EmbedbConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.hnsw.dimension = 2;

    let server_config = config.server.clone();
    let engine = Engine::open(config, Arc::new(NoopEmbedder::new(2))).unwrap();
    let app = build_router(Arc::new(AppState { engine }), &server_config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (dir, format!("http://{addr}"))
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (_dir, base) = spawn_server().await;
    let body: Value = reqwest::get(format!("{base}/api-docs/openapi.json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["paths"]["/search"].is_object());
    assert!(body["paths"]["/documents"].is_object());
}

#[tokio::test]
async fn health_reports_online() {
    let (_dir, base) = spawn_server().await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "online");
    assert_eq!(body["records"], 0);
    assert_eq!(body["index_state"], "active");
}

#[tokio::test]
async fn upsert_search_delete_roundtrip() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    for (id, vector, title) in [
        (1, [1.0, 0.0], "alpha"),
        (2, [0.0, 1.0], "beta"),
        (3, [1.0, 1.0], "gamma"),
    ] {
        let response = client
            .post(format!("{base}/vectors"))
            .json(&json!({"id": id, "vector": vector, "payload": {"title": title}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let body: Value = client
        .post(format!("{base}/search"))
        .json(&json!({"vector": [1.0, 0.1], "top_k": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["degraded"], false);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], 1);
    assert_eq!(results[0]["payload"]["title"], "alpha");
    assert_eq!(results[1]["id"], 3);

    // Delete and verify it is gone from results immediately.
    let response = client
        .delete(format!("{base}/documents/2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let body: Value = client
        .post(format!("{base}/search"))
        .json(&json!({"vector": [0.0, 1.0], "top_k": 3}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<u64> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert!(!ids.contains(&2));
}

#[tokio::test]
async fn get_document_and_404() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/vectors"))
        .json(&json!({"id": 7, "vector": [0.5, 0.5]}))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .get(format!("{base}/documents/7"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["id"], 7);

    let response = client
        .get(format!("{base}/documents/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .delete(format!("{base}/documents/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn dimension_mismatch_is_400() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/vectors"))
        .json(&json!({"id": 1, "vector": [1.0, 0.0, 0.0]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("dimension"));
}

#[tokio::test]
async fn invalid_search_requests_are_400() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    // Neither vector nor query.
    let response = client
        .post(format!("{base}/search"))
        .json(&json!({"top_k": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // top_k of zero.
    let response = client
        .post(format!("{base}/search"))
        .json(&json!({"vector": [1.0, 0.0], "top_k": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Unknown mode.
    let response = client
        .post(format!("{base}/search"))
        .json(&json!({"vector": [1.0, 0.0], "mode": "warp"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn text_endpoints_without_adapter_are_503() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/documents"))
        .json(&json!({"id": 1, "content": "hello world"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);

    let response = client
        .post(format!("{base}/search"))
        .json(&json!({"query": "hello", "top_k": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn filtered_search_applies_payload_filter() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/vectors"))
        .json(&json!({"id": 1, "vector": [1.0, 0.0], "payload": {"lang": "rust"}}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/vectors"))
        .json(&json!({"id": 2, "vector": [0.95, 0.05], "payload": {"lang": "go"}}))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .post(format!("{base}/search"))
        .json(&json!({
            "vector": [1.0, 0.0],
            "top_k": 5,
            "filter": [{"field": "lang", "op": "eq", "value": "go"}]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], 2);
}

#[tokio::test]
async fn rebuild_and_stats() {
    let (_dir, base) = spawn_server().await;
    let client = reqwest::Client::new();

    for i in 0..5 {
        client
            .post(format!("{base}/vectors"))
            .json(&json!({"id": i, "vector": [i as f32, 1.0]}))
            .send()
            .await
            .unwrap();
    }
    client
        .delete(format!("{base}/documents/0"))
        .send()
        .await
        .unwrap();

    let response = client.post(format!("{base}/rebuild")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = client
        .get(format!("{base}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"], 4);
    assert_eq!(body["tombstones"], 0);
    assert_eq!(body["state"], "active");
    assert!(body["metrics"]["rebuilds"].as_u64().unwrap() >= 1);
}
