//! HTTP surface of a running relay: root, health, peers and CORS.

mod common;

use common::TestServer;
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_and_root() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(server.http_url("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let root = client.get(server.http_url("/")).send().await.unwrap();
    assert_eq!(root.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_peers_lists_registered_clients() {
    let server = TestServer::start().await;
    let _alice = server.connect_registered("alice").await;
    let _bob = server.connect_registered("bob").await;
    let _anonymous = server.connect().await;
    server.wait_for_active_count(3).await;

    let peers: serde_json::Value = reqwest::get(server.http_url("/api/peers"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(peers["active"], 3);
    let ids: Vec<&str> = peers["clients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["alice", "bob"]);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let server = TestServer::start().await;

    let response = reqwest::get(server.http_url("/experiments")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_cors_allows_default_dev_origin() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .get(server.http_url("/api/health"))
        .header("Origin", "http://127.0.0.1:8080")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://127.0.0.1:8080")
    );

    server.stop().await;
}
