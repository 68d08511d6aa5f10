mod utils;

use serde_json::Value;

use crate::utils::{http_url, start_agent};

#[tokio::test]
async fn test_json_lists_single_target() {
    let (server, _sink) = start_agent();
    let targets: Value = reqwest::get(http_url(&server, "/json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let targets = targets.as_array().unwrap();
    assert_eq!(targets.len(), 1);
    let target = &targets[0];
    let id = server.state().target().id.to_string();
    assert_eq!(target["id"], id.as_str());
    assert_eq!(target["title"], "test-isolate");
    assert_eq!(target["type"], "node");
    let ws = target["webSocketDebuggerUrl"].as_str().unwrap();
    assert_eq!(ws, format!("ws://{}/{id}", server.local_addr()));
    assert!(
        target["devtoolsFrontendUrl"]
            .as_str()
            .unwrap()
            .ends_with(&format!("ws={}/{id}", server.local_addr()))
    );
}

#[tokio::test]
async fn test_json_list_matches_json() {
    let (server, _sink) = start_agent();
    let list: Value = reqwest::get(http_url(&server, "/json/list"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let json: Value = reqwest::get(http_url(&server, "/json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list, json);
}

#[tokio::test]
async fn test_json_version() {
    let (server, _sink) = start_agent();
    let version: Value = reqwest::get(http_url(&server, "/json/version"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["Protocol-Version"], "1.3");
    assert_eq!(version["V8-Version"], "12.0.0");
    assert!(version["Browser"].as_str().unwrap().starts_with("v8host/"));
}

#[tokio::test]
async fn test_shutdown_stops_listener() {
    let (server, _sink) = start_agent();
    let url = http_url(&server, "/json/version");
    server.shutdown();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(reqwest::get(url).await.is_err());
}
