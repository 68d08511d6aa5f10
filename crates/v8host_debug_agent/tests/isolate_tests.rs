mod utils;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serial_test::serial;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use v8host_debug_agent::DebuggingHost;
use v8host_runtime::{ContextConfig, DebuggerConfig, DefaultHost, IsolateConfig, V8Isolate};

const PORT: u16 = 19_229;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_inspector_round_trip_through_agent() {
    let config = IsolateConfig::default()
        .with_name("inspected")
        .with_debugger(DebuggerConfig::enabled_on(i32::from(PORT)));
    let isolate = V8Isolate::new(config, Arc::new(DebuggingHost::new(DefaultHost))).unwrap();
    let _context = isolate
        .create_context(ContextConfig::default().with_debugging(true))
        .unwrap();

    let targets: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{PORT}/json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(targets[0]["title"], "inspected");
    let url = targets[0]["webSocketDebuggerUrl"].as_str().unwrap().to_string();

    let (ws_stream, _) = connect_async(url).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();
    write
        .send(Message::Text(
            r#"{"id":7,"method":"Runtime.evaluate","params":{"expression":"6 * 7"}}"#.into(),
        ))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(message)) = read.next().await {
            if let Message::Text(text) = message {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if value["id"] == 7 {
                    return Some(value);
                }
            }
        }
        None
    })
    .await
    .unwrap()
    .expect("inspector should answer");
    assert_eq!(reply["result"]["result"]["value"], 42);
}

#[tokio::test]
#[serial]
async fn test_isolate_without_debugger_has_no_agent() {
    let isolate = V8Isolate::new(IsolateConfig::default(), Arc::new(DebuggingHost::new(DefaultHost))).unwrap();
    let _context = isolate.create_context(ContextConfig::default()).unwrap();
    assert!(
        reqwest::get(format!("http://127.0.0.1:{PORT}/json"))
            .await
            .is_err()
    );
}
