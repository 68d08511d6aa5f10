mod utils;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use v8host_runtime::DebugAgent;

use crate::utils::{SinkEvent, eventually, start_agent, ws_url};

#[tokio::test]
async fn test_session_forwards_both_directions() {
    let (server, sink) = start_agent();
    let (ws_stream, _) = connect_async(ws_url(&server)).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();

    assert!(eventually(|| server.is_client_attached()).await);
    write
        .send(Message::Text(r#"{"id":1,"method":"Runtime.enable"}"#.into()))
        .await
        .unwrap();
    assert!(eventually(|| sink.events.lock().len() >= 2).await);
    assert_eq!(
        *sink.events.lock(),
        [
            SinkEvent::Connect,
            SinkEvent::Command(r#"{"id":1,"method":"Runtime.enable"}"#.to_string()),
        ]
    );

    server.send_message(r#"{"id":1,"result":{}}"#);
    let Some(Ok(Message::Text(reply))) = read.next().await else {
        panic!("expected a text frame");
    };
    assert_eq!(reply.as_str(), r#"{"id":1,"result":{}}"#);

    write.send(Message::Close(None)).await.unwrap();
    assert!(eventually(|| sink.events.lock().last() == Some(&SinkEvent::Disconnect)).await);
    assert!(!server.is_client_attached());
}

#[tokio::test]
async fn test_unknown_target_is_rejected() {
    let (server, sink) = start_agent();
    let url = format!("ws://{}/not-a-target", server.local_addr());
    assert!(connect_async(url).await.is_err());
    assert!(sink.events.lock().is_empty());
}

#[tokio::test]
async fn test_second_client_is_refused() {
    let (server, _sink) = start_agent();
    let (_first, _) = connect_async(ws_url(&server)).await.expect("Failed to connect");
    assert!(eventually(|| server.is_client_attached()).await);
    assert!(connect_async(ws_url(&server)).await.is_err());
}

#[tokio::test]
async fn test_messages_without_client_are_dropped() {
    let (server, sink) = start_agent();
    assert!(!server.state().deliver("{}"));
    server.send_message("{}");
    assert!(sink.events.lock().is_empty());
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let (server, sink) = start_agent();
    let (mut first, _) = connect_async(ws_url(&server)).await.expect("Failed to connect");
    assert!(eventually(|| server.is_client_attached()).await);
    first.close(None).await.unwrap();
    assert!(eventually(|| !server.is_client_attached()).await);

    let (_second, _) = connect_async(ws_url(&server)).await.expect("Failed to reconnect");
    assert!(eventually(|| sink.events.lock().len() == 3).await);
    assert_eq!(
        *sink.events.lock(),
        [SinkEvent::Connect, SinkEvent::Disconnect, SinkEvent::Connect]
    );
}
