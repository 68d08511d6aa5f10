//! DevTools discovery and inspector socket handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;

use crate::error::DebugAgentError;
use crate::session::AgentState;

const PROTOCOL_VERSION: &str = "1.3";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescription {
    pub description: String,
    pub devtools_frontend_url: String,
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub web_socket_debugger_url: String,
}

#[derive(Debug, Serialize)]
pub struct VersionDescription {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,
    #[serde(rename = "V8-Version")]
    pub v8_version: String,
}

/// `host:port` the client reached us on, so advertised URLs work through
/// port forwarding.
fn request_host(headers: &HeaderMap, port: u16) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| format!("127.0.0.1:{port}"), str::to_owned)
}

pub(crate) async fn list_targets(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
) -> Json<Vec<TargetDescription>> {
    let target = state.target();
    let host = request_host(&headers, target.port);
    let socket = format!("{host}/{}", target.id);
    Json(vec![TargetDescription {
        description: format!("v8host isolate {}", target.name),
        devtools_frontend_url: format!(
            "devtools://devtools/bundled/js_app.html?experiments=true&v8only=true&ws={socket}"
        ),
        id: target.id.to_string(),
        title: target.name.clone(),
        kind: "node".to_string(),
        url: format!("v8host://{}", target.name),
        web_socket_debugger_url: format!("ws://{socket}"),
    }])
}

pub(crate) async fn version(State(state): State<Arc<AgentState>>) -> Json<VersionDescription> {
    Json(VersionDescription {
        browser: format!("v8host/{}", env!("CARGO_PKG_VERSION")),
        protocol_version: PROTOCOL_VERSION.to_string(),
        v8_version: state.target().version.clone(),
    })
}

pub(crate) async fn inspector_socket(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AgentState>>,
) -> Response {
    if id != state.target().id.to_string() {
        tracing::warn!(id, "Rejecting inspector connection for unknown target");
        return DebugAgentError::UnknownTarget(id).into_response();
    }
    if state.is_attached() {
        return DebugAgentError::SessionBusy.into_response();
    }
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: Arc<AgentState>) {
    let mut outgoing = match state.attach() {
        Ok(receiver) => receiver,
        Err(err) => {
            tracing::warn!(error = %err, "Inspector session refused");
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            if let Err(err) = sender.send(Message::Text(message.into())).await {
                tracing::debug!(error = %err, "Inspector socket closed while sending");
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => state.forward(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => state.forward(text),
                Err(_) => tracing::warn!("Ignoring non-UTF-8 inspector frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "Inspector socket error");
                break;
            }
        }
    }

    state.detach();
    send_task.abort();
}
