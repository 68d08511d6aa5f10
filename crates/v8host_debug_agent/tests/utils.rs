//! Shared helpers for debug agent tests

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use v8host_debug_agent::{AgentOptions, DebugAgentServer, InspectorSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Connect,
    Command(String),
    Disconnect,
}

/// Inspector stand-in that records what the agent forwards.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) events: Mutex<Vec<SinkEvent>>,
}

impl InspectorSink for RecordingSink {
    fn connect(&self) {
        self.events.lock().push(SinkEvent::Connect);
    }

    fn send_command(&self, message: String) {
        self.events.lock().push(SinkEvent::Command(message));
    }

    fn disconnect(&self) {
        self.events.lock().push(SinkEvent::Disconnect);
    }
}

/// Starts an agent on an ephemeral loopback port.
pub(crate) fn start_agent() -> (DebugAgentServer, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let options = AgentOptions {
        name: "test-isolate".to_string(),
        version: "12.0.0".to_string(),
        port: 0,
        remote: false,
    };
    let server = DebugAgentServer::start(options, sink.clone()).unwrap();
    (server, sink)
}

pub(crate) fn http_url(server: &DebugAgentServer, path: &str) -> String {
    format!("http://{}{path}", server.local_addr())
}

pub(crate) fn ws_url(server: &DebugAgentServer) -> String {
    format!("ws://{}/{}", server.local_addr(), server.state().target().id)
}

/// Polls `condition` for up to two seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    condition()
}
