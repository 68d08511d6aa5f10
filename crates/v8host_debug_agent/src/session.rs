use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;
use v8host_runtime::DebugCallback;

use crate::error::DebugAgentError;

/// Inspector side of a debug session.
pub trait InspectorSink: Send + Sync + 'static {
    fn connect(&self);
    fn send_command(&self, message: String);
    fn disconnect(&self);
}

impl InspectorSink for DebugCallback {
    fn connect(&self) {
        self.connect_client();
    }

    fn send_command(&self, message: String) {
        DebugCallback::send_command(self, message);
    }

    fn disconnect(&self) {
        self.disconnect_client();
    }
}

/// Identity advertised through the discovery endpoints.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub port: u16,
}

impl TargetInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: version.into(),
            port,
        }
    }
}

/// Shared state of one agent: its target and the attached client, if any.
pub struct AgentState {
    pub(crate) target: TargetInfo,
    sink: Arc<dyn InspectorSink>,
    client: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl AgentState {
    pub fn new(target: TargetInfo, sink: Arc<dyn InspectorSink>) -> Self {
        Self {
            target,
            sink,
            client: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    pub fn is_attached(&self) -> bool {
        self.client
            .lock()
            .as_ref()
            .is_some_and(|client| !client.is_closed())
    }

    /// Claims the session for a new client. The receiver yields messages
    /// from the inspector until the client detaches.
    pub(crate) fn attach(&self) -> Result<mpsc::UnboundedReceiver<String>, DebugAgentError> {
        let mut client = self.client.lock();
        if client.as_ref().is_some_and(|client| !client.is_closed()) {
            return Err(DebugAgentError::SessionBusy);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        *client = Some(sender);
        drop(client);

        tracing::info!(target_id = %self.target.id, name = %self.target.name, "Debugger client attached");
        self.sink.connect();
        Ok(receiver)
    }

    pub(crate) fn forward(&self, message: String) {
        self.sink.send_command(message);
    }

    pub(crate) fn detach(&self) {
        if self.client.lock().take().is_some() {
            tracing::info!(target_id = %self.target.id, "Debugger client detached");
            self.sink.disconnect();
        }
    }

    /// Queues an inspector message for the attached client. Returns false
    /// when nobody is listening.
    pub fn deliver(&self, message: &str) -> bool {
        let client = self.client.lock();
        let Some(client) = client.as_ref() else {
            tracing::trace!("Dropping inspector message without a client");
            return false;
        };
        client.send(message.to_string()).is_ok()
    }
}
