use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::Router;
use axum::routing::get;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use v8host_runtime::DebugAgent;

use crate::error::DebugAgentError;
use crate::routes;
use crate::session::{AgentState, InspectorSink, TargetInfo};

/// Settings an agent is started with.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub name: String,
    pub version: String,
    /// Zero binds an ephemeral port
    pub port: u16,
    /// Listen on all interfaces instead of loopback only
    pub remote: bool,
}

pub(crate) fn create_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/json", get(routes::list_targets))
        .route("/json/list", get(routes::list_targets))
        .route("/json/version", get(routes::version))
        .route("/{id}", get(routes::inspector_socket))
        .with_state(state)
}

/// An HTTP/WebSocket debug agent serving one isolate from its own thread.
///
/// Dropping the server stops the listener and closes any client socket.
pub struct DebugAgentServer {
    state: Arc<AgentState>,
    local_addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DebugAgentServer {
    pub fn start(options: AgentOptions, sink: Arc<dyn InspectorSink>) -> Result<Self, DebugAgentError> {
        let ip = if options.remote {
            Ipv4Addr::UNSPECIFIED
        } else {
            Ipv4Addr::LOCALHOST
        };
        let addr = SocketAddr::from((ip, options.port));
        let bind_error = |source| DebugAgentError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let target = TargetInfo::new(options.name, options.version, local_addr.port());
        let state = Arc::new(AgentState::new(target, sink));
        let router = create_router(state.clone());
        let (shutdown, stopped) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(format!("v8host-debug-agent-{}", local_addr.port()))
            .spawn(move || serve(listener, router, stopped))
            .map_err(DebugAgentError::Thread)?;

        tracing::info!(
            name = %state.target().name,
            %local_addr,
            target_id = %state.target().id,
            "Debug agent listening"
        );
        Ok(Self {
            state,
            local_addr,
            shutdown: Mutex::new(Some(shutdown)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.state
    }

    pub fn is_client_attached(&self) -> bool {
        self.state.is_attached()
    }

    /// Stops serving; later calls are no-ops.
    pub fn shutdown(&self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
        self.state.detach();
        if let Some(thread) = self.thread.lock().take()
            && thread.thread().id() != std::thread::current().id()
            && thread.join().is_err()
        {
            tracing::warn!("Debug agent thread panicked");
        }
    }
}

fn serve(listener: std::net::TcpListener, router: Router, stopped: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "Failed building debug agent runtime");
            return;
        }
    };
    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, "Failed adopting debug agent listener");
                return;
            }
        };
        tokio::select! {
            served = axum::serve(listener, router).into_future() => {
                if let Err(err) = served {
                    tracing::error!(error = %err, "Debug agent stopped with an error");
                }
            }
            _ = stopped => {}
        }
    });
    tracing::debug!("Debug agent stopped");
}

impl DebugAgent for DebugAgentServer {
    fn send_message(&self, message: &str) {
        self.state.deliver(message);
    }
}

impl Drop for DebugAgentServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
