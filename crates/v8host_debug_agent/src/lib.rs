//! Debug agent for v8host isolates.
//!
//! Serves the DevTools discovery endpoints (`/json`, `/json/list`,
//! `/json/version`) and a single WebSocket inspector session per isolate.
//! Protocol messages pass through verbatim in both directions.
//!
//! Wrap any [`HostEnvironment`](v8host_runtime::HostEnvironment) in a
//! [`DebuggingHost`] to give isolates created with debugging enabled a live
//! agent:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use v8host_debug_agent::DebuggingHost;
//! use v8host_runtime::{DebuggerConfig, DefaultHost, IsolateConfig, V8Isolate};
//!
//! # fn example() -> v8host_runtime::Result<()> {
//! let config = IsolateConfig::default().with_debugger(DebuggerConfig::enabled_on(9222));
//! let isolate = V8Isolate::new(config, Arc::new(DebuggingHost::new(DefaultHost)))?;
//! isolate.await_debugger_and_pause()?;
//! # Ok(())
//! # }
//! ```

mod error;
mod host;
pub mod routes;
mod server;
mod session;

pub use error::DebugAgentError;
pub use host::DebuggingHost;
pub use server::{AgentOptions, DebugAgentServer};
pub use session::{AgentState, InspectorSink, TargetInfo};
