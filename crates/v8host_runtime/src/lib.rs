//! # v8host runtime
//!
//! Engine-integration core for embedding V8 in a host process.
//!
//! ## Overview
//!
//! Each [`V8Isolate`] owns one engine isolate on a dedicated thread. Host
//! threads reach it through blocking calls or queued tasks; script reaches
//! the host through proxies over [`HostObject`] implementations.
//!
//! - **Resource governance**: heap ceiling sampled while script runs, stack
//!   ceiling on every re-entry, array-buffer allocation ceiling
//! - **Cooperative scheduling**: nestable and non-nestable foreground tasks,
//!   worker tasks, delayed tasks and a message loop for the debugger
//! - **Contexts**: script and module execution, code caching, global
//!   members and host object proxies
//! - **Debugging**: inspector sessions bridged to a host [`DebugAgent`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use v8host_config::ContextConfig;
//! use v8host_runtime::{DocumentInfo, PropertyBag, V8Isolate, Value};
//!
//! # fn example() -> v8host_runtime::Result<()> {
//! let isolate = V8Isolate::with_defaults()?;
//! let context = isolate.create_context(ContextConfig::default())?;
//!
//! let host = PropertyBag::new().with("greeting", "hello");
//! context.set_global_property("host", Value::host_object(host), true)?;
//!
//! let result = context.execute(&DocumentInfo::script("main.js"), "greeting + ' world'", true)?;
//! assert_eq!(result.as_str(), Some("hello world"));
//! # Ok(())
//! # }
//! ```

mod cache;
pub mod callback_pool;
mod context;
mod document;
mod error;
pub mod governor;
mod holder;
mod host;
mod isolate;
pub mod platform;
pub mod scheduler;
mod script;
mod value;

#[cfg(test)]
mod tests;

pub use cache::{CacheKey, V8CacheKind, V8CacheResult};
pub use callback_pool::{CallbackPool, CallbackSlot};
pub use context::{ArrayBufferOrViewInfo, PromiseState, V8Context};
pub use document::{DocumentInfo, DocumentKind, code_digest, next_unique_id};
pub use error::{ENGINE_NAME, Result, V8Exception, V8ExceptionKind};
pub use holder::{
    HostObjectFlags, HostObjectHolder, HostObjectSubtype, SharedBufferInfo, V8ObjectFlags,
    V8ObjectHolder, V8ObjectSubtype,
};
pub use host::{
    DebugAgent, DefaultHost, HostEnumerator, HostEnvironment, HostException, HostExceptionObject,
    HostFunction, HostObject, HostResult, Invocability, LoadedModule, NativeCallback, PropertyBag,
};
pub use isolate::debugger::DebugCallback;
pub use isolate::{HeapStatistics, IsolateStatistics, V8Isolate};
pub use script::V8Script;
pub use value::{BigIntValue, Value};

pub use v8host_config::{ContextConfig, DebuggerConfig, IsolateConfig};
