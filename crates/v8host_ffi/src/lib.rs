//! C ABI over the v8host runtime.
//!
//! Every engine entity crosses the boundary as an opaque handle with
//! `_Release`, `_CloneHandle` and `_DestroyHandle` entry points. Values travel
//! as [`V8Value`] records, strings and arrays through the `Std*` vector
//! helpers. The host registers a [`HostMethodTable`] once with
//! [`V8Host_SetMethodTable`]; the engine reaches host objects, modules, the
//! debug agent and background threads through it.
//!
//! No entry point unwinds. Failures are delivered to the host's
//! `schedule_script_engine_exception` before the call returns its fallback
//! value.

#![allow(non_snake_case, clippy::missing_safety_doc)]

mod config;
mod context;
mod exception;
mod flags;
mod handle;
mod host;
mod isolate;
mod object;
mod thunk;
mod value;
mod vector;

#[cfg(test)]
mod tests;

pub use config::{V8Host_CreateFromConfigFile, V8Host_InitLogger};
pub use context::V8ContextHandle;
pub use exception::{HostException_Schedule, V8ExceptionInfo};
pub use flags::{ContextFlags, IsolateFlags};
pub use handle::Handle;
pub use host::{
    HOST_ERROR, HOST_NOT_HANDLED, HOST_OK, HostMethodTable, V8Host_GetLiveHostObjectCount,
    V8Host_GetPendingNativeCallbackCount, V8Host_SetMethodTable,
};
pub use isolate::{V8HeapStatistics, V8IsolateConstraints, V8IsolateHandle, V8IsolateStatistics};
pub use object::{NativeCallbackHandle, V8DebugCallbackHandle, V8ObjectHandle, V8ScriptHandle};
pub use value::{V8Value, V8ValueKind, V8Value_Clear};
pub use vector::*;

pub use context::*;
pub use isolate::*;
pub use object::*;
