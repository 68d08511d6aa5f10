//! Collaborator interfaces implemented by the embedding host.
//!
//! [`HostObject`] is the property and invocation protocol behind every script
//! proxy; [`HostEnvironment`] supplies modules, cache sizing, debug agents and
//! background threads to an isolate.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::document::DocumentInfo;
use crate::isolate::debugger::DebugCallback;
use crate::value::Value;

mod helpers;

pub use helpers::{HostEnumerator, HostExceptionObject, HostFunction, PropertyBag};

pub type HostResult<T> = std::result::Result<T, HostException>;

/// Error raised by host code called from script.
///
/// It reaches script as an `Error` whose message is `message`; unless the
/// context hides host exceptions the original travels along and comes back
/// as [`crate::V8Exception::inner_exception`].
#[derive(Clone, Error)]
#[error("{message}")]
pub struct HostException {
    message: String,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl HostException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Any + Send + Sync) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostException")
            .field("message", &self.message)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocability {
    None,
    /// Proxied as an ordinary object; `typeof` reports "object"
    Invocable,
    /// Callable from script; `typeof` reports "function"
    Delegate,
}

/// Property and invocation protocol of a host object exposed to script.
///
/// Setters and deleters return `Ok(false)` for keys they do not handle; the
/// engine then applies its ordinary semantics to the proxy itself.
#[allow(unused_variables)]
pub trait HostObject: Send + Sync + 'static {
    fn get_property(&self, name: &str) -> HostResult<Value> {
        Ok(Value::Nonexistent)
    }

    /// Lookup used by global-member lookup; `None` lets the search continue.
    fn try_get_property(&self, name: &str) -> HostResult<Option<Value>> {
        self.get_property(name)
            .map(|value| (!value.is_nonexistent()).then_some(value))
    }

    /// Values of cacheable properties are memoized per proxy until the
    /// context's access token rotates.
    fn is_cacheable(&self, name: &str) -> bool {
        false
    }

    fn set_property(&self, name: &str, value: Value) -> HostResult<bool> {
        Ok(false)
    }

    fn delete_property(&self, name: &str) -> HostResult<bool> {
        Ok(false)
    }

    fn property_names(&self) -> HostResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_indexed(&self, index: u32) -> HostResult<Value> {
        Ok(Value::Nonexistent)
    }

    fn set_indexed(&self, index: u32, value: Value) -> HostResult<bool> {
        Ok(false)
    }

    fn delete_indexed(&self, index: u32) -> HostResult<bool> {
        Ok(false)
    }

    fn property_indices(&self) -> HostResult<Vec<u32>> {
        Ok(Vec::new())
    }

    fn invoke(&self, as_constructor: bool, args: &[Value]) -> HostResult<Value> {
        Err(HostException::new("Object does not support invocation"))
    }

    fn invoke_method(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        match self.get_property(name)? {
            Value::HostObject(method) => method.object().invoke(false, args),
            _ => Err(HostException::new(format!(
                "Object has no suitable method named '{name}'"
            ))),
        }
    }

    /// Returns a host object with `moveNext()` and `current` members.
    fn enumerator(&self) -> HostResult<Value> {
        Err(HostException::new("Object does not support enumeration"))
    }

    /// Returns a host object whose `moveNext()` may produce a promise.
    fn async_enumerator(&self) -> HostResult<Value> {
        self.enumerator()
    }

    fn invocability(&self) -> Invocability {
        Invocability::None
    }

    /// Host objects that represent an exception answer with it here so the
    /// error raised in script can carry it back out.
    fn as_host_exception(&self) -> Option<HostException> {
        None
    }
}

/// A module produced by [`HostEnvironment::load_module`].
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub document: DocumentInfo,
    /// Source text, unused for synthetic kinds
    pub code: String,
    /// Export value for JSON and text documents
    pub exports: Value,
}

/// Transport end of a debugger session owned by the host.
pub trait DebugAgent: Send + Sync {
    /// Delivers one inspector protocol message to the connected front-end.
    fn send_message(&self, message: &str);
}

pub type NativeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Services an isolate requires from its host.
#[allow(unused_variables)]
pub trait HostEnvironment: Send + Sync + 'static {
    fn load_module(
        &self,
        referrer: Option<&DocumentInfo>,
        specifier: &str,
    ) -> HostResult<LoadedModule> {
        Err(HostException::new(format!(
            "Cannot load module '{specifier}': module loading is not enabled"
        )))
    }

    /// Key/value pairs installed on each module's `import.meta`.
    fn create_module_context(&self, document: &DocumentInfo) -> HostResult<Vec<(String, Value)>> {
        Ok(Vec::new())
    }

    /// Consulted on every script cache insertion
    fn max_script_cache_size(&self) -> usize {
        1024
    }

    /// Consulted on every module cache insertion
    fn max_module_cache_size(&self) -> usize {
        1024
    }

    fn create_debug_agent(
        &self,
        name: &str,
        version: &str,
        port: u16,
        remote: bool,
        callback: DebugCallback,
    ) -> Option<Arc<dyn DebugAgent>> {
        None
    }

    /// Runs `callback` on a background thread of the host's choosing.
    fn queue_native_callback(&self, callback: NativeCallback) {
        let spawned = std::thread::Builder::new()
            .name("v8host-worker".to_string())
            .spawn(callback);
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "Failed spawning worker thread");
        }
    }
}

/// Host with no module loader and no debug agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHost;

impl HostEnvironment for DefaultHost {}
