//! The host method table and the runtime collaborators built on it.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use v8host_runtime::{
    DebugAgent, DebugCallback, DocumentInfo, DocumentKind, HostEnvironment, HostException,
    HostObject, HostObjectHolder, HostResult, Invocability, LoadedModule, NativeCallback, Value,
};

use crate::exception::{V8ExceptionInfo, take_host_exception};
use crate::handle::Handle;
use crate::object::{NativeCallbackHandle, V8DebugCallbackHandle};
use crate::thunk::{Thunk, alloc_thunk};
use crate::value::{V8Value, V8Value_Clear, export_args};
use crate::vector::{StdString, StdStringArray, StdUInt32Array, StdV8ValueArray};

/// Host method status: the call failed after `HostException_Schedule`.
pub const HOST_ERROR: i32 = -1;
/// Host method status: the key or operation is not handled.
pub const HOST_NOT_HANDLED: i32 = 0;
pub const HOST_OK: i32 = 1;

type HostObjectPtr = *mut c_void;

/// Functions the host supplies to the engine. Name arguments are UTF-8
/// pointer and length pairs borrowed for the call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostMethodTable {
    pub schedule_script_engine_exception: unsafe extern "C" fn(info: *const V8ExceptionInfo),
    /// The engine dropped its wrapper for `object`. A later crossing of the
    /// same pointer creates a new wrapper.
    pub release_host_object: unsafe extern "C" fn(object: HostObjectPtr),
    pub get_property: unsafe extern "C" fn(HostObjectPtr, *const u8, usize, value: *mut V8Value) -> i32,
    pub set_property: unsafe extern "C" fn(HostObjectPtr, *const u8, usize, value: *const V8Value) -> i32,
    pub delete_property: unsafe extern "C" fn(HostObjectPtr, *const u8, usize) -> i32,
    pub get_property_names: unsafe extern "C" fn(HostObjectPtr, names: *mut StdStringArray) -> i32,
    pub get_indexed_property: unsafe extern "C" fn(HostObjectPtr, index: u32, value: *mut V8Value) -> i32,
    pub set_indexed_property: unsafe extern "C" fn(HostObjectPtr, index: u32, value: *const V8Value) -> i32,
    pub delete_indexed_property: unsafe extern "C" fn(HostObjectPtr, index: u32) -> i32,
    pub get_property_indices: unsafe extern "C" fn(HostObjectPtr, indices: *mut StdUInt32Array) -> i32,
    pub invoke: unsafe extern "C" fn(
        HostObjectPtr,
        as_constructor: bool,
        args: *const StdV8ValueArray,
        result: *mut V8Value,
    ) -> i32,
    pub invoke_method: unsafe extern "C" fn(
        HostObjectPtr,
        *const u8,
        usize,
        args: *const StdV8ValueArray,
        result: *mut V8Value,
    ) -> i32,
    pub get_enumerator: unsafe extern "C" fn(HostObjectPtr, result: *mut V8Value) -> i32,
    pub get_async_enumerator: unsafe extern "C" fn(HostObjectPtr, result: *mut V8Value) -> i32,
    /// 0 none, 1 invocable, 2 delegate
    pub get_invocability: unsafe extern "C" fn(HostObjectPtr) -> u32,
    /// `referrer_unique_id` is zero without a referrer. Fills the loaded
    /// document's name, kind (0 script, 1 module, 2 JSON, 3 text), unique id,
    /// code and synthetic exports. A unique id left at zero is assigned by
    /// the engine; hosts that track documents return the same id each time a
    /// document is loaded.
    pub load_module: unsafe extern "C" fn(
        referrer_name: *const u8,
        referrer_name_length: usize,
        referrer_unique_id: u64,
        specifier: *const u8,
        specifier_length: usize,
        resource_name: *mut StdString,
        kind: *mut u32,
        unique_id: *mut u64,
        code: *mut StdString,
        exports: *mut V8Value,
    ) -> i32,
    pub create_module_context: unsafe extern "C" fn(
        resource_name: *const u8,
        resource_name_length: usize,
        unique_id: u64,
        names: *mut StdStringArray,
        values: *mut StdV8ValueArray,
    ) -> i32,
    pub get_max_script_cache_size: unsafe extern "C" fn() -> usize,
    pub get_max_module_cache_size: unsafe extern "C" fn() -> usize,
    /// Returns the host's agent, or null. The host owns `callback`.
    pub create_debug_agent: unsafe extern "C" fn(
        name: *const u8,
        name_length: usize,
        version: *const u8,
        version_length: usize,
        port: u16,
        remote: bool,
        callback: *mut V8DebugCallbackHandle,
    ) -> *mut c_void,
    pub send_debug_message: unsafe extern "C" fn(agent: *mut c_void, message: *const u8, message_length: usize),
    pub destroy_debug_agent: unsafe extern "C" fn(agent: *mut c_void),
    /// Exactly one of `thunk` and `handle` is set. The host calls the thunk
    /// once, or passes the handle to `NativeCallback_Invoke` and destroys it.
    pub queue_native_callback: unsafe extern "C" fn(thunk: Option<Thunk>, handle: *mut NativeCallbackHandle),
    pub write_bytes_to_stream: unsafe extern "C" fn(stream: *mut c_void, bytes: *const u8, length: usize),
    pub invoke_host_action: unsafe extern "C" fn(action: *mut c_void),
    pub invoke_host_action_with_arg: unsafe extern "C" fn(action: *mut c_void, arg: *mut c_void),
}

static METHODS: Lazy<RwLock<Option<HostMethodTable>>> = Lazy::new(|| RwLock::new(None));

/// Installs the host method table, replacing any earlier one.
///
/// # Safety
/// `table` is null or points to a fully populated table whose functions stay
/// callable for the life of the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Host_SetMethodTable(table: *const HostMethodTable) {
    *METHODS.write() = unsafe { table.as_ref() }.copied();
}

pub(crate) fn methods() -> Option<HostMethodTable> {
    *METHODS.read()
}

fn require_methods() -> HostResult<HostMethodTable> {
    methods().ok_or_else(|| HostException::new("No host method table is installed"))
}

/// Host objects by host pointer, and host pointers by holder identity.
#[derive(Default)]
struct HostObjectRegistry {
    by_pointer: HashMap<usize, Weak<FfiHostObject>>,
    by_identity: HashMap<usize, usize>,
}

static REGISTRY: Lazy<Mutex<HostObjectRegistry>> = Lazy::new(Mutex::default);

/// Wraps a host pointer, reusing the live wrapper so the proxy identity is
/// stable across crossings.
pub(crate) fn host_object_value(object: HostObjectPtr) -> Value {
    if object.is_null() {
        return Value::Undefined;
    }
    let key = object as usize;
    let wrapper = {
        let mut registry = REGISTRY.lock();
        match registry.by_pointer.get(&key).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                let wrapper = Arc::new(FfiHostObject { object: key });
                let identity = Arc::as_ptr(&wrapper).cast::<()>() as usize;
                registry.by_pointer.insert(key, Arc::downgrade(&wrapper));
                registry.by_identity.insert(identity, key);
                wrapper
            }
        }
    };
    Value::HostObject(HostObjectHolder::new(wrapper))
}

pub(crate) fn host_pointer(holder: &HostObjectHolder) -> Option<HostObjectPtr> {
    REGISTRY
        .lock()
        .by_identity
        .get(&holder.identity())
        .map(|pointer| *pointer as HostObjectPtr)
}

pub(crate) fn live_host_objects() -> usize {
    REGISTRY.lock().by_pointer.len()
}

fn status(method: &str, status: i32) -> HostResult<bool> {
    match status {
        HOST_ERROR => Err(take_host_exception(method)),
        HOST_NOT_HANDLED => Ok(false),
        _ => Ok(true),
    }
}

/// Reads a host-written value and frees what the host left in it.
fn take_value(value: &mut V8Value) -> Value {
    let imported = unsafe { value.import() };
    if matches!(value.kind, crate::value::V8ValueKind::String | crate::value::V8ValueKind::BigInt) {
        // Host-written strings live in host memory.
        *value = V8Value::default();
    }
    imported
}

/// A host object living on the far side of the boundary.
pub(crate) struct FfiHostObject {
    object: usize,
}

impl FfiHostObject {
    fn ptr(&self) -> HostObjectPtr {
        self.object as HostObjectPtr
    }

    fn call_value(
        &self,
        method: &str,
        call: impl FnOnce(&HostMethodTable, *mut V8Value) -> i32,
    ) -> HostResult<Value> {
        let methods = require_methods()?;
        let mut value = V8Value::default();
        let handled = status(method, call(&methods, &raw mut value))?;
        let result = take_value(&mut value);
        Ok(if handled { result } else { Value::Nonexistent })
    }

    fn call_status(&self, method: &str, call: impl FnOnce(&HostMethodTable) -> i32) -> HostResult<bool> {
        let methods = require_methods()?;
        status(method, call(&methods))
    }
}

impl HostObject for FfiHostObject {
    fn get_property(&self, name: &str) -> HostResult<Value> {
        self.call_value("get_property", |methods, value| unsafe {
            (methods.get_property)(self.ptr(), name.as_ptr(), name.len(), value)
        })
    }

    fn set_property(&self, name: &str, value: Value) -> HostResult<bool> {
        let mut exported = V8Value::export(&value);
        let handled = self.call_status("set_property", |methods| unsafe {
            (methods.set_property)(self.ptr(), name.as_ptr(), name.len(), &raw const exported)
        });
        unsafe { V8Value_Clear(&raw mut exported) };
        handled
    }

    fn delete_property(&self, name: &str) -> HostResult<bool> {
        self.call_status("delete_property", |methods| unsafe {
            (methods.delete_property)(self.ptr(), name.as_ptr(), name.len())
        })
    }

    fn property_names(&self) -> HostResult<Vec<String>> {
        let mut names = StdStringArray::new();
        self.call_status("get_property_names", |methods| unsafe {
            (methods.get_property_names)(self.ptr(), &raw mut names)
        })?;
        Ok(names)
    }

    fn get_indexed(&self, index: u32) -> HostResult<Value> {
        self.call_value("get_indexed_property", |methods, value| unsafe {
            (methods.get_indexed_property)(self.ptr(), index, value)
        })
    }

    fn set_indexed(&self, index: u32, value: Value) -> HostResult<bool> {
        let mut exported = V8Value::export(&value);
        let handled = self.call_status("set_indexed_property", |methods| unsafe {
            (methods.set_indexed_property)(self.ptr(), index, &raw const exported)
        });
        unsafe { V8Value_Clear(&raw mut exported) };
        handled
    }

    fn delete_indexed(&self, index: u32) -> HostResult<bool> {
        self.call_status("delete_indexed_property", |methods| unsafe {
            (methods.delete_indexed_property)(self.ptr(), index)
        })
    }

    fn property_indices(&self) -> HostResult<Vec<u32>> {
        let mut indices = StdUInt32Array::new();
        self.call_status("get_property_indices", |methods| unsafe {
            (methods.get_property_indices)(self.ptr(), &raw mut indices)
        })?;
        Ok(indices)
    }

    fn invoke(&self, as_constructor: bool, args: &[Value]) -> HostResult<Value> {
        let mut exported = export_args(args);
        let result = self.call_value("invoke", |methods, value| unsafe {
            (methods.invoke)(self.ptr(), as_constructor, &raw const exported, value)
        });
        clear_all(&mut exported);
        result.map(undefined_if_missing)
    }

    fn invoke_method(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        let mut exported = export_args(args);
        let result = self.call_value("invoke_method", |methods, value| unsafe {
            (methods.invoke_method)(self.ptr(), name.as_ptr(), name.len(), &raw const exported, value)
        });
        clear_all(&mut exported);
        result.map(undefined_if_missing)
    }

    fn enumerator(&self) -> HostResult<Value> {
        self.call_value("get_enumerator", |methods, value| unsafe {
            (methods.get_enumerator)(self.ptr(), value)
        })
    }

    fn async_enumerator(&self) -> HostResult<Value> {
        self.call_value("get_async_enumerator", |methods, value| unsafe {
            (methods.get_async_enumerator)(self.ptr(), value)
        })
    }

    fn invocability(&self) -> Invocability {
        let Some(methods) = methods() else {
            return Invocability::None;
        };
        match unsafe { (methods.get_invocability)(self.ptr()) } {
            1 => Invocability::Invocable,
            2 => Invocability::Delegate,
            _ => Invocability::None,
        }
    }
}

impl Drop for FfiHostObject {
    fn drop(&mut self) {
        let identity = std::ptr::from_ref(self).cast::<()>() as usize;
        {
            let mut registry = REGISTRY.lock();
            registry.by_identity.remove(&identity);
            if registry
                .by_pointer
                .get(&self.object)
                .is_some_and(|weak| weak.strong_count() == 0)
            {
                registry.by_pointer.remove(&self.object);
            }
        }
        if let Some(methods) = methods() {
            unsafe { (methods.release_host_object)(self.ptr()) };
        }
    }
}

fn undefined_if_missing(value: Value) -> Value {
    if value.is_nonexistent() { Value::Undefined } else { value }
}

fn clear_all(values: &mut StdV8ValueArray) {
    for value in values.iter_mut() {
        unsafe { V8Value_Clear(value) };
    }
}

/// Agent owned by the host, fed through `send_debug_message`.
struct FfiDebugAgent {
    agent: usize,
}

impl DebugAgent for FfiDebugAgent {
    fn send_message(&self, message: &str) {
        if let Some(methods) = methods() {
            unsafe { (methods.send_debug_message)(self.agent as *mut c_void, message.as_ptr(), message.len()) };
        }
    }
}

impl Drop for FfiDebugAgent {
    fn drop(&mut self) {
        if let Some(methods) = methods() {
            unsafe { (methods.destroy_debug_agent)(self.agent as *mut c_void) };
        }
    }
}

fn document_kind(code: u32) -> HostResult<DocumentKind> {
    match code {
        0 => Ok(DocumentKind::Script),
        1 => Ok(DocumentKind::Module),
        2 => Ok(DocumentKind::Json),
        3 => Ok(DocumentKind::Text),
        other => Err(HostException::new(format!("Unknown document kind {other}"))),
    }
}

/// [`HostEnvironment`] backed by the installed method table.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FfiHost;

impl HostEnvironment for FfiHost {
    fn load_module(&self, referrer: Option<&DocumentInfo>, specifier: &str) -> HostResult<LoadedModule> {
        let methods = require_methods()?;
        let referrer_name = referrer.map_or("", DocumentInfo::resource_name);
        let referrer_id = referrer.map_or(0, DocumentInfo::unique_id);
        let mut resource_name = StdString::new();
        let mut kind = 0_u32;
        let mut unique_id = 0_u64;
        let mut code = StdString::new();
        let mut exports = V8Value {
            kind: crate::value::V8ValueKind::Nonexistent,
            ..V8Value::default()
        };
        let found = status("load_module", unsafe {
            (methods.load_module)(
                referrer_name.as_ptr(),
                referrer_name.len(),
                referrer_id,
                specifier.as_ptr(),
                specifier.len(),
                &raw mut resource_name,
                &raw mut kind,
                &raw mut unique_id,
                &raw mut code,
                &raw mut exports,
            )
        })?;
        if !found {
            return Err(HostException::new(format!("Module '{specifier}' not found")));
        }
        if resource_name.is_empty() {
            resource_name = specifier.to_string();
        }
        let mut document = DocumentInfo::new(resource_name, document_kind(kind)?);
        if unique_id != 0 {
            document = document.with_unique_id(unique_id);
        }
        Ok(LoadedModule {
            document,
            code,
            exports: take_value(&mut exports),
        })
    }

    fn create_module_context(&self, document: &DocumentInfo) -> HostResult<Vec<(String, Value)>> {
        let Some(methods) = methods() else {
            return Ok(Vec::new());
        };
        let name = document.resource_name();
        let mut names = StdStringArray::new();
        let mut values = StdV8ValueArray::new();
        status("create_module_context", unsafe {
            (methods.create_module_context)(
                name.as_ptr(),
                name.len(),
                document.unique_id(),
                &raw mut names,
                &raw mut values,
            )
        })?;
        Ok(names
            .into_iter()
            .zip(values.iter_mut().map(take_value))
            .collect())
    }

    fn max_script_cache_size(&self) -> usize {
        methods().map_or(1024, |methods| unsafe { (methods.get_max_script_cache_size)() })
    }

    fn max_module_cache_size(&self) -> usize {
        methods().map_or(1024, |methods| unsafe { (methods.get_max_module_cache_size)() })
    }

    fn create_debug_agent(
        &self,
        name: &str,
        version: &str,
        port: u16,
        remote: bool,
        callback: DebugCallback,
    ) -> Option<Arc<dyn DebugAgent>> {
        let methods = methods()?;
        let agent = unsafe {
            (methods.create_debug_agent)(
                name.as_ptr(),
                name.len(),
                version.as_ptr(),
                version.len(),
                port,
                remote,
                Handle::into_raw(callback),
            )
        };
        if agent.is_null() {
            return None;
        }
        Some(Arc::new(FfiDebugAgent { agent: agent as usize }))
    }

    fn queue_native_callback(&self, callback: NativeCallback) {
        let Some(methods) = methods() else {
            tracing::warn!("Running native callback inline: no host method table");
            callback();
            return;
        };
        match alloc_thunk(callback) {
            Ok(thunk) => unsafe { (methods.queue_native_callback)(Some(thunk), std::ptr::null_mut()) },
            Err(callback) => {
                tracing::debug!("Native callback pool saturated, queueing a handle");
                let handle = Handle::into_raw(callback);
                unsafe { (methods.queue_native_callback)(None, handle) };
            }
        }
    }
}

/// Host objects the engine currently wraps.
#[unsafe(no_mangle)]
pub extern "C" fn V8Host_GetLiveHostObjectCount() -> usize {
    live_host_objects()
}

/// Native callbacks handed out as thunks and not yet run.
#[unsafe(no_mangle)]
pub extern "C" fn V8Host_GetPendingNativeCallbackCount() -> usize {
    crate::thunk::pending_thunks()
}
