//! A recording host method table and handle helpers for driving the C ABI
//! from Rust.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::c_void;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use v8host_ffi::{
    HOST_ERROR, HOST_NOT_HANDLED, HOST_OK, HostException_Schedule, HostMethodTable, NativeCallbackHandle,
    StdString, StdStringArray, StdUInt32Array, StdV8ValueArray, V8ContextHandle, V8DebugCallbackHandle,
    V8DocumentInfo, V8ExceptionInfo, V8Host_SetMethodTable, V8Isolate_Create, V8Isolate_CreateContext,
    V8IsolateHandle, V8Value, V8ValueKind,
};

/// Owned copy of one exception delivered to the host.
#[derive(Debug, Clone)]
pub(crate) struct RecordedException {
    pub(crate) kind: u32,
    pub(crate) engine_name: String,
    pub(crate) message: String,
    pub(crate) stack_trace: Option<String>,
    pub(crate) execution_started: bool,
    pub(crate) inner_exception: usize,
}

#[derive(Default)]
pub(crate) struct Recorder {
    pub(crate) exceptions: Vec<RecordedException>,
    pub(crate) released_objects: Vec<usize>,
    pub(crate) actions: Vec<(usize, Option<usize>)>,
    pub(crate) snapshot: Vec<u8>,
    /// Host objects by pointer: property name to number
    pub(crate) objects: HashMap<usize, HashMap<String, f64>>,
    /// Host object pointers whose property reads fail with this token
    pub(crate) failing: HashMap<usize, usize>,
    /// Specifiers served by `load_module`, in order
    pub(crate) module_loads: Vec<String>,
}

pub(crate) static RECORDER: Lazy<Mutex<Recorder>> = Lazy::new(Mutex::default);

unsafe fn text(ptr: *const u8, len: usize) -> String {
    if ptr.is_null() || len == 0 {
        return String::new();
    }
    String::from_utf8_lossy(unsafe { std::slice::from_raw_parts(ptr, len) }).into_owned()
}

unsafe extern "C" fn schedule_script_engine_exception(info: *const V8ExceptionInfo) {
    let info = unsafe { &*info };
    let recorded = RecordedException {
        kind: info.kind,
        engine_name: unsafe { text(info.engine_name, info.engine_name_length) },
        message: unsafe { text(info.message, info.message_length) },
        stack_trace: (!info.stack_trace.is_null())
            .then(|| unsafe { text(info.stack_trace, info.stack_trace_length) }),
        execution_started: info.execution_started,
        inner_exception: info.inner_exception as usize,
    };
    RECORDER.lock().exceptions.push(recorded);
}

unsafe extern "C" fn release_host_object(object: *mut c_void) {
    RECORDER.lock().released_objects.push(object as usize);
}

unsafe extern "C" fn get_property(object: *mut c_void, name: *const u8, len: usize, value: *mut V8Value) -> i32 {
    let name = unsafe { text(name, len) };
    let key = object as usize;
    let failing = RECORDER.lock().failing.get(&key).copied();
    if let Some(token) = failing {
        let message = format!("cannot read {name}");
        unsafe { HostException_Schedule(message.as_ptr(), message.len(), token as *mut c_void) };
        return HOST_ERROR;
    }
    let number = RECORDER.lock().objects.get(&key).and_then(|props| props.get(&name).copied());
    match number {
        Some(number) => {
            let out = unsafe { &mut *value };
            out.kind = V8ValueKind::Number;
            out.number = number;
            HOST_OK
        }
        None => HOST_NOT_HANDLED,
    }
}

unsafe extern "C" fn set_property(object: *mut c_void, name: *const u8, len: usize, value: *const V8Value) -> i32 {
    let name = unsafe { text(name, len) };
    let value = unsafe { &*value };
    if value.kind != V8ValueKind::Number {
        return HOST_NOT_HANDLED;
    }
    RECORDER
        .lock()
        .objects
        .entry(object as usize)
        .or_default()
        .insert(name, value.number);
    HOST_OK
}

unsafe extern "C" fn delete_property(object: *mut c_void, name: *const u8, len: usize) -> i32 {
    let name = unsafe { text(name, len) };
    let removed = RECORDER
        .lock()
        .objects
        .get_mut(&(object as usize))
        .and_then(|props| props.remove(&name));
    if removed.is_some() { HOST_OK } else { HOST_NOT_HANDLED }
}

unsafe extern "C" fn get_property_names(object: *mut c_void, names: *mut StdStringArray) -> i32 {
    let mut keys: Vec<String> = RECORDER
        .lock()
        .objects
        .get(&(object as usize))
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    keys.sort();
    unsafe { *names = keys };
    HOST_OK
}

unsafe extern "C" fn get_indexed(_: *mut c_void, _: u32, _: *mut V8Value) -> i32 {
    HOST_NOT_HANDLED
}

unsafe extern "C" fn set_indexed(_: *mut c_void, _: u32, _: *const V8Value) -> i32 {
    HOST_NOT_HANDLED
}

unsafe extern "C" fn delete_indexed(_: *mut c_void, _: u32) -> i32 {
    HOST_NOT_HANDLED
}

unsafe extern "C" fn get_property_indices(_: *mut c_void, _: *mut StdUInt32Array) -> i32 {
    HOST_OK
}

unsafe extern "C" fn invoke(_: *mut c_void, _: bool, args: *const StdV8ValueArray, result: *mut V8Value) -> i32 {
    let sum: f64 = unsafe { &*args }
        .iter()
        .filter(|arg| arg.kind == V8ValueKind::Number)
        .map(|arg| arg.number)
        .sum();
    let out = unsafe { &mut *result };
    out.kind = V8ValueKind::Number;
    out.number = sum;
    HOST_OK
}

unsafe extern "C" fn invoke_method(
    object: *mut c_void,
    _: *const u8,
    _: usize,
    args: *const StdV8ValueArray,
    result: *mut V8Value,
) -> i32 {
    unsafe { invoke(object, false, args, result) }
}

unsafe extern "C" fn get_enumerator(_: *mut c_void, _: *mut V8Value) -> i32 {
    HOST_NOT_HANDLED
}

/// Pointers at or above `INVOCABLE_BASE` are plain invocables; at or above
/// `DELEGATE_BASE` they are script-callable delegates.
pub(crate) const INVOCABLE_BASE: usize = 0x10_0000;
pub(crate) const DELEGATE_BASE: usize = 0x20_0000;

unsafe extern "C" fn get_invocability(object: *mut c_void) -> u32 {
    match object as usize {
        address if address >= DELEGATE_BASE => 2,
        address if address >= INVOCABLE_BASE => 1,
        _ => 0,
    }
}

/// Modules served by the test host: specifier, stable unique id (zero lets
/// the engine assign one) and source.
static MODULES: &[(&str, u64, &str)] = &[
    ("answer.mjs", 0, "export const answer = 40 + 2;"),
    (
        "counter.mjs",
        0xC0_0001,
        "globalThis.counterRuns = (globalThis.counterRuns ?? 0) + 1; export const token = {};",
    ),
    ("left.mjs", 0xC0_0002, "export { token as left } from 'counter.mjs';"),
    ("right.mjs", 0xC0_0003, "export { token as right } from 'counter.mjs';"),
];

unsafe extern "C" fn load_module(
    _: *const u8,
    _: usize,
    _: u64,
    specifier: *const u8,
    specifier_length: usize,
    resource_name: *mut StdString,
    kind: *mut u32,
    unique_id: *mut u64,
    code: *mut StdString,
    _: *mut V8Value,
) -> i32 {
    let specifier = unsafe { text(specifier, specifier_length) };
    let Some(&(_, id, source)) = MODULES.iter().find(|(name, _, _)| *name == specifier) else {
        return HOST_NOT_HANDLED;
    };
    RECORDER.lock().module_loads.push(specifier.clone());
    unsafe {
        *resource_name = specifier;
        *kind = 1;
        *unique_id = id;
        *code = source.to_string();
    }
    HOST_OK
}

unsafe extern "C" fn create_module_context(
    _: *const u8,
    _: usize,
    _: u64,
    _: *mut StdStringArray,
    _: *mut StdV8ValueArray,
) -> i32 {
    HOST_OK
}

unsafe extern "C" fn cache_size() -> usize {
    64
}

unsafe extern "C" fn create_debug_agent(
    _: *const u8,
    _: usize,
    _: *const u8,
    _: usize,
    _: u16,
    _: bool,
    callback: *mut V8DebugCallbackHandle,
) -> *mut c_void {
    unsafe { v8host_ffi::V8DebugCallback_DestroyHandle(callback) };
    std::ptr::null_mut()
}

unsafe extern "C" fn send_debug_message(_: *mut c_void, _: *const u8, _: usize) {}

unsafe extern "C" fn destroy_debug_agent(_: *mut c_void) {}

unsafe extern "C" fn queue_native_callback(thunk: Option<unsafe extern "C" fn()>, handle: *mut NativeCallbackHandle) {
    let handle = handle as usize;
    std::thread::spawn(move || match thunk {
        Some(thunk) => unsafe { thunk() },
        None => unsafe {
            let handle = handle as *mut NativeCallbackHandle;
            v8host_ffi::NativeCallback_Invoke(handle);
            v8host_ffi::NativeCallback_DestroyHandle(handle);
        },
    });
}

unsafe extern "C" fn write_bytes_to_stream(_: *mut c_void, bytes: *const u8, len: usize) {
    let bytes = unsafe { std::slice::from_raw_parts(bytes, len) };
    RECORDER.lock().snapshot.extend_from_slice(bytes);
}

unsafe extern "C" fn invoke_host_action(action: *mut c_void) {
    RECORDER.lock().actions.push((action as usize, None));
}

unsafe extern "C" fn invoke_host_action_with_arg(action: *mut c_void, arg: *mut c_void) {
    if action as usize == FILL_BUFFER_ACTION {
        let data = unsafe { &*arg.cast::<v8host_ffi::V8BufferData>() };
        unsafe { std::ptr::write_bytes(data.data, 7, data.size) };
    }
    RECORDER.lock().actions.push((action as usize, Some(arg as usize)));
}

/// Action id that fills the lent buffer with sevens.
pub(crate) const FILL_BUFFER_ACTION: usize = 0xF111;

pub(crate) static TABLE: HostMethodTable = HostMethodTable {
    schedule_script_engine_exception,
    release_host_object,
    get_property,
    set_property,
    delete_property,
    get_property_names,
    get_indexed_property: get_indexed,
    set_indexed_property: set_indexed,
    delete_indexed_property: delete_indexed,
    get_property_indices,
    invoke,
    invoke_method,
    get_enumerator,
    get_async_enumerator: get_enumerator,
    get_invocability,
    load_module,
    create_module_context,
    get_max_script_cache_size: cache_size,
    get_max_module_cache_size: cache_size,
    create_debug_agent,
    send_debug_message,
    destroy_debug_agent,
    queue_native_callback,
    write_bytes_to_stream,
    invoke_host_action,
    invoke_host_action_with_arg,
};

/// Installs the recording table and clears earlier recordings.
pub(crate) fn install() {
    unsafe { V8Host_SetMethodTable(&raw const TABLE) };
    *RECORDER.lock() = Recorder::default();
}

pub(crate) fn take_exceptions() -> Vec<RecordedException> {
    std::mem::take(&mut RECORDER.lock().exceptions)
}

pub(crate) fn create_isolate(flags: u32) -> *mut V8IsolateHandle {
    let name = "ffi-test";
    let isolate = unsafe { V8Isolate_Create(name.as_ptr(), name.len(), std::ptr::null(), flags, 0) };
    assert!(!isolate.is_null(), "isolate creation failed: {:?}", take_exceptions());
    isolate
}

pub(crate) fn create_context(isolate: *mut V8IsolateHandle) -> *mut V8ContextHandle {
    let name = "ffi-context";
    let context = unsafe { V8Isolate_CreateContext(isolate, name.as_ptr(), name.len(), 0) };
    assert!(!context.is_null(), "context creation failed: {:?}", take_exceptions());
    context
}

pub(crate) fn document(name: &'static str, kind: u32) -> V8DocumentInfo {
    V8DocumentInfo {
        resource_name: name.as_ptr(),
        resource_name_length: name.len(),
        source_map_url: std::ptr::null(),
        source_map_url_length: 0,
        unique_id: 0,
        kind,
    }
}

/// Runs `code` as a classic script and returns the raw completion value.
pub(crate) fn execute(context: *const V8ContextHandle, code: &str) -> V8Value {
    let document = document("ffi.js", 0);
    let mut result = V8Value::default();
    unsafe {
        v8host_ffi::V8Context_ExecuteCode(context, &raw const document, code.as_ptr(), code.len(), true, &raw mut result);
    }
    result
}

/// Copies an engine-written string value and clears it.
pub(crate) fn take_string(value: &mut V8Value) -> String {
    assert_eq!(value.kind, V8ValueKind::String);
    let result = unsafe { text(value.data.cast::<u8>(), value.length) };
    unsafe { v8host_ffi::V8Value_Clear(value) };
    result
}

pub(crate) fn host_object_value(pointer: usize) -> V8Value {
    V8Value {
        kind: V8ValueKind::HostObject,
        data: pointer as *mut c_void,
        ..V8Value::default()
    }
}

pub(crate) fn teardown(isolate: *mut V8IsolateHandle, context: *mut V8ContextHandle) {
    unsafe {
        v8host_ffi::V8Context_Release(context);
        v8host_ffi::V8Context_DestroyHandle(context);
        v8host_ffi::V8Isolate_Release(isolate);
        v8host_ffi::V8Isolate_DestroyHandle(isolate);
    }
}
