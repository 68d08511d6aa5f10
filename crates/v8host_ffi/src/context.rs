use v8host_runtime::{DocumentInfo, DocumentKind, V8CacheKind, V8CacheResult, V8Context, V8Exception};

use crate::exception::guard;
use crate::handle::{self, Handle, entity};
use crate::object::V8ScriptHandle;
use crate::value::V8Value;
use crate::vector::{StdByteArray, read_utf8};

pub type V8ContextHandle = Handle<V8Context>;

unsafe fn context(ptr: *const V8ContextHandle) -> Result<V8Context, V8Exception> {
    unsafe { entity(ptr, "context") }
}

fn document_kind(kind: u32) -> Result<DocumentKind, V8Exception> {
    match kind {
        0 => Ok(DocumentKind::Script),
        1 => Ok(DocumentKind::Module),
        2 => Ok(DocumentKind::Json),
        3 => Ok(DocumentKind::Text),
        other => Err(V8Exception::general(format!("Unknown document kind {other}"))),
    }
}

fn cache_kind(kind: u32) -> Result<V8CacheKind, V8Exception> {
    match kind {
        0 => Ok(V8CacheKind::None),
        1 => Ok(V8CacheKind::Produce),
        2 => Ok(V8CacheKind::Consume),
        3 => Ok(V8CacheKind::Update),
        other => Err(V8Exception::general(format!("Unknown cache kind {other}"))),
    }
}

fn cache_result_code(result: V8CacheResult) -> u32 {
    match result {
        V8CacheResult::Disabled => 0,
        V8CacheResult::Accepted => 1,
        V8CacheResult::Verified => 2,
        V8CacheResult::Updated => 3,
        V8CacheResult::UpdateFailed => 4,
    }
}

/// Describes the document a piece of code came from.
#[repr(C)]
pub struct V8DocumentInfo {
    pub resource_name: *const u8,
    pub resource_name_length: usize,
    /// Null when there is none
    pub source_map_url: *const u8,
    pub source_map_url_length: usize,
    /// Zero assigns a fresh id
    pub unique_id: u64,
    /// 0 script, 1 module, 2 JSON, 3 text
    pub kind: u32,
}

impl V8DocumentInfo {
    unsafe fn to_document(&self) -> Result<DocumentInfo, V8Exception> {
        let name = unsafe { read_utf8(self.resource_name, self.resource_name_length) };
        let mut document = DocumentInfo::new(name, document_kind(self.kind)?);
        if !self.source_map_url.is_null() {
            let url = unsafe { read_utf8(self.source_map_url, self.source_map_url_length) };
            document = document.with_source_map_url(url);
        }
        if self.unique_id != 0 {
            document = document.with_unique_id(self.unique_id);
        }
        Ok(document)
    }
}

unsafe fn read_document(document: *const V8DocumentInfo) -> Result<DocumentInfo, V8Exception> {
    let document = unsafe { document.as_ref() }.ok_or_else(|| V8Exception::general("Missing document info"))?;
    unsafe { document.to_document() }
}

/// # Safety
/// `context_handle` is a live context handle; `value` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_GetRootObject(context_handle: *const V8ContextHandle, value: *mut V8Value) {
    guard((), || {
        let root = unsafe { context(context_handle) }?.get_root_object()?;
        unsafe { V8Value::write(value, &root) };
        Ok(())
    });
}

/// # Safety
/// `context_handle` is a live context handle; `name` points to
/// `name_length` readable bytes; `value` is a host-supplied value.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_SetGlobalProperty(
    context_handle: *const V8ContextHandle,
    name: *const u8,
    name_length: usize,
    value: *const V8Value,
    global_members: bool,
) {
    let name = unsafe { read_utf8(name, name_length) };
    let value = unsafe { V8Value::read(value) };
    guard((), || unsafe { context(context_handle) }?.set_global_property(&name, value, global_members));
}

/// # Safety
/// `context_handle` is a live context handle; `name` points to
/// `name_length` readable bytes; `value` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_GetGlobalProperty(
    context_handle: *const V8ContextHandle,
    name: *const u8,
    name_length: usize,
    value: *mut V8Value,
) {
    let name = unsafe { read_utf8(name, name_length) };
    guard((), || {
        let result = unsafe { context(context_handle) }?.get_global_property(&name)?;
        unsafe { V8Value::write(value, &result) };
        Ok(())
    });
}

/// Runs `code` as the described document, writing the completion value to
/// `result` when `evaluate` is set.
///
/// # Safety
/// `context_handle` is a live context handle; `document` is valid for
/// reads; `code` points to `code_length` readable bytes; `result` is null or
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_ExecuteCode(
    context_handle: *const V8ContextHandle,
    document: *const V8DocumentInfo,
    code: *const u8,
    code_length: usize,
    evaluate: bool,
    result: *mut V8Value,
) {
    let code = unsafe { read_utf8(code, code_length) };
    guard((), || {
        let document = unsafe { read_document(document) }?;
        let value = unsafe { context(context_handle) }?.execute(&document, &code, evaluate)?;
        unsafe { V8Value::write(result, &value) };
        Ok(())
    });
}

/// Compiles `code` into a script handle. `cache_kind` is 0 none, 1 produce,
/// 2 consume, 3 update; `cache_bytes` carries the caller's bytes in and, for
/// produced or updated caches, the engine's bytes out. `cache_result`
/// receives 0 disabled, 1 accepted, 2 verified, 3 updated or 4 update failed.
///
/// # Safety
/// `context_handle` is a live context handle; `document` is valid for
/// reads; `code` points to `code_length` readable bytes; `cache_bytes` and
/// `cache_result` are null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_Compile(
    context_handle: *const V8ContextHandle,
    document: *const V8DocumentInfo,
    code: *const u8,
    code_length: usize,
    cache_kind_code: u32,
    cache_bytes: *mut StdByteArray,
    cache_result: *mut u32,
) -> *mut V8ScriptHandle {
    let code = unsafe { read_utf8(code, code_length) };
    let cache_bytes = unsafe { cache_bytes.as_mut() };
    guard(std::ptr::null_mut(), || {
        let document = unsafe { read_document(document) }?;
        let kind = cache_kind(cache_kind_code)?;
        let mut bytes = cache_bytes.as_ref().map(|bytes| bytes.to_vec()).unwrap_or_default();
        let (script, result) =
            unsafe { context(context_handle) }?.compile_with_cache(&document, &code, kind, &mut bytes)?;
        if let Some(out) = cache_bytes {
            *out = bytes;
        }
        if let Some(out) = unsafe { cache_result.as_mut() } {
            *out = cache_result_code(result);
        }
        Ok(Handle::into_raw(script))
    })
}

/// # Safety
/// `context_handle` and `script_handle` are live handles; `result` is null
/// or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_ExecuteScript(
    context_handle: *const V8ContextHandle,
    script_handle: *const V8ScriptHandle,
    evaluate: bool,
    result: *mut V8Value,
) {
    guard((), || {
        let script = unsafe { entity(script_handle, "script") }?;
        let value = unsafe { context(context_handle) }?.execute_script(&script, evaluate)?;
        unsafe { V8Value::write(result, &value) };
        Ok(())
    });
}

/// Terminates script running in the context's isolate. Safe to call from
/// any thread.
///
/// # Safety
/// `context_handle` is a live context handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_Interrupt(context_handle: *const V8ContextHandle) {
    guard((), || {
        unsafe { context(context_handle) }?.interrupt();
        Ok(())
    });
}

/// # Safety
/// `context_handle` is a live context handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_CancelInterrupt(context_handle: *const V8ContextHandle) {
    guard((), || {
        unsafe { context(context_handle) }?.cancel_interrupt();
        Ok(())
    });
}

/// # Safety
/// `context_handle` is a live context handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_OnAccessSettingsChanged(context_handle: *const V8ContextHandle) {
    guard((), || unsafe { context(context_handle) }?.on_access_settings_changed());
}

/// Destroys the context and empties every clone of the handle. Repeated
/// calls do nothing.
///
/// # Safety
/// `context_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_Release(context_handle: *const V8ContextHandle) {
    let Some(context) = (unsafe { handle::release(context_handle) }) else {
        return;
    };
    guard((), || context.destroy());
}

/// # Safety
/// `context_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_CloneHandle(context_handle: *const V8ContextHandle) -> *mut V8ContextHandle {
    unsafe { handle::clone_handle(context_handle) }
}

/// # Safety
/// `context_handle` is null or a handle that has not been destroyed; it
/// must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Context_DestroyHandle(context_handle: *mut V8ContextHandle) {
    unsafe { handle::destroy(context_handle) };
}
