//! Entry points over script objects, compiled scripts, debugger callbacks and
//! queued native callbacks.

use std::ffi::c_void;

use v8host_runtime::{
    DebugCallback, NativeCallback, PromiseState, V8Context, V8Exception, V8ObjectHolder, V8Script,
};

use crate::context::V8ContextHandle;
use crate::exception::guard;
use crate::handle::{self, Handle, entity};
use crate::host::methods;
use crate::value::{V8Value, read_args};
use crate::vector::{StdStringArray, StdUInt32Array, StdV8ValueArray, read_utf8};

pub type V8ObjectHandle = Handle<V8ObjectHolder>;
pub type V8ScriptHandle = Handle<V8Script>;
pub type V8DebugCallbackHandle = Handle<DebugCallback>;
pub type NativeCallbackHandle = Handle<NativeCallback>;

unsafe fn target(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
) -> Result<(V8Context, V8ObjectHolder), V8Exception> {
    let context = unsafe { entity(context_handle, "context") }?;
    let object = unsafe { entity(object_handle, "script object") }?;
    Ok((context, object))
}

/// # Safety
/// Handles are live; `name` points to `name_length` readable bytes; `value`
/// is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_GetNamedProperty(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    name: *const u8,
    name_length: usize,
    value: *mut V8Value,
) {
    let name = unsafe { read_utf8(name, name_length) };
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let result = context.get_property(&object, &name)?;
        unsafe { V8Value::write(value, &result) };
        Ok(())
    });
}

/// # Safety
/// Handles are live; `name` points to `name_length` readable bytes; `value`
/// is a host-supplied value.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_SetNamedProperty(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    name: *const u8,
    name_length: usize,
    value: *const V8Value,
) {
    let name = unsafe { read_utf8(name, name_length) };
    let value = unsafe { V8Value::read(value) };
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        context.set_property(&object, &name, value)
    });
}

/// # Safety
/// Handles are live; `name` points to `name_length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_DeleteNamedProperty(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    name: *const u8,
    name_length: usize,
) -> bool {
    let name = unsafe { read_utf8(name, name_length) };
    guard(false, || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        context.delete_property(&object, &name)
    })
}

/// # Safety
/// Handles are live; `names` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_GetPropertyNames(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    include_indices: bool,
    names: *mut StdStringArray,
) {
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let result = context.get_property_names(&object, include_indices)?;
        if let Some(names) = unsafe { names.as_mut() } {
            *names = result;
        }
        Ok(())
    });
}

/// # Safety
/// Handles are live; `value` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_GetIndexedProperty(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    index: u32,
    value: *mut V8Value,
) {
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let result = context.get_indexed_property(&object, index)?;
        unsafe { V8Value::write(value, &result) };
        Ok(())
    });
}

/// # Safety
/// Handles are live; `value` is a host-supplied value.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_SetIndexedProperty(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    index: u32,
    value: *const V8Value,
) {
    let value = unsafe { V8Value::read(value) };
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        context.set_indexed_property(&object, index, value)
    });
}

/// # Safety
/// Handles are live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_DeleteIndexedProperty(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    index: u32,
) -> bool {
    guard(false, || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        context.delete_indexed_property(&object, index)
    })
}

/// # Safety
/// Handles are live; `indices` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_GetPropertyIndices(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    indices: *mut StdUInt32Array,
) {
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let result = context.get_property_indices(&object)?;
        if let Some(indices) = unsafe { indices.as_mut() } {
            *indices = result;
        }
        Ok(())
    });
}

/// # Safety
/// Handles are live; `args` is null or an array of host-supplied values;
/// `result` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_Invoke(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    as_constructor: bool,
    args: *const StdV8ValueArray,
    result: *mut V8Value,
) {
    let args = unsafe { read_args(args) };
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let value = context.invoke(&object, as_constructor, args)?;
        unsafe { V8Value::write(result, &value) };
        Ok(())
    });
}

/// # Safety
/// Handles are live; `name` points to `name_length` readable bytes; `args`
/// is null or an array of host-supplied values; `result` is valid for
/// writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_InvokeMethod(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    name: *const u8,
    name_length: usize,
    args: *const StdV8ValueArray,
    result: *mut V8Value,
) {
    let name = unsafe { read_utf8(name, name_length) };
    let args = unsafe { read_args(args) };
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let value = context.invoke_method(&object, &name, args)?;
        unsafe { V8Value::write(result, &value) };
        Ok(())
    });
}

/// Writes 0 pending, 1 fulfilled or 2 rejected to `state`, and the settled
/// value to `result`.
///
/// # Safety
/// Handles are live; `state` and `result` are null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_GetPromiseState(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    state: *mut u32,
    result: *mut V8Value,
) {
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let (code, value) = match context.get_promise_state(&object)? {
            PromiseState::Pending => (0, None),
            PromiseState::Fulfilled(value) => (1, Some(value)),
            PromiseState::Rejected(value) => (2, Some(value)),
        };
        if let Some(state) = unsafe { state.as_mut() } {
            *state = code;
        }
        if let Some(value) = value {
            unsafe { V8Value::write(result, &value) };
        }
        Ok(())
    });
}

/// Layout of an array buffer or a view onto one.
#[repr(C)]
#[derive(Debug)]
pub struct V8ArrayBufferOrViewInfo {
    pub subtype: u32,
    pub offset: usize,
    pub size: usize,
    /// Element count for typed arrays, byte count otherwise
    pub length: usize,
    /// Host-owned handle to the underlying buffer
    pub buffer: *mut V8ObjectHandle,
}

/// # Safety
/// Handles are live; `info` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_GetArrayBufferOrViewInfo(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    info: *mut V8ArrayBufferOrViewInfo,
) {
    guard((), || {
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        let layout = context.get_array_buffer_or_view_info(&object)?;
        if let Some(info) = unsafe { info.as_mut() } {
            *info = V8ArrayBufferOrViewInfo {
                subtype: layout.subtype as u32,
                offset: layout.offset,
                size: layout.size,
                length: layout.length,
                buffer: Handle::into_raw(layout.buffer),
            };
        }
        Ok(())
    });
}

/// Bytes lent to `invoke_host_action_with_arg` for the duration of the
/// call.
#[repr(C)]
pub struct V8BufferData {
    pub data: *mut u8,
    pub size: usize,
}

/// Calls the host action on the isolate thread with a `V8BufferData`
/// covering the buffer or view bytes.
///
/// # Safety
/// Handles are live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_InvokeWithArrayBufferOrViewData(
    context_handle: *const V8ContextHandle,
    object_handle: *const V8ObjectHandle,
    action: *mut c_void,
) {
    let action = action as usize;
    guard((), || {
        let methods = methods().ok_or_else(|| V8Exception::general("No host method table is installed"))?;
        let (context, object) = unsafe { target(context_handle, object_handle) }?;
        context.with_array_buffer_or_view_data(&object, move |bytes| {
            let mut data = V8BufferData {
                data: bytes.as_mut_ptr(),
                size: bytes.len(),
            };
            unsafe {
                (methods.invoke_host_action_with_arg)(
                    action as *mut c_void,
                    (&raw mut data).cast::<c_void>(),
                );
            }
        })
    });
}

/// Releases the script object for every clone of the handle.
///
/// # Safety
/// `object_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_Release(object_handle: *const V8ObjectHandle) {
    if let Some(object) = unsafe { handle::release(object_handle) } {
        object.release();
    }
}

/// # Safety
/// `object_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_CloneHandle(object_handle: *const V8ObjectHandle) -> *mut V8ObjectHandle {
    unsafe { handle::clone_handle(object_handle) }
}

/// # Safety
/// `object_handle` is null or a handle that has not been destroyed; it must
/// not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Object_DestroyHandle(object_handle: *mut V8ObjectHandle) {
    unsafe { handle::destroy(object_handle) };
}

/// # Safety
/// `script_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Script_Release(script_handle: *const V8ScriptHandle) {
    if let Some(script) = unsafe { handle::release(script_handle) } {
        script.release();
    }
}

/// # Safety
/// `script_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Script_CloneHandle(script_handle: *const V8ScriptHandle) -> *mut V8ScriptHandle {
    unsafe { handle::clone_handle(script_handle) }
}

/// # Safety
/// `script_handle` is null or a handle that has not been destroyed; it must
/// not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Script_DestroyHandle(script_handle: *mut V8ScriptHandle) {
    unsafe { handle::destroy(script_handle) };
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8DebugCallback_ConnectClient(callback_handle: *const V8DebugCallbackHandle) {
    if let Some(callback) = unsafe { handle::handle_ref(callback_handle) }.and_then(Handle::get) {
        callback.connect_client();
    }
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed;
/// `message` points to `message_length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8DebugCallback_SendCommand(
    callback_handle: *const V8DebugCallbackHandle,
    message: *const u8,
    message_length: usize,
) {
    let message = unsafe { read_utf8(message, message_length) };
    if let Some(callback) = unsafe { handle::handle_ref(callback_handle) }.and_then(Handle::get) {
        callback.send_command(message);
    }
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8DebugCallback_DisconnectClient(callback_handle: *const V8DebugCallbackHandle) {
    if let Some(callback) = unsafe { handle::handle_ref(callback_handle) }.and_then(Handle::get) {
        callback.disconnect_client();
    }
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8DebugCallback_Release(callback_handle: *const V8DebugCallbackHandle) {
    drop(unsafe { handle::release(callback_handle) });
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8DebugCallback_CloneHandle(
    callback_handle: *const V8DebugCallbackHandle,
) -> *mut V8DebugCallbackHandle {
    unsafe { handle::clone_handle(callback_handle) }
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed; it
/// must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8DebugCallback_DestroyHandle(callback_handle: *mut V8DebugCallbackHandle) {
    unsafe { handle::destroy(callback_handle) };
}

/// Runs a queued native callback. Only the first call on a handle (or any
/// of its clones) does anything.
///
/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NativeCallback_Invoke(callback_handle: *const NativeCallbackHandle) {
    let Some(callback) = (unsafe { handle::release(callback_handle) }) else {
        return;
    };
    guard((), || {
        callback();
        Ok(())
    });
}

/// # Safety
/// `callback_handle` is null or a handle that has not been destroyed; it
/// must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NativeCallback_DestroyHandle(callback_handle: *mut NativeCallbackHandle) {
    unsafe { handle::destroy(callback_handle) };
}
