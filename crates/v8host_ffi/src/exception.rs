use std::cell::RefCell;
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};

use v8host_runtime::{HostException, V8Exception, V8ExceptionKind};

use crate::host;
use crate::value::{V8Value, V8Value_Clear};

/// A [`V8Exception`] as delivered to `schedule_script_engine_exception`.
/// Every pointer is valid only for the duration of that call.
#[repr(C)]
pub struct V8ExceptionInfo {
    /// 0 general, 1 fatal, 2 interrupt
    pub kind: u32,
    pub engine_name: *const u8,
    pub engine_name_length: usize,
    pub message: *const u8,
    pub message_length: usize,
    /// Null when there is no stack trace
    pub stack_trace: *const u8,
    pub stack_trace_length: usize,
    pub execution_started: bool,
    pub script_exception: V8Value,
    /// The token the host passed to [`HostException_Schedule`], if the
    /// failure started there
    pub inner_exception: *mut c_void,
}

/// Token attached to host exceptions that came across the boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostToken(pub(crate) usize);

thread_local! {
    static PENDING_HOST_EXCEPTION: RefCell<Option<HostException>> = const { RefCell::new(None) };
}

/// Records the failure of the host method currently returning `HOST_ERROR`
/// on this thread. `token` comes back as `inner_exception` if the failure
/// surfaces as an engine exception.
///
/// # Safety
/// `message` points to `message_length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn HostException_Schedule(message: *const u8, message_length: usize, token: *mut c_void) {
    let message = unsafe { crate::vector::read_utf8(message, message_length) };
    let mut exception = HostException::new(message);
    if !token.is_null() {
        exception = exception.with_payload(HostToken(token as usize));
    }
    PENDING_HOST_EXCEPTION.with(|pending| *pending.borrow_mut() = Some(exception));
}

/// The exception scheduled by the host method that just failed.
pub(crate) fn take_host_exception(method: &str) -> HostException {
    PENDING_HOST_EXCEPTION
        .with(|pending| pending.borrow_mut().take())
        .unwrap_or_else(|| HostException::new(format!("Host method '{method}' failed")))
}

fn kind_code(kind: V8ExceptionKind) -> u32 {
    match kind {
        V8ExceptionKind::General => 0,
        V8ExceptionKind::Fatal => 1,
        V8ExceptionKind::Interrupt => 2,
    }
}

pub(crate) fn schedule(err: &V8Exception) {
    let Some(methods) = host::methods() else {
        tracing::error!(error = %err, "Engine exception dropped: no host method table");
        return;
    };
    let stack_trace = err.stack_trace.as_deref();
    let mut info = V8ExceptionInfo {
        kind: kind_code(err.kind),
        engine_name: err.engine_name.as_ptr(),
        engine_name_length: err.engine_name.len(),
        message: err.message.as_ptr(),
        message_length: err.message.len(),
        stack_trace: stack_trace.map_or(std::ptr::null(), str::as_ptr),
        stack_trace_length: stack_trace.map_or(0, str::len),
        execution_started: err.execution_started,
        script_exception: V8Value::export(&err.script_exception),
        inner_exception: err
            .inner_exception
            .as_ref()
            .and_then(|inner| inner.payload::<HostToken>())
            .map_or(std::ptr::null_mut(), |token| token.0 as *mut c_void),
    };
    unsafe { (methods.schedule_script_engine_exception)(&raw const info) };
    unsafe { V8Value_Clear(&raw mut info.script_exception) };
}

/// Runs an entry point body, routing failures and panics to the host and
/// returning `fallback` in their place.
pub(crate) fn guard<R>(fallback: R, body: impl FnOnce() -> Result<R, V8Exception>) -> R {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            schedule(&err);
            fallback
        }
        Err(_) => {
            tracing::error!("Panic caught at the C boundary");
            schedule(&V8Exception::general("Unexpected panic in the engine binding"));
            fallback
        }
    }
}
