use std::ffi::c_void;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use v8host_runtime::scheduler::TaskKind;
use v8host_runtime::{ContextConfig, DebuggerConfig, IsolateConfig, V8Exception, V8Isolate};

use crate::context::V8ContextHandle;
use crate::exception::guard;
use crate::flags::{ContextFlags, IsolateFlags};
use crate::handle::{self, Handle, entity};
use crate::host::{FfiHost, HostMethodTable, methods};
use crate::vector::read_utf8;

pub type V8IsolateHandle = Handle<V8Isolate>;

/// Resource constraints fixed at isolate creation. Zero leaves a limit
/// unset.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V8IsolateConstraints {
    pub max_new_space_size: usize,
    pub max_old_space_size: usize,
    /// Values below one keep the default
    pub heap_expansion_multiplier: f64,
    pub max_array_buffer_allocation: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V8HeapStatistics {
    pub total_heap_size: usize,
    pub total_heap_size_executable: usize,
    pub total_physical_size: usize,
    pub total_available_size: usize,
    pub used_heap_size: usize,
    pub heap_size_limit: usize,
    pub malloced_memory: usize,
    pub external_memory: usize,
    pub number_of_native_contexts: usize,
    pub number_of_detached_contexts: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V8IsolateStatistics {
    pub script_count: usize,
    pub module_count: usize,
    pub script_cache_size: usize,
    pub module_cache_size: usize,
    pub context_count: usize,
    pub object_count: usize,
    pub array_buffer_allocation: usize,
}

fn isolate_config(
    name: String,
    constraints: Option<&V8IsolateConstraints>,
    flags: IsolateFlags,
    debug_port: i32,
) -> IsolateConfig {
    let mut config = IsolateConfig::default()
        .with_name(name)
        .with_dynamic_module_imports(flags.contains(IsolateFlags::ENABLE_DYNAMIC_MODULE_IMPORTS))
        .with_disable_heap_size_violation_interrupt(
            flags.contains(IsolateFlags::DISABLE_HEAP_SIZE_VIOLATION_INTERRUPT),
        );
    if let Some(constraints) = constraints {
        config.max_new_space_size = constraints.max_new_space_size;
        config.max_old_space_size = constraints.max_old_space_size;
        config.max_array_buffer_allocation = constraints.max_array_buffer_allocation;
        if constraints.heap_expansion_multiplier >= 1.0 {
            config.heap_expansion_multiplier = constraints.heap_expansion_multiplier;
        }
    }
    if flags.contains(IsolateFlags::ENABLE_DEBUGGING) {
        config = config.with_debugger(DebuggerConfig {
            enabled: true,
            remote: flags.contains(IsolateFlags::ENABLE_REMOTE_DEBUGGING),
            port: debug_port,
        });
    }
    config
}

fn context_config(name: String, flags: ContextFlags) -> ContextConfig {
    ContextConfig::default()
        .with_name(name)
        .with_debugging(flags.contains(ContextFlags::ENABLE_DEBUGGING))
        .with_dynamic_module_imports(flags.contains(ContextFlags::ENABLE_DYNAMIC_MODULE_IMPORTS))
        .with_date_time_conversion(flags.contains(ContextFlags::ENABLE_DATE_TIME_CONVERSION))
        .with_hide_host_exceptions(flags.contains(ContextFlags::HIDE_HOST_EXCEPTIONS))
        .with_interrupt_propagation(flags.contains(ContextFlags::ENABLE_INTERRUPT_PROPAGATION))
        .with_task_promise_conversion(flags.contains(ContextFlags::ENABLE_TASK_PROMISE_CONVERSION))
}

unsafe fn isolate(ptr: *const V8IsolateHandle) -> Result<V8Isolate, V8Exception> {
    unsafe { entity(ptr, "isolate") }
}

/// Creates an isolate on a new thread. Returns null after scheduling an
/// exception on failure.
///
/// # Safety
/// `name` points to `name_length` readable bytes; `constraints` is null or
/// valid for reads.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_Create(
    name: *const u8,
    name_length: usize,
    constraints: *const V8IsolateConstraints,
    flags: u32,
    debug_port: i32,
) -> *mut V8IsolateHandle {
    let name = unsafe { read_utf8(name, name_length) };
    let constraints = unsafe { constraints.as_ref() };
    guard(std::ptr::null_mut(), || {
        let config = isolate_config(name, constraints, IsolateFlags::from_bits_truncate(flags), debug_port);
        let isolate = V8Isolate::new(config, Arc::new(FfiHost))?;
        Ok(Handle::into_raw(isolate))
    })
}

/// # Safety
/// `isolate_handle` is a live isolate handle; `name` points to `name_length`
/// readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_CreateContext(
    isolate_handle: *const V8IsolateHandle,
    name: *const u8,
    name_length: usize,
    flags: u32,
) -> *mut V8ContextHandle {
    let name = unsafe { read_utf8(name, name_length) };
    guard(std::ptr::null_mut(), || {
        let isolate = unsafe { isolate(isolate_handle) }?;
        let context = isolate.create_context(context_config(name, ContextFlags::from_bits_truncate(flags)))?;
        Ok(Handle::into_raw(context))
    })
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_GetMaxHeapSize(isolate_handle: *const V8IsolateHandle) -> usize {
    guard(0, || Ok(unsafe { isolate(isolate_handle) }?.max_heap_size()))
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_SetMaxHeapSize(isolate_handle: *const V8IsolateHandle, bytes: usize) {
    guard((), || {
        unsafe { isolate(isolate_handle) }?.set_max_heap_size(bytes);
        Ok(())
    });
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_GetHeapSizeSampleInterval(isolate_handle: *const V8IsolateHandle) -> f64 {
    guard(0.0, || {
        Ok(unsafe { isolate(isolate_handle) }?.heap_size_sample_interval().as_secs_f64() * 1000.0)
    })
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_SetHeapSizeSampleInterval(
    isolate_handle: *const V8IsolateHandle,
    milliseconds: f64,
) {
    guard((), || {
        let interval = Duration::try_from_secs_f64(milliseconds.max(0.0) / 1000.0).unwrap_or(Duration::ZERO);
        unsafe { isolate(isolate_handle) }?.set_heap_size_sample_interval(interval);
        Ok(())
    });
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_GetMaxStackUsage(isolate_handle: *const V8IsolateHandle) -> usize {
    guard(0, || Ok(unsafe { isolate(isolate_handle) }?.max_stack_usage()))
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_SetMaxStackUsage(isolate_handle: *const V8IsolateHandle, bytes: usize) {
    guard((), || {
        unsafe { isolate(isolate_handle) }?.set_max_stack_usage(bytes);
        Ok(())
    });
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_IsOutOfMemory(isolate_handle: *const V8IsolateHandle) -> bool {
    guard(false, || Ok(unsafe { isolate(isolate_handle) }?.is_out_of_memory()))
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_AwaitDebuggerAndPause(isolate_handle: *const V8IsolateHandle) {
    guard((), || unsafe { isolate(isolate_handle) }?.await_debugger_and_pause());
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_CancelAwaitDebugger(isolate_handle: *const V8IsolateHandle) {
    guard((), || {
        unsafe { isolate(isolate_handle) }?.cancel_await_debugger();
        Ok(())
    });
}

/// # Safety
/// `isolate_handle` is a live isolate handle; `statistics` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_GetHeapStatistics(
    isolate_handle: *const V8IsolateHandle,
    statistics: *mut V8HeapStatistics,
) {
    guard((), || {
        let stats = unsafe { isolate(isolate_handle) }?.heap_statistics()?;
        if let Some(out) = unsafe { statistics.as_mut() } {
            *out = V8HeapStatistics {
                total_heap_size: stats.total_heap_size,
                total_heap_size_executable: stats.total_heap_size_executable,
                total_physical_size: stats.total_physical_size,
                total_available_size: stats.total_available_size,
                used_heap_size: stats.used_heap_size,
                heap_size_limit: stats.heap_size_limit,
                malloced_memory: stats.malloced_memory,
                external_memory: stats.external_memory,
                number_of_native_contexts: stats.number_of_native_contexts,
                number_of_detached_contexts: stats.number_of_detached_contexts,
            };
        }
        Ok(())
    });
}

/// # Safety
/// `isolate_handle` is a live isolate handle; `statistics` is valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_GetStatistics(
    isolate_handle: *const V8IsolateHandle,
    statistics: *mut V8IsolateStatistics,
) {
    guard((), || {
        let stats = unsafe { isolate(isolate_handle) }?.statistics()?;
        if let Some(out) = unsafe { statistics.as_mut() } {
            *out = V8IsolateStatistics {
                script_count: stats.script_count,
                module_count: stats.module_count,
                script_cache_size: stats.script_cache_size,
                module_cache_size: stats.module_cache_size,
                context_count: stats.context_count,
                object_count: stats.object_count,
                array_buffer_allocation: stats.array_buffer_allocation,
            };
        }
        Ok(())
    });
}

fn task_kind(kind: u32) -> Option<TaskKind> {
    TaskKind::ALL.get(kind as usize).copied()
}

/// Posted and invoked counts for one task kind: 0 worker, 1 delayed worker,
/// 2 foreground, 3 non-nestable foreground, 4 delayed foreground, 5
/// non-nestable delayed foreground.
///
/// # Safety
/// `isolate_handle` is a live isolate handle; `posted` and `invoked` are null or
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_GetTaskCount(
    isolate_handle: *const V8IsolateHandle,
    kind: u32,
    posted: *mut u64,
    invoked: *mut u64,
) {
    guard((), || {
        let kind = task_kind(kind).ok_or_else(|| V8Exception::general(format!("Unknown task kind {kind}")))?;
        let count = unsafe { isolate(isolate_handle) }?.task_count(kind);
        if let Some(posted) = unsafe { posted.as_mut() } {
            *posted = count.posted;
        }
        if let Some(invoked) = unsafe { invoked.as_mut() } {
            *invoked = count.invoked;
        }
        Ok(())
    });
}

/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_CollectGarbage(isolate_handle: *const V8IsolateHandle, exhaustive: bool) {
    guard((), || unsafe { isolate(isolate_handle) }?.collect_garbage(exhaustive));
}

/// Streams the snapshot through `write_bytes_to_stream`.
struct HostStream {
    methods: HostMethodTable,
    stream: *mut c_void,
}

impl Write for HostStream {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        unsafe { (self.methods.write_bytes_to_stream)(self.stream, bytes.as_ptr(), bytes.len()) };
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// # Safety
/// `isolate_handle` is a live isolate handle; `stream` is whatever the host's
/// `write_bytes_to_stream` accepts.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_WriteHeapSnapshot(isolate_handle: *const V8IsolateHandle, stream: *mut c_void) {
    guard((), || {
        let methods = methods().ok_or_else(|| V8Exception::general("No host method table is installed"))?;
        let mut sink = HostStream { methods, stream };
        unsafe { isolate(isolate_handle) }?.write_heap_snapshot(&mut sink)
    });
}

/// Host pointer carried onto the isolate thread.
#[derive(Clone, Copy)]
struct HostAction(usize);

impl HostAction {
    fn invoke(self) {
        if let Some(methods) = methods() {
            unsafe { (methods.invoke_host_action)(self.0 as *mut c_void) };
        }
    }
}

/// Runs the host action on the isolate thread and waits for it.
///
/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_CallWithLock(isolate_handle: *const V8IsolateHandle, action: *mut c_void) {
    let action = HostAction(action as usize);
    guard((), || unsafe { isolate(isolate_handle) }?.call_with_lock(move || action.invoke()));
}

/// Like [`V8Isolate_CallWithLock`], handing `arg` back with the action.
///
/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_CallWithLockWithArg(
    isolate_handle: *const V8IsolateHandle,
    action: *mut c_void,
    arg: *mut c_void,
) {
    let (action, arg) = (action as usize, arg as usize);
    guard((), || {
        unsafe { isolate(isolate_handle) }?.call_with_lock(move || {
            if let Some(methods) = methods() {
                unsafe { (methods.invoke_host_action_with_arg)(action as *mut c_void, arg as *mut c_void) };
            }
        })
    });
}

/// Queues the host action as a foreground task, after `delay_ms` when
/// positive.
///
/// # Safety
/// `isolate_handle` is a live isolate handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_PostTask(
    isolate_handle: *const V8IsolateHandle,
    allow_nesting: bool,
    delay_ms: u64,
    action: *mut c_void,
) {
    let action = HostAction(action as usize);
    guard((), || {
        let isolate = unsafe { isolate(isolate_handle) }?;
        if delay_ms == 0 {
            isolate.post_task(allow_nesting, move || action.invoke());
        } else {
            isolate.post_delayed_task(allow_nesting, Duration::from_millis(delay_ms), move || action.invoke());
        }
        Ok(())
    });
}

/// Drops the handle's isolate reference for every clone of the handle. The
/// isolate is torn down once no context or compiled script holds it.
///
/// # Safety
/// `isolate_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_Release(isolate_handle: *const V8IsolateHandle) {
    drop(unsafe { handle::release(isolate_handle) });
}

/// # Safety
/// `isolate_handle` is null or a handle that has not been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_CloneHandle(isolate_handle: *const V8IsolateHandle) -> *mut V8IsolateHandle {
    unsafe { handle::clone_handle(isolate_handle) }
}

/// # Safety
/// `isolate_handle` is null or a handle that has not been destroyed; it must
/// not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Isolate_DestroyHandle(isolate_handle: *mut V8IsolateHandle) {
    unsafe { handle::destroy(isolate_handle) };
}
