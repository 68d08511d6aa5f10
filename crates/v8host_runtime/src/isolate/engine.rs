use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Weak};

use super::core::IsolateCore;
use super::debugger::{DebugCallback, DebugDirective, Inspector};
use super::{HeapStatistics, IsolateStatistics};
use crate::cache::CompiledCache;
use crate::context::ContextImpl;
use crate::context::modules::ModuleArtifact;
use crate::document::DocumentInfo;
use crate::error::{
    CONTEXT_DESTROYED_MESSAGE, OUT_OF_MEMORY_MESSAGE, STACK_LIMIT_MESSAGE, V8Exception,
};
use crate::governor::allocator::new_array_buffer_allocator;
use crate::governor::{
    HeapViolationAction, MIN_HEAP_EXPANSION, StackLimits, current_stack_marker,
    exceeds_heap_limit, expanded_heap_limit, governed_heap_size, heap_violation_action,
    heap_watch_interval,
};
use crate::platform::{initialize_platform_once, pump_platform_tasks};
use crate::scheduler::{ExitMessageLoopReason, IdleWork, RunMessageLoopReason, TaskKind};
use crate::script::CompiledUnit;

thread_local! {
    static CURRENT: RefCell<Option<Rc<Engine>>> = const { RefCell::new(None) };
}

struct ExecutionFrame {
    context_id: u64,
    started: bool,
}

struct HeapLimitState {
    core: Weak<IsolateCore>,
    isolate: *mut v8::Isolate,
    multiplier: f64,
}

/// Engine-thread half of an isolate.
///
/// Lives in a thread local of the isolate's dedicated thread; every handle
/// into the engine heap is owned here. Borrows of the cells below are never
/// held across a call into the engine or into host code.
pub(crate) struct Engine {
    pub(crate) core: Arc<IsolateCore>,
    isolate: RefCell<Option<v8::OwnedIsolate>>,
    isolate_ptr: *mut v8::Isolate,
    contexts: RefCell<Vec<Rc<ContextImpl>>>,
    pub(crate) scripts: RefCell<CompiledCache<v8::Global<v8::UnboundScript>>>,
    objects: RefCell<HashMap<u64, v8::Global<v8::Value>>>,
    next_object_id: Cell<u64>,
    compiled: RefCell<HashMap<u64, CompiledUnit>>,
    next_compiled_id: Cell<u64>,
    frames: RefCell<Vec<ExecutionFrame>>,
    stack_limits: Cell<Option<StackLimits>>,
    heap_watch_generation: Cell<u64>,
    inspector: Cell<Option<NonNull<Inspector>>>,
    dynamic_imports_registered: Cell<bool>,
    heap_limit: *mut HeapLimitState,
}

impl Engine {
    pub(crate) fn current() -> Option<Rc<Engine>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Body of the isolate thread: builds the engine, signals `ready`, then
    /// serves host calls and queued callbacks until the isolate is released.
    pub(crate) fn run(core: Arc<IsolateCore>, ready: SyncSender<()>) {
        let engine = Engine::create(core.clone());
        CURRENT.with(|current| *current.borrow_mut() = Some(engine.clone()));
        let _ = ready.send(());
        tracing::debug!(isolate = core.name(), "Isolate thread started");

        loop {
            match core.scheduler.next_idle_work() {
                IdleWork::HostCall(call) => {
                    if catch_unwind(AssertUnwindSafe(call)).is_err() {
                        tracing::error!(isolate = core.name(), "Host call panicked on isolate thread");
                    }
                }
                IdleWork::Drain => engine.with_isolate_scope(|_| ()),
                IdleWork::Shutdown => break,
            }
            engine.pump_platform();
        }

        engine.teardown();
        CURRENT.with(|current| current.borrow_mut().take());
        tracing::debug!(isolate = core.name(), "Isolate thread exiting");
    }

    fn create(core: Arc<IsolateCore>) -> Rc<Engine> {
        initialize_platform_once();
        let config = &core.config;

        let mut params = v8::CreateParams::default()
            .array_buffer_allocator(new_array_buffer_allocator(core.array_buffers.clone()));
        let heap_bytes = config
            .max_new_space_size
            .saturating_add(config.max_old_space_size);
        if heap_bytes > 0 {
            params = params.heap_limits(0, heap_bytes);
        }

        let mut isolate = v8::Isolate::new(params);
        isolate.set_microtasks_policy(v8::MicrotasksPolicy::Explicit);
        isolate.set_capture_stack_trace_for_uncaught_exceptions(true, 32);
        isolate.set_host_initialize_import_meta_object_callback(
            crate::context::modules::import_meta_callback,
        );
        isolate.set_promise_hook(crate::context::promise_hook);
        core.bind_engine(isolate.thread_safe_handle());

        let isolate_ptr: *mut v8::Isolate = &mut *isolate;
        let heap_limit = Box::into_raw(Box::new(HeapLimitState {
            core: core.weak(),
            isolate: isolate_ptr,
            multiplier: config.heap_expansion_multiplier,
        }));
        isolate.add_near_heap_limit_callback(near_heap_limit, heap_limit.cast::<c_void>());

        let inspector = config
            .debugger
            .enabled
            .then(|| NonNull::from(Box::leak(Inspector::new(&mut isolate, core.weak()))));

        let engine = Rc::new(Engine {
            core: core.clone(),
            isolate: RefCell::new(Some(isolate)),
            isolate_ptr,
            contexts: RefCell::new(Vec::new()),
            scripts: RefCell::new(CompiledCache::default()),
            objects: RefCell::new(HashMap::new()),
            next_object_id: Cell::new(1),
            compiled: RefCell::new(HashMap::new()),
            next_compiled_id: Cell::new(1),
            frames: RefCell::new(Vec::new()),
            stack_limits: Cell::new(None),
            heap_watch_generation: Cell::new(0),
            inspector: Cell::new(inspector),
            dynamic_imports_registered: Cell::new(false),
            heap_limit,
        });

        if config.enable_dynamic_module_imports {
            engine.enable_dynamic_imports();
        }
        if inspector.is_some() {
            engine.attach_debug_agent();
        }
        engine
    }

    /// The isolate is alive for as long as the engine is and is only ever
    /// touched from this thread.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn isolate_mut(&self) -> &mut v8::Isolate {
        // SAFETY: see above; teardown is the last use of the pointer
        unsafe { &mut *self.isolate_ptr }
    }

    /// Runs `f` in a fresh handle scope and drains runnable callbacks on the
    /// way out.
    pub(crate) fn with_isolate_scope<R>(
        &self,
        f: impl FnOnce(&mut v8::HandleScope<'_, ()>) -> R,
    ) -> R {
        let result = {
            let scope = &mut unsafe { v8::CallbackScope::new(self.isolate_mut()) };
            let scope = &mut v8::HandleScope::new(scope);
            f(scope)
        };
        self.core.scheduler.drain();
        result
    }

    fn pump_platform(&self) {
        if self.isolate.borrow().is_some() {
            pump_platform_tasks(self.isolate_mut());
        }
    }

    fn teardown(&self) {
        self.heap_watch_generation
            .set(self.heap_watch_generation.get().wrapping_add(1));
        let contexts = std::mem::take(&mut *self.contexts.borrow_mut());
        if !contexts.is_empty() {
            self.with_isolate_scope(|scope| {
                for context in &contexts {
                    context.dispose(self, scope);
                }
            });
        }
        drop(contexts);

        self.scripts.borrow_mut().clear();
        self.compiled.borrow_mut().clear();
        self.objects.borrow_mut().clear();

        if let Some(inspector) = self.inspector.take() {
            // SAFETY: leaked in create and never freed elsewhere
            drop(unsafe { Box::from_raw(inspector.as_ptr()) });
        }
        drop(self.isolate.borrow_mut().take());
        // SAFETY: the isolate that could call back with it is gone
        drop(unsafe { Box::from_raw(self.heap_limit) });
    }

    // Contexts

    pub(crate) fn add_context(&self, context: Rc<ContextImpl>) {
        if let Some(inspector) = self.inspector() {
            self.with_isolate_scope(|scope| {
                let local = v8::Local::new(scope, context.v8_context());
                inspector.context_created(local, &context.config.name, context.config.enable_debugging);
            });
        }
        let mut contexts = self.contexts.borrow_mut();
        if context.config.enable_debugging {
            contexts.insert(0, context);
        } else {
            contexts.push(context);
        }
    }

    pub(crate) fn context_by_id(&self, id: u64) -> Option<Rc<ContextImpl>> {
        self.contexts.borrow().iter().find(|c| c.id == id).cloned()
    }

    pub(crate) fn context_for(
        &self,
        scope: &mut v8::HandleScope<'_, ()>,
        context: v8::Local<'_, v8::Context>,
    ) -> Option<Rc<ContextImpl>> {
        let contexts = self.contexts.borrow().clone();
        contexts
            .into_iter()
            .find(|c| v8::Local::new(scope, c.v8_context()) == context)
    }

    pub(crate) fn require_context(&self, id: u64) -> crate::Result<Rc<ContextImpl>> {
        self.context_by_id(id)
            .ok_or_else(|| V8Exception::general(CONTEXT_DESTROYED_MESSAGE))
    }

    pub(crate) fn remove_context(&self, id: u64) {
        let removed = {
            let mut contexts = self.contexts.borrow_mut();
            let index = contexts.iter().position(|c| c.id == id);
            index.map(|index| contexts.remove(index))
        };
        if let Some(context) = removed {
            self.with_isolate_scope(|scope| context.dispose(self, scope));
            self.compiled
                .borrow_mut()
                .retain(|_, unit| unit.context_id() != Some(id));
            tracing::debug!(context = %context.config.name, "Context destroyed");
        }
    }

    pub(crate) fn context_count(&self) -> usize {
        self.contexts.borrow().len()
    }

    pub(crate) fn enable_dynamic_imports(&self) {
        if self.dynamic_imports_registered.replace(true) {
            return;
        }
        self.isolate_mut().set_host_import_module_dynamically_callback(
            crate::context::modules::dynamic_import_callback,
        );
    }

    // Object table

    pub(crate) fn register_object(&self, object: v8::Global<v8::Value>) -> u64 {
        let id = self.next_object_id.get();
        self.next_object_id.set(id + 1);
        self.objects.borrow_mut().insert(id, object);
        id
    }

    pub(crate) fn object(&self, id: u64) -> Option<v8::Global<v8::Value>> {
        self.objects.borrow().get(&id).cloned()
    }

    pub(crate) fn release_object(&self, id: u64) {
        self.objects.borrow_mut().remove(&id);
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }

    // Compiled units

    pub(crate) fn register_compiled(&self, unit: CompiledUnit) -> u64 {
        let id = self.next_compiled_id.get();
        self.next_compiled_id.set(id + 1);
        self.compiled.borrow_mut().insert(id, unit);
        id
    }

    pub(crate) fn compiled(&self, id: u64) -> Option<CompiledUnit> {
        self.compiled.borrow().get(&id).cloned()
    }

    pub(crate) fn release_compiled(&self, id: u64) {
        self.compiled.borrow_mut().remove(&id);
    }

    /// Modules compiled for `context_id` that the host still holds.
    pub(crate) fn module_units(&self, context_id: u64) -> Vec<(DocumentInfo, ModuleArtifact)> {
        self.compiled
            .borrow()
            .values()
            .filter_map(|unit| match unit {
                CompiledUnit::Module {
                    document,
                    context_id: owner,
                    artifact,
                } if *owner == context_id => Some((document.clone(), artifact.clone())),
                _ => None,
            })
            .collect()
    }

    /// Script documents by unique id, from the script cache and then from
    /// scripts the host still holds.
    pub(crate) fn document_by_unique_id(&self, unique_id: u64) -> Option<DocumentInfo> {
        if let Some(entry) = self.scripts.borrow().find_by_unique_id(unique_id) {
            return Some(entry.document.clone());
        }
        self.compiled.borrow().values().find_map(|unit| match unit {
            CompiledUnit::Script { document, .. } if document.unique_id() == unique_id => {
                Some(document.clone())
            }
            _ => None,
        })
    }

    // Execution scopes

    /// Enters an execution frame for `context_id`.
    ///
    /// The outermost frame fixes the stack limits, hands the limit to the
    /// engine and arms the heap watch. Nested frames are refused once they
    /// dig past the stack limit.
    pub(crate) fn begin_execution(&self, context_id: u64) -> crate::Result<()> {
        let marker = current_stack_marker();
        let outermost = self.frames.borrow().is_empty();
        if outermost {
            let limits = StackLimits::compute(marker, self.core.max_stack_usage());
            if let Some(limits) = limits {
                self.isolate_mut().set_stack_limit(limits.limit);
            }
            self.stack_limits.set(limits);
            if !self.core.is_terminating() {
                self.isolate_mut().cancel_terminate_execution();
            }
        } else if self.stack_exceeded_at(marker) {
            return Err(V8Exception::general(STACK_LIMIT_MESSAGE));
        }

        self.frames.borrow_mut().push(ExecutionFrame {
            context_id,
            started: false,
        });
        self.core.enter_execution();
        if outermost {
            self.arm_heap_watch();
        }
        Ok(())
    }

    /// Leaves the innermost frame. Termination is cancelled at the outermost
    /// exit, and at nested exits unless it should propagate outward.
    pub(crate) fn end_execution(&self, propagate_interrupt: bool) {
        self.frames.borrow_mut().pop();
        self.core.exit_execution();
        let outermost = self.frames.borrow().is_empty();

        if outermost {
            self.disarm_heap_watch();
            self.stack_limits.set(None);
            self.core.clear_terminating();
            self.isolate_mut().cancel_terminate_execution();
        } else if !propagate_interrupt && !self.core.is_out_of_memory() && self.core.clear_terminating() {
            self.isolate_mut().cancel_terminate_execution();
        }
    }

    pub(crate) fn is_outermost_frame(&self) -> bool {
        self.frames.borrow().len() <= 1
    }

    pub(crate) fn mark_execution_started(&self) {
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.started = true;
        }
    }

    pub(crate) fn execution_started(&self) -> bool {
        self.frames.borrow().last().is_some_and(|frame| frame.started)
    }

    fn stack_exceeded_at(&self, marker: usize) -> bool {
        self.stack_limits
            .get()
            .is_some_and(|limits| limits.is_exceeded_at(marker))
    }

    /// Checked on entry to every proxy callback.
    pub(crate) fn check_stack(&self) -> crate::Result<()> {
        if self.stack_exceeded_at(current_stack_marker()) {
            return Err(V8Exception::general(STACK_LIMIT_MESSAGE));
        }
        Ok(())
    }

    pub(crate) fn verify_not_out_of_memory(&self) -> crate::Result<()> {
        if self.core.is_out_of_memory() {
            return Err(V8Exception::fatal(OUT_OF_MEMORY_MESSAGE));
        }
        Ok(())
    }

    // Heap watch

    fn arm_heap_watch(&self) {
        if self.core.max_heap_size() == 0 {
            return;
        }
        let generation = self.heap_watch_generation.get().wrapping_add(1);
        self.heap_watch_generation.set(generation);
        self.schedule_heap_check(generation);
    }

    pub(crate) fn rearm_heap_watch(&self) {
        if !self.frames.borrow().is_empty() {
            self.arm_heap_watch();
        }
    }

    fn disarm_heap_watch(&self) {
        self.heap_watch_generation
            .set(self.heap_watch_generation.get().wrapping_add(1));
    }

    fn schedule_heap_check(&self, generation: u64) {
        let interval = heap_watch_interval(self.core.heap_size_sample_interval_ms());
        self.core.schedule_timer(interval, move |core| {
            core.enqueue(
                true,
                Box::new(move || {
                    if let Some(engine) = Engine::current() {
                        engine.check_heap(generation);
                    }
                }),
            );
        });
    }

    fn governed_heap_size(&self) -> usize {
        let mut stats = v8::HeapStatistics::default();
        self.isolate_mut().get_heap_statistics(&mut stats);
        governed_heap_size(stats.total_heap_size(), self.core.array_buffers.current())
    }

    fn check_heap(&self, generation: u64) {
        if generation != self.heap_watch_generation.get() || self.frames.borrow().is_empty() {
            return;
        }
        let max = self.core.max_heap_size();
        if max == 0 {
            return;
        }

        let mut total = self.governed_heap_size();
        if exceeds_heap_limit(total, max) {
            self.isolate_mut().low_memory_notification();
            total = self.governed_heap_size();
        }

        if exceeds_heap_limit(total, max) {
            let executing = !self.frames.borrow().is_empty();
            let action = heap_violation_action(
                self.core.config.disable_heap_size_violation_interrupt,
                executing,
            );
            tracing::warn!(
                isolate = self.core.name(),
                total_heap_size = total,
                max_heap_size = max,
                ?action,
                "Heap size limit exceeded"
            );
            match action {
                HeapViolationAction::ThrowRangeError => {
                    self.core.set_max_heap_size(0);
                    self.throw_range_error(OUT_OF_MEMORY_MESSAGE);
                    return;
                }
                HeapViolationAction::Terminate => {
                    self.core.mark_out_of_memory();
                    self.core.interrupt();
                }
            }
        }
        self.schedule_heap_check(generation);
    }

    fn throw_range_error(&self, message: &str) {
        let context_id = self.frames.borrow().last().map(|frame| frame.context_id);
        let Some(context) = context_id.and_then(|id| self.context_by_id(id)) else {
            return;
        };
        let scope = &mut unsafe { v8::CallbackScope::new(self.isolate_mut()) };
        let scope = &mut v8::HandleScope::new(scope);
        let local = v8::Local::new(scope, context.v8_context());
        let scope = &mut v8::ContextScope::new(scope, local);
        if let Some(message) = v8::String::new(scope, message) {
            let exception = v8::Exception::range_error(scope, message);
            scope.throw_exception(exception);
        }
    }

    // Isolate-wide operations

    pub(crate) fn heap_statistics(&self) -> HeapStatistics {
        let mut stats = v8::HeapStatistics::default();
        self.isolate_mut().get_heap_statistics(&mut stats);
        HeapStatistics {
            total_heap_size: stats.total_heap_size(),
            total_heap_size_executable: stats.total_heap_size_executable(),
            total_physical_size: stats.total_physical_size(),
            total_available_size: stats.total_available_size(),
            used_heap_size: stats.used_heap_size(),
            heap_size_limit: stats.heap_size_limit(),
            malloced_memory: stats.malloced_memory(),
            external_memory: stats.external_memory(),
            number_of_native_contexts: stats.number_of_native_contexts(),
            number_of_detached_contexts: stats.number_of_detached_contexts(),
        }
    }

    pub(crate) fn statistics(&self) -> IsolateStatistics {
        let compiled = self.compiled.borrow();
        let module_cache_size = self
            .contexts
            .borrow()
            .iter()
            .map(|context| context.module_cache_size())
            .sum();
        IsolateStatistics {
            script_count: compiled.values().filter(|unit| unit.context_id().is_none()).count(),
            module_count: compiled.values().filter(|unit| unit.context_id().is_some()).count(),
            script_cache_size: self.scripts.borrow().len(),
            module_cache_size,
            context_count: self.context_count(),
            object_count: self.object_count(),
            array_buffer_allocation: self.core.array_buffers.current(),
            tasks: TaskKind::ALL.map(|kind| (kind, self.core.task_count(kind))),
        }
    }

    pub(crate) fn collect_garbage(&self, exhaustive: bool) {
        let isolate = self.isolate_mut();
        if exhaustive {
            isolate.low_memory_notification();
        } else {
            isolate.memory_pressure_notification(v8::MemoryPressureLevel::Moderate);
        }
    }

    pub(crate) fn heap_snapshot(&self) -> Vec<u8> {
        let mut snapshot = Vec::new();
        self.isolate_mut().take_heap_snapshot(|chunk| {
            snapshot.extend_from_slice(chunk);
            true
        });
        snapshot
    }

    // Debugging

    pub(crate) fn inspector(&self) -> Option<&Inspector> {
        // SAFETY: the inspector outlives every borrow handed out here; it is
        // only freed in teardown after all contexts are gone
        self.inspector.get().map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    fn attach_debug_agent(&self) {
        let Some(inspector) = self.inspector() else {
            return;
        };
        let debugger = &self.core.config.debugger;
        let port = debugger.effective_port();
        let agent = self.core.host.create_debug_agent(
            self.core.name(),
            v8::V8::get_version(),
            port,
            debugger.remote,
            DebugCallback::new(self.core.weak()),
        );
        match agent {
            Some(agent) => {
                tracing::info!(isolate = self.core.name(), port, "Debug agent attached");
                inspector.set_agent(agent);
            }
            None => tracing::warn!(
                isolate = self.core.name(),
                "Debugging enabled but the host supplied no debug agent"
            ),
        }
    }

    pub(crate) fn on_debug_directive(&self, directive: DebugDirective) {
        let Some(inspector) = self.inspector() else {
            return;
        };
        let scheduler = &self.core.scheduler;
        match directive {
            DebugDirective::Connect => {
                if inspector.connect() {
                    tracing::info!(isolate = self.core.name(), "Debugger client connected");
                    if scheduler.message_loop_reason() == Some(RunMessageLoopReason::AwaitingDebugger) {
                        scheduler.exit_message_loop(ExitMessageLoopReason::ResumedExecution);
                    }
                }
            }
            DebugDirective::Command(message) => {
                self.with_isolate_scope(|_| inspector.dispatch(&message));
            }
            DebugDirective::Disconnect => {
                inspector.disconnect();
                tracing::info!(isolate = self.core.name(), "Debugger client disconnected");
                if scheduler.message_loop_reason() == Some(RunMessageLoopReason::PausedInDebugger) {
                    scheduler.exit_message_loop(ExitMessageLoopReason::ResumedExecution);
                }
            }
        }
    }

    /// Waits for a debugger client, then arranges for the next statement to
    /// pause. Returns without waiting when debugging is off or a client is
    /// already attached.
    pub(crate) fn await_debugger_and_pause(&self) -> ExitMessageLoopReason {
        let Some(inspector) = self.inspector() else {
            return ExitMessageLoopReason::CanceledAwaitDebugger;
        };
        let exit = if inspector.is_connected() {
            ExitMessageLoopReason::ResumedExecution
        } else {
            self.core
                .scheduler
                .run_message_loop(RunMessageLoopReason::AwaitingDebugger)
        };
        if exit == ExitMessageLoopReason::ResumedExecution {
            inspector.schedule_pause();
        }
        exit
    }
}

extern "C" fn near_heap_limit(data: *mut c_void, current_heap_limit: usize, _initial: usize) -> usize {
    // SAFETY: registered in Engine::create and freed only after the isolate
    let state = unsafe { &*data.cast::<HeapLimitState>() };
    if let Some(limit) = expanded_heap_limit(current_heap_limit, state.multiplier) {
        tracing::debug!(current_heap_limit, limit, "Expanding engine heap limit");
        return limit;
    }
    if let Some(core) = state.core.upgrade() {
        core.mark_out_of_memory();
    }
    // SAFETY: the isolate is alive while its callbacks run
    unsafe { &*state.isolate }.terminate_execution();
    current_heap_limit.saturating_add(MIN_HEAP_EXPANSION)
}
