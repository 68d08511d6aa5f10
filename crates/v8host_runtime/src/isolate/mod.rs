//! Isolate runtime: one engine heap, its dedicated thread and its limits.
//!
//! [`V8Isolate`] is the thread-safe face. Every operation that touches the
//! engine is run on the isolate thread, inline when the caller already is
//! that thread (a host callback re-entering the engine) and otherwise by
//! handing the work over and blocking until it completes.

use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use v8host_config::{ContextConfig, IsolateConfig};

use crate::context::V8Context;
use crate::error::{Result, V8Exception};
use crate::host::{DefaultHost, HostEnvironment};
use crate::scheduler::{ExitMessageLoopReason, RunMessageLoopReason, TaskCount, TaskKind};

pub(crate) mod core;
pub(crate) mod debugger;
pub(crate) mod engine;

use self::core::IsolateCore;
use self::engine::Engine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStatistics {
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateStatistics {
    /// Live compiled scripts held by the host
    pub script_count: usize,
    /// Live compiled modules held by the host
    pub module_count: usize,
    pub script_cache_size: usize,
    pub module_cache_size: usize,
    pub context_count: usize,
    /// Script objects pinned by host holders
    pub object_count: usize,
    pub array_buffer_allocation: usize,
    pub tasks: [(TaskKind, TaskCount); 6],
}

impl IsolateStatistics {
    pub fn task_count(&self, kind: TaskKind) -> TaskCount {
        self.tasks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, count)| *count)
            .unwrap_or_default()
    }
}

/// Keeps the isolate alive; dropping the last owner releases it and joins
/// the isolate thread.
pub(crate) struct IsolateOwner {
    pub(crate) core: Arc<IsolateCore>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for IsolateOwner {
    fn drop(&mut self) {
        self.core.release();
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        // the isolate thread itself cannot wait for its own exit
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!(isolate = self.core.name(), "Isolate thread panicked");
        }
    }
}

/// A V8 isolate running on its own thread.
///
/// Cloning is cheap and shares the isolate.
#[derive(Clone)]
pub struct V8Isolate {
    owner: Arc<IsolateOwner>,
}

impl V8Isolate {
    pub fn new(config: IsolateConfig, host: Arc<dyn HostEnvironment>) -> Result<Self> {
        let core = IsolateCore::new(config, host);
        let thread = spawn_isolate_thread(core.clone())?;
        tracing::debug!(isolate = core.name(), "Isolate created");
        Ok(Self {
            owner: Arc::new(IsolateOwner {
                core,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Isolate with the default host and configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(IsolateConfig::default(), Arc::new(DefaultHost))
    }

    pub fn name(&self) -> &str {
        self.owner.core.name()
    }

    pub fn config(&self) -> &IsolateConfig {
        &self.owner.core.config
    }

    pub(crate) fn from_owner(owner: Arc<IsolateOwner>) -> Self {
        Self { owner }
    }

    pub fn create_context(&self, config: ContextConfig) -> Result<V8Context> {
        let name = config.name.clone();
        let id = self
            .owner
            .core
            .call_flat(move |engine| crate::context::ContextImpl::create(engine, config).map(|c| c.id))?;
        Ok(V8Context::new(self.owner.clone(), id, name))
    }

    pub fn max_heap_size(&self) -> usize {
        self.owner.core.max_heap_size()
    }

    /// Changes the soft heap ceiling. Running script is watched from the next
    /// sample on; zero stops watching.
    pub fn set_max_heap_size(&self, bytes: usize) {
        self.owner.core.set_max_heap_size(bytes);
        self.rearm_heap_watch();
    }

    /// Effective sampling period, never below the watchdog's floor.
    pub fn heap_size_sample_interval(&self) -> Duration {
        crate::governor::heap::heap_watch_interval(self.owner.core.heap_size_sample_interval_ms())
    }

    pub fn set_heap_size_sample_interval(&self, interval: Duration) {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.owner.core.set_heap_size_sample_interval_ms(millis);
        self.rearm_heap_watch();
    }

    pub fn max_stack_usage(&self) -> usize {
        self.owner.core.max_stack_usage()
    }

    /// Takes effect at the next outermost script entry.
    pub fn set_max_stack_usage(&self, bytes: usize) {
        self.owner.core.set_max_stack_usage(bytes);
    }

    fn rearm_heap_watch(&self) {
        if self.owner.core.is_executing() {
            self.owner.core.enqueue(
                true,
                Box::new(|| {
                    if let Some(engine) = Engine::current() {
                        engine.rearm_heap_watch();
                    }
                }),
            );
        }
    }

    pub fn is_out_of_memory(&self) -> bool {
        self.owner.core.is_out_of_memory()
    }

    /// Blocks until a debugger client connects, then pauses at the next
    /// statement executed. Returns at once when debugging is disabled.
    pub fn await_debugger_and_pause(&self) -> Result<()> {
        let exit = self.owner.core.call(|engine| engine.await_debugger_and_pause())?;
        match exit {
            ExitMessageLoopReason::TerminatedExecution => Err(V8Exception::interrupt(
                "Awaiting debugger interrupted by host",
            )),
            reason => {
                tracing::debug!(?reason, "Stopped awaiting debugger");
                Ok(())
            }
        }
    }

    pub fn cancel_await_debugger(&self) {
        let scheduler = &self.owner.core.scheduler;
        if scheduler.message_loop_reason() == Some(RunMessageLoopReason::AwaitingDebugger) {
            scheduler.exit_message_loop(ExitMessageLoopReason::CanceledAwaitDebugger);
        }
    }

    pub fn heap_statistics(&self) -> Result<HeapStatistics> {
        self.owner.core.call(|engine| engine.heap_statistics())
    }

    pub fn statistics(&self) -> Result<IsolateStatistics> {
        self.owner.core.call(|engine| engine.statistics())
    }

    pub fn collect_garbage(&self, exhaustive: bool) -> Result<()> {
        self.owner
            .core
            .call(move |engine| engine.collect_garbage(exhaustive))
    }

    /// Writes a heap snapshot in the DevTools JSON format.
    pub fn write_heap_snapshot(&self, sink: &mut impl Write) -> Result<()> {
        let snapshot = self.owner.core.call(|engine| engine.heap_snapshot())?;
        sink.write_all(&snapshot)
            .map_err(|err| V8Exception::general(format!("Failed writing heap snapshot: {err}")))
    }

    /// Runs `callback` on the isolate thread and waits for it.
    pub fn call_with_lock<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.owner.core.call(move |engine| {
            engine.with_isolate_scope(|_| callback());
        })
    }

    /// Runs `callback` now when the isolate thread is the caller and may run
    /// it, otherwise queues it.
    pub fn call_with_lock_no_wait<F>(&self, allow_nesting: bool, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let core = &self.owner.core;
        if core.is_engine_thread() && (allow_nesting || core.scheduler.level() == 0) {
            if let Some(engine) = Engine::current() {
                engine.with_isolate_scope(|_| callback());
                return;
            }
        }
        core.enqueue(allow_nesting, Box::new(callback));
    }

    pub fn post_task<F>(&self, allow_nesting: bool, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.owner.core.post_task(allow_nesting, Box::new(task));
    }

    pub fn post_delayed_task<F>(&self, allow_nesting: bool, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.owner
            .core
            .post_delayed_task(allow_nesting, delay, Box::new(task));
    }

    pub fn post_worker_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.owner.core.post_worker_task(Box::new(task));
    }

    pub fn post_delayed_worker_task<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.owner
            .core
            .post_delayed_worker_task(delay, Box::new(task));
    }

    pub fn task_count(&self, kind: TaskKind) -> TaskCount {
        self.owner.core.task_count(kind)
    }

    pub fn pending_worker_tasks(&self) -> usize {
        self.owner.core.pending_worker_tasks()
    }
}

impl std::fmt::Debug for V8Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V8Isolate")
            .field("name", &self.name())
            .field("id", &self.owner.core.id)
            .finish()
    }
}

fn spawn_isolate_thread(core: Arc<IsolateCore>) -> Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
    let thread_core = core.clone();
    let thread = std::thread::Builder::new()
        .name(format!("v8host-isolate-{}", core.name()))
        .stack_size(core.config.effective_thread_stack_size())
        .spawn(move || Engine::run(thread_core, ready_tx))
        .map_err(|err| V8Exception::general(format!("Failed to start isolate thread: {err}")))?;
    ready_rx
        .recv()
        .map_err(|_| V8Exception::general("Isolate thread exited during startup"))?;
    Ok(thread)
}
