use std::ffi::c_void;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use v8host_config::IsolateConfig;

use super::engine::Engine;
use crate::error::{ISOLATE_RELEASED_MESSAGE, Result, V8Exception};
use crate::governor::ArrayBufferAccounting;
use crate::host::HostEnvironment;
use crate::scheduler::stats::TaskCounters;
use crate::scheduler::tasks::{WorkerTask, timer_runtime};
use crate::scheduler::{
    ExitMessageLoopReason, LockCallback, Scheduler, TaskKind, Wake,
};

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Isolate state shared with every thread that may post work.
///
/// Engine objects never live here; they stay on the engine thread inside
/// [`Engine`].
pub(crate) struct IsolateCore {
    pub(crate) id: u64,
    pub(crate) config: IsolateConfig,
    pub(crate) host: Arc<dyn HostEnvironment>,
    pub(crate) scheduler: Scheduler,
    pub(crate) stats: TaskCounters,
    pub(crate) array_buffers: Arc<ArrayBufferAccounting>,
    weak_self: Weak<IsolateCore>,
    handle: OnceCell<v8::IsolateHandle>,
    engine_thread: OnceCell<ThreadId>,
    terminating: AtomicBool,
    out_of_memory: AtomicBool,
    released: AtomicBool,
    executing: AtomicUsize,
    max_heap_size: AtomicUsize,
    heap_size_sample_interval_ms: AtomicU64,
    max_stack_usage: AtomicUsize,
    async_tasks: Mutex<Vec<Arc<WorkerTask>>>,
    task_timers: Mutex<Vec<(u64, JoinHandle<()>)>>,
    next_timer_id: AtomicU64,
}

impl IsolateCore {
    pub(crate) fn new(config: IsolateConfig, host: Arc<dyn HostEnvironment>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed),
            array_buffers: Arc::new(ArrayBufferAccounting::new(
                config.max_array_buffer_allocation,
            )),
            max_heap_size: AtomicUsize::new(config.max_heap_size),
            heap_size_sample_interval_ms: AtomicU64::new(config.heap_size_sample_interval_ms),
            max_stack_usage: AtomicUsize::new(config.max_stack_usage),
            config,
            host,
            scheduler: Scheduler::new(),
            stats: TaskCounters::default(),
            weak_self: weak_self.clone(),
            handle: OnceCell::new(),
            engine_thread: OnceCell::new(),
            terminating: AtomicBool::new(false),
            out_of_memory: AtomicBool::new(false),
            released: AtomicBool::new(false),
            executing: AtomicUsize::new(0),
            async_tasks: Mutex::new(Vec::new()),
            task_timers: Mutex::new(Vec::new()),
            next_timer_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn weak(&self) -> Weak<IsolateCore> {
        self.weak_self.clone()
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn bind_engine(&self, handle: v8::IsolateHandle) {
        let _ = self.handle.set(handle);
        let _ = self.engine_thread.set(std::thread::current().id());
    }

    pub(crate) fn is_engine_thread(&self) -> bool {
        self.engine_thread
            .get()
            .is_some_and(|id| *id == std::thread::current().id())
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn is_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::Acquire)
    }

    pub(crate) fn mark_out_of_memory(&self) {
        if !self.out_of_memory.swap(true, Ordering::AcqRel) {
            tracing::warn!(isolate = self.name(), "Isolate is out of memory");
        }
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    pub(crate) fn clear_terminating(&self) -> bool {
        self.terminating.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn enter_execution(&self) {
        self.executing.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn exit_execution(&self) {
        let _ = self
            .executing
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire) > 0
    }

    pub(crate) fn max_heap_size(&self) -> usize {
        self.max_heap_size.load(Ordering::Acquire)
    }

    pub(crate) fn set_max_heap_size(&self, bytes: usize) {
        self.max_heap_size.store(bytes, Ordering::Release);
    }

    pub(crate) fn heap_size_sample_interval_ms(&self) -> u64 {
        self.heap_size_sample_interval_ms.load(Ordering::Acquire)
    }

    pub(crate) fn set_heap_size_sample_interval_ms(&self, interval_ms: u64) {
        self.heap_size_sample_interval_ms
            .store(interval_ms, Ordering::Release);
    }

    pub(crate) fn max_stack_usage(&self) -> usize {
        self.max_stack_usage.load(Ordering::Acquire)
    }

    pub(crate) fn set_max_stack_usage(&self, bytes: usize) {
        self.max_stack_usage.store(bytes, Ordering::Release);
    }

    /// Terminates running script and ends a running message loop, such as
    /// one awaiting a debugger. Leaves an idle isolate untouched.
    pub(crate) fn interrupt(&self) {
        let loop_ended = self
            .scheduler
            .exit_message_loop(ExitMessageLoopReason::TerminatedExecution);
        if !self.is_executing() {
            if loop_ended {
                tracing::debug!(isolate = self.name(), "Interrupted message loop");
            }
            return;
        }
        self.terminating.store(true, Ordering::Release);
        if let Some(handle) = self.handle.get() {
            handle.terminate_execution();
        }
    }

    pub(crate) fn cancel_interrupt(&self) {
        self.terminating.store(false, Ordering::Release);
        if let Some(handle) = self.handle.get() {
            handle.cancel_terminate_execution();
        }
    }

    /// Runs `f` with the engine, inline when already on the engine thread and
    /// otherwise by handing it to the idle engine thread and blocking.
    pub(crate) fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Rc<Engine>) -> R + Send + 'static,
    {
        if self.is_engine_thread() {
            let engine = Engine::current().ok_or_else(released_error)?;
            return Ok(f(&engine));
        }
        if self.is_released() {
            return Err(released_error());
        }
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let accepted = self.scheduler.push_host_call(Box::new(move || {
            if let Some(engine) = Engine::current() {
                let _ = tx.send(f(&engine));
            }
        }));
        if !accepted {
            return Err(released_error());
        }
        rx.recv().map_err(|_| released_error())
    }

    /// Like [`IsolateCore::call`] for operations that already yield a
    /// [`Result`].
    pub(crate) fn call_flat<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Rc<Engine>) -> Result<R> + Send + 'static,
    {
        self.call(f)?
    }

    /// Appends a foreground callback and wakes the engine thread if needed.
    pub(crate) fn enqueue(&self, allow_nesting: bool, callback: LockCallback) {
        if self.scheduler.enqueue(allow_nesting, callback) == Wake::Interrupt {
            self.request_drain_interrupt();
        }
    }

    fn request_drain_interrupt(&self) {
        if let Some(handle) = self.handle.get() {
            handle.request_interrupt(drain_on_interrupt, std::ptr::null_mut());
        }
    }

    /// Posts a counted foreground task.
    pub(crate) fn post_task(&self, allow_nesting: bool, task: LockCallback) {
        if self.is_released() && !allow_nesting {
            return;
        }
        let kind = TaskKind::foreground(allow_nesting, false);
        self.stats.posted(kind);
        let weak = self.weak();
        self.enqueue(
            allow_nesting,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.stats.invoked(kind);
                }
                task();
            }),
        );
    }

    pub(crate) fn post_delayed_task(&self, allow_nesting: bool, delay: Duration, task: LockCallback) {
        if self.is_released() {
            return;
        }
        let kind = TaskKind::foreground(allow_nesting, true);
        self.stats.posted(kind);
        self.schedule_timer(delay, move |core| {
            let weak = core.weak();
            core.enqueue(
                allow_nesting,
                Box::new(move || {
                    if let Some(core) = weak.upgrade() {
                        core.stats.invoked(kind);
                    }
                    task();
                }),
            );
        });
    }

    pub(crate) fn post_worker_task(&self, task: LockCallback) {
        if self.is_released() {
            return;
        }
        self.stats.posted(TaskKind::Worker);
        self.dispatch_worker(TaskKind::Worker, task);
    }

    pub(crate) fn post_delayed_worker_task(&self, delay: Duration, task: LockCallback) {
        if self.is_released() {
            return;
        }
        self.stats.posted(TaskKind::DelayedWorker);
        self.schedule_timer(delay, move |core| {
            core.dispatch_worker(TaskKind::DelayedWorker, task);
        });
    }

    fn dispatch_worker(&self, kind: TaskKind, task: LockCallback) {
        let task = WorkerTask::new(kind, task);
        self.async_tasks.lock().push(task.clone());
        let weak = self.weak();
        self.host.queue_native_callback(Box::new(move || {
            if task.run()
                && let Some(core) = weak.upgrade()
            {
                core.stats.invoked(kind);
                core.async_tasks.lock().retain(|t| !Arc::ptr_eq(t, &task));
            }
        }));
    }

    /// Runs `fire` on the timer runtime after `delay` unless the isolate is
    /// released first.
    pub(crate) fn schedule_timer(
        &self,
        delay: Duration,
        fire: impl FnOnce(Arc<IsolateCore>) + Send + 'static,
    ) {
        let runtime = match timer_runtime() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "Timer runtime unavailable, dropping delayed task");
                return;
            }
        };
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let weak = self.weak();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = weak.upgrade() {
                core.task_timers.lock().retain(|(timer, _)| *timer != id);
                if !core.is_released() {
                    fire(core);
                }
            }
        });
        let mut timers = self.task_timers.lock();
        timers.retain(|(_, timer)| !timer.is_finished());
        if !handle.is_finished() {
            timers.push((id, handle));
        }
    }

    /// Drops the engine-side reference behind a [`crate::V8ObjectHolder`].
    pub(crate) fn release_entity(&self, id: u64) {
        if self.is_released() {
            return;
        }
        self.enqueue(
            false,
            Box::new(move || {
                if let Some(engine) = Engine::current() {
                    engine.release_object(id);
                }
            }),
        );
    }

    pub(crate) fn release_compiled(&self, id: u64) {
        if self.is_released() {
            return;
        }
        self.enqueue(
            false,
            Box::new(move || {
                if let Some(engine) = Engine::current() {
                    engine.release_compiled(id);
                }
            }),
        );
    }

    /// Marks the isolate released: timers are dropped, pending worker tasks
    /// run to completion and the engine thread is told to wind down.
    pub(crate) fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(isolate = self.name(), "Releasing isolate");

        let timers = std::mem::take(&mut *self.task_timers.lock());
        for (_, timer) in timers {
            timer.abort();
        }

        let pending = std::mem::take(&mut *self.async_tasks.lock());
        for task in pending {
            if task.run() {
                self.stats.invoked(task.kind());
            }
        }

        self.cancel_interrupt();
        self.scheduler.shutdown();
    }

    pub(crate) fn pending_worker_tasks(&self) -> usize {
        self.async_tasks.lock().iter().filter(|t| !t.is_done()).count()
    }

    pub(crate) fn task_count(&self, kind: TaskKind) -> crate::scheduler::TaskCount {
        self.stats.snapshot(kind)
    }
}

fn released_error() -> V8Exception {
    V8Exception::general(ISOLATE_RELEASED_MESSAGE)
}

extern "C" fn drain_on_interrupt(_isolate: &mut v8::Isolate, _data: *mut c_void) {
    if let Some(engine) = Engine::current() {
        engine.core.scheduler.drain();
    }
}
