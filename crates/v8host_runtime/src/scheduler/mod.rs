//! Call-with-lock queue and message loop of one isolate.
//!
//! Foreground callbacks run only on the engine thread. A callback posted as
//! non-nestable waits until no drain is in progress; nestable callbacks run
//! at the next drain at any depth.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use parking_lot::{Condvar, Mutex};

mod message_loop;
pub mod stats;
pub(crate) mod tasks;

pub use message_loop::{ExitMessageLoopReason, RunMessageLoopReason};
pub use stats::{TaskCount, TaskKind};

pub type LockCallback = Box<dyn FnOnce() + Send + 'static>;

/// What a poster must do so the engine thread notices a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// A pending drain will pick it up
    None,
    /// The idle loop or a message loop was signalled
    Notified,
    /// Script is running; the caller must request an engine interrupt
    Interrupt,
}

/// Work handed to the engine thread while it is idle.
pub(crate) enum IdleWork {
    HostCall(LockCallback),
    Drain,
    Shutdown,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<(bool, LockCallback)>,
    level: usize,
    host_calls: VecDeque<LockCallback>,
    busy: bool,
    run_reason: Option<RunMessageLoopReason>,
    exit_reason: Option<ExitMessageLoopReason>,
    interrupt_requested: bool,
    shutdown: bool,
}

impl SchedulerState {
    fn has_runnable(&self) -> bool {
        if self.level == 0 {
            !self.queue.is_empty()
        } else {
            self.queue.iter().any(|(nestable, _)| *nestable)
        }
    }
}

#[derive(Default)]
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    changed: Condvar,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a foreground callback.
    pub(crate) fn enqueue(&self, allow_nesting: bool, callback: LockCallback) -> Wake {
        let mut state = self.state.lock();
        let was_empty = state.queue.is_empty();
        state.queue.push_back((allow_nesting, callback));
        if !was_empty {
            return Wake::None;
        }
        if state.run_reason.is_some() || !state.busy {
            self.changed.notify_all();
            Wake::Notified
        } else if state.interrupt_requested {
            Wake::None
        } else {
            state.interrupt_requested = true;
            Wake::Interrupt
        }
    }

    /// Hands a synchronous host call to the idle loop. Returns false once the
    /// isolate is shutting down.
    pub(crate) fn push_host_call(&self, call: LockCallback) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        state.host_calls.push_back(call);
        self.changed.notify_all();
        true
    }

    /// Runs every runnable callback, including ones posted while draining.
    /// Non-nestable callbacks stay queued while `level() > 0`.
    pub fn drain(&self) {
        loop {
            let batch = self.pop_runnable();
            if batch.is_empty() {
                return;
            }
            self.run_batch(batch);
        }
    }

    fn pop_runnable(&self) -> VecDeque<LockCallback> {
        let mut state = self.state.lock();
        state.interrupt_requested = false;
        if state.level == 0 {
            return std::mem::take(&mut state.queue)
                .into_iter()
                .map(|(_, callback)| callback)
                .collect();
        }
        let (nestable, deferred): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.queue)
            .into_iter()
            .partition(|(nestable, _)| *nestable);
        state.queue = deferred;
        nestable.into_iter().map(|(_, callback)| callback).collect()
    }

    fn run_batch(&self, batch: VecDeque<LockCallback>) {
        self.state.lock().level += 1;
        let _level = LevelGuard(self);
        for callback in batch {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                tracing::warn!("Scheduled callback panicked");
            }
        }
    }

    /// Drain nesting depth; zero outside any drain.
    pub fn level(&self) -> usize {
        self.state.lock().level
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Blocks the idle engine thread until there is something to do.
    pub(crate) fn next_idle_work(&self) -> IdleWork {
        let mut state = self.state.lock();
        state.busy = false;
        loop {
            if !state.queue.is_empty() {
                state.busy = true;
                return IdleWork::Drain;
            }
            if let Some(call) = state.host_calls.pop_front() {
                state.busy = true;
                return IdleWork::HostCall(call);
            }
            if state.shutdown {
                return IdleWork::Shutdown;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Stops accepting host calls. Queued callbacks still drain.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        let abandoned = std::mem::take(&mut state.host_calls);
        drop(state);
        if !abandoned.is_empty() {
            tracing::debug!(count = abandoned.len(), "Dropping host calls on shutdown");
        }
        drop(abandoned);
        self.changed.notify_all();
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }
}

struct LevelGuard<'a>(&'a Scheduler);

impl Drop for LevelGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.level = state.level.saturating_sub(1);
    }
}
