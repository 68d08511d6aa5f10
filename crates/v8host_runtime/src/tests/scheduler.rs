use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::scheduler::{ExitMessageLoopReason, RunMessageLoopReason, Scheduler, TaskKind, Wake};

fn record(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> Box<dyn FnOnce() + Send> {
    let log = log.clone();
    Box::new(move || log.lock().push(entry))
}

#[test]
fn test_drain_runs_tasks_in_order() {
    let scheduler = Scheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    scheduler.enqueue(true, record(&log, "a"));
    scheduler.enqueue(false, record(&log, "b"));
    scheduler.enqueue(true, record(&log, "c"));

    scheduler.drain();
    assert_eq!(*log.lock(), ["a", "b", "c"]);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_tasks_posted_during_drain_run_before_it_returns() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let inner = scheduler.clone();
    let inner_log = log.clone();
    scheduler.enqueue(
        true,
        Box::new(move || {
            inner_log.lock().push("outer");
            inner.enqueue(true, record(&inner_log, "posted"));
        }),
    );

    scheduler.drain();
    assert_eq!(*log.lock(), ["outer", "posted"]);
}

#[test]
fn test_non_nestable_deferred_until_level_zero() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let inner = scheduler.clone();
    let inner_log = log.clone();
    scheduler.enqueue(
        true,
        Box::new(move || {
            inner.enqueue(false, record(&inner_log, "non-nestable"));
            inner.enqueue(true, record(&inner_log, "nestable"));
            inner.drain();
            inner_log.lock().push("nested drain done");
            assert_eq!(inner.pending(), 1);
        }),
    );

    scheduler.drain();
    assert_eq!(*log.lock(), ["nestable", "nested drain done", "non-nestable"]);
    assert_eq!(scheduler.level(), 0);
}

#[test]
fn test_panicking_task_does_not_stop_drain() {
    let scheduler = Scheduler::new();
    let ran = Arc::new(AtomicUsize::new(0));
    scheduler.enqueue(true, Box::new(|| panic!("task failure")));
    let counter = ran.clone();
    scheduler.enqueue(
        true,
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    scheduler.drain();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.level(), 0);
}

#[test]
fn test_enqueue_into_idle_scheduler_notifies() {
    let scheduler = Scheduler::new();
    assert_eq!(scheduler.enqueue(true, Box::new(|| ())), Wake::Notified);
    assert_eq!(scheduler.enqueue(true, Box::new(|| ())), Wake::None);
}

#[test]
fn test_message_loop_exit() {
    let scheduler = Arc::new(Scheduler::new());
    let remote = scheduler.clone();
    let handle = thread::spawn(move || {
        while remote.message_loop_reason().is_none() {
            thread::sleep(Duration::from_millis(5));
        }
        remote.enqueue(true, Box::new(|| ()));
        assert!(remote.exit_message_loop(ExitMessageLoopReason::ResumedExecution));
        assert!(!remote.exit_message_loop(ExitMessageLoopReason::CanceledAwaitDebugger));
    });

    let exit = scheduler.run_message_loop(RunMessageLoopReason::AwaitingDebugger);
    handle.join().unwrap();
    assert_eq!(exit, ExitMessageLoopReason::ResumedExecution);
    assert_eq!(scheduler.message_loop_reason(), None);
}

#[test]
fn test_nested_message_loop_returns_immediately() {
    let scheduler = Arc::new(Scheduler::new());
    let inner = scheduler.clone();
    let nested = Arc::new(Mutex::new(None));
    let nested_result = nested.clone();
    scheduler.enqueue(
        true,
        Box::new(move || {
            *nested_result.lock() = Some(inner.run_message_loop(RunMessageLoopReason::PausedInDebugger));
            inner.exit_message_loop(ExitMessageLoopReason::ResumedExecution);
        }),
    );

    let exit = scheduler.run_message_loop(RunMessageLoopReason::AwaitingDebugger);
    assert_eq!(exit, ExitMessageLoopReason::ResumedExecution);
    assert_eq!(*nested.lock(), Some(ExitMessageLoopReason::NestedInvocation));
}

#[test]
fn test_exit_without_loop_is_refused() {
    let scheduler = Scheduler::new();
    assert!(!scheduler.exit_message_loop(ExitMessageLoopReason::ResumedExecution));
}

#[test]
fn test_foreground_task_kinds() {
    assert_eq!(TaskKind::foreground(true, false), TaskKind::Foreground);
    assert_eq!(TaskKind::foreground(false, false), TaskKind::NonNestableForeground);
    assert_eq!(TaskKind::foreground(true, true), TaskKind::DelayedForeground);
    assert_eq!(TaskKind::foreground(false, true), TaskKind::NonNestableDelayedForeground);
}

/// Host that keeps queued worker callbacks instead of running them.
#[derive(Default)]
struct HoldingHost {
    held: Mutex<Vec<crate::NativeCallback>>,
}

impl crate::HostEnvironment for HoldingHost {
    fn queue_native_callback(&self, callback: crate::NativeCallback) {
        self.held.lock().push(callback);
    }
}

#[test]
fn test_release_counts_drained_worker_tasks_by_kind() {
    let host = Arc::new(HoldingHost::default());
    let core = crate::isolate::core::IsolateCore::new(v8host_config::IsolateConfig::default(), host.clone());
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    core.post_worker_task(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let counter = ran.clone();
    core.post_delayed_worker_task(
        Duration::from_millis(10),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    for _ in 0..100 {
        if host.held.lock().len() == 2 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(host.held.lock().len(), 2);
    assert_eq!(core.pending_worker_tasks(), 2);

    core.release();
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(core.task_count(TaskKind::Worker).invoked, 1);
    assert_eq!(core.task_count(TaskKind::DelayedWorker).invoked, 1);

    // the host's late callbacks find the bodies already run
    for callback in std::mem::take(&mut *host.held.lock()) {
        callback();
    }
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(core.task_count(TaskKind::DelayedWorker).invoked, 1);
}
