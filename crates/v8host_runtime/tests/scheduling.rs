mod utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use serial_test::serial;
use v8host_runtime::scheduler::TaskKind;
use v8host_runtime::{DocumentInfo, V8Isolate, Value};

use crate::utils::{create_context, eval};

#[test]
#[serial]
fn test_call_with_lock_runs_on_isolate_thread() {
    let isolate = V8Isolate::with_defaults().unwrap();
    let caller = std::thread::current().id();
    let (sender, receiver) = mpsc::channel();
    isolate
        .call_with_lock(move || {
            let _ = sender.send(std::thread::current().id());
        })
        .unwrap();
    assert_ne!(receiver.recv().unwrap(), caller);
}

#[test]
#[serial]
fn test_posted_tasks_run_in_order() {
    let isolate = V8Isolate::with_defaults().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..5 {
        let order = order.clone();
        isolate.post_task(index % 2 == 0, move || order.lock().push(index));
    }
    isolate.call_with_lock(|| {}).unwrap();
    assert_eq!(*order.lock(), [0, 1, 2, 3, 4]);

    let foreground = isolate.task_count(TaskKind::Foreground);
    let non_nestable = isolate.task_count(TaskKind::NonNestableForeground);
    assert_eq!(foreground.posted, 3);
    assert_eq!(foreground.invoked, 3);
    assert_eq!(non_nestable.posted, 2);
    assert_eq!(non_nestable.invoked, 2);
}

#[test]
#[serial]
fn test_non_nestable_waits_for_outermost_scope() {
    let isolate = V8Isolate::with_defaults().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let inner = isolate.clone();
    let log = order.clone();
    isolate
        .call_with_lock(move || {
            let deferred = log.clone();
            inner.call_with_lock_no_wait(false, move || deferred.lock().push("non-nestable"));
            let nested = log.clone();
            inner.call_with_lock_no_wait(true, move || nested.lock().push("nestable"));
            log.lock().push("outer");
        })
        .unwrap();
    assert_eq!(*order.lock(), ["nestable", "outer", "non-nestable"]);
}

#[test]
#[serial]
fn test_tasks_posted_while_draining_run_before_return() {
    let isolate = V8Isolate::with_defaults().unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let poster = isolate.clone();
    let counter = count.clone();
    isolate.post_task(true, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let counter = counter.clone();
        poster.post_task(true, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });
    isolate.call_with_lock(|| {}).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
#[serial]
fn test_delayed_task_fires() {
    let isolate = V8Isolate::with_defaults().unwrap();
    let (sender, receiver) = mpsc::channel();
    isolate.post_delayed_task(true, Duration::from_millis(50), move || {
        let _ = sender.send("fired");
    });
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), "fired");
    assert_eq!(isolate.task_count(TaskKind::DelayedForeground).posted, 1);
}

#[test]
#[serial]
fn test_worker_tasks_run_off_isolate() {
    let isolate = V8Isolate::with_defaults().unwrap();
    let (sender, receiver) = mpsc::channel();
    let immediate = sender.clone();
    isolate.post_worker_task(move || {
        let _ = immediate.send("worker");
    });
    isolate.post_delayed_worker_task(Duration::from_millis(20), move || {
        let _ = sender.send("delayed worker");
    });
    let mut seen = vec![
        receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
        receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
    ];
    seen.sort_unstable();
    assert_eq!(seen, ["delayed worker", "worker"]);
    assert_eq!(isolate.task_count(TaskKind::Worker).posted, 1);
    assert_eq!(isolate.task_count(TaskKind::DelayedWorker).posted, 1);
}

#[test]
#[serial]
fn test_concurrent_callers_are_serialized() {
    let (_isolate, context) = create_context();
    eval(&context, "globalThis.total = 0;");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let context = context.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    context
                        .execute(&DocumentInfo::script("add.js"), "total += 1", false)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(eval(&context, "total"), Value::Number(400.0));
}

#[test]
#[serial]
fn test_release_is_idempotent() {
    let (isolate, context) = create_context();
    let script = context.compile(&DocumentInfo::script("once.js"), "1").unwrap();
    let Value::V8Object(object) = eval(&context, "({ pinned: true })") else {
        panic!("expected an object");
    };
    let before = isolate.statistics().unwrap();
    assert_eq!(before.script_count, 1);

    script.release();
    script.release();
    object.release();
    object.release();
    assert!(script.is_released());
    assert!(object.is_released());

    isolate.call_with_lock(|| {}).unwrap();
    let after = isolate.statistics().unwrap();
    assert_eq!(after.script_count, 0);
    assert!(context.execute_script(&script, true).is_err());
}

#[test]
#[serial]
fn test_collect_garbage_and_snapshot() {
    let (isolate, context) = create_context();
    eval(&context, "globalThis.junk = new Array(1000).fill('x')");
    isolate.collect_garbage(true).unwrap();
    let mut snapshot = Vec::new();
    isolate.write_heap_snapshot(&mut snapshot).unwrap();
    assert!(!snapshot.is_empty());
    assert!(isolate.heap_statistics().unwrap().used_heap_size > 0);
}
