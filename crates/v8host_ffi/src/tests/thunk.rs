use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serial_test::serial;
use v8host_runtime::NativeCallback;

use crate::thunk::{alloc_thunk, pending_thunks};

fn counting(counter: &Arc<AtomicUsize>) -> NativeCallback {
    let counter = counter.clone();
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
#[serial]
fn test_thunk_runs_its_callback_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let Ok(thunk) = alloc_thunk(counting(&counter)) else {
        panic!("pool should have a free slot");
    };
    assert_eq!(pending_thunks(), 1);

    unsafe { thunk() };
    unsafe { thunk() };
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(pending_thunks(), 0);
}

#[test]
#[serial]
fn test_saturated_pool_hands_callback_back() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut thunks = Vec::new();
    while let Ok(thunk) = alloc_thunk(counting(&counter)) {
        thunks.push(thunk);
    }
    assert_eq!(thunks.len(), 16);

    let Err(returned) = alloc_thunk(counting(&counter)) else {
        panic!("pool should be saturated");
    };
    returned();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    for thunk in thunks {
        unsafe { thunk() };
    }
    assert_eq!(counter.load(Ordering::SeqCst), 17);
    assert_eq!(pending_thunks(), 0);
}

#[test]
#[serial]
fn test_panicking_callback_frees_its_slot() {
    let Ok(thunk) = alloc_thunk(Box::new(|| panic!("callback failure"))) else {
        panic!("pool should have a free slot");
    };
    unsafe { thunk() };
    assert_eq!(pending_thunks(), 0);
}
