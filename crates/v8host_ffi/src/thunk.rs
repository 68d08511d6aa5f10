//! Plain function pointers for queued native callbacks.
//!
//! Each pooled slot has a fixed `extern "C"` thunk; handing the host a thunk
//! is cheaper than a handle. When every slot is busy the callback travels as
//! a `NativeCallbackHandle` instead.

use std::panic::{AssertUnwindSafe, catch_unwind};

use once_cell::sync::Lazy;
use v8host_runtime::{CallbackPool, CallbackSlot, NativeCallback};

pub type Thunk = unsafe extern "C" fn();

static NATIVE_CALLBACKS: Lazy<CallbackPool<NativeCallback>> = Lazy::new(|| CallbackPool::new(THUNKS.len()));

fn run_slot(index: usize) {
    let Some(callback) = NATIVE_CALLBACKS.take(CallbackSlot::from_index(index)) else {
        tracing::warn!(index, "Native callback thunk invoked for an empty slot");
        return;
    };
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::warn!(index, "Native callback panicked");
    }
}

macro_rules! thunks {
    ($($index:literal),* $(,)?) => {
        static THUNKS: &[Thunk] = &[$({
            unsafe extern "C" fn thunk() {
                run_slot($index);
            }
            thunk
        }),*];
    };
}

thunks!(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15);

/// Parks `callback` in a free slot and returns its thunk, or hands the
/// callback back when the pool is saturated.
pub(crate) fn alloc_thunk(callback: NativeCallback) -> Result<Thunk, NativeCallback> {
    NATIVE_CALLBACKS
        .try_alloc(callback)
        .map(|slot| THUNKS[slot.index()])
}

pub(crate) fn pending_thunks() -> usize {
    NATIVE_CALLBACKS.in_use()
}
