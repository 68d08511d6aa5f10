use std::alloc::{Layout, alloc, alloc_zeroed, dealloc};
use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

const BUFFER_ALIGN: usize = 16;

/// Live array buffer bytes allocated by one isolate.
///
/// Only buffers this allocator hands out are counted; backing stores adopted
/// from elsewhere never pass through it.
#[derive(Debug)]
pub struct ArrayBufferAccounting {
    max: usize,
    current: Mutex<usize>,
}

impl ArrayBufferAccounting {
    /// A zero `max` disables the ceiling but keeps counting.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            current: Mutex::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn current(&self) -> usize {
        *self.current.lock()
    }

    /// Reserves `size` bytes, refusing anything that would cross the ceiling
    /// or overflow.
    pub fn try_reserve(&self, size: usize) -> bool {
        let mut current = self.current.lock();
        let Some(next) = current.checked_add(size) else {
            return false;
        };
        if self.max > 0 && next > self.max {
            return false;
        }
        *current = next;
        true
    }

    /// Returns `size` bytes, clamping at zero.
    pub fn release(&self, size: usize) {
        let mut current = self.current.lock();
        *current = current.saturating_sub(size);
    }
}

struct AllocatorState {
    accounting: Arc<ArrayBufferAccounting>,
}

fn allocate_with(state: &AllocatorState, len: usize, zeroed: bool) -> *mut c_void {
    if len == 0 {
        return std::ptr::null_mut();
    }
    if !state.accounting.try_reserve(len) {
        tracing::warn!(
            requested = len,
            current = state.accounting.current(),
            max = state.accounting.max(),
            "Rejected array buffer allocation"
        );
        return std::ptr::null_mut();
    }
    let Ok(layout) = Layout::from_size_align(len, BUFFER_ALIGN) else {
        state.accounting.release(len);
        return std::ptr::null_mut();
    };
    // SAFETY: layout has a non-zero size
    let data = unsafe {
        if zeroed {
            alloc_zeroed(layout)
        } else {
            alloc(layout)
        }
    };
    if data.is_null() {
        state.accounting.release(len);
    }
    data.cast::<c_void>()
}

unsafe extern "C" fn allocate(state: &AllocatorState, len: usize) -> *mut c_void {
    allocate_with(state, len, true)
}

unsafe extern "C" fn allocate_uninitialized(state: &AllocatorState, len: usize) -> *mut c_void {
    allocate_with(state, len, false)
}

unsafe extern "C" fn free(state: &AllocatorState, data: *mut c_void, len: usize) {
    if data.is_null() || len == 0 {
        return;
    }
    let Ok(layout) = Layout::from_size_align(len, BUFFER_ALIGN) else {
        return;
    };
    // SAFETY: the engine frees with the length it allocated with
    unsafe { dealloc(data.cast::<u8>(), layout) };
    state.accounting.release(len);
}

unsafe extern "C" fn drop_state(state: *const AllocatorState) {
    // SAFETY: created by Box::into_raw in new_array_buffer_allocator
    drop(unsafe { Box::from_raw(state.cast_mut()) });
}

static VTABLE: v8::RustAllocatorVtable<AllocatorState> = v8::RustAllocatorVtable {
    allocate,
    allocate_uninitialized,
    free,
    drop: drop_state,
};

/// Array buffer allocator enforcing `accounting`'s ceiling. A rejected
/// allocation surfaces in script as a `RangeError`.
pub(crate) fn new_array_buffer_allocator(
    accounting: Arc<ArrayBufferAccounting>,
) -> v8::UniqueRef<v8::Allocator> {
    let state = Box::new(AllocatorState { accounting });
    // SAFETY: the vtable matches the state type and the engine calls drop once
    unsafe { v8::new_rust_allocator(Box::into_raw(state), &VTABLE) }
}
