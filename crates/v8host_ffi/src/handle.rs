use std::sync::Arc;

use parking_lot::RwLock;
use v8host_runtime::V8Exception;

/// Opaque handle owned by the host.
///
/// Clones share one entity slot, so releasing the entity through any clone
/// releases it for all of them. The handle allocation itself lives until its
/// `_DestroyHandle` call.
pub struct Handle<T> {
    entity: Arc<RwLock<Option<T>>>,
}

impl<T> Handle<T> {
    pub(crate) fn into_raw(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            entity: Arc::new(RwLock::new(Some(value))),
        }))
    }

    pub(crate) fn clone_raw(&self) -> *mut Self {
        Box::into_raw(Box::new(Self {
            entity: self.entity.clone(),
        }))
    }

    /// Empties the shared slot. Later calls return `None`.
    pub(crate) fn take(&self) -> Option<T> {
        self.entity.write().take()
    }

    pub fn is_released(&self) -> bool {
        self.entity.read().is_none()
    }
}

impl<T: Clone> Handle<T> {
    pub(crate) fn get(&self) -> Option<T> {
        self.entity.read().clone()
    }
}

/// # Safety
/// `ptr` is null or came from [`Handle::into_raw`]/[`Handle::clone_raw`] and
/// has not been destroyed.
pub(crate) unsafe fn handle_ref<'a, T>(ptr: *const Handle<T>) -> Option<&'a Handle<T>> {
    unsafe { ptr.as_ref() }
}

/// The live entity behind `ptr`.
///
/// # Safety
/// As for [`handle_ref`].
pub(crate) unsafe fn entity<T: Clone>(ptr: *const Handle<T>, what: &str) -> Result<T, V8Exception> {
    unsafe { handle_ref(ptr) }
        .and_then(Handle::get)
        .ok_or_else(|| V8Exception::general(format!("The {what} handle is invalid or released")))
}

/// # Safety
/// As for [`handle_ref`]; `ptr` must not be used afterwards.
pub(crate) unsafe fn destroy<T>(ptr: *mut Handle<T>) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

/// # Safety
/// As for [`handle_ref`].
pub(crate) unsafe fn clone_handle<T>(ptr: *const Handle<T>) -> *mut Handle<T> {
    unsafe { handle_ref(ptr) }.map_or(std::ptr::null_mut(), Handle::clone_raw)
}

/// # Safety
/// As for [`handle_ref`].
pub(crate) unsafe fn release<T>(ptr: *const Handle<T>) -> Option<T> {
    unsafe { handle_ref(ptr) }.and_then(Handle::take)
}
