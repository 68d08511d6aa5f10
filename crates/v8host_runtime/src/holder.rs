use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::host::{HostObject, Invocability};
use crate::isolate::core::IsolateCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum V8ObjectSubtype {
    None,
    Function,
    Iterator,
    Promise,
    Array,
    ArrayBuffer,
    DataView,
    Date,
    Uint8Array,
    Uint8ClampedArray,
    Int8Array,
    Uint16Array,
    Int16Array,
    Uint32Array,
    Int32Array,
    BigUint64Array,
    BigInt64Array,
    Float32Array,
    Float64Array,
}

impl V8ObjectSubtype {
    pub fn is_array_buffer_or_view(self) -> bool {
        matches!(
            self,
            Self::ArrayBuffer
                | Self::DataView
                | Self::Uint8Array
                | Self::Uint8ClampedArray
                | Self::Int8Array
                | Self::Uint16Array
                | Self::Int16Array
                | Self::Uint32Array
                | Self::Int32Array
                | Self::BigUint64Array
                | Self::BigInt64Array
                | Self::Float32Array
                | Self::Float64Array
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct V8ObjectFlags: u32 {
        const SHARED = 1;
        const ASYNC = 1 << 1;
        const GENERATOR = 1 << 2;
        const PENDING = 1 << 3;
        const REJECTED = 1 << 4;
    }
}

/// Backing store window of a shared buffer or a view onto one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedBufferInfo {
    pub offset: usize,
    pub size: usize,
    pub length: usize,
}

pub(crate) struct V8ObjectEntry {
    owner: Weak<IsolateCore>,
    id: u64,
    subtype: V8ObjectSubtype,
    flags: V8ObjectFlags,
    identity_hash: i32,
    shared_buffer: Option<SharedBufferInfo>,
    released: AtomicBool,
}

impl V8ObjectEntry {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        // a dead isolate already dropped its object table
        if let Some(core) = self.owner.upgrade() {
            core.release_entity(self.id);
        }
    }
}

impl Drop for V8ObjectEntry {
    fn drop(&mut self) {
        self.release();
    }
}

/// Host reference to a script object living in an isolate's object table.
///
/// Clones share one entry. The script object is unpinned once the last clone
/// drops or [`V8ObjectHolder::release`] is called, whichever comes first.
#[derive(Clone)]
pub struct V8ObjectHolder(Arc<V8ObjectEntry>);

impl V8ObjectHolder {
    pub(crate) fn new(
        owner: Weak<IsolateCore>,
        id: u64,
        subtype: V8ObjectSubtype,
        flags: V8ObjectFlags,
        identity_hash: i32,
        shared_buffer: Option<SharedBufferInfo>,
    ) -> Self {
        Self(Arc::new(V8ObjectEntry {
            owner,
            id,
            subtype,
            flags,
            identity_hash,
            shared_buffer,
            released: AtomicBool::new(false),
        }))
    }

    pub fn subtype(&self) -> V8ObjectSubtype {
        self.0.subtype
    }

    pub fn flags(&self) -> V8ObjectFlags {
        self.0.flags
    }

    pub fn identity_hash(&self) -> i32 {
        self.0.identity_hash
    }

    pub fn shared_buffer(&self) -> Option<SharedBufferInfo> {
        self.0.shared_buffer
    }

    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::Acquire)
    }

    /// Unpins the script object. Repeated calls are no-ops, and so is a
    /// release after the owning isolate went away.
    pub fn release(&self) {
        self.0.release();
    }

    pub(crate) fn entity_id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn belongs_to(&self, core: &Arc<IsolateCore>) -> bool {
        std::ptr::eq(self.0.owner.as_ptr(), Arc::as_ptr(core))
    }

    pub(crate) fn same_entity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (std::ptr::eq(self.0.owner.as_ptr(), other.0.owner.as_ptr())
                && self.0.id == other.0.id)
    }
}

impl fmt::Debug for V8ObjectHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("V8ObjectHolder")
            .field("id", &self.0.id)
            .field("subtype", &self.0.subtype)
            .field("flags", &self.0.flags)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostObjectSubtype {
    Plain,
    Invocable,
    Delegate,
    Fast,
    FastFunction,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HostObjectFlags: u32 {
        const ASYNC = 1;
        const GENERATOR = 1 << 1;
        const FAST = 1 << 2;
    }
}

struct HostObjectEntry {
    object: Arc<dyn HostObject>,
    subtype: HostObjectSubtype,
    flags: HostObjectFlags,
}

/// Reference-counted carrier of a host object crossing into the engine.
///
/// Every script proxy for the object keeps its own clone.
#[derive(Clone)]
pub struct HostObjectHolder(Arc<HostObjectEntry>);

impl HostObjectHolder {
    pub fn new(object: Arc<dyn HostObject>) -> Self {
        let subtype = match object.invocability() {
            Invocability::None => HostObjectSubtype::Plain,
            Invocability::Invocable => HostObjectSubtype::Invocable,
            Invocability::Delegate => HostObjectSubtype::Delegate,
        };
        Self::with_subtype(object, subtype, HostObjectFlags::empty())
    }

    /// Wraps an object whose proxy skips the per-object property cache.
    pub fn fast(object: Arc<dyn HostObject>) -> Self {
        let subtype = match object.invocability() {
            Invocability::None | Invocability::Invocable => HostObjectSubtype::Fast,
            Invocability::Delegate => HostObjectSubtype::FastFunction,
        };
        Self::with_subtype(object, subtype, HostObjectFlags::FAST)
    }

    pub fn with_subtype(
        object: Arc<dyn HostObject>,
        subtype: HostObjectSubtype,
        flags: HostObjectFlags,
    ) -> Self {
        Self(Arc::new(HostObjectEntry {
            object,
            subtype,
            flags,
        }))
    }

    #[must_use]
    pub fn with_flags(&self, flags: HostObjectFlags) -> Self {
        Self::with_subtype(self.0.object.clone(), self.0.subtype, flags)
    }

    pub fn object(&self) -> &Arc<dyn HostObject> {
        &self.0.object
    }

    pub fn subtype(&self) -> HostObjectSubtype {
        self.0.subtype
    }

    pub fn flags(&self) -> HostObjectFlags {
        self.0.flags
    }

    pub fn is_fast(&self) -> bool {
        matches!(
            self.0.subtype,
            HostObjectSubtype::Fast | HostObjectSubtype::FastFunction
        )
    }

    /// Address of the wrapped object, stable for its lifetime
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0.object).cast::<()>() as usize
    }

    /// Number of live holders sharing this carrier
    pub fn holder_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for HostObjectHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObjectHolder")
            .field("identity", &format_args!("{:#x}", self.identity()))
            .field("subtype", &self.0.subtype)
            .field("flags", &self.0.flags)
            .finish()
    }
}
