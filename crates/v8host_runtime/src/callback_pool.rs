use std::cell::RefCell;

use parking_lot::ReentrantMutex;

/// Index of an occupied slot in a [`CallbackPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackSlot(usize);

impl CallbackSlot {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Fixed-capacity table of callbacks addressed by slot index.
///
/// Allocation always takes the lowest free slot, so freed slots are reused
/// deterministically. The table is guarded by a re-entrant lock so a callback
/// running out of a slot may allocate or free other slots.
pub struct CallbackPool<T> {
    slots: ReentrantMutex<RefCell<Vec<Option<T>>>>,
}

impl<T> CallbackPool<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: ReentrantMutex::new(RefCell::new(slots)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().borrow().len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.lock().borrow().iter().filter(|s| s.is_some()).count()
    }

    /// Stores `callback` in the lowest free slot, or returns `None` when every
    /// slot is occupied.
    pub fn alloc(&self, callback: T) -> Option<CallbackSlot> {
        self.try_alloc(callback).ok()
    }

    /// Like [`CallbackPool::alloc`] but hands the callback back when the pool
    /// is saturated.
    pub fn try_alloc(&self, callback: T) -> Result<CallbackSlot, T> {
        let guard = self.slots.lock();
        let mut slots = guard.borrow_mut();
        let Some(index) = slots.iter().position(Option::is_none) else {
            return Err(callback);
        };
        slots[index] = Some(callback);
        Ok(CallbackSlot(index))
    }

    /// Clears a slot. Returns false if it was already free or out of range.
    pub fn free(&self, slot: CallbackSlot) -> bool {
        self.take(slot).is_some()
    }

    /// Clears a slot and hands back what it held.
    pub fn take(&self, slot: CallbackSlot) -> Option<T> {
        let guard = self.slots.lock();
        let mut slots = guard.borrow_mut();
        slots.get_mut(slot.0).and_then(Option::take)
    }

    pub fn is_occupied(&self, slot: CallbackSlot) -> bool {
        self.slots
            .lock()
            .borrow()
            .get(slot.0)
            .is_some_and(Option::is_some)
    }
}

impl<T: Clone> CallbackPool<T> {
    /// Clones the callback out so the lock is not held while it runs.
    pub fn get(&self, slot: CallbackSlot) -> Option<T> {
        self.slots.lock().borrow().get(slot.0).cloned().flatten()
    }
}
