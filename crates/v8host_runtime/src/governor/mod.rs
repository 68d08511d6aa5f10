//! Heap, stack and array buffer ceilings enforced around script execution.

pub(crate) mod allocator;
pub mod heap;
pub mod stack;

pub use allocator::ArrayBufferAccounting;
pub use heap::{
    HeapViolationAction, MIN_HEAP_EXPANSION, MIN_HEAP_SAMPLE_INTERVAL, exceeds_heap_limit, expanded_heap_limit,
    governed_heap_size, heap_violation_action, heap_watch_interval,
};
pub use stack::{STACK_BREATHING_ROOM, StackLimits, current_stack_marker};
