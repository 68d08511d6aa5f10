use std::time::Duration;

/// Heap samples are never taken more often than this.
pub const MIN_HEAP_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// Smallest growth granted when the engine asks for more heap.
pub const MIN_HEAP_EXPANSION: usize = 1024 * 1024;

pub fn heap_watch_interval(sample_interval_ms: u64) -> Duration {
    Duration::from_millis(sample_interval_ms).max(MIN_HEAP_SAMPLE_INTERVAL)
}

/// Size checked against the heap ceiling: the engine's managed heap plus
/// live array buffer memory handed out by the isolate's own allocator.
pub fn governed_heap_size(total_heap_size: usize, array_buffer_bytes: usize) -> usize {
    total_heap_size.saturating_add(array_buffer_bytes)
}

pub fn exceeds_heap_limit(total_heap_size: usize, max_heap_size: usize) -> bool {
    max_heap_size > 0 && total_heap_size > max_heap_size
}

/// New engine heap limit for the near-heap-limit hook, or `None` when
/// expansion is disabled.
pub fn expanded_heap_limit(current_limit: usize, multiplier: f64) -> Option<usize> {
    if !multiplier.is_finite() || multiplier <= 1.0 {
        return None;
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let scaled = (current_limit as f64 * multiplier) as usize;
    Some(scaled.max(current_limit.saturating_add(MIN_HEAP_EXPANSION)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapViolationAction {
    /// Disable the ceiling and throw a `RangeError` into running script
    ThrowRangeError,
    /// Mark the isolate out of memory and terminate execution
    Terminate,
}

pub fn heap_violation_action(
    disable_violation_interrupt: bool,
    executing: bool,
) -> HeapViolationAction {
    if disable_violation_interrupt && executing {
        HeapViolationAction::ThrowRangeError
    } else {
        HeapViolationAction::Terminate
    }
}
