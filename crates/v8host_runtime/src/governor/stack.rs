/// Minimum headroom kept between the stack limit and the marker it was
/// computed from.
pub const STACK_BREATHING_ROOM: usize = 16 * 1024;

const MIN_STACK_LIMIT: usize = std::mem::size_of::<usize>();

/// Stack window pinned when the outermost execution scope is entered.
///
/// Stacks grow downward: re-entering script from a frame whose address is
/// below `limit` means the configured usage has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLimits {
    pub marker: usize,
    pub limit: usize,
}

impl StackLimits {
    /// `None` when `max_usage` is zero, which disables the check.
    pub fn compute(marker: usize, max_usage: usize) -> Option<Self> {
        if max_usage == 0 {
            return None;
        }
        let usage = max_usage.max(STACK_BREATHING_ROOM);
        let limit = marker.saturating_sub(usage).max(MIN_STACK_LIMIT);
        Some(Self { marker, limit })
    }

    pub fn is_exceeded_at(&self, marker: usize) -> bool {
        marker < self.limit
    }

    pub fn remaining_at(&self, marker: usize) -> usize {
        marker.saturating_sub(self.limit)
    }
}

/// Address of a local in the caller's frame.
#[inline(never)]
pub fn current_stack_marker() -> usize {
    let marker = 0u8;
    std::ptr::from_ref(std::hint::black_box(&marker)) as usize
}
