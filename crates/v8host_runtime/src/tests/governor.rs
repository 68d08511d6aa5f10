use std::time::Duration;

use crate::governor::{
    ArrayBufferAccounting, HeapViolationAction, MIN_HEAP_EXPANSION, STACK_BREATHING_ROOM,
    StackLimits, current_stack_marker, exceeds_heap_limit, expanded_heap_limit,
    governed_heap_size, heap_violation_action, heap_watch_interval,
};

#[test]
fn test_array_buffer_ceiling() {
    let accounting = ArrayBufferAccounting::new(1024);
    assert!(accounting.try_reserve(1000));
    assert!(!accounting.try_reserve(25));
    assert!(accounting.try_reserve(24));
    assert_eq!(accounting.current(), 1024);
}

#[test]
fn test_array_buffer_release_clamps_at_zero() {
    let accounting = ArrayBufferAccounting::new(0);
    assert!(accounting.try_reserve(10));
    accounting.release(100);
    assert_eq!(accounting.current(), 0);
}

#[test]
fn test_unlimited_accounting_refuses_overflow() {
    let accounting = ArrayBufferAccounting::new(0);
    assert!(accounting.try_reserve(usize::MAX - 1));
    assert!(!accounting.try_reserve(2));
}

#[test]
fn test_stack_limit_keeps_breathing_room() {
    let limits = StackLimits::compute(1_000_000, 1024).unwrap();
    assert_eq!(limits.limit, 1_000_000 - STACK_BREATHING_ROOM);
    assert!(!limits.is_exceeded_at(limits.limit));
    assert!(limits.is_exceeded_at(limits.limit - 1));
    assert_eq!(limits.remaining_at(limits.limit + 10), 10);
}

#[test]
fn test_zero_stack_usage_disables_limit() {
    assert!(StackLimits::compute(current_stack_marker(), 0).is_none());
}

#[test]
fn test_stack_limit_does_not_underflow() {
    let limits = StackLimits::compute(100, 256 * 1024).unwrap();
    assert!(limits.limit > 0);
}

#[test]
fn test_heap_watch_interval_has_floor() {
    assert_eq!(heap_watch_interval(5), Duration::from_millis(50));
    assert_eq!(heap_watch_interval(250), Duration::from_millis(250));
}

#[test]
fn test_heap_limit_checks() {
    assert!(!exceeds_heap_limit(usize::MAX, 0));
    assert!(!exceeds_heap_limit(16, 16));
    assert!(exceeds_heap_limit(17, 16));
}

#[test]
fn test_array_buffer_bytes_count_toward_heap_ceiling() {
    assert_eq!(governed_heap_size(10, 0), 10);
    assert!(exceeds_heap_limit(governed_heap_size(10, 7), 16));
    assert_eq!(governed_heap_size(usize::MAX, 1), usize::MAX);
}

#[test]
fn test_heap_expansion_grows_by_at_least_minimum() {
    assert_eq!(expanded_heap_limit(100, 1.0), None);
    assert_eq!(expanded_heap_limit(100, f64::NAN), None);
    assert_eq!(expanded_heap_limit(100, 1.5), Some(100 + MIN_HEAP_EXPANSION));
    let large = 64 * MIN_HEAP_EXPANSION;
    assert_eq!(expanded_heap_limit(large, 2.0), Some(2 * large));
}

#[test]
fn test_heap_violation_policy() {
    assert_eq!(heap_violation_action(false, true), HeapViolationAction::Terminate);
    assert_eq!(heap_violation_action(true, true), HeapViolationAction::ThrowRangeError);
    assert_eq!(heap_violation_action(true, false), HeapViolationAction::Terminate);
}
