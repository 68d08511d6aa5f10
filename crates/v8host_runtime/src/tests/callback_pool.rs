use std::sync::Arc;

use crate::callback_pool::{CallbackPool, CallbackSlot};

#[test]
fn test_alloc_returns_none_when_saturated() {
    let pool = CallbackPool::new(2);
    assert!(pool.alloc(1).is_some());
    assert!(pool.alloc(2).is_some());
    assert!(pool.alloc(3).is_none());
    assert_eq!(pool.in_use(), 2);
}

#[test]
fn test_freed_slot_is_reused_lowest_first() {
    let pool = CallbackPool::new(3);
    let first = pool.alloc("a").unwrap();
    let second = pool.alloc("b").unwrap();
    let _third = pool.alloc("c").unwrap();

    assert!(pool.free(second));
    assert!(pool.free(first));
    assert_eq!(pool.alloc("d"), Some(first));
    assert_eq!(pool.alloc("e"), Some(second));
}

#[test]
fn test_free_is_idempotent() {
    let pool = CallbackPool::new(1);
    let slot = pool.alloc(()).unwrap();
    assert!(pool.free(slot));
    assert!(!pool.free(slot));
    assert!(!pool.free(CallbackSlot::from_index(42)));
}

#[test]
fn test_callback_may_reenter_pool() {
    type Callback = Arc<dyn Fn(&CallbackPool<Callback>) -> Option<CallbackSlot> + Send + Sync>;
    let pool: CallbackPool<Callback> = CallbackPool::new(4);
    let reentrant: Callback = Arc::new(|pool| pool.alloc(Arc::new(|_| None)));
    let slot = pool.alloc(reentrant).unwrap();

    let callback = pool.get(slot).unwrap();
    let nested = callback(&pool);
    assert!(nested.is_some());
    assert_eq!(pool.in_use(), 2);
}

#[test]
fn test_try_alloc_hands_back_when_saturated() {
    let pool = CallbackPool::new(1);
    assert_eq!(pool.try_alloc("first"), Ok(CallbackSlot::from_index(0)));
    assert_eq!(pool.try_alloc("second"), Err("second"));
}
