use std::sync::Arc;

use crate::document::{DocumentInfo, DocumentKind, code_digest};
use crate::holder::{HostObjectHolder, HostObjectSubtype};
use crate::host::{HostObject, HostResult, Invocability, PropertyBag};
use crate::value::{BigIntValue, Value};

#[test]
fn test_bigint_words_round_trip_through_i128() {
    for value in [0i128, 1, -1, i128::from(u64::MAX) + 1, i128::MIN, i128::MAX] {
        assert_eq!(BigIntValue::from_i128(value).to_i128(), Some(value));
    }
}

#[test]
fn test_bigint_normalizes_zero() {
    let zero = BigIntValue::new(true, vec![0, 0]);
    assert!(zero.is_zero());
    assert!(!zero.sign_bit);
    assert_eq!(BigIntValue::new(false, vec![1, 2, 3]).to_i128(), None);
}

#[test]
fn test_host_object_values_compare_by_identity() {
    let bag: Arc<dyn HostObject> = Arc::new(PropertyBag::new());
    let a = Value::HostObject(HostObjectHolder::new(bag.clone()));
    let b = Value::HostObject(HostObjectHolder::new(bag));
    let c = Value::host_object(PropertyBag::new());

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_nonexistent_is_distinct_from_undefined() {
    assert_ne!(Value::Nonexistent, Value::Undefined);
    assert!(Value::default().is_nonexistent());
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert_eq!(Value::from(2.5).as_f64(), Some(2.5));
}

struct Callable;

impl HostObject for Callable {
    fn invoke(&self, _as_constructor: bool, args: &[Value]) -> HostResult<Value> {
        Ok(Value::Number(args.len() as f64))
    }

    fn invocability(&self) -> Invocability {
        Invocability::Delegate
    }
}

#[test]
fn test_holder_subtype_follows_invocability() {
    assert_eq!(
        HostObjectHolder::new(Arc::new(PropertyBag::new())).subtype(),
        HostObjectSubtype::Plain
    );
    let delegate = HostObjectHolder::new(Arc::new(Callable));
    assert_eq!(delegate.subtype(), HostObjectSubtype::Delegate);
    assert_eq!(
        HostObjectHolder::fast(Arc::new(Callable)).subtype(),
        HostObjectSubtype::FastFunction
    );
}

#[test]
fn test_document_ids_are_unique() {
    let a = DocumentInfo::script("a.js");
    let b = DocumentInfo::script("a.js");
    assert_ne!(a.unique_id(), b.unique_id());
    assert_eq!(a.kind(), DocumentKind::Script);

    let renamed = a.clone().with_source_map_url("a.js.map");
    assert_eq!(renamed.unique_id(), a.unique_id());
    assert_eq!(renamed.source_map_url(), Some("a.js.map"));
}

#[test]
fn test_code_digest_distinguishes_code() {
    assert_eq!(code_digest("1 + 2"), code_digest("1 + 2"));
    assert_ne!(code_digest("1 + 2"), code_digest("1 + 3"));
}
