mod utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serial_test::serial;
use v8host_runtime::{
    ContextConfig, DocumentInfo, HostEnumerator, HostException, HostExceptionObject, HostFunction,
    HostObject, HostObjectHolder, HostResult, IsolateConfig, PropertyBag, V8ExceptionKind, Value,
};

use crate::utils::{create_context, create_context_with, eval};

/// Counts reads of its single cacheable property.
#[derive(Default)]
struct CountingObject {
    reads: AtomicUsize,
}

impl HostObject for CountingObject {
    fn get_property(&self, name: &str) -> HostResult<Value> {
        if name == "value" {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(Value::from(reads as f64));
        }
        Ok(Value::Nonexistent)
    }

    fn is_cacheable(&self, name: &str) -> bool {
        name == "value"
    }
}

#[test]
#[serial]
fn test_global_members_resolve_host_properties() {
    let (_isolate, context) = create_context();
    let host = PropertyBag::new().with("greeting", "hello").with("answer", 42.0);
    context
        .set_global_property("host", Value::host_object(host), true)
        .unwrap();

    assert_eq!(eval(&context, "greeting + ' world'"), Value::from("hello world"));
    assert_eq!(eval(&context, "answer + 1"), Value::Number(43.0));
    assert_eq!(eval(&context, "typeof missingName"), Value::from("undefined"));
}

#[test]
#[serial]
fn test_script_globals_shadow_global_members() {
    let (_isolate, context) = create_context();
    context
        .set_global_property("host", Value::host_object(PropertyBag::new().with("shared", 1.0)), true)
        .unwrap();
    eval(&context, "var shared = 2;");
    assert_eq!(eval(&context, "shared"), Value::Number(2.0));
}

#[test]
#[serial]
fn test_cyclic_proxy_sees_updates() {
    let (_isolate, context) = create_context();
    context
        .set_global_property("host", Value::host_object(PropertyBag::new()), true)
        .unwrap();
    let result = eval(&context, "host.self = host; host.self.self.name = 'x'; host.name");
    assert_eq!(result, Value::from("x"));
    assert_eq!(eval(&context, "host.self === host"), Value::Boolean(true));
}

#[test]
#[serial]
fn test_cacheable_properties_refresh_on_access_change() {
    let (_isolate, context) = create_context();
    let counting = Arc::new(CountingObject::default());
    context
        .set_global_property(
            "counter",
            Value::HostObject(HostObjectHolder::new(counting.clone())),
            false,
        )
        .unwrap();

    assert_eq!(eval(&context, "counter.value + counter.value"), Value::Number(2.0));
    assert_eq!(counting.reads.load(Ordering::SeqCst), 1);

    context.on_access_settings_changed().unwrap();
    assert_eq!(eval(&context, "counter.value"), Value::Number(2.0));
    assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
}

#[test]
#[serial]
fn test_host_function_invocation() {
    let (_isolate, context) = create_context();
    let add = HostFunction::new(|args| {
        let sum: f64 = args.iter().filter_map(Value::as_f64).sum();
        Ok(Value::Number(sum))
    });
    context.set_global_property("add", add.into_value(), false).unwrap();
    assert_eq!(eval(&context, "add(1, 2, 3)"), Value::Number(6.0));
    assert_eq!(eval(&context, "typeof add"), Value::from("function"));

    let callback = HostFunction::new(|_| Ok(Value::from("called")));
    context.set_global_property("callback", callback.into_value(), false).unwrap();
    assert_eq!(eval(&context, "[1].map(callback)[0]"), Value::from("called"));
}

#[test]
#[serial]
fn test_plain_invocable_is_an_object_to_script() {
    let (_isolate, context) = create_context();
    let action = HostFunction::invocable(|_| Ok(Value::from("ran")));
    context.set_global_property("action", action.into_value(), false).unwrap();

    assert_eq!(eval(&context, "typeof action"), Value::from("object"));
    assert_eq!(
        eval(&context, "try { action(); 'called' } catch (e) { e.constructor.name }"),
        Value::from("TypeError")
    );

    let callback = HostFunction::new(|_| Ok(Value::from("ran")));
    context.set_global_property("callback", callback.into_value(), false).unwrap();
    assert_eq!(eval(&context, "typeof callback + ':' + callback()"), Value::from("function:ran"));
}

#[test]
#[serial]
fn test_host_exception_reaches_caller() {
    let (_isolate, context) = create_context();
    let fail = HostFunction::new(|_| Err(HostException::new("host said no").with_payload(7_u32)));
    context.set_global_property("fail", fail.into_value(), false).unwrap();

    assert_eq!(
        eval(&context, "try { fail(); } catch (e) { e.message }"),
        Value::from("host said no")
    );

    let err = context
        .execute(&DocumentInfo::script("fail.js"), "fail()", true)
        .unwrap_err();
    assert_eq!(err.kind, V8ExceptionKind::General);
    assert!(err.message.contains("host said no"), "{}", err.message);
    let inner = err.inner_exception.expect("host exception should be attached");
    assert_eq!(inner.payload::<u32>(), Some(&7));
}

#[test]
#[serial]
fn test_hidden_host_exceptions() {
    let (_isolate, context) = create_context_with(
        IsolateConfig::default(),
        ContextConfig::default().with_hide_host_exceptions(true),
    );
    let fail = HostFunction::new(|_| Err(HostException::new("secret")));
    context.set_global_property("fail", fail.into_value(), false).unwrap();
    let err = context
        .execute(&DocumentInfo::script("fail.js"), "fail()", true)
        .unwrap_err();
    assert!(err.inner_exception.is_none());
}

#[test]
#[serial]
fn test_thrown_host_exception_object() {
    let (_isolate, context) = create_context();
    let error = HostExceptionObject::new(HostException::new("wrapped"));
    context.set_global_property("hostError", Value::host_object(error), false).unwrap();
    let err = context
        .execute(&DocumentInfo::script("throw.js"), "throw hostError", true)
        .unwrap_err();
    assert_eq!(
        err.inner_exception.map(|inner| inner.message().to_string()),
        Some("wrapped".to_string())
    );
}

#[test]
#[serial]
fn test_host_enumerator_is_iterable() {
    let (_isolate, context) = create_context();
    let items = HostEnumerator::new(vec![Value::from(1), Value::from(2), Value::from(3)]);
    context.set_global_property("items", items.into_value(), false).unwrap();
    assert_eq!(
        eval(&context, "let total = 0; for (const item of items) total += item; total"),
        Value::Number(6.0)
    );
}

#[test]
#[serial]
fn test_host_object_identity_round_trips() {
    let (_isolate, context) = create_context();
    let bag = Value::host_object(PropertyBag::new().with("a", 1.0));
    context.set_global_property("bag", bag.clone(), false).unwrap();
    let back = eval(&context, "bag");
    assert_eq!(back, bag);
    assert_eq!(eval(&context, "Object.keys(bag).join(',')"), Value::from("a"));
}

#[test]
#[serial]
fn test_host_property_writes_and_deletes() {
    let (_isolate, context) = create_context();
    let bag = Arc::new(PropertyBag::new());
    context
        .set_global_property("bag", Value::HostObject(HostObjectHolder::new(bag.clone())), false)
        .unwrap();
    eval(&context, "bag.color = 'blue'; bag.size = 3; delete bag.size;");
    assert_eq!(bag.get("color"), Some(Value::from("blue")));
    assert_eq!(bag.get("size"), None);
}
