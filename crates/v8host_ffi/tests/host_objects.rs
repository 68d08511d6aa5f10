mod utils;

use serial_test::serial;
use v8host_ffi::{
    V8Context_SetGlobalProperty, V8Host_GetLiveHostObjectCount, V8Value, V8ValueKind,
};

use crate::utils::{
    DELEGATE_BASE, INVOCABLE_BASE, RECORDER, create_context, create_isolate, execute, host_object_value,
    install, take_exceptions, take_string, teardown,
};

fn set_global(context: *mut v8host_ffi::V8ContextHandle, name: &str, value: &V8Value) {
    unsafe { V8Context_SetGlobalProperty(context, name.as_ptr(), name.len(), value, false) };
}

#[test]
#[serial]
fn test_host_object_properties() {
    install();
    RECORDER.lock().objects.entry(0x100).or_default().insert("answer".to_string(), 42.0);
    let isolate = create_isolate(0);
    let context = create_context(isolate);
    set_global(context, "host", &host_object_value(0x100));

    assert_eq!(execute(context, "host.answer").number, 42.0);
    assert_eq!(execute(context, "host.missing").kind, V8ValueKind::Undefined);

    execute(context, "host.written = 5");
    assert_eq!(RECORDER.lock().objects[&0x100].get("written"), Some(&5.0));

    let mut names = execute(context, "Object.keys(host).join(',')");
    assert_eq!(take_string(&mut names), "answer,written");

    execute(context, "delete host.written");
    assert!(!RECORDER.lock().objects[&0x100].contains_key("written"));
    assert!(take_exceptions().is_empty());
    teardown(isolate, context);
}

#[test]
#[serial]
fn test_host_pointer_keeps_one_identity() {
    install();
    let isolate = create_isolate(0);
    let context = create_context(isolate);
    set_global(context, "first", &host_object_value(0x200));
    set_global(context, "second", &host_object_value(0x200));
    assert!(V8Host_GetLiveHostObjectCount() >= 1);

    let same = execute(context, "first === second");
    assert_eq!(same.number, 1.0);
    teardown(isolate, context);
}

#[test]
#[serial]
fn test_invocable_host_objects() {
    install();
    let isolate = create_isolate(0);
    let context = create_context(isolate);
    set_global(context, "sum", &host_object_value(DELEGATE_BASE + 1));
    set_global(context, "plain", &host_object_value(INVOCABLE_BASE + 1));

    let mut kind = execute(context, "typeof sum");
    assert_eq!(take_string(&mut kind), "function");
    assert_eq!(execute(context, "sum(1, 2, 39)").number, 42.0);
    let mut kind = execute(context, "typeof plain");
    assert_eq!(take_string(&mut kind), "object");
    assert!(take_exceptions().is_empty());
    teardown(isolate, context);
}

#[test]
#[serial]
fn test_host_failure_token_comes_back() {
    install();
    RECORDER.lock().failing.insert(0x300, 0xBEEF);
    let isolate = create_isolate(0);
    let context = create_context(isolate);
    set_global(context, "broken", &host_object_value(0x300));

    let mut caught = execute(context, "try { broken.value } catch (e) { e.message }");
    assert_eq!(take_string(&mut caught), "cannot read value");

    execute(context, "broken.value");
    let exceptions = take_exceptions();
    assert_eq!(exceptions.len(), 1);
    assert!(exceptions[0].message.contains("cannot read value"), "{}", exceptions[0].message);
    assert_eq!(exceptions[0].inner_exception, 0xBEEF);
    teardown(isolate, context);
}

#[test]
#[serial]
fn test_host_object_released_after_collection() {
    install();
    let isolate = create_isolate(0);
    let context = create_context(isolate);
    set_global(context, "temp", &host_object_value(0x400));
    execute(context, "delete globalThis.temp");
    teardown(isolate, context);

    // disposing the context drops its proxy registry
    assert!(RECORDER.lock().released_objects.contains(&0x400));
}
