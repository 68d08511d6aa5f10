mod utils;

use serial_test::serial;
use v8host_runtime::{ContextConfig, DocumentInfo, IsolateConfig, V8ExceptionKind, Value};

use crate::utils::{create_context_with, eval};

const MIB: usize = 1024 * 1024;

#[test]
#[serial]
fn test_heap_ceiling_raises_fatal_exception() {
    let config = IsolateConfig::default()
        .with_max_heap_size(16 * MIB)
        .with_heap_size_sample_interval_ms(50);
    let (isolate, context) = create_context_with(config, ContextConfig::default());

    let err = context
        .execute(
            &DocumentInfo::script("heap-bomb.js"),
            "const a = []; while (true) a.push(new Array(65536).fill(1));",
            true,
        )
        .unwrap_err();
    assert_eq!(err.kind, V8ExceptionKind::Fatal);
    assert!(err.message.contains("exceeded its memory limit"), "{}", err.message);
    assert!(err.execution_started);
    assert!(isolate.is_out_of_memory());

    let again = context
        .execute(&DocumentInfo::script("after.js"), "1", true)
        .unwrap_err();
    assert_eq!(again.kind, V8ExceptionKind::Fatal);
}

#[test]
#[serial]
fn test_array_buffer_heap_bomb_raises_fatal_exception() {
    let config = IsolateConfig::default()
        .with_max_heap_size(16 * MIB)
        .with_heap_size_sample_interval_ms(50);
    let (isolate, context) = create_context_with(config, ContextConfig::default());

    let err = context
        .execute(
            &DocumentInfo::script("buffer-bomb.js"),
            "const a = []; while (true) a.push(new ArrayBuffer(65536));",
            true,
        )
        .unwrap_err();
    assert_eq!(err.kind, V8ExceptionKind::Fatal);
    assert!(err.message.contains("exceeded its memory limit"), "{}", err.message);
    assert!(err.execution_started);
    assert!(isolate.is_out_of_memory());
    assert!(isolate.statistics().unwrap().array_buffer_allocation > 0);
}

#[test]
#[serial]
fn test_heap_violation_throws_range_error_when_interrupt_disabled() {
    let config = IsolateConfig::default()
        .with_max_heap_size(16 * MIB)
        .with_heap_size_sample_interval_ms(50)
        .with_disable_heap_size_violation_interrupt(true);
    let (isolate, context) = create_context_with(config, ContextConfig::default());

    let outcome = eval(
        &context,
        "const hoard = [];
         let outcome = 'completed';
         try {
             while (true) hoard.push(new ArrayBuffer(65536));
         } catch (e) {
             outcome = e.constructor.name + ': ' + e.message;
         }
         hoard.length = 0;
         outcome",
    );
    let Value::String(outcome) = outcome else {
        panic!("expected a string, got {outcome:?}");
    };
    assert!(outcome.starts_with("RangeError"), "{outcome}");
    assert!(outcome.contains("exceeded its memory limit"), "{outcome}");

    assert!(!isolate.is_out_of_memory());
    assert_eq!(isolate.max_heap_size(), 0);
    assert_eq!(eval(&context, "'still usable'"), Value::from("still usable"));
}

#[test]
#[serial]
fn test_heap_stays_under_ceiling_after_execute() {
    let config = IsolateConfig::default().with_max_heap_size(64 * MIB);
    let (isolate, context) = create_context_with(config, ContextConfig::default());

    eval(&context, "let kept = []; for (let i = 0; i < 1000; i++) kept.push({ i }); kept.length");
    let statistics = isolate.heap_statistics().unwrap();
    assert!(statistics.total_heap_size <= 64 * MIB || isolate.is_out_of_memory());
    assert!(!isolate.is_out_of_memory());
}

#[test]
#[serial]
fn test_stack_ceiling_stops_runaway_recursion() {
    let config = IsolateConfig::default().with_max_stack_usage(256 * 1024);
    let (_isolate, context) = create_context_with(config, ContextConfig::default());

    let err = context
        .execute(&DocumentInfo::script("stack-bomb.js"), "function f() { f() } f();", true)
        .unwrap_err();
    assert_eq!(err.kind, V8ExceptionKind::General);
    assert!(
        err.message.contains("RangeError") || err.message.contains("stack usage limit exceeded"),
        "{}",
        err.message
    );

    assert_eq!(eval(&context, "'still usable'"), Value::from("still usable"));
}

#[test]
#[serial]
fn test_array_buffer_ceiling() {
    let config = IsolateConfig::default().with_max_array_buffer_allocation(MIB);
    let (isolate, context) = create_context_with(config, ContextConfig::default());

    assert_eq!(eval(&context, "new ArrayBuffer(512 * 1024).byteLength"), Value::Number(524288.0));
    let result = eval(
        &context,
        "try { globalThis.big = new ArrayBuffer(2 * 1024 * 1024); 'allocated' } catch (e) { e.constructor.name }",
    );
    assert_eq!(result, Value::from("RangeError"));

    let statistics = isolate.statistics().unwrap();
    assert!(statistics.array_buffer_allocation <= MIB);
}

#[test]
#[serial]
fn test_limits_adjust_at_runtime() {
    let (isolate, context) = create_context_with(IsolateConfig::default(), ContextConfig::default());
    assert_eq!(isolate.max_heap_size(), 0);

    isolate.set_max_heap_size(128 * MIB);
    isolate.set_max_stack_usage(512 * 1024);
    assert_eq!(isolate.max_heap_size(), 128 * MIB);
    assert_eq!(isolate.max_stack_usage(), 512 * 1024);

    isolate.set_heap_size_sample_interval(std::time::Duration::from_millis(10));
    assert!(isolate.heap_size_sample_interval() >= std::time::Duration::from_millis(50));

    assert_eq!(eval(&context, "[1, 2, 3].length"), Value::Number(3.0));
}
