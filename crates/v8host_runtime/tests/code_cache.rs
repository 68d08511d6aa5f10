mod utils;

use std::sync::Arc;

use serial_test::serial;
use v8host_runtime::{
    ContextConfig, DocumentInfo, HostEnvironment, IsolateConfig, V8CacheKind, V8CacheResult, V8Isolate, Value,
};

use crate::utils::create_context;

#[test]
#[serial]
fn test_update_cache_round_trip() {
    let (_isolate, context) = create_context();
    let document = DocumentInfo::script("sum.js");

    let mut bytes = Vec::new();
    let (script, result) = context.compile_updating_cache(&document, "1+2+3", &mut bytes).unwrap();
    assert_eq!(result, V8CacheResult::Updated);
    assert!(!bytes.is_empty());
    assert_eq!(context.execute_script(&script, true).unwrap(), Value::Number(6.0));

    let (_, result) = context.compile_updating_cache(&document, "1+2+3", &mut bytes).unwrap();
    assert_eq!(result, V8CacheResult::Verified);

    let produced = bytes.clone();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    let (_, result) = context.compile_updating_cache(&document, "1+2+3", &mut bytes).unwrap();
    assert_eq!(result, V8CacheResult::Updated);
    assert_eq!(bytes, produced);
}

#[test]
#[serial]
fn test_produced_cache_is_accepted_elsewhere() {
    let (_isolate, producer) = create_context();
    let code = "function square(n) { return n * n } square(9)";
    let (_, produced) = producer
        .compile_producing_cache(&DocumentInfo::script("square.js"), code)
        .unwrap();
    let produced = produced.expect("engine should produce a code cache");

    let (_isolate, consumer) = create_context();
    let (script, accepted) = consumer
        .compile_consuming_cache(&DocumentInfo::script("square.js"), code, &produced)
        .unwrap();
    assert!(accepted);
    assert_eq!(consumer.execute_script(&script, true).unwrap(), Value::Number(81.0));
}

#[test]
#[serial]
fn test_garbage_cache_is_rejected() {
    let (_isolate, context) = create_context();
    let (script, accepted) = context
        .compile_consuming_cache(&DocumentInfo::script("junk.js"), "40 + 2", &[1, 2, 3, 4])
        .unwrap();
    assert!(!accepted);
    assert_eq!(context.execute_script(&script, true).unwrap(), Value::Number(42.0));
}

#[test]
#[serial]
fn test_no_cache_reports_disabled() {
    let (_isolate, context) = create_context();
    let mut bytes = Vec::new();
    let (_, result) = context
        .compile_with_cache(&DocumentInfo::script("plain.js"), "1", V8CacheKind::None, &mut bytes)
        .unwrap();
    assert_eq!(result, V8CacheResult::Disabled);
    assert!(bytes.is_empty());
}

#[test]
#[serial]
fn test_module_cache_round_trip() {
    let (_isolate, context) = create_context();
    let document = DocumentInfo::module("cached.mjs");
    let code = "import.meta.setResult(7 * 6);";

    let mut bytes = Vec::new();
    let (module, result) = context.compile_updating_cache(&document, code, &mut bytes).unwrap();
    assert_eq!(result, V8CacheResult::Updated);
    assert!(!bytes.is_empty());
    assert_eq!(context.execute_script(&module, true).unwrap(), Value::Number(42.0));

    let (_, result) = context.compile_updating_cache(&document, code, &mut bytes).unwrap();
    assert_eq!(result, V8CacheResult::Verified);
}

#[test]
#[serial]
fn test_script_cache_shared_across_contexts() {
    let (isolate, context) = create_context();
    context.compile(&DocumentInfo::script("a.js"), "1").unwrap();
    let other = isolate.create_context(Default::default()).unwrap();
    other.compile(&DocumentInfo::script("b.js"), "2").unwrap();
    let statistics = isolate.statistics().unwrap();
    assert_eq!(statistics.script_cache_size, 2);
}

/// Host allowing two entries in each compiled-artifact cache.
struct TwoEntryCacheHost;

impl HostEnvironment for TwoEntryCacheHost {
    fn max_script_cache_size(&self) -> usize {
        2
    }

    fn max_module_cache_size(&self) -> usize {
        2
    }
}

const GARBAGE: &[u8] = &[1, 2, 3, 4];

#[test]
#[serial]
fn test_least_recently_used_script_is_evicted() {
    let isolate = V8Isolate::new(IsolateConfig::default(), Arc::new(TwoEntryCacheHost)).unwrap();
    let context = isolate.create_context(ContextConfig::default()).unwrap();
    let documents: Vec<_> = ["a.js", "b.js", "c.js", "d.js"].into_iter().map(DocumentInfo::script).collect();
    let [a, b, c, d] = &documents[..] else {
        unreachable!()
    };

    context.compile(a, "1").unwrap();
    context.compile(b, "2").unwrap();
    // a cached artifact accepts any bytes without consulting the engine
    let (_, accepted) = context.compile_consuming_cache(a, "1", GARBAGE).unwrap();
    assert!(accepted);

    context.compile(c, "3").unwrap();
    let (_, accepted) = context.compile_consuming_cache(b, "2", GARBAGE).unwrap();
    assert!(!accepted, "b.js should have been evicted");

    context.compile(d, "4").unwrap();
    let statistics = isolate.statistics().unwrap();
    assert!(statistics.script_cache_size <= 2);
    let (_, accepted) = context.compile_consuming_cache(a, "1", GARBAGE).unwrap();
    assert!(!accepted, "a.js should have been evicted");
}

#[test]
#[serial]
fn test_least_recently_used_module_is_evicted() {
    let isolate = V8Isolate::new(IsolateConfig::default(), Arc::new(TwoEntryCacheHost)).unwrap();
    let context = isolate.create_context(ContextConfig::default()).unwrap();
    let first = DocumentInfo::module("first.mjs");

    context.compile(&first, "export const n = 1;").unwrap();
    let (_, accepted) = context
        .compile_consuming_cache(&first, "export const n = 1;", GARBAGE)
        .unwrap();
    assert!(accepted);

    context.compile(&DocumentInfo::module("second.mjs"), "export const n = 2;").unwrap();
    context.compile(&DocumentInfo::module("third.mjs"), "export const n = 3;").unwrap();
    assert!(isolate.statistics().unwrap().module_cache_size <= 2);

    let (_, accepted) = context
        .compile_consuming_cache(&first, "export const n = 1;", GARBAGE)
        .unwrap();
    assert!(!accepted, "first.mjs should have been evicted");
}
