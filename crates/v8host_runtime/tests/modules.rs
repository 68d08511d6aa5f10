mod utils;

use serial_test::serial;
use v8host_runtime::{ContextConfig, DocumentInfo, DocumentKind, PromiseState, Value};

use crate::utils::{ModuleHost, create_context, create_module_context};

#[test]
#[serial]
fn test_module_result_from_top_level_await() {
    let (_isolate, context) = create_context();
    let result = context
        .execute(
            &DocumentInfo::module("main.mjs"),
            "export let x = await Promise.resolve(42); import.meta.setResult(x);",
            true,
        )
        .unwrap();
    assert_eq!(result, Value::Number(42.0));
}

#[test]
#[serial]
fn test_module_without_result_is_undefined() {
    let (_isolate, context) = create_context();
    let result = context
        .execute(&DocumentInfo::module("plain.mjs"), "export const y = 1;", true)
        .unwrap();
    assert_eq!(result, Value::Undefined);
}

#[test]
#[serial]
fn test_static_imports_through_host() {
    let host = ModuleHost::default()
        .with_module("math.mjs", DocumentKind::Module, "export const double = n => n * 2;")
        .with_module("data.json", DocumentKind::Json, r#"{ "count": 21 }"#)
        .with_module("note.txt", DocumentKind::Text, "hello text");
    let (_isolate, context, host) = create_module_context(host, ContextConfig::default());

    let result = context
        .execute(
            &DocumentInfo::module("main.mjs"),
            "import { double } from 'math.mjs';
             import data from 'data.json';
             import note from 'note.txt';
             import.meta.setResult(double(data.count) + ':' + note);",
            true,
        )
        .unwrap();
    assert_eq!(result, Value::from("42:hello text"));

    let referrers = host.referrers.lock();
    assert!(referrers.iter().all(|(_, referrer)| referrer.as_deref() == Some("main.mjs")));
    assert_eq!(referrers.len(), 3);
}

#[test]
#[serial]
fn test_missing_module_fails_before_execution() {
    let (_isolate, context, _host) = create_module_context(ModuleHost::default(), ContextConfig::default());
    let err = context
        .execute(&DocumentInfo::module("main.mjs"), "import 'nowhere.mjs';", true)
        .unwrap_err();
    assert!(err.message.contains("nowhere.mjs"), "{}", err.message);
    assert!(!err.execution_started);
}

#[test]
#[serial]
fn test_import_meta_carries_host_pairs() {
    let host = ModuleHost::default().with_meta("url", "file:///main.mjs");
    let (_isolate, context, _host) = create_module_context(host, ContextConfig::default());
    let result = context
        .execute(&DocumentInfo::module("main.mjs"), "import.meta.setResult(import.meta.url);", true)
        .unwrap();
    assert_eq!(result, Value::from("file:///main.mjs"));
}

#[test]
#[serial]
fn test_dynamic_import_recovers_referrer() {
    let host = ModuleHost::default().with_module("dep.mjs", DocumentKind::Module, "export const value = 'dynamic';");
    let (_isolate, context, host) =
        create_module_context(host, ContextConfig::default().with_dynamic_module_imports(true));

    let Value::V8Object(promise) = context
        .execute(&DocumentInfo::script("loader.js"), "import('dep.mjs').then(ns => ns.value)", true)
        .unwrap()
    else {
        panic!("expected a promise");
    };
    assert_eq!(
        context.get_promise_state(&promise).unwrap(),
        PromiseState::Fulfilled(Value::from("dynamic"))
    );

    let referrers = host.referrers.lock();
    assert_eq!(referrers[0], ("dep.mjs".to_string(), Some("loader.js".to_string())));
}

#[test]
#[serial]
fn test_dynamic_import_disabled_rejects() {
    let host = ModuleHost::default().with_module("dep.mjs", DocumentKind::Module, "export default 1;");
    let (_isolate, context, _host) = create_module_context(host, ContextConfig::default());

    let Value::V8Object(promise) = context
        .execute(&DocumentInfo::script("loader.js"), "import('dep.mjs')", true)
        .unwrap()
    else {
        panic!("expected a promise");
    };
    assert!(matches!(
        context.get_promise_state(&promise).unwrap(),
        PromiseState::Rejected(_)
    ));
}

#[test]
#[serial]
fn test_compiled_module_is_bound_to_its_context() {
    let (isolate, context) = create_context();
    let module = context
        .compile(&DocumentInfo::module("bound.mjs"), "import.meta.setResult('ran');")
        .unwrap();
    assert_eq!(context.execute_script(&module, true).unwrap(), Value::from("ran"));

    let other = isolate.create_context(ContextConfig::default()).unwrap();
    let err = other.execute_script(&module, true).unwrap_err();
    assert!(err.message.contains("another script context"), "{}", err.message);
}

#[test]
#[serial]
fn test_compiled_script_runs_in_any_context() {
    let (isolate, context) = create_context();
    let script = context
        .compile(&DocumentInfo::script("shared.js"), "typeof marker")
        .unwrap();
    let other = isolate.create_context(ContextConfig::default()).unwrap();
    other
        .execute(&DocumentInfo::script("mark.js"), "globalThis.marker = 1", false)
        .unwrap();

    assert_eq!(context.execute_script(&script, true).unwrap(), Value::from("undefined"));
    assert_eq!(other.execute_script(&script, true).unwrap(), Value::from("number"));
}

#[test]
#[serial]
fn test_dynamic_imports_follow_each_context_flag() {
    let host = ModuleHost::default().with_module("dep.mjs", DocumentKind::Module, "export const value = 'served';");
    let (isolate, enabled, _host) =
        create_module_context(host, ContextConfig::default().with_dynamic_module_imports(true));
    let disabled = isolate.create_context(ContextConfig::default()).unwrap();

    let import = |context: &v8host_runtime::V8Context| {
        let Value::V8Object(promise) = context
            .execute(&DocumentInfo::script("loader.js"), "import('dep.mjs').then(ns => ns.value)", true)
            .unwrap()
        else {
            panic!("expected a promise");
        };
        context.get_promise_state(&promise).unwrap()
    };

    assert_eq!(import(&enabled), PromiseState::Fulfilled(Value::from("served")));
    let PromiseState::Rejected(reason) = import(&disabled) else {
        panic!("import should be refused in a context without dynamic imports");
    };
    let Value::V8Object(reason) = reason else {
        panic!("expected an error object");
    };
    assert_eq!(
        disabled.get_property(&reason, "message").unwrap(),
        Value::from("Dynamic module import is not enabled")
    );
}

#[test]
#[serial]
fn test_shared_dependency_evaluates_once() {
    let host = ModuleHost::default()
        .with_module(
            "shared.mjs",
            DocumentKind::Module,
            "globalThis.evaluations = (globalThis.evaluations ?? 0) + 1;
             export const token = {};
             export const meta = import.meta;",
        )
        .with_module(
            "left.mjs",
            DocumentKind::Module,
            "import { token, meta } from 'shared.mjs'; export const left = [token, meta];",
        )
        .with_module(
            "right.mjs",
            DocumentKind::Module,
            "import { token, meta } from 'shared.mjs'; export const right = [token, meta];",
        );
    let (_isolate, context, host) = create_module_context(host, ContextConfig::default());

    let result = context
        .execute(
            &DocumentInfo::module("main.mjs"),
            "import { left } from 'left.mjs';
             import { right } from 'right.mjs';
             import { token } from 'shared.mjs';
             import.meta.setResult([
                 globalThis.evaluations,
                 left[0] === right[0] && right[0] === token,
                 left[1] === right[1],
             ].join(':'));",
            true,
        )
        .unwrap();
    assert_eq!(result, Value::from("1:true:true"));

    let shared_loads = host
        .referrers
        .lock()
        .iter()
        .filter(|(specifier, _)| specifier == "shared.mjs")
        .count();
    assert!(shared_loads >= 2, "shared.mjs resolved {shared_loads} times");
}
