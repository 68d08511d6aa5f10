mod utils;

use std::io::{BufRead, BufReader};
use std::ptr;

use serial_test::serial;
use v8host_ffi::{V8ContextHandle, V8Host_CreateFromConfigFile, V8Host_InitLogger, V8IsolateHandle, V8ValueKind};

use crate::utils::{execute, install, take_exceptions, teardown};

fn create_from_file(path: &str) -> (bool, *mut V8IsolateHandle, *mut V8ContextHandle) {
    let mut isolate = ptr::null_mut();
    let mut context = ptr::null_mut();
    let created = unsafe { V8Host_CreateFromConfigFile(path.as_ptr(), path.len(), &raw mut isolate, &raw mut context) };
    (created, isolate, context)
}

#[test]
#[serial]
fn test_config_file_sets_up_logging_and_isolate() {
    install();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("engine.jsonl");
    let config_path = dir.path().join("v8host.json");
    let config = serde_json::json!({
        "isolate": { "name": "from-file" },
        "context": { "name": "configured" },
        "logger": { "level": "debug", "colors": false, "file": log_path.to_str().unwrap() },
    });
    std::fs::write(&config_path, config.to_string()).unwrap();

    let (created, isolate, context) = create_from_file(config_path.to_str().unwrap());
    assert!(created, "{:?}", take_exceptions());
    assert!(!isolate.is_null() && !context.is_null());

    let value = execute(context, "6 * 7");
    assert_eq!(value.kind, V8ValueKind::Number);
    assert_eq!(value.number, 42.0);

    let file = std::fs::File::open(&log_path).unwrap();
    let entries: Vec<serde_json::Value> = BufReader::new(file)
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect();
    assert!(
        entries
            .iter()
            .any(|entry| entry["message"] == "Isolate created" && entry["isolate"] == "from-file"),
        "{entries:?}"
    );

    // the subscriber is process-wide and already installed
    assert!(!unsafe { V8Host_InitLogger(ptr::null(), 0) });
    let exceptions = take_exceptions();
    assert_eq!(exceptions.len(), 1);
    assert!(exceptions[0].message.contains("tracing subscriber"), "{}", exceptions[0].message);

    teardown(isolate, context);
}

#[test]
#[serial]
fn test_bad_logger_config_is_reported() {
    install();
    let json = r#"{ "level": "loud" }"#;
    assert!(!unsafe { V8Host_InitLogger(json.as_ptr(), json.len()) });
    let exceptions = take_exceptions();
    assert_eq!(exceptions.len(), 1);
    assert!(exceptions[0].message.contains("Invalid logger config"), "{}", exceptions[0].message);
}

#[test]
#[serial]
fn test_missing_config_file_creates_nothing() {
    install();
    let (created, isolate, context) = create_from_file("/definitely/not/here/v8host.json");
    assert!(!created);
    assert!(isolate.is_null() && context.is_null());
    let exceptions = take_exceptions();
    assert_eq!(exceptions.len(), 1);
    assert!(exceptions[0].message.contains("does not exist"), "{}", exceptions[0].message);
}
