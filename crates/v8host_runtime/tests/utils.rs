//! Shared helpers for integration tests that drive real isolates

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use v8host_runtime::{
    ContextConfig, DocumentInfo, DocumentKind, HostEnvironment, HostException, HostResult,
    IsolateConfig, LoadedModule, V8Context, V8Isolate, Value,
};

/// Isolate plus one context, both with default settings.
pub(crate) fn create_context() -> (V8Isolate, V8Context) {
    create_context_with(IsolateConfig::default(), ContextConfig::default())
}

pub(crate) fn create_context_with(isolate: IsolateConfig, context: ContextConfig) -> (V8Isolate, V8Context) {
    let isolate = V8Isolate::new(isolate, Arc::new(v8host_runtime::DefaultHost)).unwrap();
    let context = isolate.create_context(context).unwrap();
    (isolate, context)
}

pub(crate) fn eval(context: &V8Context, code: &str) -> Value {
    context
        .execute(&DocumentInfo::script("test.js"), code, true)
        .unwrap_or_else(|err| panic!("script failed: {err} ({:?})", err.stack_trace))
}

/// Module loader backed by an in-memory map of specifier to source.
#[derive(Default)]
pub(crate) struct ModuleHost {
    modules: Mutex<HashMap<String, (DocumentKind, String)>>,
    meta: Mutex<Vec<(String, Value)>>,
    pub(crate) referrers: Mutex<Vec<(String, Option<String>)>>,
}

impl ModuleHost {
    pub(crate) fn with_module(self, specifier: &str, kind: DocumentKind, code: &str) -> Self {
        self.modules
            .lock()
            .insert(specifier.to_string(), (kind, code.to_string()));
        self
    }

    pub(crate) fn with_meta(self, name: &str, value: impl Into<Value>) -> Self {
        self.meta.lock().push((name.to_string(), value.into()));
        self
    }
}

impl HostEnvironment for ModuleHost {
    fn load_module(&self, referrer: Option<&DocumentInfo>, specifier: &str) -> HostResult<LoadedModule> {
        self.referrers.lock().push((
            specifier.to_string(),
            referrer.map(|document| document.resource_name().to_string()),
        ));
        let (kind, code) = self
            .modules
            .lock()
            .get(specifier)
            .cloned()
            .ok_or_else(|| HostException::new(format!("Module '{specifier}' not found")))?;
        Ok(LoadedModule {
            document: DocumentInfo::new(specifier, kind),
            code,
            exports: Value::Nonexistent,
        })
    }

    fn create_module_context(&self, _document: &DocumentInfo) -> HostResult<Vec<(String, Value)>> {
        Ok(self.meta.lock().clone())
    }
}

pub(crate) fn create_module_context(host: ModuleHost, config: ContextConfig) -> (V8Isolate, V8Context, Arc<ModuleHost>) {
    let host = Arc::new(host);
    let isolate = V8Isolate::new(IsolateConfig::default(), host.clone()).unwrap();
    let context = isolate.create_context(config).unwrap();
    (isolate, context, host)
}
