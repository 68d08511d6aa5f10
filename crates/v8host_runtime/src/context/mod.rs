//! Script contexts.
//!
//! A [`V8Context`] is the thread-safe handle; the engine-side state lives in
//! a [`ContextImpl`] owned by the isolate thread and keyed by context id.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use v8host_config::ContextConfig;

use crate::cache::{CompiledCache, V8CacheKind, V8CacheResult};
use crate::document::DocumentInfo;
use crate::error::{CONTEXT_DESTROYED_MESSAGE, Result, ScopeFailure, ScopeResult, V8Exception};
use crate::holder::{HostObjectHolder, SharedBufferInfo, V8ObjectHolder, V8ObjectSubtype};
use crate::isolate::core::IsolateCore;
use crate::isolate::engine::Engine;
use crate::isolate::{IsolateOwner, V8Isolate};
use crate::script::V8Script;
use crate::value::Value;

mod convert;
mod execute;
mod globals;
pub(crate) mod modules;
mod object;
mod proxy;
mod verify;

use modules::{ModuleArtifact, SyntheticExports};
use proxy::{ProxyRegistry, ProxyTemplates};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

const INTERNAL_SOURCE: &str = include_str!("internal.js");
const INTERNAL_GLOBAL: &str = "EngineInternal";

/// Settlement of a script promise as seen from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// Layout of an array buffer or a view onto one.
#[derive(Debug, Clone)]
pub struct ArrayBufferOrViewInfo {
    pub subtype: V8ObjectSubtype,
    pub offset: usize,
    pub size: usize,
    /// Element count for typed arrays, byte count otherwise
    pub length: usize,
    /// The underlying buffer; the object itself for a plain buffer
    pub buffer: V8ObjectHolder,
    pub shared: Option<SharedBufferInfo>,
}

/// Private keys a context stamps on its script objects.
pub(crate) struct ContextKeys {
    pub(crate) host_object: v8::Global<v8::Private>,
    pub(crate) host_exception: v8::Global<v8::Private>,
    pub(crate) cache: v8::Global<v8::Private>,
    pub(crate) cache_token: v8::Global<v8::Private>,
}

impl ContextKeys {
    fn new(scope: &mut v8::HandleScope<'_>) -> Option<Self> {
        let mut private = |name: &str| {
            let name = v8::String::new(scope, name)?;
            let key = v8::Private::new(scope, Some(name));
            Some(v8::Global::new(scope, key))
        };
        Some(Self {
            host_object: private("hostObject")?,
            host_exception: private("hostException")?,
            cache: private("cache")?,
            cache_token: private("cacheToken")?,
        })
    }
}

/// Engine-side state of one context.
pub(crate) struct ContextImpl {
    pub(crate) id: u64,
    pub(crate) config: ContextConfig,
    context: v8::Global<v8::Context>,
    pub(crate) keys: ContextKeys,
    templates: ProxyTemplates,
    internal: v8::Global<v8::Object>,
    access_token: RefCell<v8::Global<v8::Object>>,
    missing_value: v8::Global<v8::Object>,
    global_members: RefCell<Vec<HostObjectHolder>>,
    proxies: RefCell<ProxyRegistry>,
    modules: RefCell<CompiledCache<ModuleArtifact>>,
    synthetic_exports: RefCell<Vec<SyntheticExports>>,
    constructing_proxy: Cell<bool>,
    flush_pending: Cell<bool>,
    disposed: Cell<bool>,
}

impl ContextImpl {
    pub(crate) fn create(engine: &Rc<Engine>, config: ContextConfig) -> Result<Rc<ContextImpl>> {
        engine.verify_not_out_of_memory()?;
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let context = engine
            .with_isolate_scope(|scope| Self::build(scope, id, config))
            .ok_or_else(|| V8Exception::general("Failed to initialize script context"))?;
        if context.config.enable_dynamic_module_imports {
            engine.enable_dynamic_imports();
        }
        engine.add_context(context.clone());
        tracing::debug!(
            isolate = engine.core.name(),
            context = %context.config.name,
            id,
            "Context created"
        );
        Ok(context)
    }

    fn build(scope: &mut v8::HandleScope<'_, ()>, id: u64, config: ContextConfig) -> Option<Rc<Self>> {
        let data: v8::Local<v8::Value> = v8::Number::new(scope, id as f64).into();
        let global_template = globals::global_template(scope, data);
        let context = v8::Context::new(
            scope,
            v8::ContextOptions {
                global_template: Some(global_template),
                ..Default::default()
            },
        );
        let scope = &mut v8::ContextScope::new(scope, context);

        let keys = ContextKeys::new(scope)?;
        let templates = ProxyTemplates::new(scope, data)?;
        let internal = install_internal(scope)?;
        let access_token = v8::Object::new(scope);
        let missing_value = v8::Object::new(scope);

        Some(Rc::new(Self {
            id,
            config,
            context: v8::Global::new(scope, context),
            keys,
            templates,
            internal: v8::Global::new(scope, internal),
            access_token: RefCell::new(v8::Global::new(scope, access_token)),
            missing_value: v8::Global::new(scope, missing_value),
            global_members: RefCell::new(Vec::new()),
            proxies: RefCell::new(ProxyRegistry::default()),
            modules: RefCell::new(CompiledCache::default()),
            synthetic_exports: RefCell::new(Vec::new()),
            constructing_proxy: Cell::new(false),
            flush_pending: Cell::new(false),
            disposed: Cell::new(false),
        }))
    }

    pub(crate) fn v8_context(&self) -> &v8::Global<v8::Context> {
        &self.context
    }

    pub(crate) fn module_cache_size(&self) -> usize {
        self.modules.borrow().len()
    }

    /// Runs `f` inside this context as one execution scope and converts
    /// whatever the engine threw into a [`V8Exception`].
    pub(crate) fn run<R>(
        self: &Rc<Self>,
        engine: &Engine,
        f: impl for<'s> FnOnce(&mut v8::HandleScope<'s>, &Rc<Self>) -> ScopeResult<R>,
    ) -> Result<R> {
        engine.verify_not_out_of_memory()?;
        if self.disposed.get() {
            return Err(V8Exception::general(CONTEXT_DESTROYED_MESSAGE));
        }
        engine.with_isolate_scope(|scope| {
            let context = v8::Local::new(scope, &self.context);
            let scope = &mut v8::ContextScope::new(scope, context);
            engine.begin_execution(self.id)?;
            let outcome = {
                let tc = &mut v8::TryCatch::new(scope);
                let result = match f(tc, self) {
                    Ok(value) if !tc.has_caught() => Ok(value),
                    Ok(_) | Err(ScopeFailure::Pending) => Err(self.exception_from_try_catch(engine, tc)),
                    Err(ScopeFailure::Host(err)) => {
                        Err(err.with_execution_started(engine.execution_started()))
                    }
                };
                if result.is_ok() && engine.is_outermost_frame() && !engine.core.is_terminating() {
                    tc.perform_microtask_checkpoint();
                }
                result
            };
            engine.end_execution(self.config.enable_interrupt_propagation);
            outcome
        })
    }

    pub(crate) fn rotate_access_token(&self, scope: &mut v8::HandleScope<'_>) {
        let token = v8::Object::new(scope);
        *self.access_token.borrow_mut() = v8::Global::new(scope, token);
    }

    pub(crate) fn access_token<'s>(&self, scope: &mut v8::HandleScope<'s>) -> v8::Local<'s, v8::Object> {
        let token = self.access_token.borrow();
        v8::Local::new(scope, &*token)
    }

    /// Calls a member of the frozen `EngineInternal` helper object.
    pub(crate) fn call_internal<'s>(
        &self,
        scope: &mut v8::HandleScope<'s>,
        name: &str,
        args: &[v8::Local<'s, v8::Value>],
    ) -> ScopeResult<v8::Local<'s, v8::Value>> {
        let internal = v8::Local::new(scope, &self.internal);
        let key = convert::v8_string(scope, name)?;
        let member = internal.get(scope, key.into()).ok_or(ScopeFailure::Pending)?;
        let function = v8::Local::<v8::Function>::try_from(member).map_err(|_| {
            ScopeFailure::Host(V8Exception::general(format!(
                "{INTERNAL_GLOBAL}.{name} is not a function"
            )))
        })?;
        function
            .call(scope, internal.into(), args)
            .ok_or(ScopeFailure::Pending)
    }

    pub(crate) fn throw_error(&self, scope: &mut v8::HandleScope<'_>, message: &str) {
        let message = v8::String::new(scope, message).unwrap_or_else(|| v8::String::empty(scope));
        let exception = v8::Exception::error(scope, message);
        scope.throw_exception(exception);
    }

    pub(crate) fn throw_type_error(&self, scope: &mut v8::HandleScope<'_>, message: &str) {
        let message = v8::String::new(scope, message).unwrap_or_else(|| v8::String::empty(scope));
        let exception = v8::Exception::type_error(scope, message);
        scope.throw_exception(exception);
    }

    pub(crate) fn dispose(&self, engine: &Engine, scope: &mut v8::HandleScope<'_, ()>) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(inspector) = engine.inspector() {
            let context = v8::Local::new(scope, &self.context);
            inspector.context_destroyed(context);
        }
        self.modules.borrow_mut().clear();
        self.synthetic_exports.borrow_mut().clear();
        let members = std::mem::take(&mut *self.global_members.borrow_mut());
        let proxies = std::mem::take(&mut *self.proxies.borrow_mut());
        drop(members);
        drop(proxies);
    }
}

fn install_internal<'s>(scope: &mut v8::HandleScope<'s>) -> Option<v8::Local<'s, v8::Object>> {
    let tc = &mut v8::TryCatch::new(scope);
    let source = v8::String::new(tc, INTERNAL_SOURCE)?;
    let script = v8::Script::compile(tc, source, None)?;
    let value = script.run(tc)?;
    let internal = v8::Local::<v8::Object>::try_from(value).ok()?;
    let name = v8::String::new(tc, INTERNAL_GLOBAL)?;
    let global = tc.get_current_context().global(tc);
    global.define_own_property(tc, name.into(), internal.into(), v8::PropertyAttribute::DONT_ENUM)?;
    Some(internal)
}

/// Queues a microtask flush after promise resolutions in contexts that ask
/// for it. Consecutive resolutions share one flush.
pub(crate) extern "C" fn promise_hook(
    kind: v8::PromiseHookType,
    promise: v8::Local<v8::Promise>,
    _parent: v8::Local<v8::Value>,
) {
    if !matches!(kind, v8::PromiseHookType::Resolve) {
        return;
    }
    let Some(engine) = Engine::current() else {
        return;
    };
    let scope = &mut unsafe { v8::CallbackScope::new(promise) };
    let Some(creation_context) = promise.get_creation_context(scope) else {
        return;
    };
    let Some(context) = engine.context_for(scope, creation_context) else {
        return;
    };
    if !context.config.enable_task_promise_conversion || context.flush_pending.replace(true) {
        return;
    }
    let id = context.id;
    engine.core.enqueue(
        true,
        Box::new(move || {
            let Some(engine) = Engine::current() else {
                return;
            };
            if let Some(context) = engine.context_by_id(id) {
                context.flush_pending.set(false);
                engine.with_isolate_scope(|scope| scope.perform_microtask_checkpoint());
            }
        }),
    );
}

struct ContextToken {
    id: u64,
    name: String,
    core: Weak<IsolateCore>,
    destroyed: AtomicBool,
}

impl ContextToken {
    fn destroy(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }
}

impl Drop for ContextToken {
    fn drop(&mut self) {
        if !self.destroy() {
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if core.is_released() {
            return;
        }
        let id = self.id;
        core.enqueue(
            false,
            Box::new(move || {
                if let Some(engine) = Engine::current() {
                    engine.remove_context(id);
                }
            }),
        );
    }
}

/// A script context inside a [`V8Isolate`].
///
/// Clones share the context, which is destroyed by [`V8Context::destroy`] or
/// once the last clone drops.
#[derive(Clone)]
pub struct V8Context {
    owner: Arc<IsolateOwner>,
    token: Arc<ContextToken>,
}

impl V8Context {
    pub(crate) fn new(owner: Arc<IsolateOwner>, id: u64, name: String) -> Self {
        let core = Arc::downgrade(&owner.core);
        Self {
            owner,
            token: Arc::new(ContextToken {
                id,
                name,
                core,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.token.name
    }

    pub fn isolate(&self) -> V8Isolate {
        V8Isolate::from_owner(self.owner.clone())
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.destroyed.load(Ordering::Acquire)
    }

    fn with_context<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: for<'s> FnOnce(&Engine, &mut v8::HandleScope<'s>, &Rc<ContextImpl>) -> ScopeResult<R>
            + Send
            + 'static,
    {
        if self.is_destroyed() {
            return Err(V8Exception::general(CONTEXT_DESTROYED_MESSAGE));
        }
        let id = self.token.id;
        self.owner.core.call_flat(move |engine| {
            let context = engine.require_context(id)?;
            context.run(engine, |scope, context| f(engine, scope, context))
        })
    }

    /// The context's global object.
    pub fn get_root_object(&self) -> Result<Value> {
        self.with_context(|engine, scope, context| {
            let global = scope.get_current_context().global(scope);
            Ok(context.export_value(engine, scope, global.into()))
        })
    }

    /// Defines `name` on the global object. With `global_members` set, a host
    /// object value also contributes its own properties as globals.
    pub fn set_global_property(&self, name: &str, value: Value, global_members: bool) -> Result<()> {
        let name = name.to_string();
        self.with_context(move |engine, scope, context| {
            context.set_global_property(engine, scope, &name, &value, global_members)
        })
    }

    pub fn get_global_property(&self, name: &str) -> Result<Value> {
        let name = name.to_string();
        self.with_context(move |engine, scope, context| {
            let global = scope.get_current_context().global(scope);
            let key = convert::v8_string(scope, &name)?;
            let value = global.get(scope, key.into()).ok_or(ScopeFailure::Pending)?;
            Ok(context.export_value(engine, scope, value))
        })
    }

    /// Runs `code` as `document`. The completion value is returned only when
    /// `evaluate` is set.
    pub fn execute(&self, document: &DocumentInfo, code: &str, evaluate: bool) -> Result<Value> {
        let document = document.clone();
        let code = code.to_string();
        self.with_context(move |engine, scope, context| {
            context.execute_code(engine, scope, &document, &code, evaluate)
        })
    }

    pub fn execute_script(&self, script: &V8Script, evaluate: bool) -> Result<Value> {
        let script = script.clone();
        self.with_context(move |engine, scope, context| {
            context.execute_compiled(engine, scope, &script, evaluate)
        })
    }

    pub fn compile(&self, document: &DocumentInfo, code: &str) -> Result<V8Script> {
        let mut bytes = Vec::new();
        self.compile_with_cache(document, code, V8CacheKind::None, &mut bytes)
            .map(|(script, _)| script)
    }

    /// Compiles and returns the engine's code cache for the result.
    pub fn compile_producing_cache(
        &self,
        document: &DocumentInfo,
        code: &str,
    ) -> Result<(V8Script, Option<Vec<u8>>)> {
        let mut bytes = Vec::new();
        let (script, result) =
            self.compile_with_cache(document, code, V8CacheKind::Produce, &mut bytes)?;
        let bytes = (result == V8CacheResult::Updated).then_some(bytes);
        Ok((script, bytes))
    }

    /// Compiles using `cache_bytes` as a hint; the flag reports whether the
    /// engine took them.
    pub fn compile_consuming_cache(
        &self,
        document: &DocumentInfo,
        code: &str,
        cache_bytes: &[u8],
    ) -> Result<(V8Script, bool)> {
        let mut bytes = cache_bytes.to_vec();
        let (script, result) =
            self.compile_with_cache(document, code, V8CacheKind::Consume, &mut bytes)?;
        Ok((script, result == V8CacheResult::Accepted))
    }

    /// Compiles and reconciles `cache_bytes` with the cached entry, replacing
    /// them when the result is [`V8CacheResult::Updated`].
    pub fn compile_updating_cache(
        &self,
        document: &DocumentInfo,
        code: &str,
        cache_bytes: &mut Vec<u8>,
    ) -> Result<(V8Script, V8CacheResult)> {
        self.compile_with_cache(document, code, V8CacheKind::Update, cache_bytes)
    }

    pub fn compile_with_cache(
        &self,
        document: &DocumentInfo,
        code: &str,
        kind: V8CacheKind,
        cache_bytes: &mut Vec<u8>,
    ) -> Result<(V8Script, V8CacheResult)> {
        let document = document.clone();
        let code = code.to_string();
        let supplied = cache_bytes.clone();
        let (script, result, bytes) = self.with_context(move |engine, scope, context| {
            context.compile(engine, scope, &document, &code, kind, &supplied)
        })?;
        if let Some(bytes) = bytes {
            *cache_bytes = bytes;
        }
        Ok((script, result))
    }

    /// Terminates script running in this context's isolate.
    pub fn interrupt(&self) {
        self.owner.core.interrupt();
    }

    pub fn cancel_interrupt(&self) {
        self.owner.core.cancel_interrupt();
    }

    /// Invalidates every cached host property read in this context.
    pub fn on_access_settings_changed(&self) -> Result<()> {
        self.with_context(|_, scope, context| {
            context.rotate_access_token(scope);
            Ok(())
        })
    }

    pub fn get_promise_state(&self, promise: &V8ObjectHolder) -> Result<PromiseState> {
        let promise = promise.clone();
        self.with_context(move |engine, scope, context| context.promise_state(engine, scope, &promise))
    }

    pub fn get_property(&self, object: &V8ObjectHolder, name: &str) -> Result<Value> {
        let (object, name) = (object.clone(), name.to_string());
        self.with_context(move |engine, scope, context| {
            context.get_object_property(engine, scope, &object, &name)
        })
    }

    pub fn set_property(&self, object: &V8ObjectHolder, name: &str, value: Value) -> Result<()> {
        let (object, name) = (object.clone(), name.to_string());
        self.with_context(move |engine, scope, context| {
            context.set_object_property(engine, scope, &object, &name, &value)
        })
    }

    pub fn delete_property(&self, object: &V8ObjectHolder, name: &str) -> Result<bool> {
        let (object, name) = (object.clone(), name.to_string());
        self.with_context(move |engine, scope, context| {
            context.delete_object_property(engine, scope, &object, &name)
        })
    }

    pub fn get_property_names(&self, object: &V8ObjectHolder, include_indices: bool) -> Result<Vec<String>> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.object_property_names(engine, scope, &object, include_indices)
        })
    }

    pub fn get_indexed_property(&self, object: &V8ObjectHolder, index: u32) -> Result<Value> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.get_object_index(engine, scope, &object, index)
        })
    }

    pub fn set_indexed_property(&self, object: &V8ObjectHolder, index: u32, value: Value) -> Result<()> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.set_object_index(engine, scope, &object, index, &value)
        })
    }

    pub fn delete_indexed_property(&self, object: &V8ObjectHolder, index: u32) -> Result<bool> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.delete_object_index(engine, scope, &object, index)
        })
    }

    pub fn get_property_indices(&self, object: &V8ObjectHolder) -> Result<Vec<u32>> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.object_property_indices(engine, scope, &object)
        })
    }

    /// Calls a script function, or constructs with it when `as_constructor`.
    pub fn invoke(&self, object: &V8ObjectHolder, as_constructor: bool, args: Vec<Value>) -> Result<Value> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.invoke_object(engine, scope, &object, as_constructor, &args)
        })
    }

    pub fn invoke_method(&self, object: &V8ObjectHolder, name: &str, args: Vec<Value>) -> Result<Value> {
        let (object, name) = (object.clone(), name.to_string());
        self.with_context(move |engine, scope, context| {
            context.invoke_object_method(engine, scope, &object, &name, &args)
        })
    }

    pub fn get_array_buffer_or_view_info(&self, object: &V8ObjectHolder) -> Result<ArrayBufferOrViewInfo> {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.array_buffer_or_view_info(engine, scope, &object)
        })
    }

    /// Hands the bytes of an array buffer or view to `f` on the isolate
    /// thread.
    pub fn with_array_buffer_or_view_data<R, F>(&self, object: &V8ObjectHolder, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut [u8]) -> R + Send + 'static,
    {
        let object = object.clone();
        self.with_context(move |engine, scope, context| {
            context.with_array_buffer_or_view_data(engine, scope, &object, f)
        })
    }

    /// Destroys the context now instead of when the last clone drops.
    pub fn destroy(&self) -> Result<()> {
        if !self.token.destroy() {
            return Ok(());
        }
        let id = self.token.id;
        self.owner.core.call(move |engine| engine.remove_context(id))
    }
}

impl std::fmt::Debug for V8Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V8Context")
            .field("name", &self.token.name)
            .field("id", &self.token.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
