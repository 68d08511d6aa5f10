//! Script-side proxies for host objects.
//!
//! Each context builds five function templates, one per
//! [`HostObjectSubtype`]. Only delegates are callable from script; a plain
//! invocable gets the object shape so `typeof` reports "object". A proxy carries its registry slot under a private
//! key; the registry maps the slot back to the [`HostObjectHolder`] and keeps
//! one live proxy per host object so identity survives round trips.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ContextImpl;
use super::convert::v8_string;
use super::verify::host_error;
use crate::error::{ScopeFailure, ScopeResult};
use crate::holder::{HostObjectHolder, HostObjectSubtype};
use crate::isolate::engine::Engine;

const INTERNAL_USE_ONLY_MESSAGE: &str = "This function is for engine internal use only";

pub(crate) struct ProxyTemplates {
    host_object: v8::Global<v8::FunctionTemplate>,
    host_invocable: v8::Global<v8::FunctionTemplate>,
    host_delegate: v8::Global<v8::FunctionTemplate>,
    fast_host_object: v8::Global<v8::FunctionTemplate>,
    fast_host_function: v8::Global<v8::FunctionTemplate>,
}

impl ProxyTemplates {
    pub(crate) fn new(scope: &mut v8::HandleScope<'_>, data: v8::Local<'_, v8::Value>) -> Option<Self> {
        let mut build = |name: &str, invocable: bool| {
            let template = proxy_template(scope, data, name, invocable)?;
            Some(v8::Global::new(scope, template))
        };
        Some(Self {
            host_object: build("HostObject", false)?,
            host_invocable: build("HostInvocable", false)?,
            host_delegate: build("HostDelegate", true)?,
            fast_host_object: build("FastHostObject", false)?,
            fast_host_function: build("FastHostFunction", true)?,
        })
    }

    fn for_subtype(&self, subtype: HostObjectSubtype) -> &v8::Global<v8::FunctionTemplate> {
        match subtype {
            HostObjectSubtype::Plain => &self.host_object,
            HostObjectSubtype::Invocable => &self.host_invocable,
            HostObjectSubtype::Delegate => &self.host_delegate,
            HostObjectSubtype::Fast => &self.fast_host_object,
            HostObjectSubtype::FastFunction => &self.fast_host_function,
        }
    }
}

fn proxy_template<'s>(
    scope: &mut v8::HandleScope<'s>,
    data: v8::Local<'_, v8::Value>,
    name: &str,
    invocable: bool,
) -> Option<v8::Local<'s, v8::FunctionTemplate>> {
    let template = v8::FunctionTemplate::builder(construct_guard)
        .data(data)
        .build(scope);
    template.set_class_name(v8::String::new(scope, name)?);

    let instance = template.instance_template(scope);
    instance.set_named_property_handler(
        v8::NamedPropertyHandlerConfiguration::new()
            .getter(named_getter)
            .setter(named_setter)
            .query(named_query)
            .deleter(named_deleter)
            .enumerator(named_enumerator)
            .data(data),
    );
    instance.set_indexed_property_handler(
        v8::IndexedPropertyHandlerConfiguration::new()
            .getter(indexed_getter)
            .setter(indexed_setter)
            .query(indexed_query)
            .deleter(indexed_deleter)
            .enumerator(indexed_enumerator)
            .data(data),
    );
    if invocable {
        instance.set_call_as_function_handler(invoke_callback);
    }

    let prototype = template.prototype_template(scope);
    let hidden = v8::PropertyAttribute::DONT_ENUM;
    let iterator = v8::FunctionTemplate::builder(iterator_callback).data(data).build(scope);
    let async_iterator = v8::FunctionTemplate::builder(async_iterator_callback)
        .data(data)
        .build(scope);
    let to_json = v8::FunctionTemplate::builder(to_json_callback).data(data).build(scope);
    let iterator_key = v8::Symbol::get_iterator(scope);
    let async_iterator_key = v8::Symbol::get_async_iterator(scope);
    let to_json_key = v8::String::new(scope, "toJSON")?;
    prototype.set_with_attr(iterator_key.into(), iterator.into(), hidden);
    prototype.set_with_attr(async_iterator_key.into(), async_iterator.into(), hidden);
    prototype.set_with_attr(to_json_key.into(), to_json.into(), hidden);

    Some(template)
}

struct ProxyEntry {
    holder: HostObjectHolder,
    proxy: v8::Weak<v8::Object>,
}

/// Live proxies of one context.
///
/// Weak finalizers only record dead slots; entries are swept on the next
/// registry access so no finalizer touches the map itself.
#[derive(Default)]
pub(crate) struct ProxyRegistry {
    entries: HashMap<u64, ProxyEntry>,
    by_target: HashMap<(usize, HostObjectSubtype), u64>,
    next_slot: u64,
    dead: Rc<RefCell<Vec<u64>>>,
}

impl ProxyRegistry {
    fn sweep(&mut self) {
        let dead = std::mem::take(&mut *self.dead.borrow_mut());
        for slot in dead {
            let Some(entry) = self.entries.remove(&slot) else {
                continue;
            };
            let target = (entry.holder.identity(), entry.holder.subtype());
            if self.by_target.get(&target) == Some(&slot) {
                self.by_target.remove(&target);
            }
        }
    }

    fn find(&self, holder: &HostObjectHolder) -> Option<&ProxyEntry> {
        let slot = self.by_target.get(&(holder.identity(), holder.subtype()))?;
        self.entries.get(slot)
    }

    fn reserve_slot(&mut self) -> u64 {
        self.next_slot += 1;
        self.next_slot
    }

    fn insert(&mut self, slot: u64, holder: HostObjectHolder, proxy: v8::Weak<v8::Object>) {
        self.by_target
            .insert((holder.identity(), holder.subtype()), slot);
        self.entries.insert(slot, ProxyEntry { holder, proxy });
    }

    fn holder(&self, slot: u64) -> Option<HostObjectHolder> {
        self.entries.get(&slot).map(|entry| entry.holder.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl ContextImpl {
    /// Returns the live proxy for `holder`, creating one if needed.
    pub(crate) fn proxy_for<'s>(
        &self,
        scope: &mut v8::HandleScope<'s>,
        holder: &HostObjectHolder,
    ) -> ScopeResult<v8::Local<'s, v8::Object>> {
        {
            let mut proxies = self.proxies.borrow_mut();
            proxies.sweep();
            if let Some(proxy) = proxies.find(holder).and_then(|entry| entry.proxy.to_local(scope)) {
                return Ok(proxy);
            }
        }

        let template = v8::Local::new(scope, self.templates.for_subtype(holder.subtype()));
        let function = template.get_function(scope).ok_or(ScopeFailure::Pending)?;
        self.constructing_proxy.set(true);
        let proxy = function.new_instance(scope, &[]);
        self.constructing_proxy.set(false);
        let proxy = proxy.ok_or(ScopeFailure::Pending)?;

        let (slot, dead) = {
            let mut proxies = self.proxies.borrow_mut();
            (proxies.reserve_slot(), proxies.dead.clone())
        };
        let key = v8::Local::new(scope, &self.keys.host_object);
        #[allow(clippy::cast_precision_loss)]
        let slot_value = v8::Number::new(scope, slot as f64);
        proxy
            .set_private(scope, key, slot_value.into())
            .ok_or(ScopeFailure::Pending)?;
        let weak = v8::Weak::with_finalizer(
            scope,
            proxy,
            Box::new(move |_| dead.borrow_mut().push(slot)),
        );
        self.proxies.borrow_mut().insert(slot, holder.clone(), weak);
        tracing::trace!(context = %self.config.name, slot, ?holder, "Created host object proxy");
        Ok(proxy)
    }

    /// The host object behind one of this context's proxies.
    pub(crate) fn host_object_of(
        &self,
        scope: &mut v8::HandleScope<'_>,
        object: v8::Local<'_, v8::Object>,
    ) -> Option<HostObjectHolder> {
        let key = v8::Local::new(scope, &self.keys.host_object);
        let slot = object.get_private(scope, key)?;
        let slot = v8::Local::<v8::Number>::try_from(slot).ok()?.value();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.proxies.borrow().holder(slot as u64)
    }

    pub(crate) fn proxy_count(&self) -> usize {
        self.proxies.borrow().len()
    }

    /// Per-proxy memo of cacheable reads, replaced whenever the access token
    /// it was filled under is no longer current.
    fn property_cache<'s>(
        &self,
        scope: &mut v8::HandleScope<'s>,
        proxy: v8::Local<'s, v8::Object>,
    ) -> Option<v8::Local<'s, v8::Map>> {
        let token_key = v8::Local::new(scope, &self.keys.cache_token);
        let cache_key = v8::Local::new(scope, &self.keys.cache);
        let token = self.access_token(scope);
        let stored = proxy.get_private(scope, token_key)?;
        if stored.strict_equals(token.into()) {
            let cache = proxy.get_private(scope, cache_key)?;
            if let Ok(cache) = v8::Local::<v8::Map>::try_from(cache) {
                return Some(cache);
            }
        }
        let cache = v8::Map::new(scope);
        proxy.set_private(scope, cache_key, cache.into())?;
        proxy.set_private(scope, token_key, token.into())?;
        Some(cache)
    }

    /// `Some(None)` is a cached miss.
    fn cached_property<'s>(
        &self,
        scope: &mut v8::HandleScope<'s>,
        proxy: v8::Local<'s, v8::Object>,
        name: v8::Local<'s, v8::String>,
    ) -> Option<Option<v8::Local<'s, v8::Value>>> {
        let cache = self.property_cache(scope, proxy)?;
        if !cache.has(scope, name.into())? {
            return None;
        }
        let value = cache.get(scope, name.into())?;
        let missing = v8::Local::new(scope, &self.missing_value);
        Some((!value.strict_equals(missing.into())).then_some(value))
    }

    fn cache_property<'s>(
        &self,
        scope: &mut v8::HandleScope<'s>,
        proxy: v8::Local<'s, v8::Object>,
        name: v8::Local<'s, v8::String>,
        value: Option<v8::Local<'s, v8::Value>>,
    ) {
        let Some(cache) = self.property_cache(scope, proxy) else {
            return;
        };
        let value = value.unwrap_or_else(|| v8::Local::new(scope, &self.missing_value).into());
        cache.set(scope, name.into(), value);
    }

    pub(crate) fn get_host_property<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        proxy: v8::Local<'s, v8::Object>,
        holder: &HostObjectHolder,
        name: v8::Local<'s, v8::String>,
    ) -> ScopeResult<Option<v8::Local<'s, v8::Value>>> {
        let key = name.to_rust_string_lossy(scope);
        let cacheable = !holder.is_fast() && holder.object().is_cacheable(&key);
        if cacheable && let Some(cached) = self.cached_property(scope, proxy, name) {
            return Ok(cached);
        }

        let value = holder.object().get_property(&key).map_err(host_error)?;
        let imported = if value.is_nonexistent() {
            None
        } else {
            Some(self.import_value(engine, scope, &value)?)
        };
        if cacheable {
            self.cache_property(scope, proxy, name, imported);
        }
        Ok(imported)
    }

    pub(crate) fn set_host_property<'a>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'a>,
        holder: &HostObjectHolder,
        name: &str,
        value: v8::Local<'a, v8::Value>,
    ) -> ScopeResult<bool> {
        let value = self.export_value(engine, scope, value);
        let handled = holder.object().set_property(name, value).map_err(host_error)?;
        if handled {
            self.rotate_access_token(scope);
        }
        Ok(handled)
    }

    pub(crate) fn delete_host_property(
        &self,
        scope: &mut v8::HandleScope<'_>,
        holder: &HostObjectHolder,
        name: &str,
    ) -> ScopeResult<bool> {
        let deleted = holder.object().delete_property(name).map_err(host_error)?;
        if deleted {
            self.rotate_access_token(scope);
        }
        Ok(deleted)
    }

    pub(crate) fn has_host_property(&self, holder: &HostObjectHolder, name: &str) -> ScopeResult<bool> {
        let names = holder.object().property_names().map_err(host_error)?;
        if names.iter().any(|n| n == name) {
            return Ok(true);
        }
        let found = holder.object().try_get_property(name).map_err(host_error)?;
        Ok(found.is_some())
    }

    fn host_iterator<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        holder: &HostObjectHolder,
        asynchronous: bool,
    ) -> ScopeResult<v8::Local<'s, v8::Value>> {
        let (enumerator, helper) = if asynchronous {
            (holder.object().async_enumerator(), "toAsyncIterator")
        } else {
            (holder.object().enumerator(), "toIterator")
        };
        let enumerator = enumerator.map_err(host_error)?;
        let enumerator = self.import_value(engine, scope, &enumerator)?;
        self.call_internal(scope, helper, &[enumerator])
    }
}

/// Engine and context behind a proxy callback, resolved from the context id
/// carried as template data.
struct ProxyCall {
    engine: Rc<Engine>,
    context: Rc<ContextImpl>,
    holder: HostObjectHolder,
}

impl ProxyCall {
    fn resolve(
        scope: &mut v8::HandleScope<'_>,
        data: v8::Local<'_, v8::Value>,
        this: v8::Local<'_, v8::Object>,
    ) -> Option<Self> {
        let engine = Engine::current()?;
        let context = context_from_data(&engine, data)?;
        let holder = context.host_object_of(scope, this)?;
        if let Err(err) = engine.check_stack() {
            context.throw_failure(scope, err.into());
            return None;
        }
        Some(Self {
            engine,
            context,
            holder,
        })
    }

    /// Throws `failure` into script; the callback reports the key handled.
    fn fail(&self, scope: &mut v8::HandleScope<'_>, failure: ScopeFailure) -> v8::Intercepted {
        self.context.throw_failure(scope, failure);
        v8::Intercepted::Yes
    }
}

pub(crate) fn context_from_data(engine: &Engine, data: v8::Local<'_, v8::Value>) -> Option<Rc<ContextImpl>> {
    let id = v8::Local::<v8::Number>::try_from(data).ok()?.value();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    engine.context_by_id(id as u64)
}

fn construct_guard(
    scope: &mut v8::HandleScope<'_>,
    args: v8::FunctionCallbackArguments<'_>,
    _rv: v8::ReturnValue,
) {
    let allowed = Engine::current()
        .and_then(|engine| context_from_data(&engine, args.data()))
        .is_some_and(|context| context.constructing_proxy.get());
    if !allowed && let Some(message) = v8::String::new(scope, INTERNAL_USE_ONLY_MESSAGE) {
        let exception = v8::Exception::type_error(scope, message);
        scope.throw_exception(exception);
    }
}

fn named_getter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue,
) -> v8::Intercepted {
    let Ok(name) = v8::Local::<v8::String>::try_from(key) else {
        return v8::Intercepted::No;
    };
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    match call
        .context
        .get_host_property(&call.engine, scope, args.this(), &call.holder, name)
    {
        Ok(Some(value)) => {
            rv.set(value);
            v8::Intercepted::Yes
        }
        Ok(None) => v8::Intercepted::No,
        Err(failure) => call.fail(scope, failure),
    }
}

fn named_setter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    value: v8::Local<'s, v8::Value>,
    args: v8::PropertyCallbackArguments<'s>,
    _rv: v8::ReturnValue<()>,
) -> v8::Intercepted {
    if !key.is_string() {
        return v8::Intercepted::No;
    }
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    match call
        .context
        .set_host_property(&call.engine, scope, &call.holder, &name, value)
    {
        Ok(true) => v8::Intercepted::Yes,
        Ok(false) => v8::Intercepted::No,
        Err(failure) => call.fail(scope, failure),
    }
}

fn named_query<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Integer>,
) -> v8::Intercepted {
    if !key.is_string() {
        return v8::Intercepted::No;
    }
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    match call.context.has_host_property(&call.holder, &name) {
        Ok(true) => {
            rv.set_int32(0);
            v8::Intercepted::Yes
        }
        Ok(false) => v8::Intercepted::No,
        Err(failure) => call.fail(scope, failure),
    }
}

fn named_deleter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Boolean>,
) -> v8::Intercepted {
    if !key.is_string() {
        return v8::Intercepted::No;
    }
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    match call.context.delete_host_property(scope, &call.holder, &name) {
        Ok(true) => {
            rv.set_bool(true);
            v8::Intercepted::Yes
        }
        Ok(false) => v8::Intercepted::No,
        Err(failure) => call.fail(scope, failure),
    }
}

fn named_enumerator<'s>(
    scope: &mut v8::HandleScope<'s>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Array>,
) {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return;
    };
    let names = match call.holder.object().property_names() {
        Ok(names) => names,
        Err(err) => {
            call.context.throw_failure(scope, host_error(err));
            return;
        }
    };
    let names: Vec<v8::Local<v8::Value>> = names
        .iter()
        .filter_map(|name| v8_string(scope, name).ok().map(Into::into))
        .collect();
    rv.set(v8::Array::new_with_elements(scope, &names));
}

fn indexed_getter<'s>(
    scope: &mut v8::HandleScope<'s>,
    index: u32,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue,
) -> v8::Intercepted {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    let value = match call.holder.object().get_indexed(index) {
        Ok(value) => value,
        Err(err) => return call.fail(scope, host_error(err)),
    };
    if value.is_nonexistent() {
        return v8::Intercepted::No;
    }
    match call.context.import_value(&call.engine, scope, &value) {
        Ok(value) => {
            rv.set(value);
            v8::Intercepted::Yes
        }
        Err(failure) => call.fail(scope, failure),
    }
}

fn indexed_setter<'s>(
    scope: &mut v8::HandleScope<'s>,
    index: u32,
    value: v8::Local<'s, v8::Value>,
    args: v8::PropertyCallbackArguments<'s>,
    _rv: v8::ReturnValue<()>,
) -> v8::Intercepted {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    let value = call.context.export_value(&call.engine, scope, value);
    match call.holder.object().set_indexed(index, value) {
        Ok(true) => v8::Intercepted::Yes,
        Ok(false) => v8::Intercepted::No,
        Err(err) => call.fail(scope, host_error(err)),
    }
}

fn indexed_query<'s>(
    scope: &mut v8::HandleScope<'s>,
    index: u32,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Integer>,
) -> v8::Intercepted {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    match call.holder.object().property_indices() {
        Ok(indices) if indices.contains(&index) => {
            rv.set_int32(0);
            v8::Intercepted::Yes
        }
        Ok(_) => v8::Intercepted::No,
        Err(err) => call.fail(scope, host_error(err)),
    }
}

fn indexed_deleter<'s>(
    scope: &mut v8::HandleScope<'s>,
    index: u32,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Boolean>,
) -> v8::Intercepted {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return v8::Intercepted::No;
    };
    match call.holder.object().delete_indexed(index) {
        Ok(true) => {
            rv.set_bool(true);
            v8::Intercepted::Yes
        }
        Ok(false) => v8::Intercepted::No,
        Err(err) => call.fail(scope, host_error(err)),
    }
}

fn indexed_enumerator<'s>(
    scope: &mut v8::HandleScope<'s>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Array>,
) {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return;
    };
    match call.holder.object().property_indices() {
        Ok(indices) => {
            let indices: Vec<v8::Local<v8::Value>> = indices
                .into_iter()
                .map(|index| v8::Integer::new_from_unsigned(scope, index).into())
                .collect();
            rv.set(v8::Array::new_with_elements(scope, &indices));
        }
        Err(err) => call.context.throw_failure(scope, host_error(err)),
    }
}

/// Call and construct handler of invocable proxies. Call-as-function
/// handlers get no template data, so the context is the proxy's creator.
fn invoke_callback<'a>(
    scope: &mut v8::HandleScope<'a>,
    args: v8::FunctionCallbackArguments<'a>,
    mut rv: v8::ReturnValue,
) {
    let target = args.holder();
    let Some(engine) = Engine::current() else {
        return;
    };
    let Some(creation_context) = target.get_creation_context(scope) else {
        return;
    };
    let Some(context) = engine.context_for(scope, creation_context) else {
        return;
    };
    let Some(holder) = context.host_object_of(scope, target) else {
        return;
    };
    if let Err(err) = engine.check_stack() {
        context.throw_failure(scope, err.into());
        return;
    }

    let as_constructor = !args.new_target().is_undefined();
    let values = context.export_values(&engine, scope, &args);
    let result = holder
        .object()
        .invoke(as_constructor, &values)
        .map_err(host_error)
        .and_then(|value| context.import_value(&engine, scope, &value));
    match result {
        Ok(value) => rv.set(value),
        Err(failure) => context.throw_failure(scope, failure),
    }
}

fn iterator_callback(
    scope: &mut v8::HandleScope<'_>,
    args: v8::FunctionCallbackArguments<'_>,
    rv: v8::ReturnValue,
) {
    iterate(scope, &args, rv, false);
}

fn async_iterator_callback(
    scope: &mut v8::HandleScope<'_>,
    args: v8::FunctionCallbackArguments<'_>,
    rv: v8::ReturnValue,
) {
    iterate(scope, &args, rv, true);
}

fn iterate(
    scope: &mut v8::HandleScope<'_>,
    args: &v8::FunctionCallbackArguments<'_>,
    mut rv: v8::ReturnValue,
    asynchronous: bool,
) {
    let Some(call) = ProxyCall::resolve(scope, args.data(), args.this()) else {
        return;
    };
    match call
        .context
        .host_iterator(&call.engine, scope, &call.holder, asynchronous)
    {
        Ok(iterator) => rv.set(iterator),
        Err(failure) => call.context.throw_failure(scope, failure),
    }
}

fn to_json_callback<'a>(
    scope: &mut v8::HandleScope<'a>,
    args: v8::FunctionCallbackArguments<'a>,
    mut rv: v8::ReturnValue,
) {
    let Some(engine) = Engine::current() else {
        return;
    };
    let Some(context) = context_from_data(&engine, args.data()) else {
        return;
    };
    let key = args.get(0);
    match context.call_internal(scope, "toJson", &[key, args.this().into()]) {
        Ok(json) => rv.set(json),
        Err(failure) => context.throw_failure(scope, failure),
    }
}
