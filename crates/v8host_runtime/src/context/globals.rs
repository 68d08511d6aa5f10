//! Global members: host objects whose properties resolve as globals.
//!
//! The global template carries a non-masking named interceptor, so it only
//! runs after ordinary global lookup misses and real globals always win.
//! Members are searched newest first.

use indexmap::IndexSet;

use super::ContextImpl;
use super::convert::v8_string;
use super::proxy::context_from_data;
use super::verify::host_error;
use crate::error::{ScopeFailure, ScopeResult};
use crate::holder::HostObjectHolder;
use crate::isolate::engine::Engine;
use crate::value::Value;

pub(super) fn global_template<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    data: v8::Local<'_, v8::Value>,
) -> v8::Local<'s, v8::ObjectTemplate> {
    let template = v8::ObjectTemplate::new(scope);
    template.set_named_property_handler(
        v8::NamedPropertyHandlerConfiguration::new()
            .getter(global_getter)
            .setter(global_setter)
            .query(global_query)
            .deleter(global_deleter)
            .enumerator(global_enumerator)
            .data(data)
            .flags(v8::PropertyHandlerFlags::NON_MASKING | v8::PropertyHandlerFlags::ONLY_INTERCEPT_STRINGS),
    );
    template
}

impl ContextImpl {
    pub(crate) fn set_global_property(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        name: &str,
        value: &Value,
        global_members: bool,
    ) -> ScopeResult<()> {
        let global = scope.get_current_context().global(scope);
        let key = v8_string(scope, name)?;
        let imported = self.import_value(engine, scope, value)?;
        global
            .create_data_property(scope, key.into(), imported)
            .ok_or(ScopeFailure::Pending)?;

        if global_members && let Value::HostObject(holder) = value {
            let mut members = self.global_members.borrow_mut();
            if !members.iter().any(|member| member.identity() == holder.identity()) {
                members.push(holder.clone());
            }
        }
        Ok(())
    }

    /// Snapshot of the members, newest first; host calls must not run under
    /// a borrow of the list.
    fn members_newest_first(&self) -> Vec<HostObjectHolder> {
        self.global_members.borrow().iter().rev().cloned().collect()
    }

    pub(crate) fn global_member_count(&self) -> usize {
        self.global_members.borrow().len()
    }
}

struct GlobalCall {
    engine: std::rc::Rc<Engine>,
    context: std::rc::Rc<ContextImpl>,
    members: Vec<HostObjectHolder>,
}

impl GlobalCall {
    fn resolve(data: v8::Local<'_, v8::Value>) -> Option<Self> {
        let engine = Engine::current()?;
        let context = context_from_data(&engine, data)?;
        let members = context.members_newest_first();
        if members.is_empty() {
            return None;
        }
        Some(Self {
            engine,
            context,
            members,
        })
    }

    fn fail(&self, scope: &mut v8::HandleScope<'_>, failure: ScopeFailure) -> v8::Intercepted {
        self.context.throw_failure(scope, failure);
        v8::Intercepted::Yes
    }

    /// The newest member exposing `name`.
    fn owner_of(&self, name: &str) -> ScopeResult<Option<&HostObjectHolder>> {
        for member in &self.members {
            if self.context.has_host_property(member, name)? {
                return Ok(Some(member));
            }
        }
        Ok(None)
    }
}

fn global_getter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue,
) -> v8::Intercepted {
    let Some(call) = GlobalCall::resolve(args.data()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    for member in &call.members {
        let found = match member.object().try_get_property(&name) {
            Ok(found) => found,
            Err(err) => return call.fail(scope, host_error(err)),
        };
        if let Some(value) = found {
            return match call.context.import_value(&call.engine, scope, &value) {
                Ok(value) => {
                    rv.set(value);
                    v8::Intercepted::Yes
                }
                Err(failure) => call.fail(scope, failure),
            };
        }
    }
    v8::Intercepted::No
}

fn global_setter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    value: v8::Local<'s, v8::Value>,
    args: v8::PropertyCallbackArguments<'s>,
    _rv: v8::ReturnValue<()>,
) -> v8::Intercepted {
    let Some(call) = GlobalCall::resolve(args.data()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    let owner = match call.owner_of(&name) {
        Ok(Some(owner)) => owner.clone(),
        Ok(None) => return v8::Intercepted::No,
        Err(failure) => return call.fail(scope, failure),
    };
    match call
        .context
        .set_host_property(&call.engine, scope, &owner, &name, value)
    {
        Ok(true) => v8::Intercepted::Yes,
        Ok(false) => v8::Intercepted::No,
        Err(failure) => call.fail(scope, failure),
    }
}

fn global_query<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Integer>,
) -> v8::Intercepted {
    let Some(call) = GlobalCall::resolve(args.data()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    match call.owner_of(&name) {
        Ok(Some(_)) => {
            rv.set_int32(0);
            v8::Intercepted::Yes
        }
        Ok(None) => v8::Intercepted::No,
        Err(failure) => call.fail(scope, failure),
    }
}

fn global_deleter<'s>(
    scope: &mut v8::HandleScope<'s>,
    key: v8::Local<'s, v8::Name>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Boolean>,
) -> v8::Intercepted {
    let Some(call) = GlobalCall::resolve(args.data()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    let owner = match call.owner_of(&name) {
        Ok(Some(owner)) => owner.clone(),
        Ok(None) => return v8::Intercepted::No,
        Err(failure) => return call.fail(scope, failure),
    };
    match call.context.delete_host_property(scope, &owner, &name) {
        Ok(deleted) => {
            rv.set_bool(deleted);
            v8::Intercepted::Yes
        }
        Err(failure) => call.fail(scope, failure),
    }
}

fn global_enumerator<'s>(
    scope: &mut v8::HandleScope<'s>,
    args: v8::PropertyCallbackArguments<'s>,
    mut rv: v8::ReturnValue<v8::Array>,
) {
    let Some(call) = GlobalCall::resolve(args.data()) else {
        return;
    };
    let mut names = IndexSet::new();
    for member in &call.members {
        match member.object().property_names() {
            Ok(member_names) => names.extend(member_names),
            Err(err) => {
                call.context.throw_failure(scope, host_error(err));
                return;
            }
        }
    }
    let names: Vec<v8::Local<v8::Value>> = names
        .iter()
        .filter_map(|name| v8_string(scope, name).ok().map(Into::into))
        .collect();
    rv.set(v8::Array::new_with_elements(scope, &names));
}
