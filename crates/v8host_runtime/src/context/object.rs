//! Host-side operations on script objects referenced by a [`V8ObjectHolder`].

use super::convert::v8_string;
use super::{ArrayBufferOrViewInfo, ContextImpl, PromiseState};
use crate::error::{OrPending, ScopeFailure, ScopeResult, V8Exception};
use crate::holder::{V8ObjectHolder, V8ObjectSubtype};
use crate::isolate::engine::Engine;
use crate::value::Value;

fn not_a(what: &str) -> ScopeFailure {
    ScopeFailure::Host(V8Exception::general(format!("The script object is not {what}")))
}

impl ContextImpl {
    pub(crate) fn promise_state(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
    ) -> ScopeResult<PromiseState> {
        let object = self.resolve_object(engine, scope, holder)?;
        let promise = v8::Local::<v8::Promise>::try_from(object).map_err(|_| not_a("a promise"))?;
        let state = match promise.state() {
            v8::PromiseState::Pending => PromiseState::Pending,
            v8::PromiseState::Fulfilled => {
                let value = promise.result(scope);
                PromiseState::Fulfilled(self.export_value(engine, scope, value))
            }
            v8::PromiseState::Rejected => {
                promise.mark_as_handled();
                let value = promise.result(scope);
                PromiseState::Rejected(self.export_value(engine, scope, value))
            }
        };
        Ok(state)
    }

    pub(crate) fn get_object_property(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        name: &str,
    ) -> ScopeResult<Value> {
        let object = self.resolve_object(engine, scope, holder)?;
        let key = v8_string(scope, name)?;
        let value = object.get(scope, key.into()).or_pending()?;
        Ok(self.export_value(engine, scope, value))
    }

    pub(crate) fn set_object_property(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        name: &str,
        value: &Value,
    ) -> ScopeResult<()> {
        let object = self.resolve_object(engine, scope, holder)?;
        let key = v8_string(scope, name)?;
        let value = self.import_value(engine, scope, value)?;
        object.set(scope, key.into(), value).or_pending()?;
        Ok(())
    }

    pub(crate) fn delete_object_property(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        name: &str,
    ) -> ScopeResult<bool> {
        let object = self.resolve_object(engine, scope, holder)?;
        let key = v8_string(scope, name)?;
        object.delete(scope, key.into()).or_pending()
    }

    /// Enumerable string keys including inherited ones, as `for...in` sees
    /// them.
    pub(crate) fn object_property_names(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        include_indices: bool,
    ) -> ScopeResult<Vec<String>> {
        let object = self.resolve_object(engine, scope, holder)?;
        let args = v8::GetPropertyNamesArgs {
            index_filter: if include_indices {
                v8::IndexFilter::IncludeIndices
            } else {
                v8::IndexFilter::SkipIndices
            },
            key_conversion: v8::KeyConversionMode::ConvertToString,
            ..Default::default()
        };
        let names = object.get_property_names(scope, args).or_pending()?;
        let mut result = Vec::with_capacity(names.length() as usize);
        for index in 0..names.length() {
            let name = names.get_index(scope, index).or_pending()?;
            result.push(name.to_rust_string_lossy(scope));
        }
        Ok(result)
    }

    pub(crate) fn get_object_index(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        index: u32,
    ) -> ScopeResult<Value> {
        let object = self.resolve_object(engine, scope, holder)?;
        let value = object.get_index(scope, index).or_pending()?;
        Ok(self.export_value(engine, scope, value))
    }

    pub(crate) fn set_object_index(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        index: u32,
        value: &Value,
    ) -> ScopeResult<()> {
        let object = self.resolve_object(engine, scope, holder)?;
        let value = self.import_value(engine, scope, value)?;
        object.set_index(scope, index, value).or_pending()?;
        Ok(())
    }

    pub(crate) fn delete_object_index(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        index: u32,
    ) -> ScopeResult<bool> {
        let object = self.resolve_object(engine, scope, holder)?;
        object.delete_index(scope, index).or_pending()
    }

    pub(crate) fn object_property_indices(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
    ) -> ScopeResult<Vec<u32>> {
        let object = self.resolve_object(engine, scope, holder)?;
        let names = object
            .get_property_names(scope, v8::GetPropertyNamesArgs::default())
            .or_pending()?;
        let mut indices = Vec::new();
        for index in 0..names.length() {
            let name = names.get_index(scope, index).or_pending()?;
            if name.is_uint32() {
                indices.push(name.uint32_value(scope).or_pending()?);
            }
        }
        Ok(indices)
    }

    #[tracing::instrument(skip_all, fields(context = %self.config.name, as_constructor))]
    pub(crate) fn invoke_object(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        as_constructor: bool,
        args: &[Value],
    ) -> ScopeResult<Value> {
        let object = self.resolve_object(engine, scope, holder)?;
        let function = v8::Local::<v8::Function>::try_from(object).map_err(|_| not_a("invocable"))?;
        let args = self.import_values(engine, scope, args)?;
        engine.mark_execution_started();
        let result: v8::Local<v8::Value> = if as_constructor {
            function.new_instance(scope, &args).or_pending()?.into()
        } else {
            let receiver = v8::undefined(scope).into();
            function.call(scope, receiver, &args).or_pending()?
        };
        Ok(self.export_value(engine, scope, result))
    }

    pub(crate) fn invoke_object_method(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        name: &str,
        args: &[Value],
    ) -> ScopeResult<Value> {
        let object = self.resolve_object(engine, scope, holder)?;
        let key = v8_string(scope, name)?;
        let member = object.get(scope, key.into()).or_pending()?;
        let method = v8::Local::<v8::Function>::try_from(member).map_err(|_| {
            ScopeFailure::Host(V8Exception::general(format!(
                "Method or property '{name}' is not a function"
            )))
        })?;
        let args = self.import_values(engine, scope, args)?;
        engine.mark_execution_started();
        let result = method.call(scope, object.into(), &args).or_pending()?;
        Ok(self.export_value(engine, scope, result))
    }

    pub(crate) fn array_buffer_or_view_info(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
    ) -> ScopeResult<ArrayBufferOrViewInfo> {
        let object = self.resolve_object(engine, scope, holder)?;
        if object.is_array_buffer() || object.is_shared_array_buffer() {
            let size = buffer_byte_length(object);
            return Ok(ArrayBufferOrViewInfo {
                subtype: V8ObjectSubtype::ArrayBuffer,
                offset: 0,
                size,
                length: size,
                buffer: holder.clone(),
                shared: holder.shared_buffer(),
            });
        }
        let view = v8::Local::<v8::ArrayBufferView>::try_from(object)
            .map_err(|_| not_a("an array buffer or view"))?;
        let buffer = view.buffer(scope).or_pending()?;
        let Value::V8Object(buffer) = self.export_value(engine, scope, buffer.into()) else {
            return Err(not_a("backed by an array buffer"));
        };
        Ok(ArrayBufferOrViewInfo {
            subtype: holder.subtype(),
            offset: view.byte_offset(),
            size: view.byte_length(),
            length: super::convert::view_length(object, view.byte_length()),
            buffer,
            shared: holder.shared_buffer(),
        })
    }

    /// Lends the bytes of an array buffer or of the window a view covers.
    pub(crate) fn with_array_buffer_or_view_data<R>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        holder: &V8ObjectHolder,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> ScopeResult<R> {
        let object = self.resolve_object(engine, scope, holder)?;
        let (store, offset, size) = if let Ok(buffer) = v8::Local::<v8::ArrayBuffer>::try_from(object) {
            (buffer.get_backing_store(), 0, buffer.byte_length())
        } else if let Ok(buffer) = v8::Local::<v8::SharedArrayBuffer>::try_from(object) {
            (buffer.get_backing_store(), 0, buffer.byte_length())
        } else if let Ok(view) = v8::Local::<v8::ArrayBufferView>::try_from(object) {
            let buffer = view.buffer(scope).or_pending()?;
            (buffer.get_backing_store(), view.byte_offset(), view.byte_length())
        } else {
            return Err(not_a("an array buffer or view"));
        };

        if size == 0 || offset.saturating_add(size) > store.byte_length() {
            return Ok(f(&mut []));
        }
        let Some(base) = store.data() else {
            return Ok(f(&mut []));
        };
        let base = base.as_ptr().cast::<u8>();
        // SAFETY: the range lies inside the backing store, which stays alive
        // for the duration of the call on the isolate thread
        let bytes = unsafe { std::slice::from_raw_parts_mut(base.add(offset), size) };
        Ok(f(bytes))
    }
}

fn buffer_byte_length(object: v8::Local<'_, v8::Object>) -> usize {
    if let Ok(buffer) = v8::Local::<v8::ArrayBuffer>::try_from(object) {
        return buffer.byte_length();
    }
    v8::Local::<v8::SharedArrayBuffer>::try_from(object)
        .map(|buffer| buffer.byte_length())
        .unwrap_or(0)
}
