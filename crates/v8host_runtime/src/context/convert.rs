//! Value marshalling between the host [`Value`] model and engine handles.

use super::ContextImpl;
use crate::error::{ScopeFailure, ScopeResult, V8Exception};
use crate::holder::{SharedBufferInfo, V8ObjectFlags, V8ObjectHolder, V8ObjectSubtype};
use crate::isolate::engine::Engine;
use crate::value::{BigIntValue, Value};

pub(crate) fn v8_string<'s>(scope: &mut v8::HandleScope<'s>, value: &str) -> ScopeResult<v8::Local<'s, v8::String>> {
    v8::String::new(scope, value)
        .ok_or_else(|| ScopeFailure::Host(V8Exception::general("String exceeds the engine's maximum length")))
}

impl ContextImpl {
    /// Converts a host value into an engine handle.
    ///
    /// A script object reference that was released or belongs to another
    /// isolate imports as `undefined`.
    pub(crate) fn import_value<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        value: &Value,
    ) -> ScopeResult<v8::Local<'s, v8::Value>> {
        let imported: v8::Local<v8::Value> = match value {
            Value::Nonexistent | Value::Undefined => v8::undefined(scope).into(),
            Value::Null => v8::null(scope).into(),
            Value::Boolean(value) => v8::Boolean::new(scope, *value).into(),
            Value::Number(value) => v8::Number::new(scope, *value).into(),
            Value::String(value) => v8_string(scope, value)?.into(),
            Value::DateTime(millis) => v8::Date::new(scope, *millis)
                .ok_or(ScopeFailure::Pending)?
                .into(),
            Value::BigInt(value) => v8::BigInt::new_from_words(scope, value.sign_bit, &value.words)
                .ok_or(ScopeFailure::Pending)?
                .into(),
            Value::V8Object(holder) => match self.lookup_object(engine, holder) {
                Some(object) => v8::Local::new(scope, object),
                None => {
                    tracing::trace!(?holder, "Importing unavailable script object as undefined");
                    v8::undefined(scope).into()
                }
            },
            Value::HostObject(holder) => self.proxy_for(scope, holder)?.into(),
        };
        Ok(imported)
    }

    pub(crate) fn import_values<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        values: &[Value],
    ) -> ScopeResult<Vec<v8::Local<'s, v8::Value>>> {
        values
            .iter()
            .map(|value| self.import_value(engine, scope, value))
            .collect()
    }

    fn lookup_object(&self, engine: &Engine, holder: &V8ObjectHolder) -> Option<v8::Global<v8::Value>> {
        if holder.is_released() || !holder.belongs_to(&engine.core) {
            return None;
        }
        engine.object(holder.entity_id())
    }

    /// Resolves the target of an object operation, failing for references
    /// that can no longer be used.
    pub(crate) fn resolve_object<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        holder: &V8ObjectHolder,
    ) -> ScopeResult<v8::Local<'s, v8::Object>> {
        let object = self
            .lookup_object(engine, holder)
            .ok_or_else(|| V8Exception::general("The script object has been released"))?;
        let object = v8::Local::new(scope, object);
        v8::Local::<v8::Object>::try_from(object)
            .map_err(|_| ScopeFailure::Host(V8Exception::general("The value is not a script object")))
    }

    /// Converts an engine handle into a host value. Total: every engine
    /// value maps to exactly one variant.
    pub(crate) fn export_value<'a>(&self, engine: &Engine, scope: &mut v8::HandleScope<'a>, value: v8::Local<'a, v8::Value>) -> Value {
        if value.is_undefined() {
            return Value::Undefined;
        }
        if value.is_null() {
            return Value::Null;
        }
        if value.is_boolean() {
            return Value::Boolean(value.is_true());
        }
        if let Ok(number) = v8::Local::<v8::Number>::try_from(value) {
            return Value::Number(number.value());
        }
        if value.is_string() {
            return Value::String(value.to_rust_string_lossy(scope));
        }
        if let Ok(bigint) = v8::Local::<v8::BigInt>::try_from(value) {
            let mut words = vec![0u64; bigint.word_count()];
            let (sign_bit, words) = bigint.to_words_array(&mut words);
            return Value::BigInt(BigIntValue::new(sign_bit, words.to_vec()));
        }
        if self.config.enable_date_time_conversion
            && let Ok(date) = v8::Local::<v8::Date>::try_from(value)
        {
            return Value::DateTime(date.value_of());
        }
        let Ok(object) = v8::Local::<v8::Object>::try_from(value) else {
            // symbols and other primitives without a host counterpart
            return self.register_value(engine, scope, value, V8ObjectSubtype::None, V8ObjectFlags::empty(), 0, None);
        };
        if let Some(holder) = self.host_object_of(scope, object) {
            return Value::HostObject(holder);
        }

        let (subtype, flags, shared) = self.classify(scope, object);
        let identity_hash = i32::from(object.get_identity_hash());
        self.register_value(engine, scope, value, subtype, flags, identity_hash, shared)
    }

    pub(crate) fn export_values<'a>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'a>,
        args: &v8::FunctionCallbackArguments<'a>,
    ) -> Vec<Value> {
        (0..args.length())
            .map(|index| self.export_value(engine, scope, args.get(index)))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn register_value(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        value: v8::Local<'_, v8::Value>,
        subtype: V8ObjectSubtype,
        flags: V8ObjectFlags,
        identity_hash: i32,
        shared: Option<SharedBufferInfo>,
    ) -> Value {
        let id = engine.register_object(v8::Global::new(scope, value));
        Value::V8Object(V8ObjectHolder::new(
            engine.core.weak(),
            id,
            subtype,
            flags,
            identity_hash,
            shared,
        ))
    }

    fn classify<'a>(
        &self,
        scope: &mut v8::HandleScope<'a>,
        object: v8::Local<'a, v8::Object>,
    ) -> (V8ObjectSubtype, V8ObjectFlags, Option<SharedBufferInfo>) {
        let mut flags = V8ObjectFlags::empty();

        if object.is_function() {
            if object.is_async_function() {
                flags |= V8ObjectFlags::ASYNC;
            }
            if object.is_generator_function() {
                flags |= V8ObjectFlags::GENERATOR;
            }
            return (V8ObjectSubtype::Function, flags, None);
        }
        if let Ok(promise) = v8::Local::<v8::Promise>::try_from(object) {
            match promise.state() {
                v8::PromiseState::Pending => flags |= V8ObjectFlags::PENDING,
                v8::PromiseState::Rejected => flags |= V8ObjectFlags::REJECTED,
                v8::PromiseState::Fulfilled => {}
            }
            return (V8ObjectSubtype::Promise, flags, None);
        }
        if object.is_array() {
            return (V8ObjectSubtype::Array, flags, None);
        }
        if object.is_generator_object() {
            flags |= V8ObjectFlags::GENERATOR;
            if self.is_async_generator(scope, object) {
                flags |= V8ObjectFlags::ASYNC;
            }
            return (V8ObjectSubtype::Iterator, flags, None);
        }
        if object.is_map_iterator() || object.is_set_iterator() {
            return (V8ObjectSubtype::Iterator, flags, None);
        }
        if object.is_array_buffer() || object.is_shared_array_buffer() {
            let shared = object.is_shared_array_buffer().then(|| {
                let size = v8::Local::<v8::SharedArrayBuffer>::try_from(object)
                    .map(|buffer| buffer.byte_length())
                    .unwrap_or(0);
                SharedBufferInfo {
                    offset: 0,
                    size,
                    length: size,
                }
            });
            if shared.is_some() {
                flags |= V8ObjectFlags::SHARED;
            }
            return (V8ObjectSubtype::ArrayBuffer, flags, shared);
        }
        if let Ok(view) = v8::Local::<v8::ArrayBufferView>::try_from(object) {
            let subtype = view_subtype(object);
            let shared = view
                .buffer(scope)
                .filter(|buffer| buffer.is_shared_array_buffer())
                .map(|_| SharedBufferInfo {
                    offset: view.byte_offset(),
                    size: view.byte_length(),
                    length: view_length(object, view.byte_length()),
                });
            if shared.is_some() {
                flags |= V8ObjectFlags::SHARED;
            }
            return (subtype, flags, shared);
        }
        if object.is_date() {
            return (V8ObjectSubtype::Date, flags, None);
        }
        (V8ObjectSubtype::None, flags, None)
    }

    fn is_async_generator<'a>(&self, scope: &mut v8::HandleScope<'a>, object: v8::Local<'a, v8::Object>) -> bool {
        let tc = &mut v8::TryCatch::new(scope);
        self.call_internal(tc, "isAsyncGenerator", &[object.into()])
            .is_ok_and(|result| result.is_true())
    }
}

fn view_subtype(view: v8::Local<'_, v8::Object>) -> V8ObjectSubtype {
    if view.is_data_view() {
        V8ObjectSubtype::DataView
    } else if view.is_uint8_array() {
        V8ObjectSubtype::Uint8Array
    } else if view.is_uint8_clamped_array() {
        V8ObjectSubtype::Uint8ClampedArray
    } else if view.is_int8_array() {
        V8ObjectSubtype::Int8Array
    } else if view.is_uint16_array() {
        V8ObjectSubtype::Uint16Array
    } else if view.is_int16_array() {
        V8ObjectSubtype::Int16Array
    } else if view.is_uint32_array() {
        V8ObjectSubtype::Uint32Array
    } else if view.is_int32_array() {
        V8ObjectSubtype::Int32Array
    } else if view.is_big_uint64_array() {
        V8ObjectSubtype::BigUint64Array
    } else if view.is_big_int64_array() {
        V8ObjectSubtype::BigInt64Array
    } else if view.is_float32_array() {
        V8ObjectSubtype::Float32Array
    } else if view.is_float64_array() {
        V8ObjectSubtype::Float64Array
    } else {
        V8ObjectSubtype::None
    }
}

/// Element count of a typed array; byte count for data views.
pub(crate) fn view_length(view: v8::Local<'_, v8::Object>, byte_length: usize) -> usize {
    v8::Local::<v8::TypedArray>::try_from(view)
        .map(|array| array.length())
        .unwrap_or(byte_length)
}
