use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{HostException, HostObject, HostResult, Invocability};
use crate::holder::HostObjectHolder;
use crate::value::Value;

type HostFn = dyn Fn(&[Value]) -> HostResult<Value> + Send + Sync;

/// A Rust closure exposed to script.
pub struct HostFunction {
    body: Box<HostFn>,
    invocability: Invocability,
}

impl HostFunction {
    /// A script-callable function; `typeof` reports "function".
    pub fn new(body: impl Fn(&[Value]) -> HostResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            body: Box::new(body),
            invocability: Invocability::Delegate,
        }
    }

    /// Same body, exposed as a plain invocable object. Script sees an
    /// ordinary object; only the host invokes it.
    pub fn invocable(body: impl Fn(&[Value]) -> HostResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            body: Box::new(body),
            invocability: Invocability::Invocable,
        }
    }

    pub fn into_value(self) -> Value {
        Value::HostObject(HostObjectHolder::new(Arc::new(self)))
    }
}

impl HostObject for HostFunction {
    fn invoke(&self, _as_constructor: bool, args: &[Value]) -> HostResult<Value> {
        (self.body)(args)
    }

    fn invocability(&self) -> Invocability {
        self.invocability
    }
}

/// Ordered name/value store, the simplest useful host object.
#[derive(Default)]
pub struct PropertyBag {
    properties: Mutex<IndexMap<String, Value>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.lock().insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.lock().get(name).cloned()
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.lock().insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.properties.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.lock().is_empty()
    }
}

impl HostObject for PropertyBag {
    fn get_property(&self, name: &str) -> HostResult<Value> {
        Ok(self.get(name).unwrap_or(Value::Nonexistent))
    }

    fn is_cacheable(&self, _name: &str) -> bool {
        true
    }

    fn set_property(&self, name: &str, value: Value) -> HostResult<bool> {
        self.insert(name, value);
        Ok(true)
    }

    fn delete_property(&self, name: &str) -> HostResult<bool> {
        Ok(self.properties.lock().shift_remove(name).is_some())
    }

    fn property_names(&self) -> HostResult<Vec<String>> {
        Ok(self.properties.lock().keys().cloned().collect())
    }

    fn invoke_method(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        match self.get(name) {
            Some(Value::HostObject(method)) => method.object().invoke(false, args),
            _ => Err(HostException::new(format!(
                "Object has no suitable method named '{name}'"
            ))),
        }
    }
}

type BoxedValues = Box<dyn Iterator<Item = Value> + Send>;

struct EnumeratorState {
    source: Mutex<BoxedValues>,
    current: Mutex<Value>,
}

impl EnumeratorState {
    fn move_next(&self) -> bool {
        let next = self.source.lock().next();
        let advanced = next.is_some();
        *self.current.lock() = next.unwrap_or(Value::Undefined);
        advanced
    }
}

/// Adapts a Rust iterator to the `moveNext()`/`current` shape script
/// iterators are built from.
pub struct HostEnumerator {
    state: Arc<EnumeratorState>,
}

impl HostEnumerator {
    pub fn new(values: impl IntoIterator<Item = Value, IntoIter: Send + 'static>) -> Self {
        Self {
            state: Arc::new(EnumeratorState {
                source: Mutex::new(Box::new(values.into_iter())),
                current: Mutex::new(Value::Undefined),
            }),
        }
    }

    pub fn into_value(self) -> Value {
        Value::HostObject(HostObjectHolder::new(Arc::new(self)))
    }
}

impl HostObject for HostEnumerator {
    fn get_property(&self, name: &str) -> HostResult<Value> {
        match name {
            "current" => Ok(self.state.current.lock().clone()),
            "moveNext" => {
                let state = self.state.clone();
                Ok(HostFunction::new(move |_| Ok(Value::Boolean(state.move_next()))).into_value())
            }
            _ => Ok(Value::Nonexistent),
        }
    }

    fn is_cacheable(&self, name: &str) -> bool {
        name == "moveNext"
    }

    fn enumerator(&self) -> HostResult<Value> {
        let this = Self {
            state: self.state.clone(),
        };
        Ok(this.into_value())
    }

    fn invoke_method(&self, name: &str, _args: &[Value]) -> HostResult<Value> {
        match name {
            "moveNext" => Ok(Value::Boolean(self.state.move_next())),
            _ => Err(HostException::new(format!(
                "Object has no suitable method named '{name}'"
            ))),
        }
    }
}

/// Presents a [`HostException`] to script as an object with a `message`.
pub struct HostExceptionObject {
    exception: HostException,
}

impl HostExceptionObject {
    pub fn new(exception: HostException) -> Self {
        Self { exception }
    }
}

impl HostObject for HostExceptionObject {
    fn get_property(&self, name: &str) -> HostResult<Value> {
        match name {
            "message" => Ok(Value::String(self.exception.message().to_string())),
            _ => Ok(Value::Nonexistent),
        }
    }

    fn property_names(&self) -> HostResult<Vec<String>> {
        Ok(vec!["message".to_string()])
    }

    fn as_host_exception(&self) -> Option<HostException> {
        Some(self.exception.clone())
    }
}
