use std::fmt;
use std::sync::Arc;

use crate::holder::{HostObjectHolder, V8ObjectHolder};
use crate::host::HostObject;

/// A value crossing the boundary between the host and the engine.
///
/// Every script value exported from a context maps to exactly one variant.
/// Object variants hold cloned references; dropping a `Value` never disposes
/// the underlying entity while another holder is alive.
#[derive(Clone, Default)]
pub enum Value {
    /// No value at all, as opposed to `undefined`. Property lookups return
    /// this when the key is absent.
    #[default]
    Nonexistent,
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Milliseconds since the Unix epoch
    DateTime(f64),
    BigInt(BigIntValue),
    V8Object(V8ObjectHolder),
    HostObject(HostObjectHolder),
}

impl Value {
    pub fn host_object(object: impl HostObject) -> Self {
        Self::HostObject(HostObjectHolder::new(Arc::new(object)))
    }

    pub fn is_nonexistent(&self) -> bool {
        matches!(self, Self::Nonexistent)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_v8_object(&self) -> Option<&V8ObjectHolder> {
        match self {
            Self::V8Object(holder) => Some(holder),
            _ => None,
        }
    }

    pub fn as_host_object(&self) -> Option<&HostObjectHolder> {
        match self {
            Self::HostObject(holder) => Some(holder),
            _ => None,
        }
    }

    /// Short tag used in logs and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nonexistent => "nonexistent",
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::BigInt(_) => "bigint",
            Self::V8Object(_) => "v8object",
            Self::HostObject(_) => "hostobject",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nonexistent => f.write_str("Nonexistent"),
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Boolean(value) => f.debug_tuple("Boolean").field(value).finish(),
            Self::Number(value) => f.debug_tuple("Number").field(value).finish(),
            Self::String(value) => f.debug_tuple("String").field(value).finish(),
            Self::DateTime(value) => f.debug_tuple("DateTime").field(value).finish(),
            Self::BigInt(value) => f.debug_tuple("BigInt").field(value).finish(),
            Self::V8Object(holder) => f.debug_tuple("V8Object").field(holder).finish(),
            Self::HostObject(holder) => f.debug_tuple("HostObject").field(holder).finish(),
        }
    }
}

/// Object variants compare by identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nonexistent, Self::Nonexistent)
            | (Self::Undefined, Self::Undefined)
            | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) | (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::V8Object(a), Self::V8Object(b)) => a.same_entity(b),
            (Self::HostObject(a), Self::HostObject(b)) => a.identity() == b.identity(),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<HostObjectHolder> for Value {
    fn from(value: HostObjectHolder) -> Self {
        Self::HostObject(value)
    }
}

impl From<V8ObjectHolder> for Value {
    fn from(value: V8ObjectHolder) -> Self {
        Self::V8Object(value)
    }
}

impl From<BigIntValue> for Value {
    fn from(value: BigIntValue) -> Self {
        Self::BigInt(value)
    }
}

/// Sign and magnitude of a script `BigInt`, least significant word first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BigIntValue {
    pub sign_bit: bool,
    pub words: Vec<u64>,
}

impl BigIntValue {
    pub fn new(sign_bit: bool, words: Vec<u64>) -> Self {
        let mut value = Self { sign_bit, words };
        value.normalize();
        value
    }

    pub fn from_i128(value: i128) -> Self {
        let magnitude = value.unsigned_abs();
        #[allow(clippy::cast_possible_truncation)]
        let words = vec![magnitude as u64, (magnitude >> 64) as u64];
        Self::new(value < 0, words)
    }

    /// `None` when the magnitude does not fit
    pub fn to_i128(&self) -> Option<i128> {
        if self.words.len() > 2 {
            return None;
        }
        let low = u128::from(self.words.first().copied().unwrap_or(0));
        let high = u128::from(self.words.get(1).copied().unwrap_or(0));
        let magnitude = (high << 64) | low;
        if self.sign_bit {
            if magnitude == 1u128 << 127 {
                return Some(i128::MIN);
            }
            i128::try_from(magnitude).ok().map(|m| -m)
        } else {
            i128::try_from(magnitude).ok()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.words.is_empty()
    }

    fn normalize(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
        if self.words.is_empty() {
            self.sign_bit = false;
        }
    }
}
