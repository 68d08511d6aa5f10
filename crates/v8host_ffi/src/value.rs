use std::ffi::c_void;

use v8host_runtime::{BigIntValue, Value};

use crate::handle::{Handle, handle_ref};
use crate::host;
use crate::object::V8ObjectHandle;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V8ValueKind {
    Nonexistent = 0,
    Undefined = 1,
    Null = 2,
    Boolean = 3,
    Number = 4,
    String = 5,
    DateTime = 6,
    BigInt = 7,
    V8Object = 8,
    HostObject = 9,
}

/// A marshalled value.
///
/// Values written by the engine own their string and BigInt storage until
/// [`V8Value_Clear`]; an object handle written by the engine belongs to the
/// host. Values the host passes in are only borrowed for the call.
#[repr(C)]
#[derive(Debug)]
pub struct V8Value {
    pub kind: V8ValueKind,
    /// Boolean (0 or 1), Number and DateTime payload
    pub number: f64,
    pub sign_bit: bool,
    /// UTF-8 bytes, BigInt words, a `V8ObjectHandle` or a host object
    pub data: *mut c_void,
    /// Byte count of a string or word count of a BigInt
    pub length: usize,
    /// Script object subtype
    pub subtype: u32,
}

impl Default for V8Value {
    fn default() -> Self {
        Self {
            kind: V8ValueKind::Undefined,
            number: 0.0,
            sign_bit: false,
            data: std::ptr::null_mut(),
            length: 0,
            subtype: 0,
        }
    }
}

impl V8Value {
    fn of(kind: V8ValueKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Engine-owned rendition of `value`.
    pub(crate) fn export(value: &Value) -> Self {
        match value {
            Value::Nonexistent => Self::of(V8ValueKind::Nonexistent),
            Value::Undefined => Self::of(V8ValueKind::Undefined),
            Value::Null => Self::of(V8ValueKind::Null),
            Value::Boolean(flag) => Self {
                number: f64::from(u8::from(*flag)),
                ..Self::of(V8ValueKind::Boolean)
            },
            Value::Number(number) => Self {
                number: *number,
                ..Self::of(V8ValueKind::Number)
            },
            Value::DateTime(millis) => Self {
                number: *millis,
                ..Self::of(V8ValueKind::DateTime)
            },
            Value::String(text) => {
                let bytes = text.clone().into_bytes().into_boxed_slice();
                let length = bytes.len();
                Self {
                    data: Box::into_raw(bytes).cast::<c_void>(),
                    length,
                    ..Self::of(V8ValueKind::String)
                }
            }
            Value::BigInt(bigint) => {
                let words = bigint.words.clone().into_boxed_slice();
                let length = words.len();
                Self {
                    sign_bit: bigint.sign_bit,
                    data: Box::into_raw(words).cast::<c_void>(),
                    length,
                    ..Self::of(V8ValueKind::BigInt)
                }
            }
            Value::V8Object(holder) => Self {
                data: Handle::into_raw(holder.clone()).cast::<c_void>(),
                subtype: holder.subtype() as u32,
                ..Self::of(V8ValueKind::V8Object)
            },
            Value::HostObject(holder) => match host::host_pointer(holder) {
                Some(object) => Self {
                    data: object,
                    ..Self::of(V8ValueKind::HostObject)
                },
                None => {
                    tracing::warn!("Host object without a host counterpart exported as undefined");
                    Self::of(V8ValueKind::Undefined)
                }
            },
        }
    }

    /// Reads a host-supplied value.
    ///
    /// # Safety
    /// The payload fields must match `kind` as documented on the fields.
    pub(crate) unsafe fn import(&self) -> Value {
        match self.kind {
            V8ValueKind::Nonexistent => Value::Nonexistent,
            V8ValueKind::Undefined => Value::Undefined,
            V8ValueKind::Null => Value::Null,
            V8ValueKind::Boolean => Value::Boolean(self.number != 0.0),
            V8ValueKind::Number => Value::Number(self.number),
            V8ValueKind::DateTime => Value::DateTime(self.number),
            V8ValueKind::String => {
                Value::String(unsafe { crate::vector::read_utf8(self.data.cast::<u8>(), self.length) })
            }
            V8ValueKind::BigInt => {
                let words = if self.data.is_null() || self.length == 0 {
                    Vec::new()
                } else {
                    unsafe { std::slice::from_raw_parts(self.data.cast::<u64>(), self.length) }.to_vec()
                };
                Value::BigInt(BigIntValue::new(self.sign_bit, words))
            }
            V8ValueKind::V8Object => unsafe { handle_ref(self.data.cast::<V8ObjectHandle>().cast_const()) }
                .and_then(Handle::get)
                .map_or(Value::Undefined, Value::V8Object),
            V8ValueKind::HostObject => host::host_object_value(self.data),
        }
    }

    /// # Safety
    /// `value` is null or valid for writes.
    pub(crate) unsafe fn write(value: *mut Self, exported: &Value) {
        if let Some(slot) = unsafe { value.as_mut() } {
            *slot = Self::export(exported);
        }
    }

    /// # Safety
    /// As for [`V8Value::import`]; a null pointer reads as undefined.
    pub(crate) unsafe fn read(value: *const Self) -> Value {
        unsafe { value.as_ref() }.map_or(Value::Undefined, |value| unsafe { value.import() })
    }
}

/// Frees the string or BigInt storage of an engine-written value and resets
/// it to undefined. Object handles are left to the host.
///
/// # Safety
/// `value` is null or was last written by the engine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Value_Clear(value: *mut V8Value) {
    let Some(value) = (unsafe { value.as_mut() }) else {
        return;
    };
    if !value.data.is_null() {
        match value.kind {
            V8ValueKind::String => {
                let bytes = std::ptr::slice_from_raw_parts_mut(value.data.cast::<u8>(), value.length);
                drop(unsafe { Box::from_raw(bytes) });
            }
            V8ValueKind::BigInt => {
                let words = std::ptr::slice_from_raw_parts_mut(value.data.cast::<u64>(), value.length);
                drop(unsafe { Box::from_raw(words) });
            }
            _ => {}
        }
    }
    *value = V8Value::default();
}

/// Copies `args` out of a host array.
///
/// # Safety
/// `args` is null or a live `StdV8ValueArray` of host-supplied values.
pub(crate) unsafe fn read_args(args: *const crate::vector::StdV8ValueArray) -> Vec<Value> {
    unsafe { args.as_ref() }
        .map(|args| args.iter().map(|arg| unsafe { arg.import() }).collect())
        .unwrap_or_default()
}

/// Engine-owned array of exported values; the host clears each element.
pub(crate) fn export_args(args: &[Value]) -> crate::vector::StdV8ValueArray {
    args.iter().map(V8Value::export).collect()
}
