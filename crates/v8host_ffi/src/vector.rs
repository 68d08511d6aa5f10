//! Growable buffers the host fills or reads in place.

use std::ffi::c_void;

use crate::value::V8Value;

macro_rules! std_vector {
    ($name:ident, $elem:ty, $fill:expr, $new:ident, $delete:ident, $count:ident, $set_count:ident, $data:ident) => {
        pub type $name = Vec<$elem>;

        #[unsafe(no_mangle)]
        pub extern "C" fn $new(count: usize) -> *mut $name {
            let mut vector: $name = Vec::new();
            vector.resize_with(count, || $fill);
            Box::into_raw(Box::new(vector))
        }

        /// # Safety
        /// `vector` is null or came from the matching `_New`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $delete(vector: *mut $name) {
            if !vector.is_null() {
                drop(unsafe { Box::from_raw(vector) });
            }
        }

        /// # Safety
        /// `vector` is null or came from the matching `_New`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $count(vector: *const $name) -> usize {
            unsafe { vector.as_ref() }.map_or(0, Vec::len)
        }

        /// # Safety
        /// `vector` is null or came from the matching `_New`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $set_count(vector: *mut $name, count: usize) {
            if let Some(vector) = unsafe { vector.as_mut() } {
                vector.resize_with(count, || $fill);
            }
        }

        /// Element storage, valid until the count changes.
        ///
        /// # Safety
        /// `vector` is null or came from the matching `_New`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $data(vector: *mut $name) -> *mut $elem {
            unsafe { vector.as_mut() }.map_or(std::ptr::null_mut(), Vec::as_mut_ptr)
        }
    };
}

std_vector!(StdByteArray, u8, 0, StdByteArray_New, StdByteArray_Delete, StdByteArray_GetElementCount, StdByteArray_SetElementCount, StdByteArray_GetData);
std_vector!(StdInt32Array, i32, 0, StdInt32Array_New, StdInt32Array_Delete, StdInt32Array_GetElementCount, StdInt32Array_SetElementCount, StdInt32Array_GetData);
std_vector!(StdUInt32Array, u32, 0, StdUInt32Array_New, StdUInt32Array_Delete, StdUInt32Array_GetElementCount, StdUInt32Array_SetElementCount, StdUInt32Array_GetData);
std_vector!(StdUInt64Array, u64, 0, StdUInt64Array_New, StdUInt64Array_Delete, StdUInt64Array_GetElementCount, StdUInt64Array_SetElementCount, StdUInt64Array_GetData);
std_vector!(StdPtrArray, *mut c_void, std::ptr::null_mut(), StdPtrArray_New, StdPtrArray_Delete, StdPtrArray_GetElementCount, StdPtrArray_SetElementCount, StdPtrArray_GetData);
std_vector!(StdV8ValueArray, V8Value, V8Value::default(), StdV8ValueArray_New, StdV8ValueArray_Delete, StdV8ValueArray_GetElementCount, StdV8ValueArray_SetElementCount, StdV8ValueArray_GetData);

pub type StdString = String;

/// Copies `length` UTF-8 bytes; invalid sequences are replaced.
///
/// # Safety
/// `value` points to `length` readable bytes, or `length` is zero.
pub(crate) unsafe fn read_utf8(value: *const u8, length: usize) -> String {
    if value.is_null() || length == 0 {
        return String::new();
    }
    let bytes = unsafe { std::slice::from_raw_parts(value, length) };
    String::from_utf8_lossy(bytes).into_owned()
}

/// # Safety
/// `value` points to `length` readable bytes, or `length` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdString_New(value: *const u8, length: usize) -> *mut StdString {
    Box::into_raw(Box::new(unsafe { read_utf8(value, length) }))
}

/// # Safety
/// `string` is null or came from `StdString_New`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdString_Delete(string: *mut StdString) {
    if !string.is_null() {
        drop(unsafe { Box::from_raw(string) });
    }
}

/// UTF-8 bytes of the string, valid until it is changed or deleted.
///
/// # Safety
/// `string` is null or came from `StdString_New`; `length` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdString_GetValue(string: *const StdString, length: *mut usize) -> *const u8 {
    let Some(string) = (unsafe { string.as_ref() }) else {
        return std::ptr::null();
    };
    if let Some(length) = unsafe { length.as_mut() } {
        *length = string.len();
    }
    string.as_ptr()
}

/// # Safety
/// `string` is null or came from `StdString_New`; `value` points to
/// `length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdString_SetValue(string: *mut StdString, value: *const u8, length: usize) {
    if let Some(string) = unsafe { string.as_mut() } {
        *string = unsafe { read_utf8(value, length) };
    }
}

pub type StdStringArray = Vec<String>;

#[unsafe(no_mangle)]
pub extern "C" fn StdStringArray_New(count: usize) -> *mut StdStringArray {
    Box::into_raw(Box::new(vec![String::new(); count]))
}

/// # Safety
/// `array` is null or came from `StdStringArray_New`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdStringArray_Delete(array: *mut StdStringArray) {
    if !array.is_null() {
        drop(unsafe { Box::from_raw(array) });
    }
}

/// # Safety
/// `array` is null or came from `StdStringArray_New`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdStringArray_GetElementCount(array: *const StdStringArray) -> usize {
    unsafe { array.as_ref() }.map_or(0, Vec::len)
}

/// # Safety
/// `array` is null or came from `StdStringArray_New`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdStringArray_SetElementCount(array: *mut StdStringArray, count: usize) {
    if let Some(array) = unsafe { array.as_mut() } {
        array.resize(count, String::new());
    }
}

/// # Safety
/// `array` is null or came from `StdStringArray_New`; `length` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdStringArray_GetElement(
    array: *const StdStringArray,
    index: usize,
    length: *mut usize,
) -> *const u8 {
    let element = unsafe { array.as_ref() }.and_then(|array| array.get(index));
    unsafe { StdString_GetValue(element.map_or(std::ptr::null(), std::ptr::from_ref), length) }
}

/// # Safety
/// `array` is null or came from `StdStringArray_New`; `value` points to
/// `length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn StdStringArray_SetElement(
    array: *mut StdStringArray,
    index: usize,
    value: *const u8,
    length: usize,
) {
    if let Some(element) = unsafe { array.as_mut() }.and_then(|array| array.get_mut(index)) {
        *element = unsafe { read_utf8(value, length) };
    }
}
