//! Tagged value codec.
//!
//! [`GluValue`] is the fixed-size record values travel in. Primitives are
//! stored inline; heap-backed variants carry a handle (a boxed interpreter
//! reference) that the holder owns. Two bitwise copies of one record share
//! that handle, so only one of them may be freed; use [`glu_value_clone`]
//! for an independent copy.

use std::ffi::{c_char, c_void, CStr};
use std::fmt;

use mlua::{
    AnyUserData, Buffer, Function, LightUserData, String as LuaString, Table, Thread, Value,
    Vector,
};

use crate::catch_panic;
use crate::error::ErrorValue;
use crate::handle::{borrow, into_handle, take};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GluValueTag {
    Nil = 0,
    Boolean = 1,
    LightUserData = 2,
    Integer = 3,
    Number = 4,
    Vector = 5,
    String = 6,
    Table = 7,
    Function = 8,
    Thread = 9,
    UserData = 10,
    Buffer = 11,
    Error = 12,
    /// A value of a kind the boundary does not model. Carries no handle
    /// and decodes to nil.
    Other = 13,
}

impl GluValueTag {
    pub fn name(self) -> &'static CStr {
        match self {
            GluValueTag::Nil => c"nil",
            GluValueTag::Boolean => c"boolean",
            GluValueTag::LightUserData | GluValueTag::UserData => c"userdata",
            GluValueTag::Integer | GluValueTag::Number => c"number",
            GluValueTag::Vector => c"vector",
            GluValueTag::String => c"string",
            GluValueTag::Table => c"table",
            GluValueTag::Function => c"function",
            GluValueTag::Thread => c"thread",
            GluValueTag::Buffer => c"buffer",
            GluValueTag::Error => c"error",
            GluValueTag::Other => c"other",
        }
    }

    /// Whether values with this tag own a handle.
    pub fn is_heap_backed(self) -> bool {
        matches!(
            self,
            GluValueTag::String
                | GluValueTag::Table
                | GluValueTag::Function
                | GluValueTag::Thread
                | GluValueTag::UserData
                | GluValueTag::Buffer
                | GluValueTag::Error
        )
    }
}

/// Payload of a [`GluValue`]; the tag says which field is live.
#[repr(C)]
#[derive(Copy, Clone)]
pub union GluValueData {
    pub boolean: bool,
    pub light_userdata: *mut c_void,
    pub integer: i64,
    pub number: f64,
    pub vector: [f32; 3],
    pub string: *mut LuaString,
    pub table: *mut Table,
    pub function: *mut Function,
    pub thread: *mut Thread,
    pub userdata: *mut AnyUserData,
    pub buffer: *mut Buffer,
    pub error: *mut ErrorValue,
    pub other: *mut c_void,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct GluValue {
    pub tag: GluValueTag,
    pub data: GluValueData,
}

impl GluValue {
    pub const NIL: GluValue = GluValue {
        tag: GluValueTag::Nil,
        data: GluValueData { integer: 0 },
    };

    pub fn boolean(b: bool) -> Self {
        GluValue {
            tag: GluValueTag::Boolean,
            data: GluValueData { boolean: b },
        }
    }

    pub fn integer(i: i64) -> Self {
        GluValue {
            tag: GluValueTag::Integer,
            data: GluValueData { integer: i },
        }
    }

    pub fn number(n: f64) -> Self {
        GluValue {
            tag: GluValueTag::Number,
            data: GluValueData { number: n },
        }
    }

    pub fn vector(v: [f32; 3]) -> Self {
        GluValue {
            tag: GluValueTag::Vector,
            data: GluValueData { vector: v },
        }
    }

    /// Encode `value`, moving any heap reference behind a new handle.
    pub fn from_value(value: Value) -> Self {
        let (tag, data) = match value {
            Value::Nil => return GluValue::NIL,
            Value::Boolean(b) => return GluValue::boolean(b),
            Value::Integer(i) => return GluValue::integer(i),
            Value::Number(n) => return GluValue::number(n),
            Value::Vector(v) => return GluValue::vector([v.x(), v.y(), v.z()]),
            Value::LightUserData(p) => (
                GluValueTag::LightUserData,
                GluValueData { light_userdata: p.0 },
            ),
            Value::String(s) => (
                GluValueTag::String,
                GluValueData {
                    string: into_handle(s),
                },
            ),
            Value::Table(t) => (
                GluValueTag::Table,
                GluValueData {
                    table: into_handle(t),
                },
            ),
            Value::Function(f) => (
                GluValueTag::Function,
                GluValueData {
                    function: into_handle(f),
                },
            ),
            Value::Thread(t) => (
                GluValueTag::Thread,
                GluValueData {
                    thread: into_handle(t),
                },
            ),
            Value::UserData(ud) => (
                GluValueTag::UserData,
                GluValueData {
                    userdata: into_handle(ud),
                },
            ),
            Value::Buffer(b) => (
                GluValueTag::Buffer,
                GluValueData {
                    buffer: into_handle(b),
                },
            ),
            Value::Error(e) => (
                GluValueTag::Error,
                GluValueData {
                    error: into_handle(ErrorValue::from_lua(&e)),
                },
            ),
            #[allow(unreachable_patterns, reason = "kinds added by newer interpreters")]
            _ => (
                GluValueTag::Other,
                GluValueData {
                    other: std::ptr::null_mut(),
                },
            ),
        };
        GluValue { tag, data }
    }

    /// Decode, taking ownership of the handle. A null handle or `other`
    /// decodes to nil.
    pub(crate) fn into_value(self) -> Value {
        // SAFETY: the tag names the union field that was written, and a
        // heap-backed field holds a handle the caller gives up here
        unsafe {
            match self.tag {
                GluValueTag::Nil | GluValueTag::Other => Value::Nil,
                GluValueTag::Boolean => Value::Boolean(self.data.boolean),
                GluValueTag::LightUserData => {
                    Value::LightUserData(LightUserData(self.data.light_userdata))
                }
                GluValueTag::Integer => Value::Integer(self.data.integer),
                GluValueTag::Number => Value::Number(self.data.number),
                GluValueTag::Vector => {
                    let [x, y, z] = self.data.vector;
                    Value::Vector(Vector::new(x, y, z))
                }
                GluValueTag::String => take(self.data.string).map_or(Value::Nil, Value::String),
                GluValueTag::Table => take(self.data.table).map_or(Value::Nil, Value::Table),
                GluValueTag::Function => {
                    take(self.data.function).map_or(Value::Nil, Value::Function)
                }
                GluValueTag::Thread => take(self.data.thread).map_or(Value::Nil, Value::Thread),
                GluValueTag::UserData => {
                    take(self.data.userdata).map_or(Value::Nil, Value::UserData)
                }
                GluValueTag::Buffer => take(self.data.buffer).map_or(Value::Nil, Value::Buffer),
                GluValueTag::Error => take(self.data.error).map_or(Value::Nil, error_value),
            }
        }
    }

    /// Decode without taking ownership: heap references are shared.
    pub(crate) fn to_value(&self) -> Value {
        // SAFETY: as in `into_value`; the handle is only borrowed
        unsafe {
            match self.tag {
                GluValueTag::String => shared(self.data.string, Value::String),
                GluValueTag::Table => shared(self.data.table, Value::Table),
                GluValueTag::Function => shared(self.data.function, Value::Function),
                GluValueTag::Thread => shared(self.data.thread, Value::Thread),
                GluValueTag::UserData => shared(self.data.userdata, Value::UserData),
                GluValueTag::Buffer => shared(self.data.buffer, Value::Buffer),
                GluValueTag::Error => shared(self.data.error, error_value),
                _ => self.into_value(),
            }
        }
    }
}

fn error_value(error: ErrorValue) -> Value {
    Value::Error(Box::new(error.into_lua()))
}

fn shared<T: Clone>(handle: *mut T, wrap: impl FnOnce(T) -> Value) -> Value {
    borrow(handle).cloned().map_or(Value::Nil, wrap)
}

impl fmt::Debug for GluValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GluValue").field(&self.to_value()).finish()
    }
}

/// Make an independent copy of `value`.
///
/// Primitives are copied; heap-backed values get a new handle sharing the
/// same object, which must be freed on its own. The original is untouched.
/// If the copy cannot be made the result is nil.
#[no_mangle]
pub extern "C" fn glu_value_clone(value: GluValue) -> GluValue {
    catch_panic(
        "glu_value_clone",
        |_| GluValue::NIL,
        || GluValue::from_value(value.to_value()),
    )
}

/// Release the handle owned by `value`. Primitives are a no-op.
#[no_mangle]
pub extern "C" fn glu_value_free(value: GluValue) {
    drop(value.into_value());
}

/// Static, NUL-terminated type name of `value` (`"nil"`, `"table"`, ...).
#[no_mangle]
pub extern "C" fn glu_value_type_name(value: GluValue) -> *const c_char {
    value.tag.name().as_ptr()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
mod tests;
