//! Errors crossing the boundary.
//!
//! [`BridgeError`] is what an entry point fails with; its message is the
//! envelope error string. [`ErrorValue`] is an error carried as data: what
//! a failing call returns (see [`glu_function_call`](crate::glu_function_call))
//! and what a host callback hands back to raise one.

use std::ffi::{c_char, CString};

use mlua::Error as LuaError;

use crate::handle::{borrow, bytes, into_handle, release};
use crate::string::GluBytes;

/// Broad classification of a failure, for logging and for deciding whether
/// a call failure is reported as data or as an envelope error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A null or out-of-range argument.
    Argument,
    TypeMismatch,
    ReadOnly,
    /// The memory ceiling was hit.
    ResourceExhaustion,
    CompileFailure,
    Runtime,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0} pointer is null")]
    Null(&'static str),
    #[error("attempt to modify a readonly table")]
    ReadOnly,
    #[error("index {index} out of bounds (length {len})")]
    OutOfBounds { index: i64, len: usize },
    #[error("range {start}..{end} out of bounds (length {len})")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
    #[error("user data was not created by the host")]
    ForeignUserData,
    #[error("{}", describe(.0))]
    Lua(#[from] LuaError),
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::Null(_)
            | BridgeError::OutOfBounds { .. }
            | BridgeError::RangeOutOfBounds { .. } => ErrorCategory::Argument,
            BridgeError::ReadOnly => ErrorCategory::ReadOnly,
            BridgeError::ForeignUserData => ErrorCategory::TypeMismatch,
            BridgeError::Lua(err) => lua_category(err),
        }
    }
}

pub(crate) fn lua_category(err: &LuaError) -> ErrorCategory {
    match err {
        LuaError::MemoryError(_) => ErrorCategory::ResourceExhaustion,
        LuaError::SyntaxError { .. } => ErrorCategory::CompileFailure,
        LuaError::FromLuaConversionError { .. }
        | LuaError::ToLuaConversionError { .. }
        | LuaError::UserDataTypeMismatch => ErrorCategory::TypeMismatch,
        LuaError::CallbackError { cause, .. } | LuaError::WithContext { cause, .. } => {
            lua_category(cause)
        }
        _ => ErrorCategory::Runtime,
    }
}

/// The message a script would see for `err`, without the wrapping the
/// interpreter adds around errors raised through host callbacks.
pub(crate) fn describe(err: &LuaError) -> String {
    match err {
        LuaError::RuntimeError(message) | LuaError::MemoryError(message) => message.clone(),
        LuaError::SyntaxError { message, .. } => message.clone(),
        LuaError::CallbackError { cause, .. } | LuaError::WithContext { cause, .. } => {
            describe(cause)
        }
        other => other.to_string(),
    }
}

/// An error message held as a value. Always NUL-terminated, never
/// containing an interior NUL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorValue {
    message: CString,
}

impl ErrorValue {
    /// Build from raw bytes, dropping any NUL bytes.
    pub fn from_bytes(mut message: Vec<u8>) -> Self {
        message.retain(|&b| b != 0);
        ErrorValue {
            message: CString::new(message).unwrap_or_default(),
        }
    }

    pub(crate) fn from_lua(err: &LuaError) -> Self {
        ErrorValue::from_bytes(describe(err).into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.message.as_bytes()
    }

    /// The error raised into a script when a host callback returns this.
    pub(crate) fn into_lua(self) -> LuaError {
        LuaError::runtime(self.message.to_string_lossy())
    }
}

/// Create an error value from `len` bytes at `data`. NUL bytes are dropped.
#[no_mangle]
pub extern "C" fn glu_error_new(data: *const c_char, len: usize) -> *mut ErrorValue {
    into_handle(ErrorValue::from_bytes(bytes(data.cast(), len).to_vec()))
}

/// The message, without its trailing NUL. `data` is NUL-terminated.
#[no_mangle]
pub extern "C" fn glu_error_get_string(error: *const ErrorValue) -> GluBytes {
    borrow(error).map_or(GluBytes::EMPTY, |e| GluBytes::of(e.as_bytes()))
}

#[no_mangle]
pub extern "C" fn glu_free_error(error: *mut ErrorValue) {
    release(error);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
