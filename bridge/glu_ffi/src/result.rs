//! Typed result envelopes.
//!
//! Every fallible entry point returns a `#[repr(C)]` record pairing a payload
//! with an error string. Exactly one of them is set: on success `error` is
//! null, on failure the payload is its empty value (null, `0`, `false` or a
//! nil [`GluValue`]) and `error` is a NUL-terminated message the caller
//! releases with [`glu_result_error_free`]. The payload type is fixed per
//! alias, so the host never casts an untyped pointer back.

use std::ffi::{c_char, CString};
use std::fmt::Display;

use mlua::{AnyUserData, Buffer, Function, String as LuaString, Table};

use crate::catch_panic;
use crate::chunk::GluChunkString;
use crate::error::BridgeError;
use crate::multivalue::GluMultiValue;
use crate::value::GluValue;

/// An envelope carrying a payload of type `T`.
#[repr(C)]
pub struct GluResult<T> {
    pub value: T,
    pub error: *mut c_char,
}

/// An envelope for operations with no payload.
#[repr(C)]
pub struct GluNoneResult {
    pub error: *mut c_char,
}

pub type GluBoolResult = GluResult<bool>;
pub type GluI64Result = GluResult<i64>;
pub type GluUsizeResult = GluResult<usize>;
pub type GluValueResult = GluResult<GluValue>;
pub type GluStringResult = GluResult<*mut LuaString>;
pub type GluTableResult = GluResult<*mut Table>;
pub type GluFunctionResult = GluResult<*mut Function>;
pub type GluUserDataResult = GluResult<*mut AnyUserData>;
pub type GluBufferResult = GluResult<*mut Buffer>;
pub type GluMultiValueResult = GluResult<*mut GluMultiValue>;
pub type GluChunkStringResult = GluResult<*mut GluChunkString>;

mod sealed {
    pub trait Sealed {}

    impl Sealed for bool {}
    impl Sealed for i64 {}
    impl Sealed for usize {}
    impl<T> Sealed for *mut T {}
    impl Sealed for crate::value::GluValue {}
}

/// Payload types, with the value used when the envelope carries an error.
///
/// Sealed: the set of envelope payloads is fixed by the header.
pub trait Payload: sealed::Sealed {
    #[doc(hidden)]
    fn empty() -> Self;
}

impl Payload for bool {
    fn empty() -> Self {
        false
    }
}

impl Payload for i64 {
    fn empty() -> Self {
        0
    }
}

impl Payload for usize {
    fn empty() -> Self {
        0
    }
}

impl<T> Payload for *mut T {
    fn empty() -> Self {
        std::ptr::null_mut()
    }
}

impl Payload for GluValue {
    fn empty() -> Self {
        GluValue::NIL
    }
}

impl<T: Payload> GluResult<T> {
    pub(crate) fn ok(value: T) -> Self {
        GluResult {
            value,
            error: std::ptr::null_mut(),
        }
    }

    pub(crate) fn err(error: impl Display) -> Self {
        GluResult {
            value: T::empty(),
            error: into_c_string(error),
        }
    }

    pub(crate) fn fail(error: impl Into<BridgeError>) -> Self {
        Self::err(logged(error.into()))
    }

    pub(crate) fn from_result<E: Into<BridgeError>>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(error) => Self::fail(error),
        }
    }
}

impl<T> GluResult<T> {
    pub fn is_ok(&self) -> bool {
        self.error.is_null()
    }
}

impl GluNoneResult {
    pub(crate) fn ok() -> Self {
        GluNoneResult {
            error: std::ptr::null_mut(),
        }
    }

    pub(crate) fn err(error: impl Display) -> Self {
        GluNoneResult {
            error: into_c_string(error),
        }
    }

    pub(crate) fn fail(error: impl Into<BridgeError>) -> Self {
        Self::err(logged(error.into()))
    }

    pub(crate) fn from_result<E: Into<BridgeError>>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(error) => Self::fail(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_null()
    }
}

fn logged(error: BridgeError) -> BridgeError {
    tracing::debug!(category = ?error.category(), %error, "entry point failed");
    error
}

/// Envelopes that can report a failure without a payload.
pub(crate) trait Envelope {
    fn failure(message: String) -> Self;

    fn null(what: &'static str) -> Self;
}

impl<T: Payload> Envelope for GluResult<T> {
    fn failure(message: String) -> Self {
        Self::err(message)
    }

    fn null(what: &'static str) -> Self {
        Self::fail(BridgeError::Null(what))
    }
}

impl Envelope for GluNoneResult {
    fn failure(message: String) -> Self {
        Self::err(message)
    }

    fn null(what: &'static str) -> Self {
        Self::fail(BridgeError::Null(what))
    }
}

/// Run an envelope-returning entry point, reporting a panic as an error.
pub(crate) fn guarded<E: Envelope>(entry: &'static str, body: impl FnOnce() -> E) -> E {
    catch_panic(entry, E::failure, body)
}

/// Render `text` as an owned C string for the host. NUL bytes are dropped.
pub(crate) fn into_c_string(text: impl Display) -> *mut c_char {
    let mut bytes = text.to_string().into_bytes();
    bytes.retain(|&b| b != 0);
    // No interior NULs remain, so this cannot fail.
    CString::new(bytes).unwrap_or_default().into_raw()
}

/// Free an error string from an envelope (or a [`glu_table_debug`] string).
///
/// Only the string is released; a payload is never touched.
///
/// [`glu_table_debug`]: crate::glu_table_debug
#[no_mangle]
pub extern "C" fn glu_result_error_free(error: *mut c_char) {
    if error.is_null() {
        return;
    }
    // SAFETY: the string was produced by `into_c_string` and is released once
    drop(unsafe { CString::from_raw(error) });
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
