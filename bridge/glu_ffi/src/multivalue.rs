//! MultiValue stack handles.
//!
//! A [`GluMultiValue`] crosses the boundary whole: whoever receives the
//! pointer owns it and frees it, along with every value still inside.

use mlua::MultiValue;

use crate::handle::{into_handle, release};
use crate::value::GluValue;

/// Owned list of call arguments or results.
#[derive(Debug, Default)]
pub struct GluMultiValue {
    pub(crate) values: MultiValue,
}

impl GluMultiValue {
    pub(crate) fn into_handle(values: MultiValue) -> *mut GluMultiValue {
        into_handle(GluMultiValue { values })
    }

    /// Reclaim a list handed over by the host. Null is an empty list.
    pub(crate) fn take(ptr: *mut GluMultiValue) -> MultiValue {
        crate::handle::take(ptr).map_or_else(MultiValue::new, |mv| mv.values)
    }
}

fn borrow_mut<'a>(ptr: *mut GluMultiValue) -> Option<&'a mut GluMultiValue> {
    // SAFETY: a non-null list pointer is live and used from one thread
    unsafe { ptr.as_mut() }
}

/// Create an empty list. `capacity` is a hint, not a limit.
#[no_mangle]
pub extern "C" fn glu_create_multivalue_with_capacity(capacity: usize) -> *mut GluMultiValue {
    GluMultiValue::into_handle(MultiValue::with_capacity(capacity))
}

/// Append `value`, taking ownership of it. Pushing to null frees `value`.
#[no_mangle]
pub extern "C" fn glu_multivalue_push(mv: *mut GluMultiValue, value: GluValue) {
    let value = value.into_value();
    if let Some(mv) = borrow_mut(mv) {
        mv.values.push_back(value);
    }
}

#[no_mangle]
pub extern "C" fn glu_multivalue_len(mv: *mut GluMultiValue) -> usize {
    borrow_mut(mv).map_or(0, |mv| mv.values.len())
}

/// Remove and return the last value; nil when empty. The caller owns it.
#[no_mangle]
pub extern "C" fn glu_multivalue_pop(mv: *mut GluMultiValue) -> GluValue {
    borrow_mut(mv)
        .and_then(|mv| mv.values.pop_back())
        .map_or(GluValue::NIL, GluValue::from_value)
}

/// Free the list and every value still in it.
#[no_mangle]
pub extern "C" fn glu_free_multivalue(mv: *mut GluMultiValue) {
    release(mv);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
