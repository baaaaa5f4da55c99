//! Boxed handles handed to the host.
//!
//! A handle is `Box::into_raw` of a native object. Creating one gives the
//! host ownership; [`release`] or [`take`] gives it back exactly once.

/// Move `value` behind a new handle owned by the host.
pub(crate) fn into_handle<T>(value: T) -> *mut T {
    Box::into_raw(Box::new(value))
}

/// Borrow the object behind a handle without taking ownership.
pub(crate) fn borrow<'a, T>(ptr: *const T) -> Option<&'a T> {
    // SAFETY: a non-null handle came from `into_handle` and has not been
    // released; the host does not use it concurrently.
    unsafe { ptr.as_ref() }
}

/// Reclaim ownership of the object behind a handle.
pub(crate) fn take<T>(ptr: *mut T) -> Option<T> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the host hands the handle back exactly once
    Some(*unsafe { Box::from_raw(ptr) })
}

/// Drop the object behind a handle. Null is ignored.
pub(crate) fn release<T>(ptr: *mut T) {
    drop(take(ptr));
}

/// View `len` bytes at `data`. Null or empty input yields an empty slice.
pub(crate) fn bytes<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: the host guarantees `data` is readable for `len` bytes for the
    // duration of the call
    unsafe { std::slice::from_raw_parts(data, len) }
}
