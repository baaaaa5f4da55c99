//! Interned string handles.

use std::ffi::c_char;

use mlua::String as LuaString;

use crate::handle::{borrow, bytes, into_handle, release};
use crate::result::{guarded, Envelope, GluStringResult};
use crate::session::GluSession;

/// Borrowed byte view. Valid while the object it was read from is alive.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct GluBytes {
    pub data: *const c_char,
    pub len: usize,
}

impl GluBytes {
    pub(crate) const EMPTY: GluBytes = GluBytes {
        data: std::ptr::null(),
        len: 0,
    };

    pub(crate) fn of(bytes: &[u8]) -> Self {
        GluBytes {
            data: bytes.as_ptr().cast(),
            len: bytes.len(),
        }
    }

    /// The viewed bytes.
    ///
    /// # Safety
    /// The object the view was taken from must still be alive.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        bytes(self.data.cast(), self.len)
    }
}

/// Intern `len` bytes at `data` in `session`.
#[no_mangle]
pub extern "C" fn glu_create_string(
    session: *const GluSession,
    data: *const c_char,
    len: usize,
) -> GluStringResult {
    guarded("glu_create_string", || {
        let Some(session) = borrow(session) else {
            return GluStringResult::null("session");
        };
        if data.is_null() && len > 0 {
            return GluStringResult::null("string data");
        }
        let result = session.lua().create_string(bytes(data.cast(), len));
        GluStringResult::from_result(result.map(into_handle))
    })
}

#[no_mangle]
pub extern "C" fn glu_string_as_bytes(string: *const LuaString) -> GluBytes {
    borrow(string).map_or(GluBytes::EMPTY, |s| GluBytes::of(&s.as_bytes()))
}

/// Like [`glu_string_as_bytes`] but `len` includes the trailing NUL.
#[no_mangle]
pub extern "C" fn glu_string_as_bytes_with_nul(string: *const LuaString) -> GluBytes {
    borrow(string).map_or(GluBytes::EMPTY, |s| GluBytes::of(&s.as_bytes_with_nul()))
}

/// Identity of the interned string, for comparison and debugging only.
#[no_mangle]
pub extern "C" fn glu_string_to_pointer(string: *const LuaString) -> usize {
    borrow(string).map_or(0, |s| s.to_pointer() as usize)
}

#[no_mangle]
pub extern "C" fn glu_free_string(string: *mut LuaString) {
    release(string);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
