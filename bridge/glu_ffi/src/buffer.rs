//! Fixed-size byte buffers.

use mlua::Buffer;

use crate::error::BridgeError;
use crate::handle::{borrow, bytes, into_handle, release};
use crate::result::{guarded, Envelope, GluBufferResult, GluNoneResult};
use crate::session::GluSession;

/// `offset..offset + len` as a range inside `buffer`.
fn window(buffer: &Buffer, offset: usize, len: usize) -> Result<std::ops::Range<usize>, BridgeError> {
    match offset.checked_add(len) {
        Some(end) if end <= buffer.len() => Ok(offset..end),
        _ => Err(BridgeError::RangeOutOfBounds {
            start: offset,
            end: offset.saturating_add(len),
            len: buffer.len(),
        }),
    }
}

/// Create a zero-filled buffer of `len` bytes.
#[no_mangle]
pub extern "C" fn glu_create_buffer(session: *const GluSession, len: usize) -> GluBufferResult {
    guarded("glu_create_buffer", || {
        let Some(session) = borrow(session) else {
            return GluBufferResult::null("session");
        };
        let result = session.lua().create_buffer(vec![0u8; len]);
        GluBufferResult::from_result(result.map(into_handle))
    })
}

#[no_mangle]
pub extern "C" fn glu_buffer_len(buffer: *const Buffer) -> usize {
    borrow(buffer).map_or(0, Buffer::len)
}

/// Copy `len` bytes starting at `offset` into `out`.
#[no_mangle]
pub extern "C" fn glu_buffer_read(
    buffer: *const Buffer,
    offset: usize,
    out: *mut u8,
    len: usize,
) -> GluNoneResult {
    guarded("glu_buffer_read", || {
        let Some(buffer) = borrow(buffer) else {
            return GluNoneResult::null("buffer");
        };
        let range = match window(buffer, offset, len) {
            Ok(range) => range,
            Err(e) => return GluNoneResult::fail(e),
        };
        if range.is_empty() {
            return GluNoneResult::ok();
        }
        if out.is_null() {
            return GluNoneResult::null("output");
        }
        // SAFETY: the host guarantees `out` is writable for `len` bytes
        let out = unsafe { std::slice::from_raw_parts_mut(out, len) };
        out.copy_from_slice(&buffer.to_vec()[range]);
        GluNoneResult::ok()
    })
}

/// Overwrite `len` bytes starting at `offset` with `data`.
#[no_mangle]
pub extern "C" fn glu_buffer_write(
    buffer: *const Buffer,
    offset: usize,
    data: *const u8,
    len: usize,
) -> GluNoneResult {
    guarded("glu_buffer_write", || {
        let Some(buffer) = borrow(buffer) else {
            return GluNoneResult::null("buffer");
        };
        if data.is_null() && len > 0 {
            return GluNoneResult::null("data");
        }
        match window(buffer, offset, len) {
            Ok(range) if range.is_empty() => GluNoneResult::ok(),
            Ok(_) => {
                buffer.write_bytes(offset, bytes(data, len));
                GluNoneResult::ok()
            }
            Err(e) => GluNoneResult::fail(e),
        }
    })
}

#[no_mangle]
pub extern "C" fn glu_free_buffer(buffer: *mut Buffer) {
    release(buffer);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
