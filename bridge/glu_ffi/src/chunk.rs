//! Chunk loading.

use std::borrow::Cow;
use std::ffi::c_char;

use mlua::{ChunkMode, Table};

use crate::handle::{borrow, bytes, into_handle, release, take};
use crate::result::{guarded, Envelope, GluChunkStringResult, GluFunctionResult};
use crate::session::{GluCompilerOptions, GluSession};
use crate::string::GluBytes;

/// Owned byte string used for chunk names, sources and compiled chunks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GluChunkString {
    pub(crate) data: Vec<u8>,
}

/// Everything needed to load a chunk.
///
/// `name` and `code` are consumed by [`glu_load_chunk`]; `env` and
/// `compiler_opts` are borrowed. Null `name` uses `"chunk"`, null `env` the
/// session globals, null `compiler_opts` the session options. `mode` is
/// `0` for text and `1` for binary; other values read as text.
#[repr(C)]
#[derive(Debug)]
pub struct GluChunkOptions {
    pub name: *mut GluChunkString,
    pub env: *const Table,
    pub mode: u8,
    pub compiler_opts: *const GluCompilerOptions,
    pub code: *mut GluChunkString,
}

/// Copy `len` bytes at `data` into a new chunk string. Null only when
/// `data` is null and `len` is not zero.
#[no_mangle]
pub extern "C" fn glu_chunk_string_new(data: *const c_char, len: usize) -> *mut GluChunkString {
    if data.is_null() && len > 0 {
        return std::ptr::null_mut();
    }
    into_handle(GluChunkString {
        data: bytes(data.cast(), len).to_vec(),
    })
}

#[no_mangle]
pub extern "C" fn glu_chunk_string_as_bytes(string: *const GluChunkString) -> GluBytes {
    borrow(string).map_or(GluBytes::EMPTY, |s| GluBytes::of(&s.data))
}

#[no_mangle]
pub extern "C" fn glu_free_chunk_string(string: *mut GluChunkString) {
    release(string);
}

/// Name used when a chunk is loaded without one.
const DEFAULT_CHUNK_NAME: &str = "chunk";

/// Compile a chunk into a function without running it.
#[no_mangle]
pub extern "C" fn glu_load_chunk(
    session: *const GluSession,
    opts: GluChunkOptions,
) -> GluFunctionResult {
    guarded("glu_load_chunk", || {
        let name = take(opts.name);
        let code = take(opts.code);
        let Some(session) = borrow(session) else {
            return GluFunctionResult::null("session");
        };
        let Some(code) = code else {
            return GluFunctionResult::err("chunk code is null");
        };
        let mut chunk = session
            .lua()
            .load(code.data)
            .set_name(chunk_name(name.as_ref()))
            .set_mode(chunk_mode(opts.mode));
        if let Some(env) = borrow(opts.env) {
            chunk = chunk.set_environment(env.clone());
        }
        if let Some(compiler_opts) = borrow(opts.compiler_opts) {
            chunk = chunk.set_compiler(compiler_opts.compiler());
        }
        GluFunctionResult::from_result(chunk.into_function().map(into_handle))
    })
}

/// Compile `code` into bytecode for loading with mode `1`.
///
/// Both arguments are borrowed. Null `opts` uses the default options.
#[no_mangle]
pub extern "C" fn glu_chunk_compile(
    code: *const GluChunkString,
    opts: *const GluCompilerOptions,
) -> GluChunkStringResult {
    guarded("glu_chunk_compile", || {
        let Some(code) = borrow(code) else {
            return GluChunkStringResult::err("chunk code is null");
        };
        let compiler = borrow(opts).copied().unwrap_or_default().compiler();
        let result = compiler.compile(&code.data);
        GluChunkStringResult::from_result(result.map(|data| into_handle(GluChunkString { data })))
    })
}

fn chunk_mode(mode: u8) -> ChunkMode {
    match mode {
        1 => ChunkMode::Binary,
        _ => ChunkMode::Text,
    }
}

/// The name the interpreter reports in messages. Names starting with `@`
/// or `=` are passed through; anything else gets a `=` so it is shown as
/// given.
fn chunk_name(name: Option<&GluChunkString>) -> String {
    let name = name.map_or(Cow::Borrowed(DEFAULT_CHUNK_NAME), |n| String::from_utf8_lossy(&n.data));
    if name.starts_with('@') || name.starts_with('=') {
        name.into_owned()
    } else {
        format!("={name}")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
