//! C-ABI boundary over an embedded Luau interpreter (`libglu_ffi`).
//!
//! This crate is the only place where host pointers and interpreter
//! objects meet. Everything behind it is [`mlua`] with its vendored Luau
//! build; everything in front of it is a `#[no_mangle] extern "C"` function
//! declared in `include/glu_ffi.h`.
//!
//! # Build Modes
//!
//! - **rlib**: for Rust consumers and the tests in this crate
//! - **staticlib** / **cdylib**: for linking into the host
//!
//! # Function Categories
//!
//! - **Session**: `glu_session_new`, `glu_session_set_memory_limit`,
//!   `glu_session_collect_garbage`, `glu_session_free`
//! - **Values**: `glu_value_clone`, `glu_value_free`, `glu_value_type_name`
//! - **Strings / Errors**: `glu_create_string`, `glu_error_new`, ...
//! - **Tables**: `glu_create_table`, `glu_table_get`, `glu_table_foreach`, ...
//! - **Functions**: `glu_create_function`, `glu_function_call`
//! - **User data / Buffers**: `glu_create_userdata`, `glu_create_buffer`, ...
//! - **MultiValue**: `glu_create_multivalue_with_capacity`, `glu_multivalue_push`, ...
//! - **Chunks**: `glu_chunk_string_new`, `glu_load_chunk`, `glu_chunk_compile`
//!
//! # Ownership
//!
//! Every handle returned to the host is a `Box` the host owns and must hand
//! back to exactly one matching `glu_free_*` call. A [`GluValue`] holding a
//! heap-backed variant owns one such box; passing it to a sink (`set`,
//! `push`, ...) transfers that ownership, and [`glu_value_clone`] makes an
//! independent copy. Error strings inside envelopes are released with
//! [`glu_result_error_free`] only.
//!
//! Host drop callbacks for user data and functions run once the interpreter
//! has collected the object, and never from inside the collector: they are
//! queued and run before the entry point that triggered collection returns
//! (see [`deferred`]).
//!
//! # Safety
//!
//! Entry points are not marked `unsafe` because they are C entry points,
//! not Rust API functions. They check for null before dereferencing and
//! otherwise trust the host to pass pointers obtained from this library
//! that have not been freed. A session and everything allocated from it
//! must stay on one thread.

#![warn(clippy::allow_attributes_without_reason)]
#![allow(
    unsafe_code,
    reason = "C-ABI entry points require unsafe for raw pointer operations"
)]
#![allow(
    clippy::not_unsafe_ptr_arg_deref,
    reason = "entry points receive host pointers that the header contract declares valid"
)]

mod buffer;
mod callback;
mod chunk;
mod deferred;
mod error;
mod function;
mod handle;
mod multivalue;
mod result;
mod session;
mod string;
mod table;
mod userdata;
mod value;

#[cfg(test)]
mod testing;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

pub use buffer::{
    glu_buffer_len, glu_buffer_read, glu_buffer_write, glu_create_buffer, glu_free_buffer,
};
pub use callback::{GluCallback, GluCallbackFn, GluDropFn};
pub use chunk::{
    glu_chunk_compile, glu_chunk_string_as_bytes, glu_chunk_string_new, glu_free_chunk_string,
    glu_load_chunk, GluChunkOptions, GluChunkString,
};
pub use error::{
    glu_error_get_string, glu_error_new, glu_free_error, BridgeError, ErrorCategory, ErrorValue,
};
pub use function::{glu_create_function, glu_free_function, glu_function_call, FunctionCallbackData};
pub use multivalue::{
    glu_create_multivalue_with_capacity, glu_free_multivalue, glu_multivalue_len,
    glu_multivalue_pop, glu_multivalue_push, GluMultiValue,
};
pub use result::{
    glu_result_error_free, GluBoolResult, GluBufferResult, GluChunkStringResult,
    GluFunctionResult, GluI64Result, GluMultiValueResult, GluNoneResult, GluResult,
    GluStringResult, GluTableResult, GluUserDataResult, GluUsizeResult, GluValueResult, Payload,
};
pub use session::{
    glu_session_collect_garbage, glu_session_free, glu_session_globals, glu_session_memory_usage, glu_session_new,
    glu_session_set_compiler_options, glu_session_set_memory_limit, GluCompilerOptions,
    GluSession,
};
pub use string::{
    glu_create_string, glu_free_string, glu_string_as_bytes, glu_string_as_bytes_with_nul,
    glu_string_to_pointer, GluBytes,
};
pub use table::{
    glu_create_table, glu_create_table_with_capacity, glu_free_table, glu_table_clear,
    glu_table_contains_key, glu_table_debug, glu_table_equals, glu_table_foreach,
    glu_table_foreach_value, glu_table_get, glu_table_is_empty, glu_table_is_readonly,
    glu_table_len, glu_table_metatable, glu_table_pop, glu_table_push,
    glu_table_raw_get, glu_table_raw_insert, glu_table_raw_len, glu_table_raw_pop,
    glu_table_raw_push, glu_table_raw_remove, glu_table_raw_set, glu_table_set,
    glu_table_set_metatable, glu_table_set_readonly, glu_table_set_safeenv,
    glu_table_to_pointer, TableForEachCallbackData, TableForEachValueCallbackData,
};
pub use userdata::{
    glu_create_userdata, glu_free_userdata, glu_userdata_handle, glu_userdata_metatable,
    DynamicData,
};
pub use value::{
    glu_value_clone, glu_value_free, glu_value_type_name, GluValue, GluValueData, GluValueTag,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=glu_ffi=debug` (or
/// `trace` for callback registrations and host drops).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Host entry point for [`init_tracing`].
#[no_mangle]
pub extern "C" fn glu_init_tracing() {
    init_tracing();
}

// ── Panic containment ───────────────────────────────────────────────────

/// Run `body`, turning a panic into `on_panic(message)`.
///
/// Unwinding out of an `extern "C"` function aborts the host, so every
/// entry point that runs interpreter code goes through here. Host drops
/// queued while `body` ran are delivered before returning.
pub(crate) fn catch_panic<R>(
    entry: &'static str,
    on_panic: impl FnOnce(String) -> R,
    body: impl FnOnce() -> R,
) -> R {
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    deferred::run_pending();
    match outcome {
        Ok(value) => value,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(entry, %message, "panic caught at boundary");
            on_panic(format!("internal error in {entry}: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
