//! Functions backed by host callbacks, and calling any function.

use mlua::{Function, Lua, MultiValue, Value};

use crate::callback::{CallbackGuard, GluCallback};
use crate::error::{describe, lua_category, ErrorCategory, ErrorValue};
use crate::handle::{borrow, into_handle, release, take};
use crate::multivalue::GluMultiValue;
use crate::result::{guarded, Envelope, GluFunctionResult, GluMultiValueResult};
use crate::session::GluSession;

/// Payload a function callback receives.
///
/// `session` is a view of the calling session, valid for the duration of
/// the callback; it may be used to create values and must not be freed.
/// `args` belongs to the host, which frees it or hands it back through
/// `values`. Setting `values` (results) or `error` (raise a runtime error)
/// passes ownership to native code; when both are set `error` wins and
/// `values` is freed.
#[repr(C)]
#[derive(Debug)]
pub struct FunctionCallbackData {
    pub session: *const GluSession,
    pub args: *mut GluMultiValue,
    pub values: *mut GluMultiValue,
    pub error: *mut ErrorValue,
}

/// Wrap a host callback as a function.
///
/// The registration's drop callback runs once, after the function has been
/// collected (or the session freed); if creation fails it has already run
/// on return.
#[no_mangle]
pub extern "C" fn glu_create_function(
    session: *const GluSession,
    callback: GluCallback,
) -> GluFunctionResult {
    guarded("glu_create_function", move || {
        let guard = CallbackGuard::<FunctionCallbackData>::new(callback);
        let Some(session) = borrow(session) else {
            return GluFunctionResult::null("session");
        };
        let baseline = session.baseline();
        let result = session
            .lua()
            .create_function(move |lua, args: MultiValue| call_host(&guard, lua, baseline, args));
        GluFunctionResult::from_result(result.map(into_handle))
    })
}

fn call_host(
    guard: &CallbackGuard<FunctionCallbackData>,
    lua: &Lua,
    baseline: usize,
    args: MultiValue,
) -> mlua::Result<MultiValue> {
    let view = GluSession::view(lua, baseline);
    let mut data = FunctionCallbackData {
        session: &view,
        args: GluMultiValue::into_handle(args),
        values: std::ptr::null_mut(),
        error: std::ptr::null_mut(),
    };
    if !guard.invoke(&mut data) {
        drop(GluMultiValue::take(data.args));
    }
    let values = GluMultiValue::take(data.values);
    match take(data.error) {
        Some(error) => Err(ErrorValue::into_lua(error)),
        None => Ok(values),
    }
}

/// Call `function` with `args`, consuming `args` (null means no arguments).
///
/// Failures of the call machinery (null function, memory ceiling) are
/// envelope errors. An error raised by the called code, including stack
/// overflow, is a successful result holding a single `error` value.
#[no_mangle]
pub extern "C" fn glu_function_call(
    function: *const Function,
    args: *mut GluMultiValue,
) -> GluMultiValueResult {
    guarded("glu_function_call", || {
        let args = GluMultiValue::take(args);
        let Some(function) = borrow(function) else {
            return GluMultiValueResult::null("function");
        };
        match function.call::<MultiValue>(args) {
            Ok(results) => GluMultiValueResult::ok(GluMultiValue::into_handle(results)),
            Err(err) if lua_category(&err) == ErrorCategory::ResourceExhaustion => {
                GluMultiValueResult::fail(err)
            }
            Err(err) => {
                tracing::debug!(error = %describe(&err), "call raised an error");
                let results = MultiValue::from_vec(vec![Value::Error(Box::new(err))]);
                GluMultiValueResult::ok(GluMultiValue::into_handle(results))
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn glu_free_function(function: *mut Function) {
    release(function);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
mod tests;
