use std::ffi::c_char;

use pretty_assertions::assert_eq;

use super::*;
use crate::callback::GluCallback;
use crate::error::{glu_error_get_string, glu_error_new};
use crate::multivalue::{
    glu_create_multivalue_with_capacity, glu_free_multivalue, glu_multivalue_len,
    glu_multivalue_pop, glu_multivalue_push,
};
use crate::session::{glu_session_free, glu_session_new, glu_session_set_memory_limit};
use crate::string::glu_create_string;
use crate::testing::{err, eval, integer, none_ok, ok, text, Host, TestSession};
use crate::userdata::glu_create_userdata;
use crate::value::{glu_value_free, GluValue, GluValueData, GluValueTag};

fn sum_args(_: &Host<FunctionCallbackData>, data: &mut FunctionCallbackData) {
    let mut total = 0;
    while glu_multivalue_len(data.args) > 0 {
        total += integer(glu_multivalue_pop(data.args));
    }
    glu_free_multivalue(data.args);
    let out = glu_create_multivalue_with_capacity(1);
    glu_multivalue_push(out, GluValue::integer(total));
    data.values = out;
}

fn fail(_: &Host<FunctionCallbackData>, data: &mut FunctionCallbackData) {
    glu_free_multivalue(data.args);
    let message = "host says no";
    data.error = glu_error_new(message.as_ptr().cast::<c_char>(), message.len());
}

fn args(values: &[i64]) -> *mut GluMultiValue {
    let mv = glu_create_multivalue_with_capacity(values.len());
    for &v in values {
        glu_multivalue_push(mv, GluValue::integer(v));
    }
    mv
}

/// Message of the single error value in `results`, which is freed.
fn raised(results: *mut GluMultiValue) -> String {
    assert_eq!(glu_multivalue_len(results), 1);
    let value = glu_multivalue_pop(results);
    glu_free_multivalue(results);
    assert_eq!(value.tag, GluValueTag::Error);
    // SAFETY: tag checked; the view is copied before the value is freed
    let message = unsafe { glu_error_get_string(value.data.error).as_slice() }.to_vec();
    glu_value_free(value);
    String::from_utf8(message).unwrap()
}

#[test]
fn host_callback_receives_args_and_returns_values() {
    let host = Host::new(sum_args);
    let session = TestSession::new();
    let f = ok(glu_create_function(session.ptr(), host.callback()));
    let results = ok(glu_function_call(f, args(&[2, 3, 4])));
    assert_eq!(glu_multivalue_len(results), 1);
    assert_eq!(integer(glu_multivalue_pop(results)), 9);
    glu_free_multivalue(results);
    assert_eq!(host.calls.get(), 1);

    glu_free_function(f);
    assert_eq!(host.drops.get(), 0);
    session.collect();
    assert_eq!(host.drops.get(), 1);
}

#[test]
fn callback_without_values_returns_nothing() {
    let host = Host::<FunctionCallbackData>::new(|_, data| glu_free_multivalue(data.args));
    let session = TestSession::new();
    let f = ok(glu_create_function(session.ptr(), host.callback()));
    let results = ok(glu_function_call(f, std::ptr::null_mut()));
    assert_eq!(glu_multivalue_len(results), 0);
    glu_free_multivalue(results);
    glu_free_function(f);
}

#[test]
fn registration_without_callback_releases_the_arguments() {
    let held = Host::<()>::new(|_, _| {});
    let session = TestSession::new();
    let silent = GluCallback {
        callback: None,
        drop: None,
        handle: 0,
    };
    let f = ok(glu_create_function(session.ptr(), silent));
    let userdata = ok(glu_create_userdata(
        session.ptr(),
        held.dynamic_data(),
        std::ptr::null(),
    ));
    let mv = glu_create_multivalue_with_capacity(1);
    glu_multivalue_push(
        mv,
        GluValue {
            tag: GluValueTag::UserData,
            data: GluValueData { userdata },
        },
    );
    let results = ok(glu_function_call(f, mv));
    assert_eq!(glu_multivalue_len(results), 0);
    glu_free_multivalue(results);
    glu_free_function(f);

    session.collect();
    assert_eq!(held.drops.get(), 1);
}

#[test]
fn callback_error_comes_back_as_error_value() {
    let host = Host::new(fail);
    let session = TestSession::new();
    let f = ok(glu_create_function(session.ptr(), host.callback()));
    let results = ok(glu_function_call(f, args(&[1])));
    assert_eq!(raised(results), "host says no");
    glu_free_function(f);
}

#[test]
fn script_errors_come_back_as_error_values() {
    let session = TestSession::new();
    let results = eval(&session, "error('plain', 0)");
    assert_eq!(raised(results), "plain");

    let results = eval(&session, "local function f() return f() + 1 end return f()");
    let message = raised(results);
    assert!(message.contains("stack overflow"), "{message}");
}

#[test]
fn callback_may_reenter_the_session() {
    fn greet(_: &Host<FunctionCallbackData>, data: &mut FunctionCallbackData) {
        glu_free_multivalue(data.args);
        let text = "hi";
        let string = ok(glu_create_string(data.session, text.as_ptr().cast(), text.len()));
        let out = glu_create_multivalue_with_capacity(1);
        glu_multivalue_push(
            out,
            GluValue {
                tag: GluValueTag::String,
                data: GluValueData { string },
            },
        );
        data.values = out;
    }

    let host = Host::new(greet);
    let session = TestSession::new();
    let f = ok(glu_create_function(session.ptr(), host.callback()));
    let results = ok(glu_function_call(f, std::ptr::null_mut()));
    assert_eq!(text(glu_multivalue_pop(results)), "hi");
    glu_free_multivalue(results);
    glu_free_function(f);
}

#[test]
fn nested_calls_reenter_the_interpreter() {
    fn countdown(_: &Host<FunctionCallbackData>, data: &mut FunctionCallbackData) {
        // Arguments arrive as (self, n); results are (depth).
        let n = integer(glu_multivalue_pop(data.args));
        let me = glu_multivalue_pop(data.args);
        glu_free_multivalue(data.args);
        let out = if n == 0 {
            glu_value_free(me);
            args(&[0])
        } else {
            // SAFETY: the test always passes the function first
            let function = unsafe { me.data.function };
            let again = glu_create_multivalue_with_capacity(2);
            glu_multivalue_push(again, crate::glu_value_clone(me));
            glu_multivalue_push(again, GluValue::integer(n - 1));
            let inner = ok(glu_function_call(function, again));
            let depth = integer(glu_multivalue_pop(inner));
            glu_free_multivalue(inner);
            glu_value_free(me);
            args(&[depth + 1])
        };
        data.values = out;
    }

    let host = Host::new(countdown);
    let session = TestSession::new();
    let f = ok(glu_create_function(session.ptr(), host.callback()));
    let first = glu_create_multivalue_with_capacity(2);
    glu_multivalue_push(
        first,
        crate::glu_value_clone(GluValue {
            tag: GluValueTag::Function,
            data: GluValueData { function: f },
        }),
    );
    glu_multivalue_push(first, GluValue::integer(8));
    let results = ok(glu_function_call(f, first));
    assert_eq!(integer(glu_multivalue_pop(results)), 8);
    glu_free_multivalue(results);
    assert_eq!(host.calls.get(), 9);
    glu_free_function(f);
}

#[test]
fn null_session_drops_the_registration() {
    let host = Host::new(sum_args);
    let message = err(glu_create_function(std::ptr::null(), host.callback()));
    assert_eq!(message, "session pointer is null");
    assert_eq!(host.drops.get(), 1);
    assert_eq!(host.calls.get(), 0);
}

#[test]
fn exhausted_ceiling_drops_the_registration() {
    let host = Host::new(sum_args);
    let session = TestSession::new();
    none_ok(glu_session_set_memory_limit(session.ptr(), 1));
    let message = err(glu_create_function(session.ptr(), host.callback()));
    assert!(message.contains("not enough memory"), "{message}");
    assert_eq!(host.drops.get(), 1);
}

#[test]
fn null_function_is_an_envelope_error() {
    let message = err(glu_function_call(std::ptr::null(), args(&[1, 2])));
    assert_eq!(message, "function pointer is null");
}

#[test]
fn handles_outlive_their_session() {
    let session = glu_session_new();
    let host = Host::new(sum_args);
    let f = ok(glu_create_function(session, host.callback()));
    glu_session_free(session);
    assert_eq!(host.drops.get(), 1);

    let message = err(glu_function_call(f, args(&[1])));
    assert!(message.starts_with("internal error in glu_function_call"), "{message}");
    assert_eq!(host.calls.get(), 0);
    glu_free_function(f);
    assert_eq!(host.drops.get(), 1);
}
