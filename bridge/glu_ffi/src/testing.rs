//! Helpers shared by the boundary tests.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_void, CStr};

use crate::callback::GluCallback;
use crate::chunk::{glu_chunk_string_new, glu_load_chunk, GluChunkOptions};
use crate::function::{glu_free_function, glu_function_call};
use crate::multivalue::{glu_free_multivalue, glu_multivalue_len, glu_multivalue_pop, GluMultiValue};
use crate::result::{glu_result_error_free, GluNoneResult, GluResult};
use crate::session::{
    glu_session_collect_garbage, glu_session_free, glu_session_new, GluSession,
};
use crate::string::{glu_create_string, glu_string_as_bytes};
use crate::userdata::DynamicData;
use crate::value::{glu_value_free, GluValue, GluValueData, GluValueTag};

/// Owns a session for the length of a test.
pub(crate) struct TestSession(*mut GluSession);

impl TestSession {
    pub(crate) fn new() -> Self {
        let ptr = glu_session_new();
        assert!(!ptr.is_null());
        TestSession(ptr)
    }

    pub(crate) fn ptr(&self) -> *const GluSession {
        self.0
    }

    /// Run a full collection, delivering host drops for unreachable objects.
    pub(crate) fn collect(&self) {
        none_ok(glu_session_collect_garbage(self.0));
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        glu_session_free(self.0);
    }
}

/// Copy and free an envelope error string.
pub(crate) fn take_error(error: *mut c_char) -> String {
    assert!(!error.is_null(), "expected an error");
    // SAFETY: envelope errors are NUL-terminated strings from this crate
    let message = unsafe { CStr::from_ptr(error) }.to_string_lossy().into_owned();
    glu_result_error_free(error);
    message
}

#[track_caller]
pub(crate) fn ok<T>(result: GluResult<T>) -> T {
    if !result.is_ok() {
        panic!("unexpected error: {}", take_error(result.error));
    }
    result.value
}

#[track_caller]
pub(crate) fn none_ok(result: GluNoneResult) {
    if !result.is_ok() {
        panic!("unexpected error: {}", take_error(result.error));
    }
}

#[track_caller]
pub(crate) fn err<T>(result: GluResult<T>) -> String {
    take_error(result.error)
}

#[track_caller]
pub(crate) fn none_err(result: GluNoneResult) -> String {
    take_error(result.error)
}

pub(crate) fn string_value(session: &TestSession, text: &str) -> GluValue {
    let string = ok(glu_create_string(session.ptr(), text.as_ptr().cast(), text.len()));
    GluValue {
        tag: GluValueTag::String,
        data: GluValueData { string },
    }
}

/// Whole-number payload of `value`. Luau numbers are doubles, so a whole
/// number may come back tagged either integer or number.
#[track_caller]
pub(crate) fn integer(value: GluValue) -> i64 {
    match value.tag {
        // SAFETY: tag checked
        GluValueTag::Integer => unsafe { value.data.integer },
        GluValueTag::Number => {
            // SAFETY: tag checked
            let n = unsafe { value.data.number };
            assert!(n.fract().abs() < f64::EPSILON, "{n} is not whole");
            #[allow(clippy::cast_possible_truncation, reason = "checked whole above")]
            let i = n as i64;
            i
        }
        other => panic!("expected a number, got {other:?}"),
    }
}

/// Copy out the bytes of a string value and free it.
#[track_caller]
pub(crate) fn text(value: GluValue) -> String {
    assert_eq!(value.tag, GluValueTag::String);
    // SAFETY: tag checked; the string is live until freed below
    let bytes = unsafe { glu_string_as_bytes(value.data.string).as_slice() }.to_vec();
    glu_value_free(value);
    String::from_utf8(bytes).unwrap()
}

/// Load `source` as a text chunk named `name`.
pub(crate) fn load(
    session: &TestSession,
    name: &str,
    source: &str,
) -> GluResult<*mut mlua::Function> {
    glu_load_chunk(
        session.ptr(),
        GluChunkOptions {
            name: glu_chunk_string_new(name.as_ptr().cast(), name.len()),
            env: std::ptr::null(),
            mode: 0,
            compiler_opts: std::ptr::null(),
            code: glu_chunk_string_new(source.as_ptr().cast(), source.len()),
        },
    )
}

/// Load and run `source`, returning its results.
#[track_caller]
pub(crate) fn eval(session: &TestSession, source: &str) -> *mut GluMultiValue {
    let f = ok(load(session, "test", source));
    let results = ok(glu_function_call(f, std::ptr::null_mut()));
    glu_free_function(f);
    results
}

/// Run `source`, which must return exactly one value.
#[track_caller]
pub(crate) fn eval_one(session: &TestSession, source: &str) -> GluValue {
    let results = eval(session, source);
    assert_eq!(glu_multivalue_len(results), 1, "{source}");
    let value = glu_multivalue_pop(results);
    glu_free_multivalue(results);
    value
}

/// Host-side state a test registers behind a callback handle.
///
/// The handle is the address of the `Host`, so it must outlive every
/// registration made from it.
pub(crate) struct Host<T> {
    body: fn(&Host<T>, &mut T),
    pub(crate) calls: Cell<usize>,
    pub(crate) drops: Cell<usize>,
    pub(crate) seen: RefCell<Vec<i64>>,
}

impl<T> Host<T> {
    pub(crate) fn new(body: fn(&Host<T>, &mut T)) -> Self {
        Host {
            body,
            calls: Cell::new(0),
            drops: Cell::new(0),
            seen: RefCell::new(Vec::new()),
        }
    }

    fn handle(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    pub(crate) fn callback(&self) -> GluCallback {
        GluCallback {
            callback: Some(trampoline::<T>),
            drop: Some(count_drop::<T>),
            handle: self.handle(),
        }
    }

    pub(crate) fn dynamic_data(&self) -> DynamicData {
        DynamicData {
            handle: self.handle(),
            drop: Some(count_drop::<T>),
        }
    }
}

extern "C" fn trampoline<T>(payload: *mut c_void, handle: usize) {
    // SAFETY: `handle` is the address of a live `Host<T>` and `payload` the
    // record type that host was registered for
    let (host, payload) = unsafe { (&*(handle as *const Host<T>), &mut *payload.cast::<T>()) };
    host.calls.set(host.calls.get() + 1);
    (host.body)(host, payload);
}

extern "C" fn count_drop<T>(handle: usize) {
    // SAFETY: `handle` is the address of a live `Host<T>`
    let host = unsafe { &*(handle as *const Host<T>) };
    host.drops.set(host.drops.get() + 1);
}
