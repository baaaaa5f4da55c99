//! User data wrapping host objects.
//!
//! Every host object shares one native type whose metamethods forward to
//! the metatable given at creation. A handler there may be a function, or
//! for `__index` and `__newindex` a table, as with ordinary metatables.

use mlua::{AnyUserData, Lua, MultiValue, Table, UserData, UserDataMethods, Value};

use crate::callback::{GluDropFn, HostRelease};
use crate::deferred::defer;
use crate::error::BridgeError;
use crate::handle::{borrow, into_handle, release};
use crate::result::{guarded, Envelope, GluUserDataResult, GluUsizeResult};
use crate::session::GluSession;

/// A host object handle plus the callback that releases it.
///
/// Native code owns the record once it is passed in and calls `drop`
/// exactly once, after the user data has been collected.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct DynamicData {
    pub handle: usize,
    pub drop: Option<GluDropFn>,
}

/// Metamethods forwarded to the per-object metatable.
const FORWARDED: &[&str] = &[
    "__index",
    "__newindex",
    "__call",
    "__tostring",
    "__len",
    "__eq",
    "__lt",
    "__le",
    "__concat",
    "__unm",
    "__add",
    "__sub",
    "__mul",
    "__div",
    "__idiv",
    "__mod",
    "__pow",
];

pub(crate) struct HostObject {
    handle: usize,
    metatable: Option<Table>,
    release: Option<HostRelease>,
}

impl Drop for HostObject {
    fn drop(&mut self) {
        // Runs inside the collector; the host hears about it afterwards.
        defer(Box::new((self.release.take(), self.metatable.take())));
    }
}

impl UserData for HostObject {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        for &event in FORWARDED {
            methods.add_meta_function(event, move |lua, args: MultiValue| {
                forward(lua, event, args)
            });
        }
    }
}

fn attached_metatable(value: &Value) -> Option<Table> {
    let Value::UserData(ud) = value else {
        return None;
    };
    ud.borrow::<HostObject>().ok()?.metatable.clone()
}

/// The handler for `event` from the first operand that has one.
fn handler(event: &str, args: &MultiValue) -> mlua::Result<Value> {
    for operand in args.iter().take(2) {
        if let Some(metatable) = attached_metatable(operand) {
            let handler: Value = metatable.raw_get(event)?;
            if !handler.is_nil() {
                return Ok(handler);
            }
        }
    }
    Ok(Value::Nil)
}

fn nth(args: &MultiValue, i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Nil)
}

fn forward(lua: &Lua, event: &'static str, args: MultiValue) -> mlua::Result<MultiValue> {
    match (handler(event, &args)?, event) {
        (Value::Function(f), _) => f.call(args),
        (Value::Table(t), "__index") => {
            Ok(MultiValue::from_vec(vec![t.get::<Value>(nth(&args, 1))?]))
        }
        (Value::Table(t), "__newindex") => {
            t.set(nth(&args, 1), nth(&args, 2))?;
            Ok(MultiValue::new())
        }
        (Value::Nil, "__tostring") => {
            let text = format!("userdata: {:p}", nth(&args, 0).to_pointer());
            Ok(MultiValue::from_vec(vec![Value::String(lua.create_string(text)?)]))
        }
        (Value::Nil, "__eq") => Ok(MultiValue::from_vec(vec![Value::Boolean(false)])),
        (other, _) => Err(mlua::Error::runtime(format!(
            "user data has no usable {event} handler (found {})",
            other.type_name()
        ))),
    }
}

/// Wrap `data` as user data with an optional metatable (null for none).
///
/// The metatable is shared, not copied. On failure `data.drop` has already
/// run.
#[no_mangle]
pub extern "C" fn glu_create_userdata(
    session: *const GluSession,
    data: DynamicData,
    metatable: *const Table,
) -> GluUserDataResult {
    guarded("glu_create_userdata", || {
        let release = HostRelease::new(data.drop, data.handle);
        let Some(session) = borrow(session) else {
            return GluUserDataResult::null("session");
        };
        let object = HostObject {
            handle: data.handle,
            metatable: borrow(metatable).cloned(),
            release: Some(release),
        };
        let result = session.lua().create_userdata(object);
        GluUserDataResult::from_result(result.map(into_handle))
    })
}

/// The host handle stored in `userdata`.
#[no_mangle]
pub extern "C" fn glu_userdata_handle(userdata: *const AnyUserData) -> GluUsizeResult {
    guarded("glu_userdata_handle", || {
        let Some(userdata) = borrow(userdata) else {
            return GluUsizeResult::null("user data");
        };
        match userdata.borrow::<HostObject>() {
            Ok(object) => GluUsizeResult::ok(object.handle),
            Err(_) => GluUsizeResult::fail(BridgeError::ForeignUserData),
        }
    })
}

/// A new reference to the metatable given at creation, or null.
#[no_mangle]
pub extern "C" fn glu_userdata_metatable(userdata: *const AnyUserData) -> *mut Table {
    borrow(userdata)
        .and_then(|ud| ud.borrow::<HostObject>().ok()?.metatable.clone())
        .map_or(std::ptr::null_mut(), into_handle)
}

#[no_mangle]
pub extern "C" fn glu_free_userdata(userdata: *mut AnyUserData) {
    release(userdata);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
