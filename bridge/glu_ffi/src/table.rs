//! Table handles.
//!
//! Values passed into a table operation are consumed, including when the
//! operation fails or the table pointer is null. Values returned (from
//! `get`, `pop`, ...) are new references the caller frees. Every mutator
//! fails with `attempt to modify a readonly table` on a readonly table and
//! leaves it unchanged.

use std::ffi::c_char;
use std::fmt::Write as _;

use mlua::{Table, Value};

use crate::callback::{CallbackGuard, GluCallback};
use crate::catch_panic;
use crate::error::{describe, BridgeError};
use crate::handle::{borrow, into_handle, release};
use crate::result::{
    guarded, into_c_string, Envelope, GluBoolResult, GluI64Result, GluNoneResult,
    GluTableResult, GluValueResult,
};
use crate::session::GluSession;
use crate::value::GluValue;

/// Payload of a [`glu_table_foreach`] callback.
///
/// `key` and `value` are borrowed for the duration of the callback; clone
/// them to keep them. Set `stop` to end the iteration.
#[repr(C)]
#[derive(Debug)]
pub struct TableForEachCallbackData {
    pub key: GluValue,
    pub value: GluValue,
    pub stop: bool,
}

/// Payload of a [`glu_table_foreach_value`] callback.
#[repr(C)]
#[derive(Debug)]
pub struct TableForEachValueCallbackData {
    pub value: GluValue,
    pub stop: bool,
}

fn table_call<E: Envelope>(
    entry: &'static str,
    table: *const Table,
    body: impl FnOnce(&Table) -> E,
) -> E {
    guarded(entry, || match borrow(table) {
        Some(table) => body(table),
        None => E::null("table"),
    })
}

/// `table`, if it may be modified.
fn writable(table: &Table) -> Result<&Table, BridgeError> {
    if table.is_readonly() {
        return Err(BridgeError::ReadOnly);
    }
    Ok(table)
}

fn length(table: &Table) -> i64 {
    i64::try_from(table.raw_len()).unwrap_or(i64::MAX)
}

// ── Construction ────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn glu_create_table(session: *const GluSession) -> GluTableResult {
    glu_create_table_with_capacity(session, 0, 0)
}

/// Create a table preallocated for `narr` sequence and `nrec` other
/// entries. The preallocation counts against the memory ceiling.
#[no_mangle]
pub extern "C" fn glu_create_table_with_capacity(
    session: *const GluSession,
    narr: usize,
    nrec: usize,
) -> GluTableResult {
    guarded("glu_create_table", || {
        let Some(session) = borrow(session) else {
            return GluTableResult::null("session");
        };
        let result = session.lua().create_table_with_capacity(narr, nrec);
        GluTableResult::from_result(result.map(into_handle))
    })
}

#[no_mangle]
pub extern "C" fn glu_free_table(table: *mut Table) {
    release(table);
}

// ── Reads ───────────────────────────────────────────────────────────────

/// Read `key`, following `__index`. A missing key yields nil.
#[no_mangle]
pub extern "C" fn glu_table_get(table: *const Table, key: GluValue) -> GluValueResult {
    let key = key.into_value();
    table_call("glu_table_get", table, |t| {
        GluValueResult::from_result(t.get::<Value>(key).map(GluValue::from_value))
    })
}

/// Read `key` without metamethods. A missing key yields nil.
#[no_mangle]
pub extern "C" fn glu_table_raw_get(table: *const Table, key: GluValue) -> GluValueResult {
    let key = key.into_value();
    table_call("glu_table_raw_get", table, |t| {
        GluValueResult::from_result(t.raw_get::<Value>(key).map(GluValue::from_value))
    })
}

/// Whether `key` maps to a non-nil value, following `__index`.
#[no_mangle]
pub extern "C" fn glu_table_contains_key(table: *const Table, key: GluValue) -> GluBoolResult {
    let key = key.into_value();
    table_call("glu_table_contains_key", table, |t| {
        GluBoolResult::from_result(t.contains_key(key))
    })
}

/// Length, honouring `__len`.
#[no_mangle]
pub extern "C" fn glu_table_len(table: *const Table) -> GluI64Result {
    table_call("glu_table_len", table, |t| GluI64Result::from_result(t.len()))
}

/// Length of the array part. Never fails; null yields `0`.
#[no_mangle]
pub extern "C" fn glu_table_raw_len(table: *const Table) -> usize {
    borrow(table).map_or(0, Table::raw_len)
}

#[no_mangle]
pub extern "C" fn glu_table_is_empty(table: *const Table) -> bool {
    borrow(table).map_or(true, Table::is_empty)
}

/// Compare with `other`: identity, else an `__eq` handler.
#[no_mangle]
pub extern "C" fn glu_table_equals(table: *const Table, other: *const Table) -> GluBoolResult {
    table_call("glu_table_equals", table, |t| match borrow(other) {
        Some(other) => GluBoolResult::from_result(t.equals(other)),
        None => GluBoolResult::null("other table"),
    })
}

/// Address of the table, for identity and debugging only.
#[no_mangle]
pub extern "C" fn glu_table_to_pointer(table: *const Table) -> usize {
    borrow(table).map_or(0, |t| t.to_pointer() as usize)
}

/// Printable one-level rendering such as `{1, 2, name = "x"}`, freed with
/// `glu_result_error_free`. Null for null.
#[no_mangle]
pub extern "C" fn glu_table_debug(table: *const Table) -> *mut c_char {
    let Some(t) = borrow(table) else {
        return std::ptr::null_mut();
    };
    catch_panic("glu_table_debug", |_| std::ptr::null_mut(), || {
        into_c_string(render(t).unwrap_or_else(|err| format!("<{}>", describe(&err))))
    })
}

fn render(table: &Table) -> mlua::Result<String> {
    let mut out = String::from("{");
    let mut next_index = 1;
    for (n, pair) in table.pairs::<Value, Value>().enumerate() {
        let (key, value) = pair?;
        if n > 0 {
            out.push_str(", ");
        }
        if sequence_index(&key) == Some(next_index) {
            next_index += 1;
        } else {
            match &key {
                Value::String(s) if is_identifier(&s.as_bytes()) => {
                    let _ = write!(out, "{} = ", s.to_string_lossy());
                }
                _ => {
                    let _ = write!(out, "[{}] = ", render_value(&key));
                }
            }
        }
        out.push_str(&render_value(&value));
    }
    out.push('}');
    Ok(out)
}

#[allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    reason = "only whole numbers are sequence positions"
)]
fn sequence_index(key: &Value) -> Option<i64> {
    match *key {
        Value::Integer(i) => Some(i),
        Value::Number(n) if n.fract() == 0.0 => Some(n as i64),
        _ => None,
    }
}

fn is_identifier(bytes: &[u8]) -> bool {
    const KEYWORDS: &[&[u8]] = &[
        b"and", b"break", b"do", b"else", b"elseif", b"end", b"false", b"for", b"function",
        b"if", b"in", b"local", b"nil", b"not", b"or", b"repeat", b"return", b"then", b"true",
        b"until", b"while",
    ];
    match bytes.split_first() {
        Some((first, rest)) => {
            (first.is_ascii_alphabetic() || *first == b'_')
                && rest.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
                && !KEYWORDS.contains(&bytes)
        }
        None => false,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Vector(v) => format!("vector({}, {}, {})", v.x(), v.y(), v.z()),
        Value::String(s) => format!("{:?}", s.to_string_lossy()),
        Value::Error(e) => format!("error: {}", describe(e)),
        other => format!("{}: {:p}", other.type_name(), other.to_pointer()),
    }
}

// ── Writes ──────────────────────────────────────────────────────────────

/// Store `value` under `key`, following `__newindex`.
#[no_mangle]
pub extern "C" fn glu_table_set(table: *const Table, key: GluValue, value: GluValue) -> GluNoneResult {
    let (key, value) = (key.into_value(), value.into_value());
    table_call("glu_table_set", table, |t| {
        GluNoneResult::from_result(writable(t).and_then(|t| Ok(t.set(key, value)?)))
    })
}

#[no_mangle]
pub extern "C" fn glu_table_raw_set(
    table: *const Table,
    key: GluValue,
    value: GluValue,
) -> GluNoneResult {
    let (key, value) = (key.into_value(), value.into_value());
    table_call("glu_table_raw_set", table, |t| {
        GluNoneResult::from_result(writable(t).and_then(|t| Ok(t.raw_set(key, value)?)))
    })
}

/// Append at `len + 1`, honouring `__len` and `__newindex`.
#[no_mangle]
pub extern "C" fn glu_table_push(table: *const Table, value: GluValue) -> GluNoneResult {
    let value = value.into_value();
    table_call("glu_table_push", table, |t| {
        GluNoneResult::from_result(writable(t).and_then(|t| Ok(t.push(value)?)))
    })
}

/// Remove and return the element at `len`.
#[no_mangle]
pub extern "C" fn glu_table_pop(table: *const Table) -> GluValueResult {
    table_call("glu_table_pop", table, |t| {
        let popped = writable(t).and_then(|t| Ok(t.pop::<Value>()?));
        GluValueResult::from_result(popped.map(GluValue::from_value))
    })
}

#[no_mangle]
pub extern "C" fn glu_table_raw_push(table: *const Table, value: GluValue) -> GluNoneResult {
    let value = value.into_value();
    table_call("glu_table_raw_push", table, |t| {
        GluNoneResult::from_result(writable(t).and_then(|t| Ok(t.raw_push(value)?)))
    })
}

#[no_mangle]
pub extern "C" fn glu_table_raw_pop(table: *const Table) -> GluValueResult {
    table_call("glu_table_raw_pop", table, |t| {
        let popped = writable(t).and_then(|t| Ok(t.raw_pop::<Value>()?));
        GluValueResult::from_result(popped.map(GluValue::from_value))
    })
}

/// Insert at `idx` (`1..=len+1`), shifting later elements up.
#[no_mangle]
pub extern "C" fn glu_table_raw_insert(
    table: *const Table,
    idx: i64,
    value: GluValue,
) -> GluNoneResult {
    let value = value.into_value();
    table_call("glu_table_raw_insert", table, |t| {
        let result = writable(t).and_then(|t| {
            let len = length(t);
            if idx < 1 || idx > len.saturating_add(1) {
                return Err(BridgeError::OutOfBounds {
                    index: idx,
                    len: t.raw_len(),
                });
            }
            Ok(t.raw_insert(idx, value)?)
        });
        GluNoneResult::from_result(result)
    })
}

/// Remove `key`; sequence positions shift later elements down.
#[no_mangle]
pub extern "C" fn glu_table_raw_remove(table: *const Table, key: GluValue) -> GluNoneResult {
    let key = key.into_value();
    table_call("glu_table_raw_remove", table, |t| {
        GluNoneResult::from_result(writable(t).and_then(|t| Ok(t.raw_remove(key)?)))
    })
}

#[no_mangle]
pub extern "C" fn glu_table_clear(table: *const Table) -> GluNoneResult {
    table_call("glu_table_clear", table, |t| {
        GluNoneResult::from_result(writable(t).and_then(|t| Ok(t.clear()?)))
    })
}

// ── Metatable and flags ─────────────────────────────────────────────────

/// A new reference to the metatable, or null.
#[no_mangle]
pub extern "C" fn glu_table_metatable(table: *const Table) -> *mut Table {
    borrow(table)
        .and_then(Table::metatable)
        .map_or(std::ptr::null_mut(), into_handle)
}

/// Attach `metatable` (null detaches). The metatable is shared, not
/// copied, and keeps its own handle.
#[no_mangle]
pub extern "C" fn glu_table_set_metatable(
    table: *const Table,
    metatable: *const Table,
) -> GluNoneResult {
    table_call("glu_table_set_metatable", table, |t| {
        let result = writable(t).and_then(|t| Ok(t.set_metatable(borrow(metatable).cloned())?));
        GluNoneResult::from_result(result)
    })
}

#[no_mangle]
pub extern "C" fn glu_table_is_readonly(table: *const Table) -> bool {
    borrow(table).is_some_and(Table::is_readonly)
}

#[no_mangle]
pub extern "C" fn glu_table_set_readonly(table: *const Table, enabled: bool) {
    if let Some(t) = borrow(table) {
        t.set_readonly(enabled);
    }
}

/// Mark `table` as a safe environment: scripts running in it may use
/// optimized access to the standard library. Only meaningful on globals
/// and chunk environments.
#[no_mangle]
pub extern "C" fn glu_table_set_safeenv(table: *const Table, enabled: bool) {
    if let Some(t) = borrow(table) {
        t.set_safeenv(enabled);
    }
}

// ── Iteration ───────────────────────────────────────────────────────────

/// Call `callback` with a [`TableForEachCallbackData`] for each entry: the
/// array part in order, then the rest. The table must not be mutated
/// meanwhile. The registration is dropped before returning.
#[no_mangle]
pub extern "C" fn glu_table_foreach(table: *const Table, callback: GluCallback) -> GluNoneResult {
    let guard = CallbackGuard::<TableForEachCallbackData>::new(callback);
    table_call("glu_table_foreach", table, move |t| {
        for pair in t.pairs::<Value, Value>() {
            let (key, value) = match pair {
                Ok(pair) => pair,
                Err(err) => return GluNoneResult::fail(err),
            };
            let (key, value) = (GluValue::from_value(key), GluValue::from_value(value));
            let mut data = TableForEachCallbackData {
                key,
                value,
                stop: false,
            };
            guard.invoke(&mut data);
            drop((key.into_value(), value.into_value()));
            if data.stop {
                break;
            }
        }
        GluNoneResult::ok()
    })
}

/// Like [`glu_table_foreach`], passing only values.
#[no_mangle]
pub extern "C" fn glu_table_foreach_value(
    table: *const Table,
    callback: GluCallback,
) -> GluNoneResult {
    let guard = CallbackGuard::<TableForEachValueCallbackData>::new(callback);
    table_call("glu_table_foreach_value", table, move |t| {
        for pair in t.pairs::<Value, Value>() {
            let value = match pair {
                Ok((_, value)) => GluValue::from_value(value),
                Err(err) => return GluNoneResult::fail(err),
            };
            let mut data = TableForEachValueCallbackData { value, stop: false };
            guard.invoke(&mut data);
            drop(value.into_value());
            if data.stop {
                break;
            }
        }
        GluNoneResult::ok()
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
