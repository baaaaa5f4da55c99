use std::ffi::CStr;

use pretty_assertions::assert_eq;

use super::*;
use crate::error::glu_error_get_string;
use crate::string::{glu_free_string, glu_string_as_bytes, glu_string_to_pointer};
use crate::table::{glu_create_table, glu_table_raw_get, glu_table_raw_len, glu_table_raw_push};
use crate::testing::{eval_one, integer, none_ok, ok, string_value, TestSession};

fn type_name(value: GluValue) -> &'static str {
    // SAFETY: type names are static C strings
    unsafe { CStr::from_ptr(glu_value_type_name(value)) }
        .to_str()
        .unwrap()
}

fn text(string: *const mlua::String) -> String {
    // SAFETY: the string outlives the view
    let bytes = unsafe { glu_string_as_bytes(string).as_slice() };
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[test]
fn primitives_are_stored_inline() {
    let v = GluValue::from_value(Value::Integer(-7));
    assert_eq!(v.tag, GluValueTag::Integer);
    assert_eq!(integer(v), -7);

    let v = GluValue::from_value(Value::Vector(Vector::new(1.0, 2.0, 3.0)));
    assert_eq!(v.tag, GluValueTag::Vector);
    // SAFETY: tag checked
    assert_eq!(unsafe { v.data.vector }, [1.0, 2.0, 3.0]);

    let mut x = 5u8;
    let p = std::ptr::from_mut(&mut x).cast::<c_void>();
    let v = GluValue::from_value(Value::LightUserData(LightUserData(p)));
    assert_eq!(v.tag, GluValueTag::LightUserData);
    assert!(matches!(v.into_value(), Value::LightUserData(LightUserData(q)) if q == p));
}

#[test]
fn heap_values_round_trip_through_handles() {
    let session = TestSession::new();
    let v = string_value(&session, "hello");
    assert_eq!(v.tag, GluValueTag::String);
    match v.into_value() {
        Value::String(s) => assert_eq!(s.as_bytes(), b"hello"),
        other => panic!("expected a string, got {other:?}"),
    }
}

#[test]
fn clone_is_independent_of_original() {
    let session = TestSession::new();
    let original = string_value(&session, "shared");
    let copy = glu_value_clone(original);
    // SAFETY: both tags are string
    let (a, b) = unsafe { (original.data.string, copy.data.string) };
    assert_ne!(a, b);
    assert_eq!(glu_string_to_pointer(a), glu_string_to_pointer(b));

    glu_value_free(copy);
    assert_eq!(text(a), "shared");
    glu_free_string(a);
}

#[test]
fn freeing_original_leaves_clone_usable() {
    let session = TestSession::new();
    let table = ok(glu_create_table(session.ptr()));
    none_ok(glu_table_raw_push(table, GluValue::integer(1)));
    let original = GluValue {
        tag: GluValueTag::Table,
        data: GluValueData { table },
    };
    let copy = glu_value_clone(original);
    glu_value_free(original);

    // SAFETY: tag is table
    let t = unsafe { copy.data.table };
    assert_eq!(glu_table_raw_len(t), 1);
    assert_eq!(integer(ok(glu_table_raw_get(t, GluValue::integer(1)))), 1);
    glu_value_free(copy);
}

#[test]
fn primitive_clone_is_a_copy() {
    let v = GluValue::number(2.5);
    let c = glu_value_clone(v);
    assert_eq!(c.tag, GluValueTag::Number);
    // SAFETY: tag checked
    assert!((unsafe { c.data.number } - 2.5).abs() < f64::EPSILON);
    glu_value_free(v);
    glu_value_free(c);
}

#[test]
fn other_tag_decodes_to_nil() {
    let other = GluValue {
        tag: GluValueTag::Other,
        data: GluValueData {
            other: std::ptr::null_mut(),
        },
    };
    assert!(other.into_value().is_nil());
    assert_eq!(glu_value_clone(other).tag, GluValueTag::Nil);
    assert!(!GluValueTag::Other.is_heap_backed());
}

#[test]
fn interpreter_values_keep_their_kind() {
    let session = TestSession::new();
    for (source, tag, name) in [
        ("return coroutine.create(function() end)", GluValueTag::Thread, "thread"),
        ("return buffer.create(4)", GluValueTag::Buffer, "buffer"),
        ("return newproxy()", GluValueTag::UserData, "userdata"),
        ("return print", GluValueTag::Function, "function"),
    ] {
        let value = eval_one(&session, source);
        assert_eq!((value.tag, type_name(value)), (tag, name), "{source}");
        let copy = glu_value_clone(value);
        assert_eq!(copy.tag, tag);
        glu_value_free(copy);
        glu_value_free(value);
    }
}

#[test]
fn error_values_carry_their_message() {
    let value = GluValue::from_value(Value::Error(Box::new(mlua::Error::runtime("went wrong"))));
    assert_eq!(value.tag, GluValueTag::Error);
    // SAFETY: tag checked; the error value is live
    let message = unsafe { glu_error_get_string(value.data.error).as_slice() }.to_vec();
    assert_eq!(message, b"went wrong");

    let copy = glu_value_clone(value);
    glu_value_free(value);
    match copy.into_value() {
        Value::Error(e) => assert_eq!(crate::error::describe(&e), "went wrong"),
        other => panic!("expected an error, got {other:?}"),
    }
}

#[test]
fn null_handle_decodes_to_nil() {
    let v = GluValue {
        tag: GluValueTag::Table,
        data: GluValueData {
            table: std::ptr::null_mut::<mlua::Table>(),
        },
    };
    assert!(v.to_value().is_nil());
    glu_value_free(v);
}

#[test]
fn type_names() {
    let session = TestSession::new();
    assert_eq!(type_name(GluValue::NIL), "nil");
    assert_eq!(type_name(GluValue::boolean(true)), "boolean");
    assert_eq!(type_name(GluValue::integer(1)), "number");
    assert_eq!(type_name(GluValue::vector([0.0; 3])), "vector");
    let s = string_value(&session, "x");
    assert_eq!(type_name(s), "string");
    glu_value_free(s);
    assert!(GluValueTag::Error.is_heap_backed());
    assert!(!GluValueTag::Vector.is_heap_backed());
}
