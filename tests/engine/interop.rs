//! Moving structured data between the host and the engine

use std::rc::Rc;

use ecmarun::compiler::FunctionKind;
use ecmarun::{HostValue, Interpreter, JsError, JsValue, Op, ProgramBuilder};
use serde_json::json;

use super::closure;

#[test]
fn test_export_program_result() {
    // return { a: [1, "two", null], b: { c: true } }
    let mut b = ProgramBuilder::new();
    b.emit(Op::LoadInt { dst: 0, value: 1 });
    b.emit_load_string(1, "two").unwrap();
    b.emit(Op::LoadNull { dst: 2 });
    b.emit(Op::CreateArray { dst: 3, start: 0, count: 3 });
    b.emit(Op::CreateObject { dst: 4 });
    b.emit_set_named(4, "a", 3).unwrap();
    b.emit(Op::CreateObject { dst: 5 });
    b.emit(Op::LoadBool { dst: 6, value: true });
    b.emit_set_named(5, "c", 6).unwrap();
    b.emit_set_named(4, "b", 5).unwrap();
    b.emit(Op::Return { value: 4 });

    let mut interp = Interpreter::new();
    let result = interp.execute(Rc::new(b.finish())).unwrap();
    let exported = interp.export_value(&result).unwrap();
    assert_eq!(
        exported.to_json().unwrap(),
        json!({ "a": [1, "two", null], "b": { "c": true } })
    );
}

#[test]
fn test_imported_data_is_visible_to_bytecode() {
    let mut interp = Interpreter::new();
    let host = HostValue::from_json(&json!({ "user": { "name": "ada", "tags": ["x", "y"] } }));
    let imported = interp.import_value(&host).unwrap();

    // function (doc) { return doc.user.tags.length + doc.user.name }
    let mut b = ProgramBuilder::named("summary");
    b.emit_get_named(1, 0, "user").unwrap();
    b.emit_get_named(2, 1, "tags").unwrap();
    b.emit_get_named(3, 2, "length").unwrap();
    b.emit_get_named(4, 1, "name").unwrap();
    b.emit(Op::Add { dst: 5, left: 3, right: 4 });
    b.emit(Op::Return { value: 5 });
    let func = closure(&mut interp, b, FunctionKind::Normal, 1);
    let result = interp.call_function(&func, &JsValue::Undefined, &[imported]).unwrap();
    assert_eq!(result, JsValue::from("2ada"));
}

#[test]
fn test_export_runs_getters() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    interp.register_method(&obj, "hiddenMethod", 0, |_, _, _| Ok(JsValue::Undefined));
    let getter = interp.create_native_function("get", 0, |_, _, _| Ok(JsValue::from("lazy")));
    let desc = ecmarun::PropertyDescriptor::accessor(Some(getter), None, true, true);
    interp
        .define_own_property(&obj, "visible".into(), &desc, true)
        .unwrap();

    let exported = interp.export_value(&JsValue::Object(obj)).unwrap();
    assert_eq!(exported.to_json().unwrap(), json!({ "visible": "lazy" }));
}

#[test]
fn test_functions_do_not_export() {
    let mut interp = Interpreter::new();
    let f = interp.create_native_function("f", 0, |_, _, _| Ok(JsValue::Undefined));
    let err = interp.export_value(&JsValue::Object(f)).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_values_from_another_engine_are_rejected() {
    let mut first = Interpreter::new();
    let mut second = Interpreter::new();
    let foreign = JsValue::Object(first.create_object());
    let err = second.export_value(&foreign).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}
