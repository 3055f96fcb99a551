//! Proxy traps, invariant checks and revocation through the public API

use std::rc::Rc;

use ecmarun::{CheapClone, Interpreter, JsError, JsValue, Op, ProgramBuilder, Property, PropertyDescriptor, PropertyKey};

fn handler_with(interp: &mut Interpreter, trap: &str, f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError> + 'static) -> JsValue {
    let handler = interp.create_object();
    interp.register_method(&handler, trap, 3, f);
    JsValue::Object(handler)
}

#[test]
fn test_get_trap_cannot_lie_about_frozen_data() {
    let mut interp = Interpreter::new();
    let target = interp.create_object();
    target
        .borrow_mut()
        .define_property("x", Property::with_attributes(JsValue::Int(1), false, true, false));
    let handler = handler_with(&mut interp, "get", |_, _, _| Ok(JsValue::Int(2)));
    let proxy = interp.create_proxy(&JsValue::Object(target), &handler).unwrap();

    let err = interp.get_property(&proxy, &PropertyKey::from("x")).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
    // other keys are free to report anything
    assert_eq!(
        interp.get_property(&proxy, &PropertyKey::from("y")).unwrap(),
        JsValue::Int(2)
    );
}

#[test]
fn test_own_keys_trap_shapes_enumeration() {
    let mut interp = Interpreter::new();
    let target = interp.create_object();
    let handler = handler_with(&mut interp, "ownKeys", |interp, _, _| {
        let keys = interp.create_array(vec![JsValue::from("b"), JsValue::from("a")]);
        Ok(JsValue::Object(keys))
    });
    let proxy = interp.create_proxy(&JsValue::Object(target), &handler).unwrap();
    let keys = interp.own_keys(&proxy, true).unwrap();
    assert_eq!(keys, vec![PropertyKey::from("b"), PropertyKey::from("a")]);
}

#[test]
fn test_own_keys_must_report_non_configurable_keys() {
    let mut interp = Interpreter::new();
    let target = interp.create_object();
    let desc = PropertyDescriptor::data(JsValue::Int(1), true, true, false);
    interp
        .define_own_property(&target, PropertyKey::from("pinned"), &desc, true)
        .unwrap();
    let handler = handler_with(&mut interp, "ownKeys", |interp, _, _| {
        Ok(JsValue::Object(interp.create_array(Vec::new())))
    });
    let proxy = interp.create_proxy(&JsValue::Object(target), &handler).unwrap();
    let err = interp.own_keys(&proxy, true).unwrap_err();
    assert!(err.to_string().contains("pinned"));
}

#[test]
fn test_apply_trap_receives_argument_array() {
    let mut interp = Interpreter::new();
    let target = interp.create_native_function("target", 0, |_, _, _| Ok(JsValue::Undefined));
    let handler = handler_with(&mut interp, "apply", |interp, _, args| {
        let list = args.get(2).and_then(JsValue::as_object).cloned().unwrap_or_else(|| interp.create_object());
        let length = interp.get_property(&list, &PropertyKey::from("length"))?;
        Ok(JsValue::number(interp.to_number(&length)? * 10.0))
    });
    let proxy = interp.create_proxy(&JsValue::Object(target), &handler).unwrap();
    let result = interp
        .call_function(
            &JsValue::Object(proxy),
            &JsValue::Undefined,
            &[JsValue::Int(1), JsValue::Int(2), JsValue::Int(3)],
        )
        .unwrap();
    assert_eq!(result, JsValue::Int(30));
}

#[test]
fn test_construct_trap_must_return_object() {
    let mut interp = Interpreter::new();
    let target = interp.create_native_constructor("Target", 0, |_, this, _| Ok(this.clone()));
    let handler = handler_with(&mut interp, "construct", |_, _, _| Ok(JsValue::Int(1)));
    let proxy = JsValue::Object(interp.create_proxy(&JsValue::Object(target), &handler).unwrap());
    let err = interp.construct(&proxy, &[]).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_proxy_global_from_bytecode() {
    let mut interp = Interpreter::new();
    let handler = handler_with(&mut interp, "get", |interp, _, args| {
        let key = interp.to_js_string(&args.get(1).cloned().unwrap_or_default())?;
        Ok(JsValue::from(format!("<{}>", key.to_rust_string_lossy())))
    });
    interp.set_global("handler", handler).unwrap();

    // new Proxy({}, handler).anything
    let mut b = ProgramBuilder::new();
    b.emit_get_var(0, "Proxy").unwrap();
    b.emit(Op::CreateObject { dst: 1 });
    b.emit_get_var(2, "handler").unwrap();
    b.emit(Op::Construct { dst: 3, callee: 0, args: 1, argc: 2 });
    b.emit_get_named(4, 3, "anything").unwrap();
    b.emit(Op::Return { value: 4 });
    let result = interp.execute(Rc::new(b.finish())).unwrap();
    assert_eq!(result, JsValue::from("<anything>"));
}

#[test]
fn test_revocable_proxy_stops_working_after_revoke() {
    let mut interp = Interpreter::new();
    let proxy_ctor = interp.get_global("Proxy").unwrap();
    let revocable = interp
        .get_value_property(&proxy_ctor, &PropertyKey::from("revocable"))
        .unwrap();
    let target = JsValue::Object(interp.create_object());
    let handler = JsValue::Object(interp.create_object());
    let pair = interp.call_function(&revocable, &proxy_ctor, &[target, handler]).unwrap();
    let pair = pair.as_object().unwrap().cheap_clone();
    let proxy = interp.get_property(&pair, &PropertyKey::from("proxy")).unwrap();
    let revoke = interp.get_property(&pair, &PropertyKey::from("revoke")).unwrap();

    assert!(interp.get_value_property(&proxy, &PropertyKey::from("x")).is_ok());
    interp.call_function(&revoke, &JsValue::Undefined, &[]).unwrap();
    let err = interp
        .get_value_property(&proxy, &PropertyKey::from("x"))
        .unwrap_err();
    assert!(err.to_string().contains("revoked"));
}
