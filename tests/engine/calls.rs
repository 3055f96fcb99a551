//! Calls, construction, re-entrancy and the depth limit

use std::rc::Rc;

use ecmarun::compiler::FunctionKind;
use ecmarun::{CheapClone, EngineConfig, Interpreter, JsError, JsValue, Op, ProgramBuilder, PropertyKey};

use super::closure;

/// function (x) { this.x = x }
fn point_constructor(interp: &mut Interpreter) -> JsValue {
    let mut b = ProgramBuilder::named("Point");
    b.emit(Op::LoadThis { dst: 1 });
    b.emit_set_named(1, "x", 0).unwrap();
    b.emit(Op::ReturnUndefined);
    closure(interp, b, FunctionKind::Normal, 1)
}

#[test]
fn test_construct_wires_prototype_and_this() {
    let mut interp = Interpreter::new();
    let ctor = point_constructor(&mut interp);
    let instance = interp.construct(&ctor, &[JsValue::Int(5)]).unwrap();
    let instance = instance.as_object().unwrap().cheap_clone();

    let prototype = interp
        .get_value_property(&ctor, &PropertyKey::from("prototype"))
        .unwrap();
    let actual = interp.get_prototype_of(&instance).unwrap().unwrap();
    assert!(actual.ptr_eq(prototype.as_object().unwrap()));
    assert_eq!(
        interp.get_property(&instance, &PropertyKey::from("x")).unwrap(),
        JsValue::Int(5)
    );
    assert!(interp.instance_of(&JsValue::Object(instance), &ctor).unwrap());
}

#[test]
fn test_construct_from_bytecode_uses_inline_frame() {
    let mut interp = Interpreter::new();
    let ctor = point_constructor(&mut interp);
    interp.set_global("Point", ctor).unwrap();

    // new Point(7).x
    let mut b = ProgramBuilder::new();
    b.emit_get_var(0, "Point").unwrap();
    b.emit(Op::LoadInt { dst: 1, value: 7 });
    b.emit(Op::Construct { dst: 2, callee: 0, args: 1, argc: 1 });
    b.emit_get_named(3, 2, "x").unwrap();
    b.emit(Op::Return { value: 3 });
    assert_eq!(interp.execute(Rc::new(b.finish())).unwrap(), JsValue::Int(7));
}

#[test]
fn test_constructor_object_result_replaces_this() {
    // function () { this.a = 1; return { b: 2 } }
    let mut b = ProgramBuilder::named("Swap");
    b.emit(Op::LoadThis { dst: 0 });
    b.emit(Op::LoadInt { dst: 1, value: 1 });
    b.emit_set_named(0, "a", 1).unwrap();
    b.emit(Op::CreateObject { dst: 2 });
    b.emit(Op::LoadInt { dst: 1, value: 2 });
    b.emit_set_named(2, "b", 1).unwrap();
    b.emit(Op::Return { value: 2 });

    let mut interp = Interpreter::new();
    let ctor = closure(&mut interp, b, FunctionKind::Normal, 0);
    let result = interp.construct(&ctor, &[]).unwrap();
    let result = result.as_object().unwrap().cheap_clone();
    assert_eq!(interp.get_property(&result, &PropertyKey::from("b")).unwrap(), JsValue::Int(2));
    assert!(!interp.has_own_property(&result, &PropertyKey::from("a")).unwrap());
}

#[test]
fn test_constructor_primitive_result_is_ignored() {
    let mut b = ProgramBuilder::named("Prim");
    b.emit(Op::LoadInt { dst: 0, value: 3 });
    b.emit(Op::Return { value: 0 });

    let mut interp = Interpreter::new();
    let ctor = closure(&mut interp, b, FunctionKind::Normal, 0);
    let result = interp.construct(&ctor, &[]).unwrap();
    assert!(result.as_object().is_some());
}

#[test]
fn test_arrow_and_async_functions_are_not_constructors() {
    let mut interp = Interpreter::new();
    let mut b = ProgramBuilder::named("arrow");
    b.emit(Op::ReturnUndefined);
    let arrow = closure(&mut interp, b, FunctionKind::Arrow, 0);
    let err = interp.construct(&arrow, &[]).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_arrow_captures_enclosing_this() {
    // function () { return () => this }
    let mut inner = ProgramBuilder::named("arrow");
    inner.emit(Op::LoadThis { dst: 0 });
    inner.emit(Op::Return { value: 0 });
    let inner = inner.finish_function(FunctionKind::Arrow, 0);

    let mut outer = ProgramBuilder::named("outer");
    outer.emit_closure(0, inner).unwrap();
    outer.emit(Op::Return { value: 0 });

    let mut interp = Interpreter::new();
    let outer = closure(&mut interp, outer, FunctionKind::Normal, 0);
    let owner = JsValue::Object(interp.create_object());
    let arrow = interp.call_function(&outer, &owner, &[]).unwrap();

    let other = JsValue::Object(interp.create_object());
    let seen = interp.call_function(&arrow, &other, &[]).unwrap();
    assert!(seen.strict_equals(&owner));
}

#[test]
fn test_sloppy_function_sees_global_this() {
    let mut b = ProgramBuilder::named("whoami");
    b.emit(Op::LoadThis { dst: 0 });
    b.emit(Op::Return { value: 0 });

    let mut interp = Interpreter::new();
    let func = closure(&mut interp, b, FunctionKind::Normal, 0);
    let seen = interp.call_function(&func, &JsValue::Undefined, &[]).unwrap();
    let global = interp.get_global("globalThis").unwrap();
    assert!(seen.strict_equals(&global));
}

#[test]
fn test_native_reenters_bytecode() {
    let mut interp = Interpreter::new();
    // applyTwice(f, x) = f(f(x))
    let apply_twice = interp.create_native_function("applyTwice", 2, |interp, _, args| {
        let f = args.first().cloned().unwrap_or_default();
        let x = args.get(1).cloned().unwrap_or_default();
        let once = interp.call(&f, &JsValue::Undefined, &[x])?;
        interp.call(&f, &JsValue::Undefined, &[once])
    });
    interp.set_global("applyTwice", JsValue::Object(apply_twice)).unwrap();

    let mut double = ProgramBuilder::named("double");
    double.emit(Op::Add { dst: 1, left: 0, right: 0 });
    double.emit(Op::Return { value: 1 });
    let double = closure(&mut interp, double, FunctionKind::Normal, 1);
    interp.set_global("double", double).unwrap();

    // applyTwice(double, 10)
    let mut b = ProgramBuilder::new();
    b.emit_get_var(0, "applyTwice").unwrap();
    b.emit(Op::LoadUndefined { dst: 1 });
    b.emit_get_var(2, "double").unwrap();
    b.emit(Op::LoadInt { dst: 3, value: 10 });
    b.emit(Op::Call { dst: 4, callee: 0, this: 1, args: 2, argc: 2 });
    b.emit(Op::Return { value: 4 });
    assert_eq!(interp.execute(Rc::new(b.finish())).unwrap(), JsValue::Int(40));
}

#[test]
fn test_error_from_nested_native_is_catchable_in_bytecode() {
    let mut interp = Interpreter::new();
    let fail = interp.create_native_function("fail", 0, |_, _, _| Err(JsError::range_error("bad")));
    interp.set_global("fail", JsValue::Object(fail)).unwrap();

    // try { fail() } catch (e) { return e.message }
    let mut b = ProgramBuilder::new();
    let try_idx = b.emit_push_try();
    b.emit_get_var(0, "fail").unwrap();
    b.emit(Op::LoadUndefined { dst: 1 });
    b.emit(Op::Call { dst: 2, callee: 0, this: 1, args: 3, argc: 0 });
    b.emit(Op::PopTry);
    b.emit(Op::ReturnUndefined);
    let catch_ip = b.current_offset() as u32;
    b.emit(Op::GetException { dst: 3 });
    b.emit_get_named(4, 3, "message").unwrap();
    b.emit(Op::Return { value: 4 });
    b.patch_try_targets(try_idx, catch_ip, 0);

    assert_eq!(interp.execute(Rc::new(b.finish())).unwrap(), JsValue::from("bad"));
}

#[test]
fn test_unbounded_recursion_is_a_range_error() {
    let config = EngineConfig {
        max_call_depth: 64,
        ..EngineConfig::default()
    };
    let mut interp = Interpreter::with_config(config);

    // function f() { return f() }
    let mut b = ProgramBuilder::named("f");
    b.emit_get_var(0, "f").unwrap();
    b.emit(Op::LoadUndefined { dst: 1 });
    b.emit(Op::Call { dst: 2, callee: 0, this: 1, args: 3, argc: 0 });
    b.emit(Op::Return { value: 2 });
    let f = closure(&mut interp, b, FunctionKind::Normal, 0);
    interp.set_global("f", f.clone()).unwrap();

    let err = interp.call_function(&f, &JsValue::Undefined, &[]).unwrap_err();
    assert!(matches!(err, JsError::RangeError { .. }));

    // the stack unwound, so the engine is usable again
    let mut ok = ProgramBuilder::new();
    ok.emit(Op::LoadInt { dst: 0, value: 1 });
    ok.emit(Op::Return { value: 0 });
    assert_eq!(interp.execute(Rc::new(ok.finish())).unwrap(), JsValue::Int(1));
}

#[test]
fn test_thrown_value_carries_stack() {
    let mut interp = Interpreter::new();

    // function inner() { throw "x" }
    let mut inner = ProgramBuilder::named("inner");
    inner.emit_load_string(0, "x").unwrap();
    inner.emit(Op::Throw { value: 0 });
    let inner = closure(&mut interp, inner, FunctionKind::Normal, 0);
    interp.set_global("inner", inner).unwrap();

    // function outer() { inner() }
    let mut outer = ProgramBuilder::named("outer");
    outer.emit_get_var(0, "inner").unwrap();
    outer.emit(Op::LoadUndefined { dst: 1 });
    outer.emit(Op::Call { dst: 2, callee: 0, this: 1, args: 3, argc: 0 });
    outer.emit(Op::ReturnUndefined);
    let outer = closure(&mut interp, outer, FunctionKind::Normal, 0);

    let err = interp.call_function(&outer, &JsValue::Undefined, &[]).unwrap_err();
    assert_eq!(err.thrown_value(), Some(&JsValue::from("x")));
    let names: Vec<&str> = err.stack().iter().map(|f| f.function_name.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer"]);
}

#[test]
fn test_temporal_dead_zone() {
    // { x; let x = 1 }
    let mut b = ProgramBuilder::new();
    b.emit(Op::PushScope);
    let name = b.add_string("x").unwrap();
    b.emit(Op::DeclareVar { name, mutable: true });
    b.emit(Op::GetVar { dst: 1, name });
    b.emit(Op::PopScope);
    b.emit(Op::ReturnUndefined);

    let err = super::run(b).unwrap_err();
    assert!(matches!(err, JsError::ReferenceError { .. }));
    assert!(err.to_string().contains("before initialization"));
}

#[test]
fn test_calling_a_non_function_is_a_type_error() {
    let mut interp = Interpreter::new();
    let err = interp
        .call_function(&JsValue::Int(1), &JsValue::Undefined, &[])
        .unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}
