//! Weak collections drop entries once their keys are unreachable

use std::rc::Rc;

use ecmarun::compiler::FunctionKind;
use ecmarun::{CheapClone, EngineConfig, Interpreter, JsError, JsValue, Op, ProgramBuilder, PropertyKey};

use super::closure;

#[test]
fn test_key_created_by_script_is_swept_at_exit() {
    super::init_tracing();
    let mut interp = Interpreter::new();
    let wm = interp.create_weak_map();
    interp.set_global("wm", JsValue::Object(wm.clone())).unwrap();

    // wm.set({}, 1)
    let mut b = ProgramBuilder::new();
    b.emit_get_var(0, "wm").unwrap();
    b.emit_get_named(1, 0, "set").unwrap();
    b.emit(Op::CreateObject { dst: 2 });
    b.emit(Op::LoadInt { dst: 3, value: 1 });
    b.emit(Op::Call { dst: 4, callee: 1, this: 0, args: 2, argc: 2 });
    b.emit(Op::ReturnUndefined);
    interp.execute(Rc::new(b.finish())).unwrap();

    assert_eq!(interp.weak_raw_len(&wm), Some(0));
}

#[test]
fn test_live_keys_survive_sweeps() {
    let mut interp = Interpreter::new();
    let wm = interp.create_weak_map();
    let key = JsValue::Object(interp.create_object());
    interp.weak_map_set(&wm, &key, JsValue::from("kept")).unwrap();

    interp.checkpoint().unwrap();
    assert_eq!(interp.sweep_weak_collections(), 0);
    assert_eq!(interp.weak_map_get(&wm, &key).unwrap(), JsValue::from("kept"));
    assert!(interp.weak_has(&wm, &key).unwrap());
    assert!(interp.weak_delete(&wm, &key).unwrap());
    assert!(!interp.weak_has(&wm, &key).unwrap());
}

#[test]
fn test_weak_set_membership() {
    let mut interp = Interpreter::new();
    let ws = interp.create_weak_set();
    let kept = JsValue::Object(interp.create_object());
    interp.weak_set_add(&ws, &kept).unwrap();
    {
        let dropped = JsValue::Object(interp.create_object());
        interp.weak_set_add(&ws, &dropped).unwrap();
    }
    assert_eq!(interp.weak_raw_len(&ws), Some(2));

    interp.checkpoint().unwrap();
    assert_eq!(interp.weak_raw_len(&ws), Some(1));
    assert!(interp.weak_has(&ws, &kept).unwrap());

    let err = interp.weak_set_add(&ws, &JsValue::Int(1)).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_periodic_sweep_inside_long_running_code() {
    let config = EngineConfig {
        weak_sweep_interval: 4,
        ..EngineConfig::default()
    };
    let mut interp = Interpreter::with_config(config);
    let wm = interp.create_weak_map();
    {
        let key = JsValue::Object(interp.create_object());
        interp.weak_map_set(&wm, &key, JsValue::Int(1)).unwrap();
    }
    let observed = Rc::new(std::cell::Cell::new(usize::MAX));
    let probe = {
        let wm = wm.clone();
        let observed = observed.clone();
        interp.create_native_function("probe", 0, move |interp, _, _| {
            observed.set(interp.weak_raw_len(&wm).unwrap_or(usize::MAX));
            Ok(JsValue::Undefined)
        })
    };
    interp.set_global("probe", JsValue::Object(probe)).unwrap();

    // a few instructions, then probe()
    let mut b = ProgramBuilder::new();
    for i in 0..8 {
        b.emit(Op::LoadInt { dst: 0, value: i });
    }
    b.emit_get_var(1, "probe").unwrap();
    b.emit(Op::LoadUndefined { dst: 2 });
    b.emit(Op::Call { dst: 3, callee: 1, this: 2, args: 4, argc: 0 });
    b.emit(Op::ReturnUndefined);
    interp.execute(Rc::new(b.finish())).unwrap();

    assert_eq!(observed.get(), 0);
}

#[test]
fn test_self_referencing_key_is_swept() {
    let mut interp = Interpreter::new();
    let wm = interp.create_weak_map();
    let weak_key = {
        let key = interp.create_object();
        interp
            .put(&key, PropertyKey::from("self"), JsValue::Object(key.cheap_clone()), true)
            .unwrap();
        interp
            .weak_map_set(&wm, &JsValue::Object(key.cheap_clone()), JsValue::Int(1))
            .unwrap();
        key.downgrade()
    };
    assert!(weak_key.is_alive());

    interp.checkpoint().unwrap();
    assert!(!weak_key.is_alive());
    assert_eq!(interp.weak_raw_len(&wm), Some(0));
}

#[test]
fn test_value_pointing_back_at_its_key_does_not_retain_it() {
    let mut interp = Interpreter::new();
    let wm = interp.create_weak_map();
    let weak_key = {
        let key = interp.create_object();
        let value = interp.create_object();
        interp
            .put(&value, PropertyKey::from("owner"), JsValue::Object(key.cheap_clone()), true)
            .unwrap();
        interp
            .weak_map_set(&wm, &JsValue::Object(key.cheap_clone()), JsValue::Object(value))
            .unwrap();
        key.downgrade()
    };

    interp.checkpoint().unwrap();
    assert!(!weak_key.is_alive());
    assert_eq!(interp.weak_raw_len(&wm), Some(0));
}

#[test]
fn test_held_key_keeps_its_cyclic_value() {
    let mut interp = Interpreter::new();
    let wm = interp.create_weak_map();
    let key = JsValue::Object(interp.create_object());
    let weak_value = {
        let value = interp.create_object();
        interp
            .put(&value, PropertyKey::from("owner"), key.clone(), true)
            .unwrap();
        interp
            .weak_map_set(&wm, &key, JsValue::Object(value.cheap_clone()))
            .unwrap();
        value.downgrade()
    };

    interp.checkpoint().unwrap();
    assert!(weak_value.is_alive());
    let value = interp.weak_map_get(&wm, &key).unwrap();
    let value = value.as_object().unwrap().cheap_clone();
    assert_eq!(interp.get_property(&value, &PropertyKey::from("owner")).unwrap(), key);
}

#[test]
fn test_closure_captured_by_its_own_scope_is_collected() {
    let mut interp = Interpreter::new();
    let wm = interp.create_weak_map();
    interp.set_global("wm", JsValue::Object(wm.clone())).unwrap();

    let mut noop = ProgramBuilder::named("f");
    noop.emit(Op::ReturnUndefined);
    let noop = noop.finish_function(FunctionKind::Normal, 0);

    // { let f = function () {}; wm.set(f, 1) }
    let mut b = ProgramBuilder::new();
    b.emit(Op::PushScope);
    b.emit_closure(0, noop).unwrap();
    b.emit_declare("f", true, 0).unwrap();
    b.emit_get_var(1, "wm").unwrap();
    b.emit_get_named(2, 1, "set").unwrap();
    b.emit(Op::LoadInt { dst: 4, value: 1 });
    b.emit(Op::Move { dst: 3, src: 0 });
    b.emit(Op::Call { dst: 5, callee: 2, this: 1, args: 3, argc: 2 });
    b.emit(Op::PopScope);
    b.emit(Op::ReturnUndefined);
    interp.execute(Rc::new(b.finish())).unwrap();
    assert_eq!(interp.weak_raw_len(&wm), Some(1));

    interp.checkpoint().unwrap();
    assert_eq!(interp.weak_raw_len(&wm), Some(0));
}

#[test]
fn test_function_and_prototype_cycle_is_collected() {
    let mut interp = Interpreter::new();
    let mut b = ProgramBuilder::named("Shape");
    b.emit(Op::ReturnUndefined);
    let weak_ctor = {
        let ctor = closure(&mut interp, b, FunctionKind::Normal, 0);
        ctor.as_object().unwrap().downgrade()
    };
    assert!(weak_ctor.is_alive());
    assert!(interp.collect_cycles() >= 2);
    assert!(!weak_ctor.is_alive());
}

#[test]
fn test_allocation_threshold_collects_at_exit() {
    let config = EngineConfig {
        cycle_collection_threshold: 1,
        ..EngineConfig::default()
    };
    let mut interp = Interpreter::with_config(config);
    let wm = interp.create_weak_map();
    interp.set_global("wm", JsValue::Object(wm.clone())).unwrap();

    // const o = {}; o.self = o; wm.set(o, 1)
    let mut b = ProgramBuilder::new();
    b.emit(Op::CreateObject { dst: 0 });
    b.emit_set_named(0, "self", 0).unwrap();
    b.emit_get_var(1, "wm").unwrap();
    b.emit_get_named(2, 1, "set").unwrap();
    b.emit(Op::Move { dst: 3, src: 0 });
    b.emit(Op::LoadInt { dst: 4, value: 1 });
    b.emit(Op::Call { dst: 5, callee: 2, this: 1, args: 3, argc: 2 });
    b.emit(Op::ReturnUndefined);
    interp.execute(Rc::new(b.finish())).unwrap();

    assert_eq!(interp.weak_raw_len(&wm), Some(0));
}
