//! Engine configuration from JSON and from the builder API

use std::rc::Rc;

use ecmarun::compiler::FunctionKind;
use ecmarun::{EngineConfig, Interpreter, JsError, JsValue, Op, ProgramBuilder};

use super::closure;

#[test]
fn test_missing_fields_keep_defaults() {
    let config = EngineConfig::from_json(r#"{"max_call_depth": 10}"#).unwrap();
    assert_eq!(config.max_call_depth, 10);
    assert_eq!(config.timeout_ms, EngineConfig::default().timeout_ms);
    assert_eq!(config.weak_sweep_interval, EngineConfig::default().weak_sweep_interval);
}

#[test]
fn test_invalid_json_is_a_type_error() {
    let err = EngineConfig::from_json("not json").unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_config_round_trips_through_serde() {
    let config = EngineConfig {
        timeout_ms: 0,
        max_call_depth: 128,
        weak_sweep_interval: 0,
        interrupt_check_interval: 16,
        ..EngineConfig::default()
    };
    let text = serde_json::to_string(&config).unwrap();
    assert_eq!(EngineConfig::from_json(&text).unwrap(), config);
}

#[test]
fn test_interpreter_uses_its_config() {
    let config = EngineConfig::from_json(r#"{"max_call_depth": 3}"#).unwrap();
    let mut interp = Interpreter::with_config(config);
    assert_eq!(interp.config().max_call_depth, 3);

    // function f(n) { return n }, called through three nested levels
    let mut b = ProgramBuilder::named("f");
    b.emit_get_var(1, "f").unwrap();
    b.emit(Op::LoadUndefined { dst: 2 });
    b.emit(Op::Call { dst: 3, callee: 1, this: 2, args: 0, argc: 1 });
    b.emit(Op::Return { value: 3 });
    let f = closure(&mut interp, b, FunctionKind::Normal, 1);
    interp.set_global("f", f.clone()).unwrap();
    let err = interp.call_function(&f, &JsValue::Undefined, &[JsValue::Int(1)]).unwrap_err();
    assert!(matches!(err, JsError::RangeError { .. }));

    interp.set_timeout_ms(0);
    assert_eq!(interp.config().timeout_ms, 0);
    let mut ok = ProgramBuilder::new();
    ok.emit(Op::LoadInt { dst: 0, value: 1 });
    ok.emit(Op::Return { value: 0 });
    assert_eq!(interp.execute(Rc::new(ok.finish())).unwrap(), JsValue::Int(1));
}
