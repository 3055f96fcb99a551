//! Generators: resumption, finally unwinding and the iterator methods

use ecmarun::compiler::FunctionKind;
use ecmarun::{
    CheapClone, EngineConfig, GeneratorStatus, Interpreter, JsError, JsValue, Op, ProgramBuilder, PropertyKey,
    ResumeAction,
};

use super::closure;

fn start(interp: &mut Interpreter, b: ProgramBuilder, params: u8, args: &[JsValue]) -> JsValue {
    let func = closure(interp, b, FunctionKind::Generator, params);
    interp.call_function(&func, &JsValue::Undefined, args).unwrap()
}

/// function* () { try { yield 1; yield 2 } finally { yield "cleanup" } }
fn yielding_finally() -> ProgramBuilder {
    let mut b = ProgramBuilder::named("withCleanup");
    let try_idx = b.emit_push_try();
    b.emit(Op::LoadInt { dst: 0, value: 1 });
    b.emit(Op::Yield { dst: 1, value: 0 });
    b.emit(Op::LoadInt { dst: 0, value: 2 });
    b.emit(Op::Yield { dst: 1, value: 0 });
    b.emit(Op::PopTry);
    let finally_ip = b.current_offset() as u32;
    b.emit_load_string(2, "cleanup").unwrap();
    b.emit(Op::Yield { dst: 3, value: 2 });
    b.emit(Op::FinallyEnd);
    b.emit(Op::ReturnUndefined);
    b.patch_try_targets(try_idx, 0, finally_ip);
    b
}

#[test]
fn test_runs_to_completion() {
    let mut interp = Interpreter::new();
    let generator = start(&mut interp, yielding_finally(), 0, &[]);

    let mut seen = Vec::new();
    loop {
        let (value, done) = interp
            .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
            .unwrap();
        if done {
            assert_eq!(value, JsValue::Undefined);
            break;
        }
        seen.push(value);
    }
    assert_eq!(seen, vec![JsValue::Int(1), JsValue::Int(2), JsValue::from("cleanup")]);
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Completed));
}

#[test]
fn test_return_runs_finally_that_yields_again() {
    let mut interp = Interpreter::new();
    let generator = start(&mut interp, yielding_finally(), 0, &[]);

    let first = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    assert_eq!(first, (JsValue::Int(1), false));

    let cleanup = interp
        .generator_step(&generator, ResumeAction::Return, JsValue::Int(42))
        .unwrap();
    assert_eq!(cleanup, (JsValue::from("cleanup"), false));
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Suspended));

    let finished = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    assert_eq!(finished, (JsValue::Int(42), true));

    let after = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    assert_eq!(after, (JsValue::Undefined, true));
}

#[test]
fn test_throw_is_caught_at_the_yield() {
    // function* (base) { try { yield base } catch (e) { return e + base } }
    let mut b = ProgramBuilder::named("catcher");
    let try_idx = b.emit_push_try();
    b.emit(Op::Yield { dst: 1, value: 0 });
    b.emit(Op::PopTry);
    b.emit(Op::ReturnUndefined);
    let catch_ip = b.current_offset() as u32;
    b.emit(Op::GetException { dst: 2 });
    b.emit(Op::Add { dst: 3, left: 2, right: 0 });
    b.emit(Op::Return { value: 3 });
    b.patch_try_targets(try_idx, catch_ip, 0);

    let mut interp = Interpreter::new();
    let generator = start(&mut interp, b, 1, &[JsValue::Int(5)]);
    let first = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    assert_eq!(first, (JsValue::Int(5), false));
    let caught = interp
        .generator_step(&generator, ResumeAction::Throw, JsValue::Int(10))
        .unwrap();
    assert_eq!(caught, (JsValue::Int(15), true));
}

#[test]
fn test_uncaught_throw_completes_generator() {
    let mut interp = Interpreter::new();
    let generator = start(&mut interp, yielding_finally(), 0, &[]);
    interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    // the finally block yields before the throw can escape
    let cleanup = interp
        .generator_step(&generator, ResumeAction::Throw, JsValue::from("boom"))
        .unwrap();
    assert_eq!(cleanup, (JsValue::from("cleanup"), false));
    let err = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap_err();
    assert_eq!(err.thrown_value(), Some(&JsValue::from("boom")));
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Completed));
}

#[test]
fn test_resuming_a_running_generator_is_a_type_error() {
    // function* () { yield g.next() }   where g is this generator
    let mut b = ProgramBuilder::named("selfish");
    b.emit_get_var(0, "g").unwrap();
    b.emit_get_named(1, 0, "next").unwrap();
    b.emit(Op::Call {
        dst: 2,
        callee: 1,
        this: 0,
        args: 3,
        argc: 0,
    });
    b.emit(Op::Yield { dst: 3, value: 2 });
    b.emit(Op::ReturnUndefined);

    let mut interp = Interpreter::new();
    let generator = start(&mut interp, b, 0, &[]);
    interp.set_global("g", generator.clone()).unwrap();

    let err = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Completed));
}

#[test]
fn test_prototype_methods_build_iterator_results() {
    let mut b = ProgramBuilder::named("one");
    b.emit(Op::LoadInt { dst: 0, value: 1 });
    b.emit(Op::Yield { dst: 1, value: 0 });
    b.emit(Op::ReturnUndefined);

    let mut interp = Interpreter::new();
    let generator = start(&mut interp, b, 0, &[]);
    let next = interp
        .get_value_property(&generator, &PropertyKey::from("next"))
        .unwrap();
    let result = interp.call_function(&next, &generator, &[]).unwrap();
    let result = result.as_object().unwrap().cheap_clone();
    assert_eq!(
        interp.get_property(&result, &PropertyKey::from("value")).unwrap(),
        JsValue::Int(1)
    );
    assert_eq!(
        interp.get_property(&result, &PropertyKey::from("done")).unwrap(),
        JsValue::Boolean(false)
    );

    let plain = JsValue::Object(interp.create_object());
    let err = interp.call_function(&next, &plain, &[]).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_return_before_start_skips_body() {
    let mut interp = Interpreter::new();
    let generator = start(&mut interp, yielding_finally(), 0, &[]);
    let result = interp
        .generator_step(&generator, ResumeAction::Return, JsValue::Int(3))
        .unwrap();
    assert_eq!(result, (JsValue::Int(3), true));
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Completed));
}

#[test]
fn test_depth_error_before_resume_keeps_generator_resumable() {
    let config = EngineConfig {
        max_call_depth: 1,
        ..EngineConfig::default()
    };
    let mut interp = Interpreter::with_config(config);
    let mut b = ProgramBuilder::named("one");
    b.emit(Op::LoadInt { dst: 0, value: 1 });
    b.emit(Op::Yield { dst: 1, value: 0 });
    b.emit(Op::ReturnUndefined);
    let generator = start(&mut interp, b, 0, &[]);

    // The native's own frame fills the stack, so the body cannot be entered
    let target = generator.clone();
    let step_nested = interp.create_native_function("stepNested", 0, move |interp, _, _| {
        match interp.generator_step(&target, ResumeAction::Next, JsValue::Undefined) {
            Err(JsError::RangeError { .. }) => Ok(JsValue::Boolean(true)),
            Err(other) => Err(other),
            Ok(_) => Ok(JsValue::Boolean(false)),
        }
    });
    let hit_limit = interp
        .call_function(&JsValue::Object(step_nested), &JsValue::Undefined, &[])
        .unwrap();
    assert_eq!(hit_limit, JsValue::Boolean(true));
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::NotStarted));

    let first = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    assert_eq!(first, (JsValue::Int(1), false));
}
