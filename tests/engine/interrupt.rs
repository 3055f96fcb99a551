//! Timeouts and host interrupts are fatal and escape `try` regions

use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use ecmarun::compiler::FunctionKind;
use ecmarun::{EngineConfig, ErrorKind, GeneratorStatus, Interpreter, JsValue, Op, ProgramBuilder, ResumeAction};

use super::closure;

/// try { for (;;) {} } catch (e) { return "caught" }
fn guarded_spin() -> ProgramBuilder {
    let mut b = ProgramBuilder::new();
    let try_idx = b.emit_push_try();
    let top = b.current_offset() as u32;
    b.emit(Op::Jump { target: top });
    b.emit(Op::PopTry);
    b.emit(Op::ReturnUndefined);
    let catch_ip = b.current_offset() as u32;
    b.emit_load_string(0, "caught").unwrap();
    b.emit(Op::Return { value: 0 });
    b.patch_try_targets(try_idx, catch_ip, 0);
    b
}

fn quick_config(timeout_ms: u64) -> EngineConfig {
    EngineConfig {
        timeout_ms,
        interrupt_check_interval: 1,
        ..EngineConfig::default()
    }
}

#[test]
fn test_timeout_is_not_catchable() {
    super::init_tracing();
    let mut interp = Interpreter::with_config(quick_config(20));
    let err = interp.execute(Rc::new(guarded_spin().finish())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(!err.is_catchable());
    assert!(err.to_string().contains("timeout"));
}

#[test]
fn test_interrupt_from_another_thread() {
    let mut interp = Interpreter::with_config(quick_config(0));
    let handle = interp.interrupt_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.interrupt();
    });
    let err = interp.execute(Rc::new(guarded_spin().finish())).unwrap_err();
    stopper.join().unwrap();
    assert_eq!(err.kind(), ErrorKind::Interrupted);

    // the flag stays set until the host clears it
    let mut b = ProgramBuilder::new();
    b.emit(Op::LoadInt { dst: 0, value: 1 });
    b.emit(Op::Return { value: 0 });
    let chunk = Rc::new(b.finish());
    assert!(interp.execute(chunk.clone()).is_err());
    interp.clear_interrupt();
    assert_eq!(interp.execute(chunk).unwrap(), JsValue::Int(1));
}

#[test]
fn test_timeout_resets_per_invocation() {
    let mut interp = Interpreter::with_config(quick_config(20));
    assert!(interp.execute(Rc::new(guarded_spin().finish())).is_err());

    let mut b = ProgramBuilder::new();
    b.emit(Op::LoadInt { dst: 0, value: 2 });
    b.emit(Op::Return { value: 0 });
    assert_eq!(interp.execute(Rc::new(b.finish())).unwrap(), JsValue::Int(2));
}

/// function* () { yield 1; for (;;) {} }
fn spinning_generator(interp: &mut Interpreter) -> JsValue {
    let mut b = ProgramBuilder::named("spinner");
    b.emit(Op::LoadInt { dst: 0, value: 1 });
    b.emit(Op::Yield { dst: 1, value: 0 });
    let top = b.current_offset() as u32;
    b.emit(Op::Jump { target: top });
    b.emit(Op::ReturnUndefined);
    let func = closure(interp, b, FunctionKind::Generator, 0);
    interp.call_function(&func, &JsValue::Undefined, &[]).unwrap()
}

#[test]
fn test_timeout_applies_to_host_generator_steps() {
    let mut interp = Interpreter::with_config(quick_config(50));
    let generator = spinning_generator(&mut interp);
    let first = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    assert_eq!(first, (JsValue::Int(1), false));

    let started = Instant::now();
    let err = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(err.to_string().contains("timeout"));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Completed));
}

#[test]
fn test_timeout_applies_to_raw_resume() {
    let mut interp = Interpreter::with_config(quick_config(50));
    let generator = spinning_generator(&mut interp);
    interp
        .resume_generator(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();
    let err = interp
        .resume_generator(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
}

#[test]
fn test_host_interrupt_stops_generator_step() {
    let mut interp = Interpreter::with_config(quick_config(0));
    let generator = spinning_generator(&mut interp);
    interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap();

    let handle = interp.interrupt_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.interrupt();
    });
    let err = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap_err();
    stopper.join().unwrap();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    interp.clear_interrupt();
    assert_eq!(interp.generator_status(&generator), Some(GeneratorStatus::Completed));
}
