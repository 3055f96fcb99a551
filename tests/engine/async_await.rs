//! Async functions, promise reactions and the job queue

use std::cell::RefCell;
use std::rc::Rc;

use ecmarun::compiler::FunctionKind;
use ecmarun::{CheapClone, Interpreter, JsError, JsValue, Op, ProgramBuilder, PromiseStatus, PropertyKey, ResumeAction};

use super::closure;

fn settled(interp: &Interpreter, promise: &JsValue) -> (PromiseStatus, JsValue) {
    interp.promise_state(promise).unwrap()
}

/// async function (x) { const v = await x; return v + 1 }
fn add_one_after_await() -> ProgramBuilder {
    let mut b = ProgramBuilder::named("addOne");
    b.emit(Op::Await { dst: 1, promise: 0 });
    b.emit(Op::LoadInt { dst: 2, value: 1 });
    b.emit(Op::Add { dst: 3, left: 1, right: 2 });
    b.emit(Op::Return { value: 3 });
    b
}

#[test]
fn test_await_plain_value_fulfills_at_checkpoint() {
    super::init_tracing();
    let mut interp = Interpreter::new();
    let func = closure(&mut interp, add_one_after_await(), FunctionKind::Async, 1);
    let promise = interp
        .call_function(&func, &JsValue::Undefined, &[JsValue::Int(41)])
        .unwrap();
    assert_eq!(settled(&interp, &promise), (PromiseStatus::Fulfilled, JsValue::Int(42)));
}

#[test]
fn test_await_engine_promise_waits_for_resolution() {
    let mut interp = Interpreter::new();
    let func = closure(&mut interp, add_one_after_await(), FunctionKind::Async, 1);
    let pending = interp.new_promise();
    let result = interp
        .call_function(&func, &JsValue::Undefined, &[JsValue::Object(pending.cheap_clone())])
        .unwrap();
    assert_eq!(settled(&interp, &result).0, PromiseStatus::Pending);

    interp.resolve_promise(&pending, JsValue::Int(9)).unwrap();
    interp.run_jobs().unwrap();
    assert_eq!(settled(&interp, &result), (PromiseStatus::Fulfilled, JsValue::Int(10)));
}

#[test]
fn test_rejected_await_is_catchable() {
    // async function (p) { try { await p } catch (e) { return e } }
    let mut b = ProgramBuilder::named("guarded");
    let try_idx = b.emit_push_try();
    b.emit(Op::Await { dst: 1, promise: 0 });
    b.emit(Op::PopTry);
    b.emit(Op::ReturnUndefined);
    let catch_ip = b.current_offset() as u32;
    b.emit(Op::GetException { dst: 2 });
    b.emit(Op::Return { value: 2 });
    b.patch_try_targets(try_idx, catch_ip, 0);

    let mut interp = Interpreter::new();
    let func = closure(&mut interp, b, FunctionKind::Async, 1);
    let rejected = interp.new_promise();
    interp.reject_promise(&rejected, JsValue::from("no")).unwrap();
    let result = interp
        .call_function(&func, &JsValue::Undefined, &[JsValue::Object(rejected)])
        .unwrap();
    assert_eq!(settled(&interp, &result), (PromiseStatus::Fulfilled, JsValue::from("no")));
}

#[test]
fn test_uncaught_error_rejects_with_error_object() {
    // async function () { await 0; null.x }
    let mut b = ProgramBuilder::named("broken");
    b.emit(Op::LoadInt { dst: 0, value: 0 });
    b.emit(Op::Await { dst: 0, promise: 0 });
    b.emit(Op::LoadNull { dst: 1 });
    b.emit_get_named(2, 1, "x").unwrap();
    b.emit(Op::ReturnUndefined);

    let mut interp = Interpreter::new();
    let func = closure(&mut interp, b, FunctionKind::Async, 0);
    let result = interp.call_function(&func, &JsValue::Undefined, &[]).unwrap();
    let (status, reason) = settled(&interp, &result);
    assert_eq!(status, PromiseStatus::Rejected);
    let reason = reason.as_object().unwrap().cheap_clone();
    assert_eq!(
        interp.get_property(&reason, &PropertyKey::from("name")).unwrap(),
        JsValue::from("TypeError")
    );
}

#[test]
fn test_async_functions_interleave_at_await_points() {
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let mut interp = Interpreter::new();
    let sink = log.clone();
    let record = interp.create_native_function("record", 1, move |interp, _, args| {
        let text = interp.to_js_string(&args.first().cloned().unwrap_or_default())?;
        sink.borrow_mut().push(text.to_rust_string_lossy());
        Ok(JsValue::Undefined)
    });
    interp.set_global("record", JsValue::Object(record)).unwrap();

    // async function () { record(tag + 1); await 0; record(tag + 2) }
    let make = |interp: &mut Interpreter, tag: &str| {
        let mut b = ProgramBuilder::named(tag);
        b.emit_get_var(0, "record").unwrap();
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit_load_string(2, &format!("{}1", tag)).unwrap();
        b.emit(Op::Call { dst: 3, callee: 0, this: 1, args: 2, argc: 1 });
        b.emit(Op::LoadInt { dst: 4, value: 0 });
        b.emit(Op::Await { dst: 4, promise: 4 });
        b.emit_load_string(2, &format!("{}2", tag)).unwrap();
        b.emit(Op::Call { dst: 3, callee: 0, this: 1, args: 2, argc: 1 });
        b.emit(Op::ReturnUndefined);
        closure(interp, b, FunctionKind::Async, 0)
    };
    let a = make(&mut interp, "a");
    let b_fn = make(&mut interp, "b");
    interp.set_global("A", a).unwrap();
    interp.set_global("B", b_fn).unwrap();

    // A(); B();
    let mut script = ProgramBuilder::new();
    script.emit(Op::LoadUndefined { dst: 1 });
    script.emit_get_var(0, "A").unwrap();
    script.emit(Op::Call { dst: 2, callee: 0, this: 1, args: 3, argc: 0 });
    script.emit_get_var(0, "B").unwrap();
    script.emit(Op::Call { dst: 2, callee: 0, this: 1, args: 3, argc: 0 });
    script.emit(Op::ReturnUndefined);
    interp.execute(Rc::new(script.finish())).unwrap();

    assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn test_then_handlers_chain() {
    let mut interp = Interpreter::new();
    let source = interp.new_promise();
    let double = interp.create_native_function("double", 1, |interp, _, args| {
        let n = interp.to_number(&args.first().cloned().unwrap_or_default())?;
        Ok(JsValue::number(n * 2.0))
    });
    let derived = interp
        .promise_then(&source, Some(JsValue::Object(double)), None)
        .unwrap();
    interp.resolve_promise(&source, JsValue::Int(21)).unwrap();
    assert_eq!(
        settled(&interp, &JsValue::Object(derived.cheap_clone())).0,
        PromiseStatus::Pending
    );
    interp.run_jobs().unwrap();
    assert_eq!(
        settled(&interp, &JsValue::Object(derived)),
        (PromiseStatus::Fulfilled, JsValue::Int(42))
    );
}

#[test]
fn test_thenable_is_adopted() {
    let mut interp = Interpreter::new();
    let thenable = interp.create_object();
    interp.register_method(&thenable, "then", 2, |interp, _, args| {
        let resolve = args.first().cloned().unwrap_or_default();
        interp.call(&resolve, &JsValue::Undefined, &[JsValue::from("adopted")])?;
        interp.call(&resolve, &JsValue::Undefined, &[JsValue::from("ignored")])?;
        Ok(JsValue::Undefined)
    });
    let promise = interp.new_promise();
    interp
        .resolve_promise(&promise, JsValue::Object(thenable))
        .unwrap();
    interp.run_jobs().unwrap();
    assert_eq!(
        settled(&interp, &JsValue::Object(promise)),
        (PromiseStatus::Fulfilled, JsValue::from("adopted"))
    );
}

#[test]
fn test_await_inside_generator_is_a_syntax_error() {
    let mut b = ProgramBuilder::named("confused");
    b.emit(Op::Await { dst: 0, promise: 0 });
    b.emit(Op::ReturnUndefined);

    let mut interp = Interpreter::new();
    let func = closure(&mut interp, b, FunctionKind::Generator, 0);
    let generator = interp.call_function(&func, &JsValue::Undefined, &[]).unwrap();
    let err = interp
        .generator_step(&generator, ResumeAction::Next, JsValue::Undefined)
        .unwrap_err();
    assert!(matches!(err, JsError::SyntaxError { .. }));
}

#[test]
fn test_yield_inside_async_function_rejects() {
    let mut b = ProgramBuilder::named("confused");
    b.emit(Op::Yield { dst: 0, value: 0 });
    b.emit(Op::ReturnUndefined);

    let mut interp = Interpreter::new();
    let func = closure(&mut interp, b, FunctionKind::Async, 0);
    let promise = interp.call_function(&func, &JsValue::Undefined, &[]).unwrap();
    let (status, reason) = settled(&interp, &promise);
    assert_eq!(status, PromiseStatus::Rejected);
    let reason = reason.as_object().unwrap().cheap_clone();
    assert_eq!(
        interp.get_property(&reason, &PropertyKey::from("name")).unwrap(),
        JsValue::from("SyntaxError")
    );
}
