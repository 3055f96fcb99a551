//! Integration tests for the engine, organized by feature
//!
//! Programs are assembled with `ProgramBuilder`; the tests only use the
//! public API.

mod async_await;
mod calls;
mod config;
mod equality;
mod generator;
mod interop;
mod interrupt;
mod object_model;
mod proxy;
mod weak;

use std::rc::Rc;

use ecmarun::compiler::FunctionKind;
use ecmarun::object::{BytecodeFunction, JsFunction};
use ecmarun::{CheapClone, Interpreter, JsError, JsValue, ProgramBuilder};

/// Run a top-level program in a fresh interpreter
pub fn run(b: ProgramBuilder) -> Result<JsValue, JsError> {
    let mut interp = Interpreter::new();
    interp.execute(Rc::new(b.finish()))
}

/// Instantiate a function body as a closure over the global scope
pub fn closure(interp: &mut Interpreter, b: ProgramBuilder, kind: FunctionKind, params: u8) -> JsValue {
    let template = Rc::new(b.finish_function(kind, params));
    let func = interp.create_function(JsFunction::Bytecode(BytecodeFunction {
        template,
        closure: interp.global_env.cheap_clone(),
        captured_this: None,
    }));
    JsValue::Object(func)
}

/// Install the test's tracing subscriber once; `RUST_LOG` selects events
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
