//! Embeddable ECMAScript value model and suspendable execution engine
//!
//! The crate provides the value representation, the prototype-based object
//! model and a register VM that runs ordinary functions, generators and
//! async functions on one logical call stack. Source parsing is out of
//! scope: programs arrive as bytecode, built with [`ProgramBuilder`] or by
//! an external compiler.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use ecmarun::{Interpreter, JsValue, Op, ProgramBuilder};
//!
//! let mut interp = Interpreter::new();
//! let mut b = ProgramBuilder::new();
//! b.emit(Op::LoadInt { dst: 0, value: 40 });
//! b.emit(Op::LoadInt { dst: 1, value: 2 });
//! b.emit(Op::Add { dst: 2, left: 0, right: 1 });
//! b.emit(Op::Return { value: 2 });
//! let result = interp.execute(Rc::new(b.finish())).unwrap();
//! assert_eq!(result, JsValue::Int(42));
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod interop;
pub mod interpreter;
pub mod number;
pub mod object;
pub mod prelude;
pub mod string;
pub mod value;

pub use compiler::{BytecodeChunk, FunctionKind, FunctionTemplate, Op, ProgramBuilder};
pub use config::EngineConfig;
pub use error::{ErrorKind, JsError, StackFrame};
pub use interop::HostValue;
pub use interpreter::coroutine::{CoroutineStep, GeneratorStatus, ResumeAction};
pub use interpreter::promise::PromiseStatus;
pub use interpreter::{InterruptHandle, Interpreter};
pub use object::{JsObject, JsObjectRef, Property, PropertyDescriptor};
pub use string::JsString;
pub use value::{CheapClone, JsSymbol, JsValue, PropertyKey};
