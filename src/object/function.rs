//! Callable object payloads

use std::fmt;
use std::rc::Rc;

use crate::compiler::{FunctionKind, FunctionTemplate};
use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::interpreter::environment::EnvRef;
use crate::string::JsString;
use crate::value::JsValue;

use super::JsObjectRef;

/// Signature of a native function: `(interpreter, this, arguments)`
pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError>>;

pub enum JsFunction {
    /// Closure over compiled bytecode
    Bytecode(BytecodeFunction),
    /// Host function registered through the object model
    Native(NativeFunction),
    /// `Function.prototype.bind` result
    Bound(Box<BoundFunctionData>),
}

pub struct BytecodeFunction {
    pub template: Rc<FunctionTemplate>,
    pub closure: EnvRef,
    /// Arrow functions capture the `this` of the frame that created them
    pub captured_this: Option<JsValue>,
}

pub struct NativeFunction {
    pub name: JsString,
    pub arity: u32,
    pub func: NativeFn,
    pub constructor: bool,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

pub struct BoundFunctionData {
    pub target: JsObjectRef,
    pub this_arg: JsValue,
    pub bound_args: Vec<JsValue>,
}

impl JsFunction {
    pub fn debug_name(&self) -> String {
        match self {
            JsFunction::Bytecode(f) => f
                .template
                .name
                .as_ref()
                .map(|n| n.to_rust_string_lossy())
                .unwrap_or_else(|| "anonymous".to_string()),
            JsFunction::Native(f) => f.name.to_rust_string_lossy(),
            JsFunction::Bound(_) => "bound".to_string(),
        }
    }

    /// Whether `new` may target this function. Bound functions defer to
    /// their target, which the interpreter checks.
    pub fn is_constructor(&self) -> bool {
        match self {
            JsFunction::Bytecode(f) => f.template.kind == FunctionKind::Normal,
            JsFunction::Native(f) => f.constructor,
            JsFunction::Bound(bound) => bound.target.is_constructor(),
        }
    }
}
