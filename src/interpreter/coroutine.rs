//! Resumable invocations
//!
//! Generators and async functions share one state machine: a `Coroutine`
//! holds the `SavedVmState` captured at its last suspend point and moves
//! through `NotStarted → Running → (Suspended ⇄ Running) → Completed`.
//! Resuming while `Running` or after `Completed` is rejected, so a body
//! never runs twice from the same state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::compiler::FunctionTemplate;
use crate::error::JsError;
use crate::object::{ExoticObject, JsObject, JsObjectRef};
use crate::value::{CheapClone, JsValue, PropertyKey};

use super::Interpreter;
use super::bytecode_vm::{BytecodeVM, SavedVmState, VmResult};
use super::cycles::{Trace, Tracer};
use super::environment::EnvRef;

/// Lifecycle of a resumable invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    NotStarted,
    Running,
    Suspended,
    Completed,
}

impl fmt::Display for GeneratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeneratorStatus::NotStarted => "suspendedStart",
            GeneratorStatus::Running => "running",
            GeneratorStatus::Suspended => "suspendedYield",
            GeneratorStatus::Completed => "closed",
        };
        f.write_str(name)
    }
}

/// How a suspended body continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// Deliver a value as the result of the suspended expression
    Next,
    /// Throw a value at the suspend point
    Throw,
    /// Return with a value after running pending finally blocks
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineKind {
    Generator,
    Async,
}

/// Outcome of one resumption
#[derive(Debug)]
pub enum CoroutineStep {
    Yielded(JsValue),
    Awaiting(JsValue),
    Returned(JsValue),
}

pub struct Coroutine {
    status: GeneratorStatus,
    /// Present while `NotStarted` or `Suspended`
    state: Option<SavedVmState>,
    name: String,
    kind: CoroutineKind,
}

impl Coroutine {
    pub(crate) fn new(state: SavedVmState, name: String, kind: CoroutineKind) -> Self {
        Self {
            status: GeneratorStatus::NotStarted,
            state: Some(state),
            name,
            kind,
        }
    }

    pub fn status(&self) -> GeneratorStatus {
        self.status
    }

    /// Complete without running any more of the body
    pub(crate) fn close(&mut self) {
        self.status = GeneratorStatus::Completed;
        self.state = None;
    }

    pub fn kind(&self) -> CoroutineKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The coroutine behind a generator object
impl Trace for Coroutine {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(state) = &self.state {
            state.trace(tracer);
        }
    }
}

fn coroutine_of(value: &JsValue) -> Option<Rc<RefCell<Coroutine>>> {
    match &value.as_object()?.borrow().exotic {
        ExoticObject::Generator(co) => Some(co.cheap_clone()),
        _ => None,
    }
}

impl Interpreter {
    /// Run a coroutine until it suspends or completes
    pub(crate) fn resume_coroutine(
        &mut self,
        co: &Rc<RefCell<Coroutine>>,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<CoroutineStep, JsError> {
        let (state, name) = {
            let mut c = co.borrow_mut();
            match c.status {
                GeneratorStatus::Running => {
                    return Err(JsError::type_error("Generator is already running"));
                }
                GeneratorStatus::Completed => {
                    return Err(JsError::type_error("Generator has already completed"));
                }
                GeneratorStatus::NotStarted if action != ResumeAction::Next => {
                    // Nothing has run yet, so there is no handler to see this
                    c.close();
                    tracing::debug!(name = %c.name, ?action, "coroutine closed before start");
                    return match action {
                        ResumeAction::Throw => Err(JsError::Thrown {
                            value,
                            stack: self.capture_stack(),
                        }),
                        _ => Ok(CoroutineStep::Returned(value)),
                    };
                }
                GeneratorStatus::NotStarted | GeneratorStatus::Suspended => {}
            }
            // Too deep to push the body's frame: nothing has run, so the
            // coroutine stays resumable
            self.check_call_depth()?;
            let state = c
                .state
                .take()
                .ok_or_else(|| JsError::defect("suspended coroutine has no saved state"))?;
            c.status = GeneratorStatus::Running;
            (state, c.name.clone())
        };

        tracing::debug!(name = %name, ?action, "coroutine resumed");
        let result = BytecodeVM::resume(self, state, action, value);

        let mut c = co.borrow_mut();
        match result {
            Ok(VmResult::Yield { value, state }) => {
                c.status = GeneratorStatus::Suspended;
                c.state = Some(state);
                tracing::debug!(name = %name, "coroutine yielded");
                Ok(CoroutineStep::Yielded(value))
            }
            Ok(VmResult::Await { value, state }) => {
                c.status = GeneratorStatus::Suspended;
                c.state = Some(state);
                tracing::debug!(name = %name, "coroutine awaiting");
                Ok(CoroutineStep::Awaiting(value))
            }
            Ok(VmResult::Complete(value)) => {
                c.status = GeneratorStatus::Completed;
                tracing::debug!(name = %name, "coroutine completed");
                Ok(CoroutineStep::Returned(value))
            }
            Err(error) => {
                c.status = GeneratorStatus::Completed;
                tracing::debug!(name = %name, kind = ?error.kind(), "coroutine completed with error");
                Err(error)
            }
        }
    }

    /// Create the generator object returned by calling a generator function
    pub(crate) fn create_generator(
        &mut self,
        func_obj: &JsObjectRef,
        template: &Rc<FunctionTemplate>,
        closure: EnvRef,
        this_value: &JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let state = BytecodeVM::initial_state(self, template, closure, this_value.clone(), args)?;
        let name = template
            .name
            .as_ref()
            .map(|n| n.to_rust_string_lossy())
            .unwrap_or_else(|| "<generator>".to_string());
        let proto = match self.get_property(func_obj, &PropertyKey::from("prototype"))? {
            JsValue::Object(proto) => proto,
            _ => self.generator_prototype.cheap_clone(),
        };
        let co = Coroutine::new(state, name, CoroutineKind::Generator);
        let obj = self.alloc(JsObject::new(
            "Generator",
            Some(proto),
            ExoticObject::Generator(Rc::new(RefCell::new(co))),
        ));
        Ok(JsValue::Object(obj))
    }

    /// Status of a generator object, `None` for anything else
    pub fn generator_status(&self, generator: &JsValue) -> Option<GeneratorStatus> {
        coroutine_of(generator).map(|co| co.borrow().status)
    }

    /// Resume a suspended generator exactly once. Unlike the iterator
    /// methods, a completed generator is an error here.
    pub fn resume_generator(
        &mut self,
        generator: &JsValue,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<CoroutineStep, JsError> {
        self.check_realm(generator)?;
        let co = coroutine_of(generator).ok_or_else(|| JsError::type_error("not a generator object"))?;
        self.enter(|interp| interp.resume_coroutine(&co, action, value))
    }

    /// `next` / `return` / `throw` on a generator object from the host: the
    /// next `(value, done)` pair. Runs as a top-level invocation, so the
    /// timeout applies and the job queue is drained afterwards.
    pub fn generator_step(
        &mut self,
        generator: &JsValue,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<(JsValue, bool), JsError> {
        self.check_realm(generator)?;
        self.enter(|interp| interp.step_generator(generator, action, value))
    }

    fn step_generator(
        &mut self,
        generator: &JsValue,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<(JsValue, bool), JsError> {
        let method = match action {
            ResumeAction::Next => "next",
            ResumeAction::Throw => "throw",
            ResumeAction::Return => "return",
        };
        let co = coroutine_of(generator).ok_or_else(|| {
            JsError::type_error(format!("Generator.prototype.{} called on non-generator", method))
        })?;
        if co.borrow().kind != CoroutineKind::Generator {
            return Err(JsError::type_error(format!(
                "Generator.prototype.{} called on non-generator",
                method
            )));
        }

        if co.borrow().status == GeneratorStatus::Completed {
            return match action {
                ResumeAction::Next => Ok((JsValue::Undefined, true)),
                ResumeAction::Return => Ok((value, true)),
                ResumeAction::Throw => Err(JsError::Thrown {
                    value,
                    stack: self.capture_stack(),
                }),
            };
        }

        match self.resume_coroutine(&co, action, value)? {
            CoroutineStep::Yielded(value) => Ok((value, false)),
            CoroutineStep::Returned(value) => Ok((value, true)),
            CoroutineStep::Awaiting(_) => {
                co.borrow_mut().close();
                Err(JsError::syntax_error("await is only valid in async functions"))
            }
        }
    }

    /// Iterator result object for a generator step
    pub(crate) fn generator_method(
        &mut self,
        this: &JsValue,
        action: ResumeAction,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let value = args.first().cloned().unwrap_or_default();
        let (value, done) = self.step_generator(this, action, value)?;
        Ok(self.create_iter_result(value, done))
    }
}
