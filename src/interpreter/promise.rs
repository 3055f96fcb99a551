//! Promises, the job queue and the async function driver
//!
//! Settling a promise never runs handlers synchronously: each reaction is
//! queued as a `Job` and the queue is drained FIFO at checkpoints. An async
//! function is a coroutine whose `await`s subscribe an `AsyncResume`
//! reaction to the awaited promise; its result promise settles once, when
//! the coroutine completes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::compiler::FunctionTemplate;
use crate::error::JsError;
use crate::object::{ExoticObject, JsObject, JsObjectRef};
use crate::value::{CheapClone, JsValue, PropertyKey};

use super::Interpreter;
use super::bytecode_vm::BytecodeVM;
use super::coroutine::{Coroutine, CoroutineKind, CoroutineStep, ResumeAction};
use super::cycles::{Trace, Tracer};
use super::environment::EnvRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for PromiseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromiseStatus::Pending => "pending",
            PromiseStatus::Fulfilled => "fulfilled",
            PromiseStatus::Rejected => "rejected",
        })
    }
}

/// Subscriber to a promise's settlement
pub(crate) enum PromiseReaction {
    /// `promise.then(onFulfilled, onRejected)`; `derived` is the promise
    /// `then` returned
    Then {
        on_fulfilled: Option<JsValue>,
        on_rejected: Option<JsValue>,
        derived: JsObjectRef,
    },
    /// Continue an async function suspended at `await`
    AsyncResume {
        coroutine: Rc<RefCell<Coroutine>>,
        promise: JsObjectRef,
    },
}

pub struct PromiseState {
    status: PromiseStatus,
    value: JsValue,
    /// Set once a resolution has been chosen, even while adopting a
    /// thenable that has not settled yet
    resolved: bool,
    reactions: Vec<PromiseReaction>,
}

impl PromiseState {
    fn new() -> Self {
        Self {
            status: PromiseStatus::Pending,
            value: JsValue::Undefined,
            resolved: false,
            reactions: Vec::new(),
        }
    }

    pub fn status(&self) -> PromiseStatus {
        self.status
    }
}

impl Trace for PromiseState {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.value(&self.value);
        for reaction in &self.reactions {
            match reaction {
                PromiseReaction::Then {
                    on_fulfilled,
                    on_rejected,
                    derived,
                } => {
                    tracer.values(on_fulfilled.iter().chain(on_rejected));
                    tracer.object(derived);
                }
                PromiseReaction::AsyncResume { coroutine, promise } => {
                    tracer.owned(coroutine);
                    tracer.object(promise);
                }
            }
        }
    }
}

/// A unit of deferred work
pub(crate) enum Job {
    Reaction {
        reaction: PromiseReaction,
        status: PromiseStatus,
        value: JsValue,
    },
    /// Call `then` on a thenable with resolving functions for `promise`
    ResolveThenable {
        promise: JsObjectRef,
        thenable: JsValue,
        then: JsValue,
    },
}

fn promise_state_of(obj: &JsObjectRef) -> Option<Rc<RefCell<PromiseState>>> {
    match &obj.borrow().exotic {
        ExoticObject::Promise(state) => Some(state.cheap_clone()),
        _ => None,
    }
}

impl Interpreter {
    /// Create a pending promise
    pub fn new_promise(&mut self) -> JsObjectRef {
        let proto = self.promise_prototype.cheap_clone();
        self.alloc(JsObject::new(
            "Promise",
            Some(proto),
            ExoticObject::Promise(Rc::new(RefCell::new(PromiseState::new()))),
        ))
    }

    /// Status and result of a promise object
    pub fn promise_state(&self, value: &JsValue) -> Option<(PromiseStatus, JsValue)> {
        let state = promise_state_of(value.as_object()?)?;
        let s = state.borrow();
        Some((s.status, s.value.clone()))
    }

    /// Resolve `promise` with `value`, adopting engine promises and
    /// thenables. Later resolutions are ignored.
    pub fn resolve_promise(&mut self, promise: &JsObjectRef, value: JsValue) -> Result<(), JsError> {
        self.check_realm(&value)?;
        let state = promise_state_of(promise).ok_or_else(|| JsError::type_error("Not a promise"))?;
        {
            let mut s = state.borrow_mut();
            if s.resolved {
                return Ok(());
            }
            s.resolved = true;
        }
        self.resolve_unguarded(promise, value)
    }

    fn resolve_unguarded(&mut self, promise: &JsObjectRef, value: JsValue) -> Result<(), JsError> {
        let JsValue::Object(obj) = &value else {
            return self.settle(promise, PromiseStatus::Fulfilled, value);
        };
        if obj.ptr_eq(promise) {
            let error = self.create_error("TypeError", "Chaining cycle detected for promise");
            return self.settle(promise, PromiseStatus::Rejected, JsValue::Object(error));
        }
        let then = match self.get_property(obj, &PropertyKey::from("then")) {
            Ok(then) => then,
            Err(e) if e.is_catchable() => {
                let reason = self.error_to_value(&e);
                return self.settle(promise, PromiseStatus::Rejected, reason);
            }
            Err(e) => return Err(e),
        };
        if !then.is_callable() {
            return self.settle(promise, PromiseStatus::Fulfilled, value);
        }
        self.jobs.push_back(Job::ResolveThenable {
            promise: promise.cheap_clone(),
            thenable: value,
            then,
        });
        Ok(())
    }

    /// Reject `promise` unless a resolution was already chosen
    pub fn reject_promise(&mut self, promise: &JsObjectRef, reason: JsValue) -> Result<(), JsError> {
        self.check_realm(&reason)?;
        let state = promise_state_of(promise).ok_or_else(|| JsError::type_error("Not a promise"))?;
        {
            let mut s = state.borrow_mut();
            if s.resolved {
                return Ok(());
            }
            s.resolved = true;
        }
        self.settle(promise, PromiseStatus::Rejected, reason)
    }

    /// Record the outcome and queue every reaction
    fn settle(&mut self, promise: &JsObjectRef, status: PromiseStatus, value: JsValue) -> Result<(), JsError> {
        let state = promise_state_of(promise).ok_or_else(|| JsError::type_error("Not a promise"))?;
        let reactions = {
            let mut s = state.borrow_mut();
            if s.status != PromiseStatus::Pending {
                return Ok(());
            }
            s.status = status;
            s.value = value.clone();
            std::mem::take(&mut s.reactions)
        };
        for reaction in reactions {
            self.jobs.push_back(Job::Reaction {
                reaction,
                status,
                value: value.clone(),
            });
        }
        Ok(())
    }

    fn add_reaction(&mut self, promise: &JsObjectRef, reaction: PromiseReaction) -> Result<(), JsError> {
        let state = promise_state_of(promise).ok_or_else(|| JsError::type_error("Not a promise"))?;
        let mut s = state.borrow_mut();
        match s.status {
            PromiseStatus::Pending => s.reactions.push(reaction),
            status => self.jobs.push_back(Job::Reaction {
                reaction,
                status,
                value: s.value.clone(),
            }),
        }
        Ok(())
    }

    /// `promise.then(on_fulfilled, on_rejected)`; returns the derived promise
    pub fn promise_then(
        &mut self,
        promise: &JsObjectRef,
        on_fulfilled: Option<JsValue>,
        on_rejected: Option<JsValue>,
    ) -> Result<JsObjectRef, JsError> {
        let derived = self.new_promise();
        self.add_reaction(
            promise,
            PromiseReaction::Then {
                on_fulfilled: on_fulfilled.filter(JsValue::is_callable),
                on_rejected: on_rejected.filter(JsValue::is_callable),
                derived: derived.cheap_clone(),
            },
        )?;
        Ok(derived)
    }

    /// PromiseResolve: engine promises pass through, anything else is
    /// wrapped in a new promise
    pub fn promise_resolve(&mut self, value: JsValue) -> Result<JsObjectRef, JsError> {
        if let JsValue::Object(obj) = &value
            && promise_state_of(obj).is_some()
            && obj.realm() == self.realm_id()
        {
            return Ok(obj.cheap_clone());
        }
        let promise = self.new_promise();
        self.resolve_promise(&promise, value)?;
        Ok(promise)
    }

    /// Run queued jobs until the queue is empty. Errors thrown by handlers
    /// reject derived promises; only fatal errors stop the drain.
    pub(crate) fn drain_jobs(&mut self) -> Result<(), JsError> {
        let mut ran = 0usize;
        while let Some(job) = self.jobs.pop_front() {
            self.check_interrupt()?;
            self.run_job(job)?;
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(jobs = ran, "job queue drained");
        }
        Ok(())
    }

    fn run_job(&mut self, job: Job) -> Result<(), JsError> {
        match job {
            Job::Reaction {
                reaction: PromiseReaction::Then {
                    on_fulfilled,
                    on_rejected,
                    derived,
                },
                status,
                value,
            } => {
                let handler = match status {
                    PromiseStatus::Rejected => on_rejected,
                    _ => on_fulfilled,
                };
                let Some(handler) = handler else {
                    return match status {
                        PromiseStatus::Rejected => self.reject_promise(&derived, value),
                        _ => self.resolve_promise(&derived, value),
                    };
                };
                match self.call(&handler, &JsValue::Undefined, &[value]) {
                    Ok(result) => self.resolve_promise(&derived, result),
                    Err(e) if e.is_catchable() => {
                        let reason = self.error_to_value(&e);
                        self.reject_promise(&derived, reason)
                    }
                    Err(e) => Err(e),
                }
            }
            Job::Reaction {
                reaction: PromiseReaction::AsyncResume { coroutine, promise },
                status,
                value,
            } => {
                let action = match status {
                    PromiseStatus::Rejected => ResumeAction::Throw,
                    _ => ResumeAction::Next,
                };
                self.async_step(&coroutine, &promise, action, value)
            }
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                let called = Rc::new(Cell::new(false));
                let resolve = {
                    let promise = promise.cheap_clone();
                    let called = called.cheap_clone();
                    self.create_native_function("", 1, move |interp, _this, args| {
                        if !called.replace(true) {
                            let value = args.first().cloned().unwrap_or_default();
                            interp.resolve_unguarded(&promise, value)?;
                        }
                        Ok(JsValue::Undefined)
                    })
                };
                let reject = {
                    let promise = promise.cheap_clone();
                    let called = called.cheap_clone();
                    self.create_native_function("", 1, move |interp, _this, args| {
                        if !called.replace(true) {
                            let reason = args.first().cloned().unwrap_or_default();
                            interp.settle(&promise, PromiseStatus::Rejected, reason)?;
                        }
                        Ok(JsValue::Undefined)
                    })
                };
                let args = [JsValue::Object(resolve), JsValue::Object(reject)];
                match self.call(&then, &thenable, &args) {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_catchable() => {
                        if !called.replace(true) {
                            let reason = self.error_to_value(&e);
                            self.settle(&promise, PromiseStatus::Rejected, reason)?;
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Async functions
    // ═══════════════════════════════════════════════════════════════════════════

    /// Call an async function: run its body up to the first `await` and
    /// return the promise for its completion
    pub(crate) fn start_async_function(
        &mut self,
        template: &Rc<FunctionTemplate>,
        closure: EnvRef,
        this_value: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let state = BytecodeVM::initial_state(self, template, closure, this_value, args)?;
        let name = template
            .name
            .as_ref()
            .map(|n| n.to_rust_string_lossy())
            .unwrap_or_else(|| "<async>".to_string());
        let coroutine = Rc::new(RefCell::new(Coroutine::new(state, name, CoroutineKind::Async)));
        let promise = self.new_promise();
        self.async_step(&coroutine, &promise, ResumeAction::Next, JsValue::Undefined)?;
        Ok(JsValue::Object(promise))
    }

    /// Advance an async function by one resumption
    fn async_step(
        &mut self,
        coroutine: &Rc<RefCell<Coroutine>>,
        promise: &JsObjectRef,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<(), JsError> {
        match self.resume_coroutine(coroutine, action, value) {
            Ok(CoroutineStep::Awaiting(awaited)) => {
                let awaited = self.promise_resolve(awaited)?;
                self.add_reaction(
                    &awaited,
                    PromiseReaction::AsyncResume {
                        coroutine: coroutine.cheap_clone(),
                        promise: promise.cheap_clone(),
                    },
                )
            }
            Ok(CoroutineStep::Returned(result)) => {
                tracing::debug!(name = coroutine.borrow().name(), "async function fulfilled");
                self.resolve_promise(promise, result)
            }
            Ok(CoroutineStep::Yielded(_)) => {
                coroutine.borrow_mut().close();
                let error = self.create_error("SyntaxError", "yield is not valid in async functions");
                self.reject_promise(promise, JsValue::Object(error))
            }
            Err(e) if e.is_catchable() => {
                tracing::debug!(name = coroutine.borrow().name(), kind = ?e.kind(), "async function rejected");
                let reason = self.error_to_value(&e);
                self.reject_promise(promise, reason)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reactions_run_in_fifo_order_at_checkpoint() {
        let mut interp = Interpreter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let promise = interp.new_promise();
        for tag in ["a", "b"] {
            let log = log.clone();
            let handler = interp.create_native_function("h", 1, move |_, _, _| {
                log.borrow_mut().push(tag);
                Ok(JsValue::Undefined)
            });
            interp
                .promise_then(&promise, Some(JsValue::Object(handler)), None)
                .unwrap();
        }
        interp.resolve_promise(&promise, JsValue::Int(1)).unwrap();
        assert!(log.borrow().is_empty());
        interp.run_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_handler_error_rejects_derived() {
        let mut interp = Interpreter::new();
        let promise = interp.new_promise();
        let handler =
            interp.create_native_function("h", 1, |_, _, _| Err(JsError::range_error("nope")));
        let derived = interp
            .promise_then(&promise, Some(JsValue::Object(handler)), None)
            .unwrap();
        interp.resolve_promise(&promise, JsValue::Undefined).unwrap();
        interp.run_jobs().unwrap();
        let (status, reason) = interp.promise_state(&JsValue::Object(derived)).unwrap();
        assert_eq!(status, PromiseStatus::Rejected);
        let name = interp
            .get_value_property(&reason, &PropertyKey::from("name"))
            .unwrap();
        assert_eq!(name, JsValue::from("RangeError"));
    }

    #[test]
    fn test_self_resolution_is_rejected() {
        let mut interp = Interpreter::new();
        let promise = interp.new_promise();
        interp
            .resolve_promise(&promise, JsValue::Object(promise.cheap_clone()))
            .unwrap();
        let (status, _) = interp.promise_state(&JsValue::Object(promise)).unwrap();
        assert_eq!(status, PromiseStatus::Rejected);
    }

    #[test]
    fn test_settles_once() {
        let mut interp = Interpreter::new();
        let promise = interp.new_promise();
        interp.reject_promise(&promise, JsValue::Int(1)).unwrap();
        interp.resolve_promise(&promise, JsValue::Int(2)).unwrap();
        let (status, value) = interp.promise_state(&JsValue::Object(promise)).unwrap();
        assert_eq!((status, value), (PromiseStatus::Rejected, JsValue::Int(1)));
    }

    #[test]
    fn test_debug_shows_settlement_status() {
        let mut interp = Interpreter::new();
        let promise = interp.new_promise();
        let pending = format!("{:?}", JsValue::Object(promise.cheap_clone()));
        assert!(pending.contains("pending"), "{pending}");
        interp.resolve_promise(&promise, JsValue::Int(1)).unwrap();
        let fulfilled = format!("{:?}", JsValue::Object(promise));
        assert!(fulfilled.contains("fulfilled"), "{fulfilled}");
    }

    #[test]
    fn test_yield_in_async_body_completes_the_coroutine() {
        use crate::compiler::{FunctionKind, Op, ProgramBuilder};
        use super::super::coroutine::GeneratorStatus;

        let mut interp = Interpreter::new();
        let mut b = ProgramBuilder::named("confused");
        b.emit(Op::Yield { dst: 0, value: 0 });
        b.emit(Op::ReturnUndefined);
        let template = Rc::new(b.finish_function(FunctionKind::Async, 0));
        let closure = interp.global_env.cheap_clone();
        let state =
            BytecodeVM::initial_state(&mut interp, &template, closure, JsValue::Undefined, &[]).unwrap();
        let coroutine = Rc::new(RefCell::new(Coroutine::new(state, "confused".to_string(), CoroutineKind::Async)));
        let promise = interp.new_promise();
        interp
            .async_step(&coroutine, &promise, ResumeAction::Next, JsValue::Undefined)
            .unwrap();

        assert_eq!(coroutine.borrow().status(), GeneratorStatus::Completed);
        let (status, _) = interp.promise_state(&JsValue::Object(promise)).unwrap();
        assert_eq!(status, PromiseStatus::Rejected);
    }
}
