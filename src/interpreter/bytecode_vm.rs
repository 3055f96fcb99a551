//! Bytecode Virtual Machine
//!
//! This module implements the bytecode interpreter that executes compiled bytecode.
//! It uses a register-based design with up to 256 virtual registers per call frame.
//!
//! Bytecode-to-bytecode calls push frames inside one VM instead of recursing
//! on the host stack. Generator and async bodies run in a VM holding exactly
//! one frame, which is what lets a suspend point package the frame, its
//! registers and its handler regions into a `SavedVmState`.

use std::rc::Rc;

use crate::compiler::{BytecodeChunk, Constant, FunctionKind, FunctionTemplate, Op, Register};
use crate::error::JsError;
use crate::object::{BytecodeFunction, JsFunction, JsObjectRef, PropertyDescriptor};
use crate::string::JsString;
use crate::value::{CheapClone, JsValue, PropertyKey};

use super::convert::NumericOp;
use super::coroutine::ResumeAction;
use super::cycles::{Trace, Tracer};
use super::environment::{self, EnvRef};
use super::{CallSite, Interpreter};

/// Result of VM execution
pub enum VmResult {
    /// Execution completed with a value
    Complete(JsValue),
    /// A generator body yielded
    Yield { value: JsValue, state: SavedVmState },
    /// An async body is waiting on a value
    Await { value: JsValue, state: SavedVmState },
}

/// How control entered a finally block
#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Normal,
    Return(JsValue),
    Throw(JsError),
}

/// Exception handler for try/catch/finally
#[derive(Debug, Clone)]
pub(crate) struct TryHandler {
    /// Instruction pointer for catch block (0 = no catch)
    catch_ip: usize,
    /// Instruction pointer for finally block (0 = no finally)
    finally_ip: usize,
    /// Call frame depth at time of push
    frame_depth: usize,
    /// Scope to restore when the handler runs
    env: EnvRef,
    /// Number of finally completions of the frame at time of push
    completion_depth: usize,
}

/// A call frame in the VM
#[derive(Clone)]
pub(crate) struct Frame {
    chunk: Rc<BytecodeChunk>,
    ip: usize,
    /// Base register index in the register file
    base: usize,
    env: EnvRef,
    this_value: JsValue,
    /// Register of the calling frame that receives the return value
    return_register: Register,
    /// Set for `new`: a non-object return value is replaced by this object
    construct_this: Option<JsObjectRef>,
    /// Completions of the finally blocks currently executing, innermost last
    completions: Vec<Completion>,
    name: String,
}

/// Saved VM state for suspension/resumption
pub struct SavedVmState {
    frame: Frame,
    registers: Vec<JsValue>,
    try_stack: Vec<TryHandler>,
    /// Handler-region depth recorded at the suspend point
    try_depth: usize,
    /// Register receiving the value passed to `next()`; `None` before the
    /// first resume
    resume_register: Option<Register>,
    exception_value: Option<JsValue>,
}

impl Trace for SavedVmState {
    fn trace(&self, tracer: &mut Tracer) {
        let frame = &self.frame;
        tracer.scope(&frame.env);
        tracer.value(&frame.this_value);
        if let Some(this) = &frame.construct_this {
            tracer.object(this);
        }
        for completion in &frame.completions {
            match completion {
                Completion::Normal => {}
                Completion::Return(value) => tracer.value(value),
                Completion::Throw(error) => tracer.error(error),
            }
        }
        tracer.values(&self.registers);
        for handler in &self.try_stack {
            tracer.scope(&handler.env);
        }
        if let Some(exception) = &self.exception_value {
            tracer.value(exception);
        }
    }
}

impl SavedVmState {
    /// Check that the state can be resumed exactly as it was captured
    pub fn validate(&self) -> Result<(), JsError> {
        let frame = &self.frame;
        let code_len = frame.chunk.code.len();
        if frame.base != 0 {
            return Err(JsError::defect(format!("saved frame has base {}", frame.base)));
        }
        if self.registers.len() < usize::from(frame.chunk.register_count).max(1) {
            return Err(JsError::defect(format!(
                "saved register file has {} slots, chunk needs {}",
                self.registers.len(),
                frame.chunk.register_count
            )));
        }
        if frame.ip > code_len {
            return Err(JsError::defect(format!(
                "saved instruction pointer {} is past the end of the chunk ({})",
                frame.ip, code_len
            )));
        }
        if self.try_depth != self.try_stack.len() {
            return Err(JsError::defect(format!(
                "saved handler depth {} does not match {} handlers",
                self.try_depth,
                self.try_stack.len()
            )));
        }
        for handler in &self.try_stack {
            if handler.frame_depth != 1
                || handler.catch_ip > code_len
                || handler.finally_ip > code_len
                || handler.completion_depth > frame.completions.len()
            {
                return Err(JsError::defect("saved try handler does not belong to the suspended frame"));
            }
        }
        if let Some(register) = self.resume_register
            && usize::from(register) >= self.registers.len()
        {
            return Err(JsError::defect(format!("resume register r{} out of range", register)));
        }
        Ok(())
    }

    /// Number of try regions open at the suspend point
    pub fn try_depth(&self) -> usize {
        self.try_depth
    }

    /// Instruction offset the state resumes at
    pub fn resume_offset(&self) -> usize {
        self.frame.ip
    }
}

/// Result of executing a single opcode
enum Step {
    Continue,
    Done(JsValue),
    Yield { value: JsValue, resume_register: Register },
    Await { value: JsValue, resume_register: Register },
}

/// The bytecode virtual machine
pub struct BytecodeVM {
    frames: Vec<Frame>,
    /// Register file shared by all frames
    registers: Vec<JsValue>,
    /// Exception handler stack
    try_stack: Vec<TryHandler>,
    /// Current exception value (for catch blocks)
    exception_value: Option<JsValue>,
    /// Generator and async bodies may suspend
    suspendable: bool,
    /// Diagnostic stack depth when this VM started; frame `i` owns
    /// `call_stack[stack_base + i]`
    stack_base: usize,
}

/// `this` as seen by the callee. Sloppy functions replace nullish `this`
/// with the global object and box primitives.
fn bind_this(interp: &mut Interpreter, template: &FunctionTemplate, this_value: JsValue) -> Result<JsValue, JsError> {
    if template.kind == FunctionKind::Arrow || template.chunk.strict {
        return Ok(this_value);
    }
    match this_value {
        JsValue::Undefined | JsValue::Null => Ok(JsValue::Object(interp.global.cheap_clone())),
        JsValue::Object(obj) => Ok(JsValue::Object(obj)),
        primitive => Ok(JsValue::Object(interp.to_object(&primitive)?)),
    }
}

fn frame_name(template: &FunctionTemplate) -> String {
    template
        .name
        .as_ref()
        .filter(|n| !n.is_empty())
        .map(|n| n.to_rust_string_lossy())
        .unwrap_or_else(|| "<anonymous>".to_string())
}

/// Register file for a fresh frame with arguments copied into the
/// parameter registers
fn frame_registers(template: &FunctionTemplate, args: &[JsValue]) -> Vec<JsValue> {
    let count = usize::from(template.chunk.register_count)
        .max(usize::from(template.param_count))
        .max(1);
    let mut registers = vec![JsValue::Undefined; count];
    for (slot, arg) in registers
        .iter_mut()
        .zip(args.iter())
        .take(usize::from(template.param_count))
    {
        *slot = arg.clone();
    }
    registers
}

/// Bytecode functions that run as frames of the calling VM
fn inline_callee(callee: &JsValue) -> Option<(Rc<FunctionTemplate>, EnvRef)> {
    let JsValue::Object(obj) = callee else {
        return None;
    };
    match &obj.borrow().exotic {
        crate::object::ExoticObject::Function(JsFunction::Bytecode(f))
            if matches!(f.template.kind, FunctionKind::Normal | FunctionKind::Arrow) =>
        {
            Some((f.template.cheap_clone(), f.closure.cheap_clone()))
        }
        _ => None,
    }
}

fn captured_this(callee: &JsValue) -> Option<JsValue> {
    match &callee.as_object()?.borrow().exotic {
        crate::object::ExoticObject::Function(JsFunction::Bytecode(f)) => f.captured_this.clone(),
        _ => None,
    }
}

impl BytecodeVM {
    /// VM for a top-level program
    pub fn new(
        interp: &mut Interpreter,
        chunk: Rc<BytecodeChunk>,
        env: EnvRef,
        this_value: JsValue,
        args: &[JsValue],
        name: String,
    ) -> Result<Self, JsError> {
        let stack_base = interp.call_stack.len();
        interp.push_call_site(CallSite {
            function_name: name.clone(),
            chunk: Some(chunk.cheap_clone()),
            ip: 0,
        })?;
        let mut registers = vec![JsValue::Undefined; usize::from(chunk.register_count).max(1)];
        for (slot, arg) in registers.iter_mut().zip(args.iter()) {
            *slot = arg.clone();
        }
        Ok(Self {
            frames: vec![Frame {
                chunk,
                ip: 0,
                base: 0,
                env,
                this_value,
                return_register: 0,
                construct_this: None,
                completions: Vec::new(),
                name,
            }],
            registers,
            try_stack: Vec::new(),
            exception_value: None,
            suspendable: false,
            stack_base,
        })
    }

    /// VM running one call of a bytecode function
    pub fn for_function(
        interp: &mut Interpreter,
        _func_obj: &JsObjectRef,
        template: &Rc<FunctionTemplate>,
        closure: EnvRef,
        this_value: JsValue,
        args: &[JsValue],
        construct_this: Option<JsObjectRef>,
    ) -> Result<Self, JsError> {
        let this_value = bind_this(interp, template, this_value)?;
        let name = frame_name(template);
        let stack_base = interp.call_stack.len();
        interp.push_call_site(CallSite {
            function_name: name.clone(),
            chunk: Some(template.chunk.cheap_clone()),
            ip: 0,
        })?;
        Ok(Self {
            frames: vec![Frame {
                chunk: template.chunk.cheap_clone(),
                ip: 0,
                base: 0,
                env: environment::new_scope(Some(closure)),
                this_value,
                return_register: 0,
                construct_this,
                completions: Vec::new(),
                name,
            }],
            registers: frame_registers(template, args),
            try_stack: Vec::new(),
            exception_value: None,
            suspendable: false,
            stack_base,
        })
    }

    /// Suspended state of a generator or async body that has not started
    pub(crate) fn initial_state(
        interp: &mut Interpreter,
        template: &Rc<FunctionTemplate>,
        closure: EnvRef,
        this_value: JsValue,
        args: &[JsValue],
    ) -> Result<SavedVmState, JsError> {
        let this_value = bind_this(interp, template, this_value)?;
        Ok(SavedVmState {
            frame: Frame {
                chunk: template.chunk.cheap_clone(),
                ip: 0,
                base: 0,
                env: environment::new_scope(Some(closure)),
                this_value,
                return_register: 0,
                construct_this: None,
                completions: Vec::new(),
                name: frame_name(template),
            },
            registers: frame_registers(template, args),
            try_stack: Vec::new(),
            try_depth: 0,
            resume_register: None,
            exception_value: None,
        })
    }

    /// Resume a suspended body: deliver `value` as the result of the
    /// suspended expression, throw it at the suspend point, or return with
    /// it after running the pending finally blocks
    pub(crate) fn resume(
        interp: &mut Interpreter,
        state: SavedVmState,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<VmResult, JsError> {
        state.validate()?;
        let stack_base = interp.call_stack.len();
        interp.push_call_site(CallSite {
            function_name: state.frame.name.clone(),
            chunk: Some(state.frame.chunk.cheap_clone()),
            ip: state.frame.ip,
        })?;

        let mut vm = Self {
            frames: vec![state.frame],
            registers: state.registers,
            try_stack: state.try_stack,
            exception_value: state.exception_value,
            suspendable: true,
            stack_base,
        };

        let result = vm.resume_with(interp, state.resume_register, action, value);
        interp.call_stack.truncate(stack_base);
        result
    }

    fn resume_with(
        &mut self,
        interp: &mut Interpreter,
        resume_register: Option<Register>,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<VmResult, JsError> {
        match action {
            ResumeAction::Next => {
                if let Some(register) = resume_register {
                    self.set_reg(register, value)?;
                }
            }
            ResumeAction::Throw => {
                let error = JsError::Thrown {
                    value,
                    stack: interp.capture_stack(),
                };
                self.handle_exception(interp, error)?;
            }
            ResumeAction::Return => match self.execute_return(interp, value)? {
                Step::Done(value) => return Ok(VmResult::Complete(value)),
                Step::Continue => {}
                Step::Yield { .. } | Step::Await { .. } => {
                    return Err(JsError::defect("return completion produced a suspension"));
                }
            },
        }
        self.run(interp)
    }

    /// Run until the outermost frame returns. Suspension is not allowed.
    pub fn run_to_completion(&mut self, interp: &mut Interpreter) -> Result<JsValue, JsError> {
        let result = self.run(interp);
        interp.call_stack.truncate(self.stack_base);
        match result? {
            VmResult::Complete(value) => Ok(value),
            VmResult::Yield { .. } | VmResult::Await { .. } => {
                Err(JsError::defect("suspension in a non-resumable frame"))
            }
        }
    }

    /// Execute bytecode until completion, suspension, or an uncaught error
    fn run(&mut self, interp: &mut Interpreter) -> Result<VmResult, JsError> {
        loop {
            interp.tick()?;
            let step = match self.step(interp) {
                Ok(step) => step,
                Err(error) => {
                    self.handle_exception(interp, error)?;
                    continue;
                }
            };
            match step {
                Step::Continue => {}
                Step::Done(value) => return Ok(VmResult::Complete(value)),
                Step::Yield {
                    value,
                    resume_register,
                } => {
                    let state = self.save_state(interp, resume_register)?;
                    return Ok(VmResult::Yield { value, state });
                }
                Step::Await {
                    value,
                    resume_register,
                } => {
                    let state = self.save_state(interp, resume_register)?;
                    return Ok(VmResult::Await { value, state });
                }
            }
        }
    }

    /// Fetch, advance and execute one instruction
    fn step(&mut self, interp: &mut Interpreter) -> Result<Step, JsError> {
        let depth = self.frames.len();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| JsError::defect("VM has no active frame"))?;
        let Some(op) = frame.chunk.get(frame.ip).cloned() else {
            return self.execute_return(interp, JsValue::Undefined);
        };
        frame.ip += 1;
        let ip = frame.ip;
        if let Some(site) = interp.call_stack.get_mut(self.stack_base + depth - 1) {
            site.ip = ip;
        }
        self.execute_op(interp, op)
    }

    /// Find a handler for `error`, unwinding frames on the way. Errors
    /// that are not catchable, or find no handler, are returned.
    fn handle_exception(&mut self, interp: &mut Interpreter, error: JsError) -> Result<(), JsError> {
        if !error.is_catchable() || self.try_stack.is_empty() {
            return Err(error);
        }
        let value = interp.error_to_value(&error);

        while let Some(handler) = self.try_stack.pop() {
            while self.frames.len() > handler.frame_depth {
                self.pop_frame(interp)?;
            }
            let Some(frame) = self.frames.last_mut() else {
                break;
            };
            frame.env = handler.env.cheap_clone();
            frame.completions.truncate(handler.completion_depth);

            if handler.catch_ip > 0 {
                if handler.finally_ip > 0 {
                    // The finally block still runs after the catch block
                    self.try_stack.push(TryHandler {
                        catch_ip: 0,
                        ..handler.clone()
                    });
                }
                frame.ip = handler.catch_ip;
                self.exception_value = Some(value);
                return Ok(());
            }
            if handler.finally_ip > 0 {
                frame.completions.push(Completion::Throw(error));
                frame.ip = handler.finally_ip;
                return Ok(());
            }
        }
        Err(error)
    }

    /// Execute a return, running any pending finally blocks first
    fn execute_return(&mut self, interp: &mut Interpreter, value: JsValue) -> Result<Step, JsError> {
        let depth = self.frames.len();

        if let Some(idx) = self
            .try_stack
            .iter()
            .rposition(|h| h.frame_depth == depth && h.finally_ip != 0)
        {
            let handler = self
                .try_stack
                .get(idx)
                .cloned()
                .ok_or_else(|| JsError::defect("missing try handler"))?;
            self.try_stack.truncate(idx);
            let frame = self.frame_mut()?;
            frame.completions.truncate(handler.completion_depth);
            frame.completions.push(Completion::Return(value));
            frame.env = handler.env;
            frame.ip = handler.finally_ip;
            return Ok(Step::Continue);
        }

        while self.try_stack.last().is_some_and(|h| h.frame_depth == depth) {
            self.try_stack.pop();
        }
        let frame = self.pop_frame(interp)?;
        let value = match frame.construct_this {
            Some(this_obj) if !value.is_object() => JsValue::Object(this_obj),
            _ => value,
        };
        if self.frames.is_empty() {
            return Ok(Step::Done(value));
        }
        self.set_reg(frame.return_register, value)?;
        Ok(Step::Continue)
    }

    fn pop_frame(&mut self, interp: &mut Interpreter) -> Result<Frame, JsError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| JsError::defect("frame stack underflow"))?;
        self.registers.truncate(frame.base);
        interp.call_stack.truncate(self.stack_base + self.frames.len());
        Ok(frame)
    }

    /// Push an in-VM frame for a bytecode call
    #[allow(clippy::too_many_arguments)]
    fn push_frame(
        &mut self,
        interp: &mut Interpreter,
        template: Rc<FunctionTemplate>,
        closure: EnvRef,
        this_value: JsValue,
        args: &[JsValue],
        return_register: Register,
        construct_this: Option<JsObjectRef>,
    ) -> Result<(), JsError> {
        let this_value = bind_this(interp, &template, this_value)?;
        let name = frame_name(&template);
        interp.push_call_site(CallSite {
            function_name: name.clone(),
            chunk: Some(template.chunk.cheap_clone()),
            ip: 0,
        })?;
        let base = self.registers.len();
        self.registers.extend(frame_registers(&template, args));
        self.frames.push(Frame {
            chunk: template.chunk.cheap_clone(),
            ip: 0,
            base,
            env: environment::new_scope(Some(closure)),
            this_value,
            return_register,
            construct_this,
            completions: Vec::new(),
            name,
        });
        Ok(())
    }

    fn save_state(&mut self, interp: &mut Interpreter, resume_register: Register) -> Result<SavedVmState, JsError> {
        if self.frames.len() != 1 {
            return Err(JsError::defect("suspension with nested frames"));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| JsError::defect("VM has no active frame"))?;
        let try_stack = std::mem::take(&mut self.try_stack);
        interp.call_stack.truncate(self.stack_base);
        Ok(SavedVmState {
            frame,
            registers: std::mem::take(&mut self.registers),
            try_depth: try_stack.len(),
            try_stack,
            resume_register: Some(resume_register),
            exception_value: self.exception_value.take(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Registers and constants
    // ═══════════════════════════════════════════════════════════════════════════

    fn frame(&self) -> Result<&Frame, JsError> {
        self.frames
            .last()
            .ok_or_else(|| JsError::defect("VM has no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, JsError> {
        self.frames
            .last_mut()
            .ok_or_else(|| JsError::defect("VM has no active frame"))
    }

    /// Get register value
    #[inline]
    fn reg(&self, r: Register) -> JsValue {
        let base = self.frames.last().map_or(0, |f| f.base);
        self.registers
            .get(base + usize::from(r))
            .cloned()
            .unwrap_or_default()
    }

    /// Set register value
    #[inline]
    fn set_reg(&mut self, r: Register, value: JsValue) -> Result<(), JsError> {
        let base = self.frames.last().map_or(0, |f| f.base);
        match self.registers.get_mut(base + usize::from(r)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(JsError::defect(format!("register r{} out of range", r))),
        }
    }

    fn reg_range(&self, start: Register, count: u8) -> Vec<JsValue> {
        (0..count)
            .map(|i| self.reg(start.saturating_add(i)))
            .collect()
    }

    fn constant(&self, idx: u16) -> Result<Constant, JsError> {
        self.frame()?
            .chunk
            .get_constant(idx)
            .cloned()
            .ok_or_else(|| JsError::defect(format!("constant #{} out of range", idx)))
    }

    fn string_constant(&self, idx: u16) -> Result<JsString, JsError> {
        match self.constant(idx)? {
            Constant::String(s) => Ok(s),
            _ => Err(JsError::defect(format!("constant #{} is not a string", idx))),
        }
    }

    fn strict(&self) -> bool {
        self.frames.last().is_some_and(|f| f.chunk.strict)
    }

    fn jump(&mut self, target: u32) -> Result<Step, JsError> {
        self.frame_mut()?.ip = target as usize;
        Ok(Step::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Instructions
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute a single opcode
    fn execute_op(&mut self, interp: &mut Interpreter, op: Op) -> Result<Step, JsError> {
        match op {
            // Constants & Register Operations
            Op::LoadConst { dst, idx } => {
                let value = match self.constant(idx)? {
                    Constant::String(s) => JsValue::String(s),
                    Constant::Number(n) => JsValue::number(n),
                    Constant::Int(i) => JsValue::from(i),
                    Constant::Function(_) => {
                        return Err(JsError::defect("function constant loaded as a value"));
                    }
                };
                self.set_reg(dst, value)?;
            }
            Op::LoadUndefined { dst } => self.set_reg(dst, JsValue::Undefined)?,
            Op::LoadNull { dst } => self.set_reg(dst, JsValue::Null)?,
            Op::LoadBool { dst, value } => self.set_reg(dst, JsValue::Boolean(value))?,
            Op::LoadInt { dst, value } => self.set_reg(dst, JsValue::Int(i64::from(value)))?,
            Op::Move { dst, src } => {
                let value = self.reg(src);
                self.set_reg(dst, value)?;
            }
            Op::LoadThis { dst } => {
                let value = self.frame()?.this_value.clone();
                self.set_reg(dst, value)?;
            }

            // Arithmetic
            Op::Add { dst, left, right } => {
                let value = interp.add_values(&self.reg(left), &self.reg(right))?;
                self.set_reg(dst, value)?;
            }
            Op::Sub { dst, left, right } => self.numeric(interp, NumericOp::Sub, dst, left, right)?,
            Op::Mul { dst, left, right } => self.numeric(interp, NumericOp::Mul, dst, left, right)?,
            Op::Div { dst, left, right } => self.numeric(interp, NumericOp::Div, dst, left, right)?,
            Op::Mod { dst, left, right } => self.numeric(interp, NumericOp::Mod, dst, left, right)?,
            Op::Neg { dst, src } => {
                let value = interp.negate(&self.reg(src))?;
                self.set_reg(dst, value)?;
            }
            Op::ToNumber { dst, src } => {
                let value = match self.reg(src) {
                    n @ (JsValue::Int(_) | JsValue::Float(_)) => n,
                    other => JsValue::number(interp.to_number(&other)?),
                };
                self.set_reg(dst, value)?;
            }

            // Comparison
            Op::Eq { dst, left, right } => {
                let result = interp.loose_equals(&self.reg(left), &self.reg(right))?;
                self.set_reg(dst, JsValue::Boolean(result))?;
            }
            Op::NotEq { dst, left, right } => {
                let result = interp.loose_equals(&self.reg(left), &self.reg(right))?;
                self.set_reg(dst, JsValue::Boolean(!result))?;
            }
            Op::StrictEq { dst, left, right } => {
                let result = self.reg(left).strict_equals(&self.reg(right));
                self.set_reg(dst, JsValue::Boolean(result))?;
            }
            Op::StrictNotEq { dst, left, right } => {
                let result = self.reg(left).strict_equals(&self.reg(right));
                self.set_reg(dst, JsValue::Boolean(!result))?;
            }
            Op::SameValue { dst, left, right } => {
                let result = self.reg(left).same_value(&self.reg(right));
                self.set_reg(dst, JsValue::Boolean(result))?;
            }
            Op::Lt { dst, left, right } => {
                let result = interp.less_than(&self.reg(left), &self.reg(right), true)?;
                self.set_reg(dst, JsValue::Boolean(result == Some(true)))?;
            }
            Op::Gt { dst, left, right } => {
                let result = interp.less_than(&self.reg(right), &self.reg(left), false)?;
                self.set_reg(dst, JsValue::Boolean(result == Some(true)))?;
            }
            Op::LtEq { dst, left, right } => {
                let result = interp.less_than(&self.reg(right), &self.reg(left), false)?;
                self.set_reg(dst, JsValue::Boolean(result == Some(false)))?;
            }
            Op::GtEq { dst, left, right } => {
                let result = interp.less_than(&self.reg(left), &self.reg(right), true)?;
                self.set_reg(dst, JsValue::Boolean(result == Some(false)))?;
            }
            Op::Not { dst, src } => {
                let value = !self.reg(src).to_boolean();
                self.set_reg(dst, JsValue::Boolean(value))?;
            }
            Op::TypeOf { dst, src } => {
                let value = JsValue::from(self.reg(src).type_of());
                self.set_reg(dst, value)?;
            }

            // Control Flow
            Op::Jump { target } => return self.jump(target),
            Op::JumpIfTrue { cond, target } => {
                if self.reg(cond).to_boolean() {
                    return self.jump(target);
                }
            }
            Op::JumpIfFalse { cond, target } => {
                if !self.reg(cond).to_boolean() {
                    return self.jump(target);
                }
            }

            // Variables & Scopes
            Op::GetVar { dst, name } => {
                let name = self.string_constant(name)?;
                let env = self.frame()?.env.cheap_clone();
                let value = interp.env_get(&env, &name)?;
                self.set_reg(dst, value)?;
            }
            Op::SetVar { name, src } => {
                let name = self.string_constant(name)?;
                let env = self.frame()?.env.cheap_clone();
                let strict = self.strict();
                interp.env_set(&env, &name, self.reg(src), strict)?;
            }
            Op::DeclareVar { name, mutable } => {
                let name = self.string_constant(name)?;
                environment::declare(&self.frame()?.env, name, mutable);
            }
            Op::InitVar { name, src } => {
                let name = self.string_constant(name)?;
                let value = self.reg(src);
                interp.check_realm(&value)?;
                environment::initialize(&self.frame()?.env, &name, value);
            }
            Op::PushScope => {
                let frame = self.frame_mut()?;
                frame.env = environment::new_scope(Some(frame.env.cheap_clone()));
            }
            Op::PopScope => {
                let frame = self.frame_mut()?;
                let outer = frame
                    .env
                    .borrow()
                    .outer
                    .clone()
                    .ok_or_else(|| JsError::defect("PopScope without an enclosing scope"))?;
                frame.env = outer;
            }

            // Objects & Properties
            Op::CreateObject { dst } => {
                let obj = interp.create_object();
                self.set_reg(dst, JsValue::Object(obj))?;
            }
            Op::CreateArray { dst, start, count } => {
                let elements = self.reg_range(start, count);
                let arr = interp.create_array(elements);
                self.set_reg(dst, JsValue::Object(arr))?;
            }
            Op::GetProp { dst, obj, key } => {
                let key = interp.to_property_key(&self.reg(key))?;
                let value = interp.get_value_property(&self.reg(obj), &key)?;
                self.set_reg(dst, value)?;
            }
            Op::GetPropConst { dst, obj, name } => {
                let key = PropertyKey::from(self.string_constant(name)?);
                let value = interp.get_value_property(&self.reg(obj), &key)?;
                self.set_reg(dst, value)?;
            }
            Op::SetProp { obj, key, value } => {
                let key = interp.to_property_key(&self.reg(key))?;
                let strict = self.strict();
                interp.set_value_property(&self.reg(obj), key, self.reg(value), strict)?;
            }
            Op::SetPropConst { obj, name, value } => {
                let key = PropertyKey::from(self.string_constant(name)?);
                let strict = self.strict();
                interp.set_value_property(&self.reg(obj), key, self.reg(value), strict)?;
            }
            Op::DeleteProp { dst, obj, key } => {
                let key = interp.to_property_key(&self.reg(key))?;
                let deleted = match self.reg(obj) {
                    JsValue::Object(target) => {
                        let strict = self.strict();
                        interp.delete_property(&target, &key, strict)?
                    }
                    JsValue::Undefined | JsValue::Null => {
                        return Err(JsError::type_error(format!(
                            "Cannot convert undefined or null to object (deleting '{}')",
                            key
                        )));
                    }
                    _ => true,
                };
                self.set_reg(dst, JsValue::Boolean(deleted))?;
            }
            Op::In { dst, key, obj } => {
                let JsValue::Object(target) = self.reg(obj) else {
                    return Err(JsError::type_error(format!(
                        "Cannot use 'in' operator to search for {:?} in {:?}",
                        self.reg(key),
                        self.reg(obj)
                    )));
                };
                let key = interp.to_property_key(&self.reg(key))?;
                let found = interp.has_property(&target, &key)?;
                self.set_reg(dst, JsValue::Boolean(found))?;
            }
            Op::InstanceOf {
                dst,
                value,
                constructor,
            } => {
                let result = interp.instance_of(&self.reg(value), &self.reg(constructor))?;
                self.set_reg(dst, JsValue::Boolean(result))?;
            }
            Op::DefineGetter { obj, name, func } => self.define_accessor(interp, obj, name, func, true)?,
            Op::DefineSetter { obj, name, func } => self.define_accessor(interp, obj, name, func, false)?,
            Op::SetPrototype { obj, proto } => {
                if let JsValue::Object(target) = self.reg(obj) {
                    match self.reg(proto) {
                        JsValue::Object(p) => interp.set_prototype_of(&target, Some(p))?,
                        JsValue::Null => interp.set_prototype_of(&target, None)?,
                        _ => {}
                    }
                }
            }

            // Functions
            Op::CreateClosure { dst, idx } => {
                let Constant::Function(template) = self.constant(idx)? else {
                    return Err(JsError::defect(format!("constant #{} is not a function", idx)));
                };
                let frame = self.frame()?;
                let captured_this = (template.kind == FunctionKind::Arrow).then(|| frame.this_value.clone());
                let closure = frame.env.cheap_clone();
                let func = interp.create_function(JsFunction::Bytecode(BytecodeFunction {
                    template,
                    closure,
                    captured_this,
                }));
                self.set_reg(dst, JsValue::Object(func))?;
            }
            Op::Call {
                dst,
                callee,
                this,
                args,
                argc,
            } => {
                let callee = self.reg(callee);
                let args = self.reg_range(args, argc);
                let this_value = self.reg(this);
                if let Some((template, closure)) = inline_callee(&callee) {
                    let this_value = captured_this(&callee).unwrap_or(this_value);
                    self.push_frame(interp, template, closure, this_value, &args, dst, None)?;
                } else {
                    let result = interp.call(&callee, &this_value, &args)?;
                    self.set_reg(dst, result)?;
                }
            }
            Op::Construct {
                dst,
                callee,
                args,
                argc,
            } => {
                let callee = self.reg(callee);
                let args = self.reg_range(args, argc);
                match inline_callee(&callee) {
                    Some((template, closure)) if template.kind == FunctionKind::Normal => {
                        let ctor = callee
                            .as_object()
                            .ok_or_else(|| JsError::defect("constructor is not an object"))?;
                        let this_obj = interp.ordinary_create_from_constructor(ctor)?;
                        let this_value = JsValue::Object(this_obj.cheap_clone());
                        self.push_frame(interp, template, closure, this_value, &args, dst, Some(this_obj))?;
                    }
                    _ => {
                        let result = interp.construct_value(&callee, &args)?;
                        self.set_reg(dst, result)?;
                    }
                }
            }
            Op::Return { value } => return self.execute_return(interp, self.reg(value)),
            Op::ReturnUndefined => return self.execute_return(interp, JsValue::Undefined),

            // Exception Handling
            Op::Throw { value } => {
                return Err(JsError::Thrown {
                    value: self.reg(value),
                    stack: interp.capture_stack(),
                });
            }
            Op::PushTry {
                catch_target,
                finally_target,
            } => {
                let frame_depth = self.frames.len();
                let frame = self.frame()?;
                let handler = TryHandler {
                    catch_ip: catch_target as usize,
                    finally_ip: finally_target as usize,
                    frame_depth,
                    env: frame.env.cheap_clone(),
                    completion_depth: frame.completions.len(),
                };
                self.try_stack.push(handler);
            }
            Op::PopTry => {
                let handler = self
                    .try_stack
                    .pop()
                    .ok_or_else(|| JsError::defect("PopTry without a try handler"))?;
                if handler.finally_ip != 0 {
                    self.frame_mut()?.completions.push(Completion::Normal);
                }
            }
            Op::GetException { dst } => {
                let value = self.exception_value.take().unwrap_or_default();
                self.set_reg(dst, value)?;
            }
            Op::FinallyEnd => {
                let completion = self
                    .frame_mut()?
                    .completions
                    .pop()
                    .ok_or_else(|| JsError::defect("FinallyEnd outside a finally block"))?;
                match completion {
                    Completion::Normal => {}
                    Completion::Return(value) => return self.execute_return(interp, value),
                    Completion::Throw(error) => return Err(error),
                }
            }

            // Async/Generator
            Op::Yield { dst, value } => {
                if !self.suspendable || self.frames.len() != 1 {
                    return Err(JsError::syntax_error("yield is only valid in generator bodies"));
                }
                return Ok(Step::Yield {
                    value: self.reg(value),
                    resume_register: dst,
                });
            }
            Op::Await { dst, promise } => {
                if !self.suspendable || self.frames.len() != 1 {
                    return Err(JsError::syntax_error("await is only valid in async function bodies"));
                }
                return Ok(Step::Await {
                    value: self.reg(promise),
                    resume_register: dst,
                });
            }
        }
        Ok(Step::Continue)
    }

    fn numeric(
        &mut self,
        interp: &mut Interpreter,
        op: NumericOp,
        dst: Register,
        left: Register,
        right: Register,
    ) -> Result<(), JsError> {
        let value = interp.numeric_op(op, &self.reg(left), &self.reg(right))?;
        self.set_reg(dst, value)
    }

    /// `get name() {}` / `set name(v) {}` in an object literal; the other
    /// half of an existing accessor is kept
    fn define_accessor(
        &mut self,
        interp: &mut Interpreter,
        obj: Register,
        name: u16,
        func: Register,
        getter: bool,
    ) -> Result<(), JsError> {
        let JsValue::Object(target) = self.reg(obj) else {
            return Err(JsError::defect("accessor defined on a non-object"));
        };
        let JsValue::Object(func) = self.reg(func) else {
            return Err(JsError::defect("accessor is not a function"));
        };
        let key = PropertyKey::from(self.string_constant(name)?);
        let mut desc = PropertyDescriptor::accessor(None, None, true, true);
        if let Some(crate::object::Property::Accessor {
            getter: existing_get,
            setter: existing_set,
            ..
        }) = interp.get_own_property(&target, &key)?
        {
            desc.get = Some(existing_get);
            desc.set = Some(existing_set);
        }
        if getter {
            desc.get = Some(Some(func));
        } else {
            desc.set = Some(Some(func));
        }
        interp.define_own_property(&target, key, &desc, true)?;
        Ok(())
    }
}
