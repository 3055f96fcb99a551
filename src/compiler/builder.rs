//! ProgramBuilder - helper for emitting bytecode instructions
//!
//! Provides a small assembler API for building bytecode chunks with
//! register allocation and jump patching support. Embedders that generate
//! code directly (and the test suites) use it in place of a compiler.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::bytecode::{
    BytecodeChunk, Constant, ConstantIndex, FunctionKind, FunctionTemplate, JumpTarget, Op,
    Register, SourceMapEntry,
};
use crate::error::JsError;
use crate::string::JsString;
use crate::value::CheapClone;

/// Placeholder for a jump that needs to be patched later
#[derive(Debug, Clone, Copy)]
pub struct JumpPlaceholder {
    /// Index of the jump instruction in the code
    pub instruction_index: usize,
}

/// Register allocator for hand-assembled code
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    /// Next available register
    next: u8,

    /// Maximum register used (for determining register_count)
    max_used: u8,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a register
    pub fn alloc(&mut self) -> Result<Register, JsError> {
        self.reserve_range(1)
    }

    /// Reserve a specific number of consecutive registers (for call arguments)
    pub fn reserve_range(&mut self, count: u8) -> Result<Register, JsError> {
        let end = self
            .next
            .checked_add(count)
            .ok_or_else(|| JsError::syntax_error("Too many registers needed (max 255)"))?;
        let start = self.next;
        self.next = end;
        self.max_used = self.max_used.max(end);
        Ok(start)
    }

    /// Make sure registers `0..count` are part of the frame
    pub fn ensure(&mut self, count: u8) {
        self.max_used = self.max_used.max(count);
        self.next = self.next.max(count);
    }

    /// Get the maximum number of registers used
    pub fn max_used(&self) -> u8 {
        self.max_used
    }
}

/// Builder for constructing bytecode chunks
#[derive(Default)]
pub struct ProgramBuilder {
    code: Vec<Op>,
    constants: Vec<Constant>,
    /// String constant deduplication map
    string_map: FxHashMap<JsString, ConstantIndex>,
    source_map: Vec<SourceMapEntry>,
    registers: RegisterAllocator,
    /// Current source position (for source map)
    current_location: Option<(u32, u32)>,
    name: Option<JsString>,
    strict: bool,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a named function body or script
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(JsString::from(name)),
            ..Self::default()
        }
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Get access to the register allocator
    pub fn registers(&mut self) -> &mut RegisterAllocator {
        &mut self.registers
    }

    /// Set the source position recorded for following instructions
    pub fn set_location(&mut self, line: u32, column: u32) {
        self.current_location = Some((line, column));
    }

    /// Emit an instruction and return its index
    pub fn emit(&mut self, op: Op) -> usize {
        let index = self.code.len();

        if let Some((line, column)) = self.current_location {
            let should_add = self
                .source_map
                .last()
                .is_none_or(|e| e.line != line || e.column != column);
            if should_add {
                self.source_map.push(SourceMapEntry {
                    bytecode_offset: index,
                    line,
                    column,
                });
            }
        }

        self.track_registers(&op);
        self.code.push(op);
        index
    }

    // Hand-written code names registers directly; grow the frame to cover them.
    fn track_registers(&mut self, op: &Op) {
        let highest = match *op {
            Op::LoadConst { dst, .. }
            | Op::LoadUndefined { dst }
            | Op::LoadNull { dst }
            | Op::LoadBool { dst, .. }
            | Op::LoadInt { dst, .. }
            | Op::LoadThis { dst }
            | Op::GetVar { dst, .. }
            | Op::CreateObject { dst }
            | Op::CreateClosure { dst, .. }
            | Op::GetException { dst } => dst,
            Op::Move { dst, src }
            | Op::Neg { dst, src }
            | Op::ToNumber { dst, src }
            | Op::Not { dst, src }
            | Op::TypeOf { dst, src } => dst.max(src),
            Op::Add { dst, left, right }
            | Op::Sub { dst, left, right }
            | Op::Mul { dst, left, right }
            | Op::Div { dst, left, right }
            | Op::Mod { dst, left, right }
            | Op::Eq { dst, left, right }
            | Op::NotEq { dst, left, right }
            | Op::StrictEq { dst, left, right }
            | Op::StrictNotEq { dst, left, right }
            | Op::SameValue { dst, left, right }
            | Op::Lt { dst, left, right }
            | Op::LtEq { dst, left, right }
            | Op::Gt { dst, left, right }
            | Op::GtEq { dst, left, right } => dst.max(left).max(right),
            Op::JumpIfTrue { cond, .. } | Op::JumpIfFalse { cond, .. } => cond,
            Op::SetVar { src, .. } | Op::InitVar { src, .. } => src,
            Op::CreateArray { dst, start, count } => {
                dst.max(start.saturating_add(count).saturating_sub(1))
            }
            Op::GetProp { dst, obj, key } | Op::DeleteProp { dst, obj, key } => dst.max(obj).max(key),
            Op::GetPropConst { dst, obj, .. } => dst.max(obj),
            Op::SetProp { obj, key, value } => obj.max(key).max(value),
            Op::SetPropConst { obj, value, .. } => obj.max(value),
            Op::In { dst, key, obj } => dst.max(key).max(obj),
            Op::InstanceOf { dst, value, constructor } => dst.max(value).max(constructor),
            Op::DefineGetter { obj, func, .. } | Op::DefineSetter { obj, func, .. } => obj.max(func),
            Op::SetPrototype { obj, proto } => obj.max(proto),
            Op::Call { dst, callee, this, args, argc } => dst
                .max(callee)
                .max(this)
                .max(args.saturating_add(argc).saturating_sub(1)),
            Op::Construct { dst, callee, args, argc } => dst
                .max(callee)
                .max(args.saturating_add(argc).saturating_sub(1)),
            Op::Return { value } | Op::Throw { value } => value,
            Op::Yield { dst, value } => dst.max(value),
            Op::Await { dst, promise } => dst.max(promise),
            Op::Jump { .. }
            | Op::DeclareVar { .. }
            | Op::PushScope
            | Op::PopScope
            | Op::ReturnUndefined
            | Op::PushTry { .. }
            | Op::PopTry
            | Op::FinallyEnd => return,
        };
        self.registers.ensure(highest.saturating_add(1));
    }

    /// Emit a jump instruction with a placeholder target
    pub fn emit_jump(&mut self) -> JumpPlaceholder {
        let index = self.emit(Op::Jump { target: 0 });
        JumpPlaceholder {
            instruction_index: index,
        }
    }

    /// Emit a conditional jump (if true) with a placeholder target
    pub fn emit_jump_if_true(&mut self, cond: Register) -> JumpPlaceholder {
        let index = self.emit(Op::JumpIfTrue { cond, target: 0 });
        JumpPlaceholder {
            instruction_index: index,
        }
    }

    /// Emit a conditional jump (if false) with a placeholder target
    pub fn emit_jump_if_false(&mut self, cond: Register) -> JumpPlaceholder {
        let index = self.emit(Op::JumpIfFalse { cond, target: 0 });
        JumpPlaceholder {
            instruction_index: index,
        }
    }

    /// Emit a jump to a known target
    pub fn emit_jump_to(&mut self, target: usize) {
        self.emit(Op::Jump {
            target: target as JumpTarget,
        });
    }

    /// Patch a jump placeholder to jump to the current position
    pub fn patch_jump(&mut self, placeholder: JumpPlaceholder) {
        let target = self.code.len() as JumpTarget;
        self.patch_jump_to(placeholder, target);
    }

    /// Patch a jump placeholder to jump to a specific target
    pub fn patch_jump_to(&mut self, placeholder: JumpPlaceholder, target: JumpTarget) {
        if let Some(op) = self.code.get_mut(placeholder.instruction_index) {
            match op {
                Op::Jump { target: t } => *t = target,
                Op::JumpIfTrue { target: t, .. } => *t = target,
                Op::JumpIfFalse { target: t, .. } => *t = target,
                _ => {}
            }
        }
    }

    /// Emit a PushTry whose targets are patched once the handlers are laid out
    pub fn emit_push_try(&mut self) -> usize {
        self.emit(Op::PushTry {
            catch_target: 0,
            finally_target: 0,
        })
    }

    /// Patch PushTry instruction with catch and finally targets (0 = none)
    pub fn patch_try_targets(&mut self, idx: usize, catch_target: JumpTarget, finally_target: JumpTarget) {
        if let Some(Op::PushTry {
            catch_target: ct,
            finally_target: ft,
        }) = self.code.get_mut(idx)
        {
            *ct = catch_target;
            *ft = finally_target;
        }
    }

    /// Get the current instruction offset (for jump targets)
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Add a string constant to the pool (with deduplication)
    pub fn add_string(&mut self, s: &str) -> Result<ConstantIndex, JsError> {
        let s = JsString::from(s);
        if let Some(&idx) = self.string_map.get(&s) {
            return Ok(idx);
        }

        let idx = self.add_constant(Constant::String(s.cheap_clone()))?;
        self.string_map.insert(s, idx);
        Ok(idx)
    }

    /// Add a constant to the pool
    pub fn add_constant(&mut self, constant: Constant) -> Result<ConstantIndex, JsError> {
        if self.constants.len() >= u16::MAX as usize {
            return Err(JsError::syntax_error("Too many constants (max 65535)"));
        }

        let idx = self.constants.len() as ConstantIndex;
        self.constants.push(constant);
        Ok(idx)
    }

    /// Add a nested function
    pub fn add_function(&mut self, template: FunctionTemplate) -> Result<ConstantIndex, JsError> {
        self.add_constant(Constant::Function(Rc::new(template)))
    }

    /// Emit LoadConst for a string
    pub fn emit_load_string(&mut self, dst: Register, s: &str) -> Result<(), JsError> {
        let idx = self.add_string(s)?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    /// Emit LoadConst for a number
    pub fn emit_load_number(&mut self, dst: Register, n: f64) -> Result<(), JsError> {
        // Small integers skip the constant pool
        if n.fract() == 0.0 && (-128.0..=127.0).contains(&n) && !(n == 0.0 && n.is_sign_negative()) {
            self.emit(Op::LoadInt { dst, value: n as i32 });
            return Ok(());
        }

        let idx = self.add_constant(Constant::Number(n))?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    /// Emit GetVar with a constant name
    pub fn emit_get_var(&mut self, dst: Register, name: &str) -> Result<(), JsError> {
        let name = self.add_string(name)?;
        self.emit(Op::GetVar { dst, name });
        Ok(())
    }

    /// Emit SetVar with a constant name
    pub fn emit_set_var(&mut self, name: &str, src: Register) -> Result<(), JsError> {
        let name = self.add_string(name)?;
        self.emit(Op::SetVar { name, src });
        Ok(())
    }

    /// Emit a `let`/`const` declaration followed by its initialization
    pub fn emit_declare(&mut self, name: &str, mutable: bool, src: Register) -> Result<(), JsError> {
        let name = self.add_string(name)?;
        self.emit(Op::DeclareVar { name, mutable });
        self.emit(Op::InitVar { name, src });
        Ok(())
    }

    /// Emit GetPropConst with a constant name
    pub fn emit_get_named(&mut self, dst: Register, obj: Register, name: &str) -> Result<(), JsError> {
        let name = self.add_string(name)?;
        self.emit(Op::GetPropConst { dst, obj, name });
        Ok(())
    }

    /// Emit SetPropConst with a constant name
    pub fn emit_set_named(&mut self, obj: Register, name: &str, value: Register) -> Result<(), JsError> {
        let name = self.add_string(name)?;
        self.emit(Op::SetPropConst { obj, name, value });
        Ok(())
    }

    /// Emit CreateClosure for a nested function
    pub fn emit_closure(&mut self, dst: Register, template: FunctionTemplate) -> Result<(), JsError> {
        let idx = self.add_function(template)?;
        self.emit(Op::CreateClosure { dst, idx });
        Ok(())
    }

    /// Allocate a register
    pub fn alloc_register(&mut self) -> Result<Register, JsError> {
        self.registers.alloc()
    }

    /// Reserve a range of consecutive registers
    pub fn reserve_registers(&mut self, count: u8) -> Result<Register, JsError> {
        self.registers.reserve_range(count)
    }

    /// Finish building and return the bytecode chunk
    pub fn finish(self) -> BytecodeChunk {
        BytecodeChunk {
            code: self.code,
            constants: self.constants,
            source_map: self.source_map,
            register_count: self.registers.max_used(),
            strict: self.strict,
            name: self.name,
        }
    }

    /// Finish as a function body
    pub fn finish_function(mut self, kind: FunctionKind, param_count: u8) -> FunctionTemplate {
        self.registers.ensure(param_count);
        let name = self.name.clone();
        FunctionTemplate {
            name,
            kind,
            param_count,
            chunk: Rc::new(self.finish()),
        }
    }
}
