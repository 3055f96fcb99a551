//! Bytecode format and program builder
//!
//! The engine does not parse source text. Programs arrive as
//! `BytecodeChunk`s produced by an external compiler, or assembled with
//! `ProgramBuilder` by embedders and tests.

mod builder;
mod bytecode;

pub use builder::{JumpPlaceholder, ProgramBuilder, RegisterAllocator};
pub use bytecode::{
    BytecodeChunk, Constant, ConstantIndex, FunctionKind, FunctionTemplate, JumpTarget, Op, Register,
    SourceMapEntry,
};
