//! Bytecode instruction set and chunk format
//!
//! Register machine code: every frame owns up to 256 registers, operands
//! name registers or constant-pool slots, and jumps are absolute
//! instruction offsets. Programs come from an external compiler (or from
//! `ProgramBuilder`); the engine only fetches and decodes.

use std::rc::Rc;

use crate::string::JsString;

/// Virtual register index (0-255)
pub type Register = u8;

/// Constant pool index (0-65535)
pub type ConstantIndex = u16;

/// Jump target (instruction offset)
pub type JumpTarget = u32;

/// Bytecode instruction
#[derive(Debug, Clone)]
pub enum Op {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Constants & Register Operations
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = string or number constant; function constants are only
    /// valid in `CreateClosure`
    LoadConst { dst: Register, idx: ConstantIndex },

    /// Load undefined: r[dst] = undefined
    LoadUndefined { dst: Register },

    /// Load null: r[dst] = null
    LoadNull { dst: Register },

    /// Load boolean: r[dst] = value
    LoadBool { dst: Register, value: bool },

    /// r[dst] = value, stored on the `Int` fast path
    LoadInt { dst: Register, value: i32 },

    /// Move register: r[dst] = r[src]
    Move { dst: Register, src: Register },

    /// r[dst] = this; the global object for sloppy calls with no receiver
    LoadThis { dst: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Arithmetic
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = r[left] + r[right], after ToPrimitive; concatenates when
    /// either side is a string
    Add { dst: Register, left: Register, right: Register },

    /// r[dst] = r[left] - r[right]; integers stay exact until they overflow
    Sub { dst: Register, left: Register, right: Register },

    /// Multiply: r[dst] = r[left] * r[right]
    Mul { dst: Register, left: Register, right: Register },

    /// r[dst] = r[left] / r[right]; inexact or signed-zero quotients leave
    /// the integer fast path
    Div { dst: Register, left: Register, right: Register },

    /// r[dst] = r[left] % r[right]; the sign follows the dividend
    Mod { dst: Register, left: Register, right: Register },

    /// r[dst] = -r[src]; negating integer 0 gives -0
    Neg { dst: Register, src: Register },

    /// r[dst] = ToNumber(r[src])
    ToNumber { dst: Register, src: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Comparison Operations
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = r[left] == r[right], with coercion
    Eq { dst: Register, left: Register, right: Register },

    /// Loose inequality: r[dst] = r[left] != r[right]
    NotEq { dst: Register, left: Register, right: Register },

    /// r[dst] = r[left] === r[right]: no coercion, NaN unequal, +0 equals -0
    StrictEq { dst: Register, left: Register, right: Register },

    /// Strict inequality: r[dst] = r[left] !== r[right]
    StrictNotEq { dst: Register, left: Register, right: Register },

    /// r[dst] = SameValue(r[left], r[right]): NaN equals itself, +0 and -0
    /// differ
    SameValue { dst: Register, left: Register, right: Register },

    /// r[dst] = r[left] < r[right]; false when either side is NaN
    Lt { dst: Register, left: Register, right: Register },

    /// Less than or equal: r[dst] = r[left] <= r[right]
    LtEq { dst: Register, left: Register, right: Register },

    /// Greater than: r[dst] = r[left] > r[right]
    Gt { dst: Register, left: Register, right: Register },

    /// Greater than or equal: r[dst] = r[left] >= r[right]
    GtEq { dst: Register, left: Register, right: Register },

    /// Logical not: r[dst] = !r[src]
    Not { dst: Register, src: Register },

    /// typeof: r[dst] = typeof r[src]
    TypeOf { dst: Register, src: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Control Flow
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Jump to an absolute instruction offset
    Jump { target: JumpTarget },

    /// Jump if r[cond] is truthy
    JumpIfTrue { cond: Register, target: JumpTarget },

    /// Jump if r[cond] is falsy
    JumpIfFalse { cond: Register, target: JumpTarget },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Variables & Scopes
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = the nearest binding of `name`, falling back to the global
    /// object; ReferenceError when unresolved or still in its TDZ
    GetVar { dst: Register, name: ConstantIndex },

    /// Assign the nearest binding of `name`. Const bindings raise a
    /// TypeError; unresolved names create a global property unless the
    /// chunk is strict.
    SetVar { name: ConstantIndex, src: Register },

    /// Declare an uninitialized binding in the current scope (TDZ until
    /// `InitVar`)
    DeclareVar { name: ConstantIndex, mutable: bool },

    /// Initialize a binding declared in the current scope
    InitVar { name: ConstantIndex, src: Register },

    /// Enter a block scope
    PushScope,

    /// Leave a block scope
    PopScope,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Objects & Properties
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = a new object inheriting from `Object.prototype`
    CreateObject { dst: Register },

    /// r[dst] = array of r[start..start+count]
    CreateArray { dst: Register, start: Register, count: u8 },

    /// r[dst] = r[obj][ToPropertyKey(r[key])], with r[obj] as receiver
    GetProp { dst: Register, obj: Register, key: Register },

    /// Get property with constant name: r[dst] = r[obj].name
    GetPropConst { dst: Register, obj: Register, name: ConstantIndex },

    /// r[obj][r[key]] = r[value]; a rejected write throws only in strict
    /// chunks
    SetProp { obj: Register, key: Register, value: Register },

    /// Set property with constant name: r[obj].name = r[value]
    SetPropConst { obj: Register, name: ConstantIndex, value: Register },

    /// r[dst] = whether the property is gone; non-configurable properties
    /// throw in strict chunks
    DeleteProp { dst: Register, obj: Register, key: Register },

    /// `in` operator: r[dst] = r[key] in r[obj]
    In { dst: Register, key: Register, obj: Register },

    /// instanceof: r[dst] = r[value] instanceof r[constructor]
    InstanceOf { dst: Register, value: Register, constructor: Register },

    /// Install r[func] as the getter of `name`, keeping any setter
    DefineGetter { obj: Register, name: ConstantIndex, func: Register },

    /// Install r[func] as the setter of `name`, keeping any getter
    DefineSetter { obj: Register, name: ConstantIndex, func: Register },

    /// Set the prototype of r[obj] to r[proto] when it is an object or
    /// null; other values are ignored
    SetPrototype { obj: Register, proto: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Functions
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = closure over the current scope for the function constant
    /// at `idx`
    CreateClosure { dst: Register, idx: ConstantIndex },

    /// r[dst] = r[callee] called with this = r[this] and arguments
    /// r[args..args+argc]; bytecode callees get a new frame in this VM
    Call { dst: Register, callee: Register, this: Register, args: Register, argc: u8 },

    /// r[dst] = new r[callee](r[args..args+argc]); an object returned by
    /// the constructor replaces the fresh `this`
    Construct { dst: Register, callee: Register, args: Register, argc: u8 },

    /// Return from function with value
    Return { value: Register },

    /// Return undefined from function
    ReturnUndefined,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Exception Handling
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Throw r[value] to the innermost handler, capturing the stack
    Throw { value: Register },

    /// Open a handler region. A target of 0 means the region has no catch
    /// (or no finally).
    ///
    /// Regions are laid out as:
    /// ```text
    /// try/catch:          PushTry{C,0} body PopTry Jump END  C: GetException catch  END:
    /// try/finally:        PushTry{0,F} body PopTry           F: finally FinallyEnd
    /// try/catch/finally:  PushTry{C,F} body PopTry Jump F    C: GetException catch PopTry
    ///                                                        F: finally FinallyEnd
    /// ```
    PushTry { catch_target: JumpTarget, finally_target: JumpTarget },

    /// Pop the innermost try handler on normal exit from its region. If the
    /// handler has a finally block, a normal completion is recorded for
    /// the matching `FinallyEnd`.
    PopTry,

    /// r[dst] = the value being caught; engine errors are materialized as
    /// error objects
    GetException { dst: Register },

    /// End of a finally block: continue, or resume the pending return or
    /// throw that entered it
    FinallyEnd,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Async/Generator
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Suspend a generator body with r[value]; the value sent to the next
    /// resume lands in r[dst]. SyntaxError outside a generator frame.
    Yield { dst: Register, value: Register },

    /// Suspend an async body until r[promise] settles; the fulfillment
    /// value lands in r[dst], a rejection is thrown at this point
    Await { dst: Register, promise: Register },
}

/// A compiled chunk of bytecode
#[derive(Debug, Clone, Default)]
pub struct BytecodeChunk {
    /// The bytecode instructions
    pub code: Vec<Op>,

    /// Strings, numbers and nested function templates
    pub constants: Vec<Constant>,

    /// Source map: instruction index -> source position
    pub source_map: Vec<SourceMapEntry>,

    /// Number of registers needed for this chunk
    pub register_count: u8,

    /// Strict-mode code keeps an undefined `this`
    pub strict: bool,

    /// Name used in stack traces
    pub name: Option<JsString>,
}

/// Source map entry for debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapEntry {
    /// Bytecode instruction index
    pub bytecode_offset: usize,
    pub line: u32,
    pub column: u32,
}

/// Constants that can be stored in the pool
#[derive(Debug, Clone)]
pub enum Constant {
    /// String constant
    String(JsString),

    /// Number constant
    Number(f64),

    /// Integer constant outside the `LoadInt` range
    Int(i64),

    /// Template instantiated by `CreateClosure`
    Function(Rc<FunctionTemplate>),
}

/// What kind of function a template describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Generator,
    Async,
}

/// A function body plus the metadata needed to instantiate closures
#[derive(Debug, Clone)]
pub struct FunctionTemplate {
    pub name: Option<JsString>,
    pub kind: FunctionKind,
    /// Arguments are copied into registers `0..param_count`
    pub param_count: u8,
    pub chunk: Rc<BytecodeChunk>,
}

impl BytecodeChunk {
    /// Create a new empty bytecode chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the instruction at the given offset
    #[inline]
    pub fn get(&self, offset: usize) -> Option<&Op> {
        self.code.get(offset)
    }

    /// Get the source location for a bytecode offset
    pub fn get_source_location(&self, offset: usize) -> Option<(u32, u32)> {
        let idx = self
            .source_map
            .binary_search_by_key(&offset, |e| e.bytecode_offset);

        match idx {
            Ok(i) => self.source_map.get(i).map(|e| (e.line, e.column)),
            Err(i) if i > 0 => self.source_map.get(i - 1).map(|e| (e.line, e.column)),
            _ => None,
        }
    }

    /// Get a constant from the pool
    #[inline]
    pub fn get_constant(&self, idx: ConstantIndex) -> Option<&Constant> {
        self.constants.get(idx as usize)
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map(|n| n.to_rust_string_lossy())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}
