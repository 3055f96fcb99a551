//! JavaScript value representation
//!
//! `JsValue` is the closed set of primitive and reference variants. Numbers
//! have two representations, `Int` for exact integers and `Float` for
//! everything else; every comparison treats them as the same mathematical
//! number except where signed zero matters.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::JsError;
use crate::number::{number_to_js_string, string_to_number};
use crate::object::{ExoticObject, JsObjectRef};
use crate::string::JsString;

/// Trait for types that have cheap (O(1), reference-counted) clones.
///
/// This makes it explicit when a clone is just a reference-count increment
/// rather than a copy of the underlying data.
pub trait CheapClone: Clone {
    /// Create a cheap (reference-counted) clone of this value.
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: ?Sized> CheapClone for Rc<T> {}

/// Integral doubles in this range are stored as `Int`
pub const MAX_SAFE_INTEGER: f64 = 9007199254740991.0;

/// A JavaScript value
#[derive(Clone, Default)]
pub enum JsValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    /// Exact integer fast path
    Int(i64),
    /// IEEE-754 double, signed zero preserved
    Float(f64),
    String(JsString),
    Symbol(JsSymbol),
    Object(JsObjectRef),
}

impl CheapClone for JsValue {}

/// Exact comparison of an integer against a double
fn int_equals_float(i: i64, f: f64) -> bool {
    f.fract() == 0.0 && (-9.223372036854775808e18..9.223372036854775808e18).contains(&f) && f as i64 == i
}

impl JsValue {
    /// Canonical number value: integral doubles (other than `-0`) within
    /// the safe-integer range become `Int`
    #[inline]
    pub fn number(n: f64) -> JsValue {
        if n.fract() == 0.0
            && n.abs() <= MAX_SAFE_INTEGER
            && !(n == 0.0 && n.is_sign_negative())
        {
            JsValue::Int(n as i64)
        } else {
            JsValue::Float(n)
        }
    }

    /// Integer result of an `Int` fast-path operation; leaves the fast path
    /// when the result is no longer exactly representable as a double
    #[inline]
    pub(crate) fn from_i64_checked(result: Option<i64>, fallback: f64) -> JsValue {
        match result {
            Some(i) if (i as f64).abs() <= MAX_SAFE_INTEGER => JsValue::Int(i),
            _ => JsValue::number(fallback),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, JsValue::Null | JsValue::Undefined)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, JsValue::Int(_) | JsValue::Float(_))
    }

    /// Check if this is a string value
    pub fn is_string(&self) -> bool {
        matches!(self, JsValue::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    /// Check if this value is callable (a function or a callable proxy)
    pub fn is_callable(&self) -> bool {
        match self {
            JsValue::Object(obj) => obj.is_callable(),
            _ => false,
        }
    }

    /// Numeric value for either number representation
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Int(i) => Some(*i as f64),
            JsValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsObjectRef> {
        match self {
            JsValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_js_string(&self) -> Option<&JsString> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the typeof result for this value
    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Int(_) | JsValue::Float(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::Object(obj) => {
                if obj.is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Convert to boolean (ToBoolean)
    pub fn to_boolean(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Boolean(b) => *b,
            JsValue::Int(i) => *i != 0,
            JsValue::Float(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Symbol(_) => true,
            JsValue::Object(_) => true,
        }
    }

    /// ToNumber for primitives. Objects go through `Interpreter::to_number`,
    /// which runs ToPrimitive first.
    pub fn primitive_to_number(&self) -> Result<f64, JsError> {
        match self {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Int(i) => Ok(*i as f64),
            JsValue::Float(f) => Ok(*f),
            JsValue::String(s) => Ok(string_to_number(s)),
            JsValue::Symbol(_) => Err(JsError::type_error(
                "Cannot convert a Symbol value to a number",
            )),
            JsValue::Object(_) => Err(JsError::defect(
                "object reached primitive number conversion",
            )),
        }
    }

    /// ToString for primitives. Objects go through `Interpreter::to_js_string`.
    pub fn primitive_to_js_string(&self) -> Result<JsString, JsError> {
        match self {
            JsValue::Undefined => Ok(JsString::from("undefined")),
            JsValue::Null => Ok(JsString::from("null")),
            JsValue::Boolean(true) => Ok(JsString::from("true")),
            JsValue::Boolean(false) => Ok(JsString::from("false")),
            JsValue::Int(i) => Ok(JsString::from(i.to_string())),
            JsValue::Float(f) => Ok(number_to_js_string(*f)),
            JsValue::String(s) => Ok(s.cheap_clone()),
            JsValue::Symbol(_) => Err(JsError::type_error(
                "Cannot convert a Symbol value to a string",
            )),
            JsValue::Object(_) => Err(JsError::defect(
                "object reached primitive string conversion",
            )),
        }
    }

    /// Strict equality (===): no coercion, `+0 === -0`, NaN never equal
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
            (JsValue::Int(a), JsValue::Int(b)) => a == b,
            (JsValue::Float(a), JsValue::Float(b)) => a == b,
            (JsValue::Int(i), JsValue::Float(f)) | (JsValue::Float(f), JsValue::Int(i)) => {
                int_equals_float(*i, *f)
            }
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// SameValue: distinguishes `+0` from `-0`, NaN equals itself
    pub fn same_value(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Float(a), JsValue::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                a == b && a.is_sign_negative() == b.is_sign_negative()
            }
            (JsValue::Int(i), JsValue::Float(f)) | (JsValue::Float(f), JsValue::Int(i)) => {
                // Int zero is always +0
                int_equals_float(*i, *f) && !(*f == 0.0 && f.is_sign_negative())
            }
            _ => self.strict_equals(other),
        }
    }

    /// SameValueZero: like SameValue but `+0` equals `-0`
    pub fn same_value_zero(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Float(a), JsValue::Float(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{}", b),
            JsValue::Int(i) => write!(f, "{}", i),
            JsValue::Float(n) => write!(f, "{}", number_to_js_string(*n)),
            JsValue::String(s) => write!(f, "\"{}\"", s),
            JsValue::Symbol(s) => write!(f, "{}", s),
            JsValue::Object(obj) => {
                let obj = obj.borrow();
                match &obj.exotic {
                    ExoticObject::Ordinary => write!(f, "{{...}}"),
                    ExoticObject::Array { length, .. } => write!(f, "[Array({})]", length),
                    ExoticObject::Function(func) => write!(f, "[Function: {}]", func.debug_name()),
                    ExoticObject::Error => write!(f, "[Error]"),
                    ExoticObject::Primitive(value) => write!(f, "[{}: {:?}]", obj.class, value),
                    ExoticObject::Map(entries) => write!(f, "Map({})", entries.len()),
                    ExoticObject::Set(entries) => write!(f, "Set({})", entries.len()),
                    ExoticObject::WeakMap(_) => write!(f, "[WeakMap]"),
                    ExoticObject::WeakSet(_) => write!(f, "[WeakSet]"),
                    ExoticObject::Generator(_) => write!(f, "[object Generator]"),
                    ExoticObject::Promise(state) => write!(f, "Promise {{{}}}", state.borrow().status()),
                    ExoticObject::Proxy(_) => write!(f, "[Proxy]"),
                }
            }
        }
    }
}

/// Same-value equality, so NaN is equal to itself and `-0` differs from `0`
impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

// Conversions from Rust types

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Boolean(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Int(n as i64)
    }
}

impl From<i64> for JsValue {
    fn from(n: i64) -> Self {
        JsValue::from_i64_checked(Some(n), n as f64)
    }
}

impl From<u32> for JsValue {
    fn from(n: u32) -> Self {
        JsValue::Int(n as i64)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<JsString> for JsValue {
    fn from(s: JsString) -> Self {
        JsValue::String(s)
    }
}

impl From<JsSymbol> for JsValue {
    fn from(s: JsSymbol) -> Self {
        JsValue::Symbol(s)
    }
}

impl From<JsObjectRef> for JsValue {
    fn from(obj: JsObjectRef) -> Self {
        JsValue::Object(obj)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Symbols
// ═══════════════════════════════════════════════════════════════════════════════

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// JavaScript Symbol primitive
/// Symbols are unique identifiers, optionally with a description
#[derive(Clone)]
pub struct JsSymbol {
    /// Unique identifier for this symbol
    id: u64,
    /// Optional description (from Symbol('description'))
    pub description: Option<JsString>,
}

impl JsSymbol {
    /// Create a new unique symbol with an optional description
    pub fn new(description: Option<JsString>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    /// Get the symbol's unique ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `Symbol(description)` as used by `Symbol.prototype.toString`
    pub fn descriptive_string(&self) -> JsString {
        let mut s = String::from("Symbol(");
        if let Some(desc) = &self.description {
            s.push_str(&desc.to_rust_string_lossy());
        }
        s.push(')');
        JsString::from(s)
    }
}

impl CheapClone for JsSymbol {}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "Symbol({})", desc),
            None => write!(f, "Symbol()"),
        }
    }
}

/// Well-known symbols the core consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownSymbol {
    ToPrimitive,
    ToStringTag,
    Iterator,
    HasInstance,
}

impl WellKnownSymbol {
    pub fn description(self) -> &'static str {
        match self {
            WellKnownSymbol::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbol::ToStringTag => "Symbol.toStringTag",
            WellKnownSymbol::Iterator => "Symbol.iterator",
            WellKnownSymbol::HasInstance => "Symbol.hasInstance",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Property keys
// ═══════════════════════════════════════════════════════════════════════════════

/// Canonical property key. Strings that spell an array index are always
/// stored as `Index`, so `"1"` and `1` address the same property.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(JsString),
    Index(u32),
    Symbol(JsSymbol),
}

impl PropertyKey {
    /// Check if this is a symbol key
    pub fn is_symbol(&self) -> bool {
        matches!(self, PropertyKey::Symbol(_))
    }

    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Check if this key equals a string literal (avoids allocation)
    #[inline]
    pub fn eq_str(&self, s: &str) -> bool {
        match self {
            PropertyKey::String(js_str) => js_str.eq_str(s),
            PropertyKey::Index(_) | PropertyKey::Symbol(_) => false,
        }
    }

    /// The key as a value (`Index` keys become strings)
    pub fn to_value(&self) -> JsValue {
        match self {
            PropertyKey::String(s) => JsValue::String(s.cheap_clone()),
            PropertyKey::Index(i) => JsValue::String(JsString::from(i.to_string())),
            PropertyKey::Symbol(s) => JsValue::Symbol(s.cheap_clone()),
        }
    }

    /// String form for string and index keys
    pub fn as_js_string(&self) -> Option<JsString> {
        match self {
            PropertyKey::String(s) => Some(s.cheap_clone()),
            PropertyKey::Index(i) => Some(JsString::from(i.to_string())),
            PropertyKey::Symbol(_) => None,
        }
    }
}

impl From<&str> for PropertyKey {
    #[inline]
    fn from(s: &str) -> Self {
        PropertyKey::from(JsString::from(s))
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::from(s.as_str())
    }
}

impl From<JsString> for PropertyKey {
    #[inline]
    fn from(s: JsString) -> Self {
        match s.to_array_index() {
            Some(idx) => PropertyKey::Index(idx),
            None => PropertyKey::String(s),
        }
    }
}

impl From<u32> for PropertyKey {
    fn from(idx: u32) -> Self {
        if idx == u32::MAX {
            PropertyKey::String(JsString::from(idx.to_string()))
        } else {
            PropertyKey::Index(idx)
        }
    }
}

impl From<JsSymbol> for PropertyKey {
    fn from(sym: JsSymbol) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{:?}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Symbol(s) => write!(f, "{}", s),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collection keys
// ═══════════════════════════════════════════════════════════════════════════════

/// A value used as a Map/Set key: SameValueZero equality with a hash that
/// agrees across the `Int`/`Float` representations
#[derive(Clone, Debug)]
pub struct MapKey(pub JsValue);

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_value_zero(&other.0)
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            JsValue::Undefined => state.write_u8(0),
            JsValue::Null => state.write_u8(1),
            JsValue::Boolean(b) => {
                state.write_u8(2);
                b.hash(state);
            }
            JsValue::Int(_) | JsValue::Float(_) => {
                state.write_u8(3);
                let n = self.0.as_number().unwrap_or(f64::NAN);
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if n == 0.0 {
                    0u64
                } else {
                    n.to_bits()
                };
                state.write_u64(bits);
            }
            JsValue::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            JsValue::Symbol(s) => {
                state.write_u8(5);
                s.hash(state);
            }
            JsValue::Object(obj) => {
                state.write_u8(6);
                state.write_u64(obj.id());
            }
        }
    }
}
