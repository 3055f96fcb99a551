//! Type conversions and operators
//!
//! `ToPrimitive`, `ToNumber`, `ToString`, `ToObject`, `ToPropertyKey` and
//! the operators built on them. Primitives convert without the interpreter;
//! objects go through `Symbol.toPrimitive` or `valueOf`/`toString`.

use crate::error::JsError;
use crate::object::{ExoticObject, JsObject, JsObjectRef};
use crate::string::JsString;
use crate::value::{CheapClone, JsValue, PropertyKey, WellKnownSymbol};

use super::Interpreter;

/// Preferred result type of `ToPrimitive`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    Default,
    Number,
    String,
}

impl PreferredType {
    fn hint(self) -> &'static str {
        match self {
            PreferredType::Default => "default",
            PreferredType::Number => "number",
            PreferredType::String => "string",
        }
    }
}

/// Numeric binary operators other than `+`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Sub,
    Mul,
    Div,
    Mod,
}

impl NumericOp {
    fn apply_float(self, a: f64, b: f64) -> f64 {
        match self {
            NumericOp::Sub => a - b,
            NumericOp::Mul => a * b,
            NumericOp::Div => a / b,
            NumericOp::Mod => a % b,
        }
    }

    /// Exact integer result, or `None` when the result is not an integer
    /// that `Int` can hold with the right sign
    fn apply_int(self, a: i64, b: i64) -> Option<i64> {
        match self {
            NumericOp::Sub => a.checked_sub(b),
            NumericOp::Mul => {
                let product = a.checked_mul(b)?;
                // 0 * -1 is -0
                (product != 0 || (a >= 0 && b >= 0)).then_some(product)
            }
            NumericOp::Div => {
                if b == 0 || a.checked_rem(b)? != 0 {
                    return None;
                }
                let quotient = a.checked_div(b)?;
                // 0 / -n is -0
                (quotient != 0 || b > 0).then_some(quotient)
            }
            NumericOp::Mod => {
                if b == 0 {
                    return None;
                }
                let rem = a.checked_rem(b)?;
                // The sign of a zero remainder follows the dividend
                (rem != 0 || a >= 0).then_some(rem)
            }
        }
    }
}

fn both_ints(a: &JsValue, b: &JsValue) -> Option<(i64, i64)> {
    match (a, b) {
        (JsValue::Int(x), JsValue::Int(y)) => Some((*x, *y)),
        _ => None,
    }
}

/// Numeric comparison of two numbers; `None` when either is NaN
fn compare_numbers(a: f64, b: f64) -> Option<bool> {
    if a.is_nan() || b.is_nan() {
        return None;
    }
    Some(a < b)
}

impl Interpreter {
    /// ToPrimitive: `Symbol.toPrimitive` first, then `valueOf`/`toString`
    /// in the order the hint asks for
    pub fn to_primitive(&mut self, value: &JsValue, preferred: PreferredType) -> Result<JsValue, JsError> {
        let JsValue::Object(obj) = value else {
            return Ok(value.clone());
        };

        let to_prim = self.well_known_symbol(WellKnownSymbol::ToPrimitive);
        let exotic = self.get(obj, &PropertyKey::Symbol(to_prim), value)?;
        if !exotic.is_null_or_undefined() {
            if !exotic.is_callable() {
                return Err(JsError::type_error("Symbol.toPrimitive is not a function"));
            }
            let result = self.call(&exotic, value, &[JsValue::from(preferred.hint())])?;
            if result.is_object() {
                return Err(JsError::type_error("Cannot convert object to primitive value"));
            }
            return Ok(result);
        }

        let order: [&str; 2] = match preferred {
            PreferredType::String => ["toString", "valueOf"],
            PreferredType::Default | PreferredType::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get(obj, &PropertyKey::from(name), value)?;
            if method.is_callable() {
                let result = self.call(&method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(JsError::type_error("Cannot convert object to primitive value"))
    }

    /// ToNumber
    pub fn to_number(&mut self, value: &JsValue) -> Result<f64, JsError> {
        match value {
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PreferredType::Number)?;
                prim.primitive_to_number()
            }
            _ => value.primitive_to_number(),
        }
    }

    /// ToNumber keeping the `Int` representation when there is one
    pub fn to_numeric(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        match value {
            JsValue::Int(_) | JsValue::Float(_) => Ok(value.clone()),
            _ => Ok(JsValue::number(self.to_number(value)?)),
        }
    }

    /// ToString
    pub fn to_js_string(&mut self, value: &JsValue) -> Result<JsString, JsError> {
        match value {
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PreferredType::String)?;
                prim.primitive_to_js_string()
            }
            _ => value.primitive_to_js_string(),
        }
    }

    /// ToPropertyKey: symbols stay symbols, canonical array indices become
    /// `Index` keys
    pub fn to_property_key(&mut self, value: &JsValue) -> Result<PropertyKey, JsError> {
        match value {
            JsValue::Symbol(sym) => Ok(PropertyKey::Symbol(sym.cheap_clone())),
            JsValue::Int(i) if (0..i64::from(u32::MAX)).contains(i) => {
                Ok(PropertyKey::Index(u32::try_from(*i).unwrap_or(u32::MAX)))
            }
            JsValue::String(s) => Ok(PropertyKey::from(s.cheap_clone())),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PreferredType::String)?;
                self.to_property_key(&prim)
            }
            _ => Ok(PropertyKey::from(value.primitive_to_js_string()?)),
        }
    }

    /// ToObject: wrap primitives, reject null and undefined
    pub fn to_object(&mut self, value: &JsValue) -> Result<JsObjectRef, JsError> {
        let proto = match value {
            JsValue::Object(obj) => return Ok(obj.cheap_clone()),
            JsValue::Undefined | JsValue::Null => {
                return Err(JsError::type_error(format!(
                    "Cannot convert {:?} to object",
                    value
                )));
            }
            JsValue::Boolean(_) => ("Boolean", self.boolean_prototype.cheap_clone()),
            JsValue::Int(_) | JsValue::Float(_) => ("Number", self.number_prototype.cheap_clone()),
            JsValue::String(_) => ("String", self.string_prototype.cheap_clone()),
            JsValue::Symbol(_) => ("Symbol", self.symbol_prototype.cheap_clone()),
        };
        let (class, prototype) = proto;
        Ok(self.alloc(JsObject::new(
            class,
            Some(prototype),
            ExoticObject::Primitive(value.clone()),
        )))
    }

    /// Loose equality (`==`)
    pub fn loose_equals(&mut self, a: &JsValue, b: &JsValue) -> Result<bool, JsError> {
        match (a, b) {
            (JsValue::Undefined | JsValue::Null, JsValue::Undefined | JsValue::Null) => Ok(true),
            (JsValue::Undefined | JsValue::Null, _) | (_, JsValue::Undefined | JsValue::Null) => Ok(false),
            (JsValue::Int(_) | JsValue::Float(_), JsValue::Int(_) | JsValue::Float(_))
            | (JsValue::String(_), JsValue::String(_))
            | (JsValue::Boolean(_), JsValue::Boolean(_))
            | (JsValue::Symbol(_), JsValue::Symbol(_))
            | (JsValue::Object(_), JsValue::Object(_)) => Ok(a.strict_equals(b)),
            (JsValue::Int(_) | JsValue::Float(_), JsValue::String(s)) => {
                Ok(a.strict_equals(&JsValue::number(crate::number::string_to_number(s))))
            }
            (JsValue::String(s), JsValue::Int(_) | JsValue::Float(_)) => {
                Ok(JsValue::number(crate::number::string_to_number(s)).strict_equals(b))
            }
            (JsValue::Boolean(_), _) => {
                let n = JsValue::number(a.primitive_to_number()?);
                self.loose_equals(&n, b)
            }
            (_, JsValue::Boolean(_)) => {
                let n = JsValue::number(b.primitive_to_number()?);
                self.loose_equals(a, &n)
            }
            (JsValue::Object(_), _) => {
                let prim = self.to_primitive(a, PreferredType::Default)?;
                self.loose_equals(&prim, b)
            }
            (_, JsValue::Object(_)) => {
                let prim = self.to_primitive(b, PreferredType::Default)?;
                self.loose_equals(a, &prim)
            }
            // Symbol against number or string
            _ => Ok(false),
        }
    }

    /// IsLessThan: `Some(a < b)`, or `None` when the comparison is
    /// undefined (a NaN was involved). `left_first` fixes the order in
    /// which objects are converted.
    pub fn less_than(&mut self, a: &JsValue, b: &JsValue, left_first: bool) -> Result<Option<bool>, JsError> {
        if let Some((x, y)) = both_ints(a, b) {
            return Ok(Some(x < y));
        }
        let (pa, pb) = if left_first {
            let pa = self.to_primitive(a, PreferredType::Number)?;
            let pb = self.to_primitive(b, PreferredType::Number)?;
            (pa, pb)
        } else {
            let pb = self.to_primitive(b, PreferredType::Number)?;
            let pa = self.to_primitive(a, PreferredType::Number)?;
            (pa, pb)
        };
        if let (JsValue::String(x), JsValue::String(y)) = (&pa, &pb) {
            return Ok(Some(x.compare(y) == std::cmp::Ordering::Less));
        }
        if let Some((x, y)) = both_ints(&pa, &pb) {
            return Ok(Some(x < y));
        }
        Ok(compare_numbers(pa.primitive_to_number()?, pb.primitive_to_number()?))
    }

    /// The `+` operator: string concatenation if either side converts to a
    /// string, numeric addition otherwise
    pub fn add_values(&mut self, a: &JsValue, b: &JsValue) -> Result<JsValue, JsError> {
        if let Some((x, y)) = both_ints(a, b) {
            return Ok(JsValue::from_i64_checked(x.checked_add(y), x as f64 + y as f64));
        }
        if let (JsValue::String(x), JsValue::String(y)) = (a, b) {
            return Ok(JsValue::String(x.concat(y)));
        }
        let pa = self.to_primitive(a, PreferredType::Default)?;
        let pb = self.to_primitive(b, PreferredType::Default)?;
        match (&pa, &pb) {
            (JsValue::String(x), _) => Ok(JsValue::String(x.concat(&pb.primitive_to_js_string()?))),
            (_, JsValue::String(y)) => Ok(JsValue::String(pa.primitive_to_js_string()?.concat(y))),
            _ => {
                if let Some((x, y)) = both_ints(&pa, &pb) {
                    return Ok(JsValue::from_i64_checked(x.checked_add(y), x as f64 + y as f64));
                }
                let x = pa.primitive_to_number()?;
                let y = pb.primitive_to_number()?;
                Ok(JsValue::number(x + y))
            }
        }
    }

    /// `-`, `*`, `/` and `%`
    pub fn numeric_op(&mut self, op: NumericOp, a: &JsValue, b: &JsValue) -> Result<JsValue, JsError> {
        let a = self.to_numeric(a)?;
        let b = self.to_numeric(b)?;
        if let Some((x, y)) = both_ints(&a, &b)
            && let Some(result) = op.apply_int(x, y)
        {
            return Ok(JsValue::from_i64_checked(Some(result), result as f64));
        }
        let x = a.primitive_to_number()?;
        let y = b.primitive_to_number()?;
        Ok(JsValue::number(op.apply_float(x, y)))
    }

    /// Unary `-`
    pub fn negate(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        match self.to_numeric(value)? {
            JsValue::Int(0) => Ok(JsValue::Float(-0.0)),
            JsValue::Int(i) => Ok(JsValue::from_i64_checked(i.checked_neg(), -(i as f64))),
            other => Ok(JsValue::Float(-other.primitive_to_number()?)),
        }
    }
}
