//! JavaScript strings
//!
//! A `JsString` is a sequence of UTF-16 code units stored in one of two forms:
//! a byte form (one byte per unit, every unit below 256) and a wide form (one
//! `u16` per unit). All indexing, lengths and comparisons work on code units
//! regardless of form. Operations that introduce a unit of 256 or above
//! promote to the wide form; nothing ever converts a wide string back.

mod builder;
mod case;
mod uri;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::value::CheapClone;

pub use builder::JsStringBuilder;

/// Reference-counted, immutable JavaScript string
#[derive(Clone)]
pub struct JsString(Repr);

#[derive(Clone)]
enum Repr {
    Bytes(Rc<[u8]>),
    Wide(Rc<[u16]>),
}

impl CheapClone for JsString {}

/// Iterator over the code units of a `JsString`
#[derive(Clone)]
pub enum Units<'a> {
    Bytes(std::slice::Iter<'a, u8>),
    Wide(std::slice::Iter<'a, u16>),
}

impl Iterator for Units<'_> {
    type Item = u16;

    #[inline]
    fn next(&mut self) -> Option<u16> {
        match self {
            Units::Bytes(it) => it.next().map(|&b| b as u16),
            Units::Wide(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Units::Bytes(it) => it.size_hint(),
            Units::Wide(it) => it.size_hint(),
        }
    }
}

impl DoubleEndedIterator for Units<'_> {
    fn next_back(&mut self) -> Option<u16> {
        match self {
            Units::Bytes(it) => it.next_back().map(|&b| b as u16),
            Units::Wide(it) => it.next_back().copied(),
        }
    }
}

impl ExactSizeIterator for Units<'_> {}

/// ECMAScript WhiteSpace and LineTerminator code units
pub(crate) fn is_js_whitespace(unit: u16) -> bool {
    matches!(
        unit,
        0x09 | 0x0A
            | 0x0B
            | 0x0C
            | 0x0D
            | 0x20
            | 0xA0
            | 0x1680
            | 0x2000..=0x200A
            | 0x2028
            | 0x2029
            | 0x202F
            | 0x205F
            | 0x3000
            | 0xFEFF
    )
}

impl JsString {
    /// The empty string
    pub fn empty() -> Self {
        JsString(Repr::Bytes(Rc::from(&[][..])))
    }

    /// Build a byte-form string from Latin-1 bytes
    pub fn from_latin1(bytes: &[u8]) -> Self {
        JsString(Repr::Bytes(Rc::from(bytes)))
    }

    /// Build a string from UTF-16 code units. Lone surrogates are kept as-is.
    /// Picks the byte form when every unit fits in a byte.
    pub fn from_utf16(units: Vec<u16>) -> Self {
        if units.iter().all(|&u| u < 256) {
            let bytes: Vec<u8> = units.iter().map(|&u| u as u8).collect();
            JsString(Repr::Bytes(Rc::from(bytes)))
        } else {
            JsString(Repr::Wide(Rc::from(units)))
        }
    }

    /// Wrap units that must stay in the wide form
    pub(crate) fn from_wide_units(units: Vec<u16>) -> Self {
        JsString(Repr::Wide(Rc::from(units)))
    }

    /// Number of UTF-16 code units
    #[inline]
    pub fn len(&self) -> usize {
        match &self.0 {
            Repr::Bytes(b) => b.len(),
            Repr::Wide(w) => w.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this string uses the wide (16-bit) form
    #[inline]
    pub fn is_wide(&self) -> bool {
        matches!(self.0, Repr::Wide(_))
    }

    #[inline]
    pub fn units(&self) -> Units<'_> {
        match &self.0 {
            Repr::Bytes(b) => Units::Bytes(b.iter()),
            Repr::Wide(w) => Units::Wide(w.iter()),
        }
    }

    pub fn to_utf16(&self) -> Vec<u16> {
        self.units().collect()
    }

    /// Raw bytes of a byte-form string
    pub(crate) fn as_latin1(&self) -> Option<&[u8]> {
        match &self.0 {
            Repr::Bytes(b) => Some(b),
            Repr::Wide(_) => None,
        }
    }

    /// Code unit at `index`
    #[inline]
    pub fn char_code_at(&self, index: usize) -> Option<u16> {
        match &self.0 {
            Repr::Bytes(b) => b.get(index).map(|&b| b as u16),
            Repr::Wide(w) => w.get(index).copied(),
        }
    }

    /// Code point at `index`, combining a surrogate pair that starts there
    pub fn code_point_at(&self, index: usize) -> Option<u32> {
        let first = self.char_code_at(index)?;
        if (0xD800..0xDC00).contains(&first)
            && let Some(second) = self.char_code_at(index + 1)
            && (0xDC00..0xE000).contains(&second)
        {
            let high = (first as u32 - 0xD800) << 10;
            let low = second as u32 - 0xDC00;
            return Some(0x10000 + high + low);
        }
        Some(first as u32)
    }

    /// Units in `[start, end)`, clamped to the string. Keeps the source form.
    pub fn substring(&self, start: usize, end: usize) -> JsString {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        if start == 0 && end == len {
            return self.cheap_clone();
        }
        match &self.0 {
            Repr::Bytes(b) => JsString::from_latin1(b.get(start..end).unwrap_or_default()),
            Repr::Wide(w) => {
                JsString(Repr::Wide(Rc::from(w.get(start..end).unwrap_or_default())))
            }
        }
    }

    pub fn concat(&self, other: &JsString) -> JsString {
        if other.is_empty() {
            return self.cheap_clone();
        }
        if self.is_empty() {
            return other.cheap_clone();
        }
        match (&self.0, &other.0) {
            (Repr::Bytes(a), Repr::Bytes(b)) => {
                let mut bytes = Vec::with_capacity(a.len() + b.len());
                bytes.extend_from_slice(a);
                bytes.extend_from_slice(b);
                JsString(Repr::Bytes(Rc::from(bytes)))
            }
            _ => {
                let mut units = Vec::with_capacity(self.len() + other.len());
                units.extend(self.units());
                units.extend(other.units());
                JsString::from_wide_units(units)
            }
        }
    }

    fn region_matches(&self, at: usize, needle: &JsString) -> bool {
        needle
            .units()
            .enumerate()
            .all(|(k, unit)| self.char_code_at(at + k) == Some(unit))
    }

    /// First occurrence of `needle` at or after `from`
    pub fn index_of(&self, needle: &JsString, from: usize) -> Option<usize> {
        let len = self.len();
        let start = from.min(len);
        if needle.is_empty() {
            return Some(start);
        }
        if needle.len() > len {
            return None;
        }
        if let (Some(hay), Some(pat)) = (self.as_latin1(), needle.as_latin1()) {
            return hay
                .get(start..)?
                .windows(pat.len())
                .position(|w| w == pat)
                .map(|p| p + start);
        }
        (start..=len - needle.len()).find(|&i| self.region_matches(i, needle))
    }

    /// Last occurrence of `needle` starting at or before `from`
    pub fn last_index_of(&self, needle: &JsString, from: usize) -> Option<usize> {
        let len = self.len();
        if needle.len() > len {
            return None;
        }
        let start = from.min(len - needle.len());
        (0..=start).rev().find(|&i| self.region_matches(i, needle))
    }

    pub fn starts_with(&self, prefix: &JsString) -> bool {
        prefix.len() <= self.len() && self.region_matches(0, prefix)
    }

    /// Code-unit lexicographic comparison
    pub fn compare(&self, other: &JsString) -> Ordering {
        match (&self.0, &other.0) {
            (Repr::Bytes(a), Repr::Bytes(b)) => a.cmp(b),
            (Repr::Wide(a), Repr::Wide(b)) => a.cmp(b),
            _ => self.units().cmp(other.units()),
        }
    }

    /// True when both strings share the same storage form and contents
    pub fn same_bytes(&self, other: &JsString) -> bool {
        match (&self.0, &other.0) {
            (Repr::Bytes(a), Repr::Bytes(b)) => a == b,
            (Repr::Wide(a), Repr::Wide(b)) => a == b,
            _ => false,
        }
    }

    pub fn repeat(&self, count: usize) -> JsString {
        match &self.0 {
            Repr::Bytes(b) => JsString::from_latin1(&b.repeat(count)),
            Repr::Wide(w) => JsString::from_wide_units(w.repeat(count)),
        }
    }

    /// Strip leading and trailing ECMAScript whitespace
    pub fn trim(&self) -> JsString {
        let start = self.units().position(|u| !is_js_whitespace(u));
        let Some(start) = start else {
            return JsString::empty();
        };
        let end = self.len() - self.units().rev().position(|u| !is_js_whitespace(u)).unwrap_or(0);
        self.substring(start, end)
    }

    /// No lone surrogates
    pub fn is_well_formed(&self) -> bool {
        match &self.0 {
            Repr::Bytes(_) => true,
            Repr::Wide(w) => char::decode_utf16(w.iter().copied()).all(|r| r.is_ok()),
        }
    }

    /// Display form: surrogate pairs collapse, lone surrogates become U+FFFD
    pub fn to_rust_string_lossy(&self) -> String {
        match &self.0 {
            Repr::Bytes(b) => b.iter().map(|&b| b as char).collect(),
            Repr::Wide(w) => char::decode_utf16(w.iter().copied())
                .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        }
    }

    /// Compare against a Rust string without allocating
    pub fn eq_str(&self, other: &str) -> bool {
        let mut theirs = other.encode_utf16();
        let mut ours = self.units();
        loop {
            match (ours.next(), theirs.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a == b => continue,
                _ => return false,
            }
        }
    }

    /// Canonical array index (`"0"`, `"17"`, never `"017"`), at most 2^32 - 2
    pub(crate) fn to_array_index(&self) -> Option<u32> {
        let len = self.len();
        if len == 0 || len > 10 {
            return None;
        }
        let mut value: u64 = 0;
        for (i, unit) in self.units().enumerate() {
            if !(b'0' as u16..=b'9' as u16).contains(&unit) {
                return None;
            }
            if i == 0 && unit == b'0' as u16 && len > 1 {
                return None;
            }
            value = value * 10 + (unit - b'0' as u16) as u64;
        }
        if value < u32::MAX as u64 {
            Some(value as u32)
        } else {
            None
        }
    }
}

impl Default for JsString {
    fn default() -> Self {
        JsString::empty()
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Bytes(a), Repr::Bytes(b)) => a == b,
            (Repr::Wide(a), Repr::Wide(b)) => a == b,
            _ => self.len() == other.len() && self.units().eq(other.units()),
        }
    }
}

impl Eq for JsString {}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.eq_str(other)
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self.eq_str(other)
    }
}

impl PartialOrd for JsString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

// Both forms hash the same unit sequence so equal strings collide.
impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for unit in self.units() {
            state.write_u16(unit);
        }
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        if s.is_ascii() {
            return JsString::from_latin1(s.as_bytes());
        }
        if s.chars().all(|c| (c as u32) < 256) {
            let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
            return JsString(Repr::Bytes(Rc::from(bytes)));
        }
        JsString::from_wide_units(s.encode_utf16().collect())
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString::from(s.as_str())
    }
}

impl From<char> for JsString {
    fn from(c: char) -> Self {
        let mut buf = [0u8; 4];
        JsString::from(&*c.encode_utf8(&mut buf))
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_rust_string_lossy())
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rust_string_lossy())
    }
}
