//! Incremental string construction

use super::{JsString, Repr};

use std::rc::Rc;

enum Buffer {
    Bytes(Vec<u8>),
    Wide(Vec<u16>),
}

/// Accumulates code units, starting in the byte form and promoting in place
/// the first time a unit of 256 or above is appended.
pub struct JsStringBuilder {
    buf: Buffer,
}

impl Default for JsStringBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsStringBuilder {
    pub fn new() -> Self {
        Self {
            buf: Buffer::Bytes(Vec::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Buffer::Bytes(Vec::with_capacity(capacity)),
        }
    }

    /// Start directly in the wide form when the content is expected to
    /// contain non-Latin-1 text, so appends never pay for a promotion.
    pub fn likely_wide(capacity: usize) -> Self {
        Self {
            buf: Buffer::Wide(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match &self.buf {
            Buffer::Bytes(b) => b.len(),
            Buffer::Wide(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_wide(&self) -> bool {
        matches!(self.buf, Buffer::Wide(_))
    }

    fn promote(&mut self, extra: usize) {
        if let Buffer::Bytes(bytes) = &self.buf {
            let mut wide = Vec::with_capacity(bytes.len() + extra);
            wide.extend(bytes.iter().map(|&b| b as u16));
            self.buf = Buffer::Wide(wide);
        }
    }

    #[inline]
    pub fn push_unit(&mut self, unit: u16) {
        match &mut self.buf {
            Buffer::Bytes(b) if unit < 256 => b.push(unit as u8),
            Buffer::Wide(w) => w.push(unit),
            Buffer::Bytes(_) => {
                self.promote(1);
                if let Buffer::Wide(w) = &mut self.buf {
                    w.push(unit);
                }
            }
        }
    }

    pub fn push_char(&mut self, c: char) {
        let mut units = [0u16; 2];
        for &unit in c.encode_utf16(&mut units).iter() {
            self.push_unit(unit);
        }
    }

    pub fn push_str(&mut self, s: &str) {
        match &mut self.buf {
            Buffer::Bytes(b) if s.is_ascii() => b.extend_from_slice(s.as_bytes()),
            _ => {
                for c in s.chars() {
                    self.push_char(c);
                }
            }
        }
    }

    pub fn push_js_string(&mut self, s: &JsString) {
        match (&mut self.buf, &s.0) {
            (Buffer::Bytes(b), Repr::Bytes(src)) => b.extend_from_slice(src),
            (Buffer::Wide(w), _) => w.extend(s.units()),
            (Buffer::Bytes(_), Repr::Wide(src)) => {
                self.promote(src.len());
                if let Buffer::Wide(w) = &mut self.buf {
                    w.extend_from_slice(src);
                }
            }
        }
    }

    /// Append units `[start, end)` of `s`
    pub fn push_substring(&mut self, s: &JsString, start: usize, end: usize) {
        let end = end.min(s.len());
        for unit in s.units().take(end).skip(start) {
            self.push_unit(unit);
        }
    }

    pub fn build(self) -> JsString {
        match self.buf {
            Buffer::Bytes(b) => JsString(Repr::Bytes(Rc::from(b))),
            Buffer::Wide(w) => JsString(Repr::Wide(Rc::from(w))),
        }
    }
}
