//! Strict conversion boundaries
//!
//! Everywhere else a malformed surrogate sequence is carried through as-is.
//! These conversions are the exception and report it as a `URIError`.

use super::{JsString, JsStringBuilder};
use crate::error::JsError;

fn is_component_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c)
}

fn hex_value(unit: u16) -> Option<u8> {
    let c = char::from_u32(unit as u32)?;
    c.to_digit(16).map(|d| d as u8)
}

fn malformed() -> JsError {
    JsError::uri_error("URI malformed")
}

impl JsString {
    /// UTF-8 encoding that rejects lone surrogates
    pub fn to_utf8_strict(&self) -> Result<String, JsError> {
        char::decode_utf16(self.units())
            .map(|r| r.map_err(|_| malformed()))
            .collect()
    }

    /// `encodeURIComponent`
    pub fn percent_encode_component(&self) -> Result<JsString, JsError> {
        let mut out = JsStringBuilder::with_capacity(self.len());
        let mut utf8 = [0u8; 4];
        for decoded in char::decode_utf16(self.units()) {
            let c = decoded.map_err(|_| malformed())?;
            if is_component_unreserved(c) {
                out.push_unit(c as u16);
                continue;
            }
            for byte in c.encode_utf8(&mut utf8).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
        Ok(out.build())
    }

    /// `decodeURIComponent`: every escape must form valid UTF-8
    pub fn percent_decode(&self) -> Result<JsString, JsError> {
        let units = self.to_utf16();
        let mut out = JsStringBuilder::with_capacity(units.len());
        let mut i = 0;
        let read_byte = |at: usize| -> Result<u8, JsError> {
            if units.get(at) != Some(&(b'%' as u16)) {
                return Err(malformed());
            }
            let hi = units.get(at + 1).copied().and_then(hex_value).ok_or_else(malformed)?;
            let lo = units.get(at + 2).copied().and_then(hex_value).ok_or_else(malformed)?;
            Ok(hi << 4 | lo)
        };
        while let Some(&unit) = units.get(i) {
            if unit != b'%' as u16 {
                out.push_unit(unit);
                i += 1;
                continue;
            }
            let lead = read_byte(i)?;
            i += 3;
            let needed = match lead {
                0x00..=0x7F => 0,
                0xC2..=0xDF => 1,
                0xE0..=0xEF => 2,
                0xF0..=0xF4 => 3,
                _ => return Err(malformed()),
            };
            let mut bytes = vec![lead];
            for _ in 0..needed {
                bytes.push(read_byte(i)?);
                i += 3;
            }
            let text = std::str::from_utf8(&bytes).map_err(|_| malformed())?;
            out.push_str(text);
        }
        Ok(out.build())
    }
}
