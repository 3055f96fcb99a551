//! Locale-insensitive case mapping

use super::{JsString, JsStringBuilder};

const GREEK_SMALL_ALPHA: u16 = 0x3B1;
const COMBINING_YPOGEGRAMMENI: u16 = 0x345;
const SMALL_FINAL_SIGMA: u16 = 0x3C2;
const SMALL_SIGMA: u16 = 0x3C3;

/// Split into runs of well-formed text and lone surrogates, map the text
/// runs with `map` and copy the lone surrogates through untouched.
fn map_runs(s: &JsString, map: impl Fn(&str) -> String) -> JsString {
    let mut out = JsStringBuilder::with_capacity(s.len());
    let mut run = String::new();
    for decoded in char::decode_utf16(s.units()) {
        match decoded {
            Ok(c) => run.push(c),
            Err(lone) => {
                if !run.is_empty() {
                    out.push_str(&map(&run));
                    run.clear();
                }
                out.push_unit(lone.unpaired_surrogate());
            }
        }
    }
    if !run.is_empty() {
        out.push_str(&map(&run));
    }
    out.build()
}

impl JsString {
    /// Unicode default lower-casing with the final-sigma rule
    pub fn to_lowercase(&self) -> JsString {
        if let Some(bytes) = self.as_latin1() {
            // Latin-1 lower-cases within Latin-1
            let lowered: Vec<u8> = bytes
                .iter()
                .map(|&b| match b {
                    b'A'..=b'Z' => b + 0x20,
                    0xC0..=0xDE if b != 0xD7 => b + 0x20,
                    _ => b,
                })
                .collect();
            return JsString::from_latin1(&lowered);
        }
        let lowered = map_runs(self, str::to_lowercase);
        revert_sigma_after_ypogegrammeni(lowered)
    }

    /// Unicode default upper-casing (`ß` becomes `SS`)
    pub fn to_uppercase(&self) -> JsString {
        if let Some(bytes) = self.as_latin1()
            && !bytes.iter().any(|&b| matches!(b, 0xB5 | 0xDF | 0xFF))
        {
            let raised: Vec<u8> = bytes
                .iter()
                .map(|&b| match b {
                    b'a'..=b'z' => b - 0x20,
                    0xE0..=0xFE if b != 0xF7 => b - 0x20,
                    _ => b,
                })
                .collect();
            return JsString::from_latin1(&raised);
        }
        map_runs(self, str::to_uppercase)
    }
}

/// The final-sigma rule treats U+0345 as case-ignorable, so `Σ` right after
/// it can come out as `ς`. That form is only kept when the U+0345 itself
/// follows an alpha.
fn revert_sigma_after_ypogegrammeni(s: JsString) -> JsString {
    let mut units = s.to_utf16();
    let mut changed = false;
    let mut i = 0;
    while i + 1 < units.len() {
        let prev = if i == 0 { None } else { units.get(i - 1).copied() };
        if prev != Some(GREEK_SMALL_ALPHA)
            && units.get(i) == Some(&COMBINING_YPOGEGRAMMENI)
            && units.get(i + 1) == Some(&SMALL_FINAL_SIGMA)
        {
            if let Some(slot) = units.get_mut(i + 1) {
                *slot = SMALL_SIGMA;
                changed = true;
            }
            i += 1;
        }
        i += 1;
    }
    if changed {
        JsString::from_wide_units(units)
    } else {
        s
    }
}
