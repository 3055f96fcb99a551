//! Number <-> String conversion following the ECMAScript algorithms

use crate::string::{JsString, is_js_whitespace};

/// Number::toString(10)
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "1.2345e3"
    let repr = format!("{:e}", n);
    let (mantissa, exponent) = repr.split_once('e').unwrap_or((repr.as_str(), "0"));
    let digits: Vec<u8> = mantissa.bytes().filter(|b| *b != b'.').collect();
    let exponent: i32 = exponent.parse().unwrap_or_default();
    let k = digits.len() as i32;
    let point = exponent + 1;

    let digit_str = |range: std::ops::Range<usize>| -> String {
        digits
            .get(range)
            .map(|d| d.iter().map(|&b| b as char).collect())
            .unwrap_or_default()
    };

    if k <= point && point <= 21 {
        let mut out = digit_str(0..digits.len());
        out.extend(std::iter::repeat_n('0', (point - k) as usize));
        out
    } else if 0 < point && point <= 21 {
        format!(
            "{}.{}",
            digit_str(0..point as usize),
            digit_str(point as usize..digits.len())
        )
    } else if -6 < point && point <= 0 {
        let mut out = String::from("0.");
        out.extend(std::iter::repeat_n('0', (-point) as usize));
        out.push_str(&digit_str(0..digits.len()));
        out
    } else {
        let e = point - 1;
        let sign = if e >= 0 { '+' } else { '-' };
        if k == 1 {
            format!("{}e{}{}", digit_str(0..1), sign, e.abs())
        } else {
            format!(
                "{}.{}e{}{}",
                digit_str(0..1),
                digit_str(1..digits.len()),
                sign,
                e.abs()
            )
        }
    }
}

pub fn number_to_js_string(n: f64) -> JsString {
    JsString::from(number_to_string(n))
}

fn is_decimal_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let mut mantissa_digits = i - int_start;
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let frac_start = i;
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        mantissa_digits += i - frac_start;
    }
    if mantissa_digits == 0 {
        return false;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_start = i;
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut value = 0.0f64;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => value = value * radix as f64 + d as f64,
            None => return f64::NAN,
        }
    }
    value
}

/// ToNumber applied to a string
pub fn string_to_number(s: &JsString) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if trimmed.units().any(|u| u >= 128 || is_js_whitespace(u)) {
        return f64::NAN;
    }
    let text = trimmed.to_rust_string_lossy();
    match text.as_str() {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let lower_prefix = text.get(..2).map(|p| p.to_ascii_lowercase());
    let rest = text.get(2..).unwrap_or_default();
    match lower_prefix.as_deref() {
        Some("0x") => return parse_radix(rest, 16),
        Some("0o") => return parse_radix(rest, 8),
        Some("0b") => return parse_radix(rest, 2),
        _ => {}
    }
    if !is_decimal_literal(&text) {
        return f64::NAN;
    }
    text.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToUint32 applied to a number
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let int = n.trunc();
    int.rem_euclid(4294967296.0) as u32
}

/// ToIntegerOrInfinity applied to a number
pub fn to_integer_or_infinity(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 {
        return 0.0;
    }
    if n.is_infinite() {
        return n;
    }
    n.trunc()
}

/// ToLength applied to a number
pub fn to_length(n: f64) -> u64 {
    let len = to_integer_or_infinity(n);
    if len <= 0.0 {
        0
    } else {
        len.min(9007199254740991.0) as u64
    }
}
