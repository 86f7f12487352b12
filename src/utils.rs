use ansi_term::{Colour, Style};

/// Parse a hexadecimal literal as written in program text: optional `-`,
/// optional `0x`/`0X`, at most 8 hex digits. Values are 32-bit two's
/// complement, so `0xfffffffe` is -2.
pub fn parse_hex(s: &str) -> Option<i32> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > 8 {
        return None;
    }
    let v = u32::from_str_radix(digits, 16).ok()? as i32;
    Some(if neg { v.wrapping_neg() } else { v })
}

/// Parse a numeric literal given on the command line: decimal, or hex with
/// a `0x` prefix. Either may carry a leading `-`.
pub fn parse_literal(s: &str) -> Option<i32> {
    if let Ok(r) = s.parse() {
        return Some(r);
    }
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.starts_with("0x") || body.starts_with("0X") {
        return parse_hex(s);
    }
    None
}

pub fn header() -> Style {
    Colour::Yellow.bold()
}

pub fn busy() -> Style {
    Colour::Green.bold()
}

pub fn idle() -> Style {
    Colour::Fixed(244).normal()
}

pub fn waiting() -> Style {
    Colour::Purple.normal()
}
