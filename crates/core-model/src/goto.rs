use core_events::GotoTarget;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GotoError {
    #[error("no position given")]
    Empty,
    #[error("not a position: `{0}`")]
    Invalid(String),
}

/// Parse a committed goto string.
///
/// Accepted forms: decimal (`4096`), hex (`0x1000`, or any digits containing
/// `a`-`f`), percent (`50%`, 100 and above means end of file), and relative
/// (`+N` / `-N`, in either base).
pub fn parse_goto(input: &str) -> Result<GotoTarget, GotoError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(GotoError::Empty);
    }
    let invalid = || GotoError::Invalid(text.to_string());

    if let Some(rest) = text.strip_prefix('+') {
        let n = parse_number(rest.trim()).ok_or_else(invalid)?;
        return i64::try_from(n).map(GotoTarget::Relative).map_err(|_| invalid());
    }
    if let Some(rest) = text.strip_prefix('-') {
        let n = parse_number(rest.trim()).ok_or_else(invalid)?;
        return i64::try_from(n)
            .map(|n| GotoTarget::Relative(-n))
            .map_err(|_| invalid());
    }
    if let Some(rest) = text.strip_suffix('%') {
        return rest
            .trim()
            .parse::<u32>()
            .map(GotoTarget::Percent)
            .map_err(|_| invalid());
    }
    parse_number(text)
        .map(GotoTarget::Absolute)
        .ok_or_else(invalid)
}

fn parse_number(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if text.bytes().any(|b| matches!(b, b'a'..=b'f' | b'A'..=b'F')) {
        return u64::from_str_radix(text, 16).ok();
    }
    text.parse().ok()
}
