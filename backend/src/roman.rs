//! Section numbers written as Roman numerals or decimal digits.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RE_ROMAN: Regex = Regex::new(r"(?i)^[IVXLCDM]+$").unwrap();
}

fn roman_value(c: char) -> Option<i64> {
    match c.to_ascii_uppercase() {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

/// Decode a Roman numeral with the subtractive rule: a symbol smaller than
/// its right neighbour is subtracted, otherwise added.
///
/// Returns None for an empty token, a non-Roman character, or a non-positive
/// result.
///
/// Example: "MCMXCIV" → 1994
pub fn roman_to_int(token: &str) -> Option<u32> {
    let values: Vec<i64> = token.chars()
        .map(roman_value)
        .collect::<Option<Vec<_>>>()?;

    if values.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    for (i, val) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if val < next => total -= val,
            _ => total += val,
        }
    }

    u32::try_from(total).ok().filter(|n| *n > 0)
}

/// Resolve a header number token: Roman if it only has Roman letters,
/// otherwise base-10.
pub fn resolve_numeral(token: &str) -> Option<u32> {
    let token = token.trim();
    if RE_ROMAN.is_match(token) {
        roman_to_int(token)
    } else {
        token.parse::<u32>().ok()
    }
}
