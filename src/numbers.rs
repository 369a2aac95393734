//! Parsing of Persian display amounts ("۱۲،۰۰۰،۰۰۰ تومان", "۱.۴۵۰ میلیارد",
//! "۳ از ۴") into integers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Currency and negotiation phrases that carry no numeric value
const NOISE: &[&str] = &[
    "تماس حاصل فرمایید",
    "تماس بگیرید",
    "قابل مذاکره",
    "رایگان است",
    "توافقی",
    "رایگان",
    "مجانی",
    "تومان",
    "تومن",
    "ریال",
];

const MULTIPLIERS: &[(&str, i64)] = &[
    ("میلیارد", 1_000_000_000),
    ("billion", 1_000_000_000),
    ("میلیون", 1_000_000),
    ("million", 1_000_000),
    ("هزار", 1_000),
    ("thousand", 1_000),
];

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)").unwrap());
static OUT_OF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*از\s*(\d+)").unwrap());
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Floor position as displayed on a listing ("۳ از ۴" is floor 3 of 4)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorInfo {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

/// Map Persian and Arabic-Indic digits and separators to ASCII.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{060C}' | '\u{066C}' => ',',
            '\u{066B}' => '.',
            other => other,
        })
        .collect()
}

/// Parse a display amount. Returns `None` when the text holds no number
/// (e.g. "توافقی").
pub fn parse_amount(text: &str) -> Option<i64> {
    let mut cleaned = normalize_digits(text.trim());
    if cleaned.is_empty() {
        return None;
    }

    for noise in NOISE {
        cleaned = cleaned.replace(noise, "");
    }

    let mut multiplier = None;
    for (word, value) in MULTIPLIERS {
        if cleaned.to_lowercase().contains(word) {
            multiplier = Some(*value);
            cleaned = cleaned.to_lowercase().replace(word, "");
            break;
        }
    }

    if let Some(caps) = DECIMAL.captures(&cleaned) {
        let value: f64 = caps[1].parse().ok()?;
        return Some((value * multiplier.unwrap_or(1) as f64).round() as i64);
    }

    if let Some(caps) = OUT_OF.captures(&cleaned) {
        return caps[1].parse().ok();
    }

    let digits: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect::<String>()
        .replace(',', "");

    let number: i64 = DIGITS.find(&digits)?.as_str().parse().ok()?;
    number.checked_mul(multiplier.unwrap_or(1))
}

/// Split a floor value into its current/total parts.
pub fn parse_floor(text: &str) -> FloorInfo {
    let cleaned = normalize_digits(text.trim());

    if let Some(caps) = OUT_OF.captures(&cleaned) {
        return FloorInfo {
            current: caps[1].parse().ok(),
            total: caps[2].parse().ok(),
        };
    }

    FloorInfo {
        current: DIGITS.find(&cleaned).and_then(|m| m.as_str().parse().ok()),
        total: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grouped_toman_amounts() {
        assert_eq!(parse_amount("۱۰۰،۰۰۰،۰۰۰ تومان"), Some(100_000_000));
        assert_eq!(parse_amount("۱۲،۰۰۰،۰۰۰ تومان"), Some(12_000_000));
        assert_eq!(parse_amount("4,500,000 تومان"), Some(4_500_000));
    }

    #[test]
    fn applies_word_multipliers() {
        assert_eq!(parse_amount("۱۰۰ میلیون"), Some(100_000_000));
        assert_eq!(parse_amount("۸ میلیون"), Some(8_000_000));
        assert_eq!(parse_amount("۱.۴۵۰ میلیارد"), Some(1_450_000_000));
        assert_eq!(parse_amount("۱۰۰ هزار"), Some(100_000));
    }

    #[test]
    fn plain_numbers_and_years() {
        assert_eq!(parse_amount("۸۰"), Some(80));
        assert_eq!(parse_amount("۱۳۸۸"), Some(1388));
        assert_eq!(parse_amount("۱۵۵ متر"), Some(155));
    }

    #[test]
    fn text_without_digits_is_none() {
        assert_eq!(parse_amount("رایگان"), None);
        assert_eq!(parse_amount("توافقی"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn floor_with_total() {
        assert_eq!(
            parse_floor("۳ از ۴"),
            FloorInfo {
                current: Some(3),
                total: Some(4)
            }
        );
        assert_eq!(
            parse_floor("۲"),
            FloorInfo {
                current: Some(2),
                total: None
            }
        );
        assert_eq!(parse_floor("همکف"), FloorInfo::default());
    }
}
