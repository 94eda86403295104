//! Phone normalizer - 表記ゆれのある電話番号を正規形にそろえる
//!
//! 正規形は `+<digits>` か、短すぎて判断できない場合の数字列そのもの。
//! 番号として実在するかの検証はしない。
//!
//! # 不変条件
//! - 冪等: `normalize(normalize(x)) == normalize(x)`
//! - 例外を投げない。使えない入力は空文字列になる

use std::sync::LazyLock;

use regex::Regex;

/// Spreadsheet float renderings: `9.19874E+11`, `9876543210.0`.
static FLOAT_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d*))?[eE]([+-]?\d+)$|^(\d+)\.0+$").unwrap()
});

/// Default country code applied to bare 10-digit numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "91";

const NATIONAL_NUMBER_LEN: usize = 10;

/// Longest integer a float rendering may expand to. Anything larger is not a phone number.
const MAX_EXPANDED_DIGITS: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl PhoneNormalizer {
    /// `country_code` is given without `+`; non-digits are dropped.
    pub fn new(country_code: impl AsRef<str>) -> Self {
        let country_code = country_code
            .as_ref()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        Self { country_code }
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let expanded = expand_float(trimmed);
        let text = expanded.as_deref().unwrap_or(trimmed);

        let stripped: String = text
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | '-') && !c.is_whitespace())
            .collect();

        if let Some(rest) = stripped.strip_prefix('+') {
            let digits = digits_of(rest);
            if digits.is_empty() {
                return String::new();
            }
            return format!("+{digits}");
        }

        let digits = digits_of(&stripped);
        match digits.len() {
            NATIONAL_NUMBER_LEN => format!("+{}{digits}", self.country_code),
            n if n > NATIONAL_NUMBER_LEN => {
                let digits = digits.strip_prefix('0').unwrap_or(&digits);
                format!("+{digits}")
            }
            _ => digits,
        }
    }
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

/// Normalize with the default country code.
pub fn normalize_phone(raw: &str) -> String {
    PhoneNormalizer::default().normalize(raw)
}

fn digits_of(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Render a float-looking value as a fixed-point integer string.
///
/// Works on the decimal text directly so large numbers keep every digit
/// the source wrote. Fractional digits left after shifting are truncated.
/// Exponents that would expand past `MAX_EXPANDED_DIGITS` are left as text.
fn expand_float(text: &str) -> Option<String> {
    let caps = FLOAT_LIKE.captures(text)?;

    if let Some(int_part) = caps.get(4) {
        return Some(int_part.as_str().to_string());
    }

    let int_part = caps.get(1)?.as_str();
    let frac_part = caps.get(2).map_or("", |m| m.as_str());
    let exponent: i64 = caps.get(3)?.as_str().parse().ok()?;

    let mantissa = format!("{int_part}{frac_part}");
    let point = i64::try_from(int_part.len()).ok()?.checked_add(exponent)?;
    if point > MAX_EXPANDED_DIGITS {
        return None;
    }

    let rendered = if point <= 0 {
        "0".to_string()
    } else if point as usize >= mantissa.len() {
        let zeros = point as usize - mantissa.len();
        format!("{mantissa}{}", "0".repeat(zeros))
    } else {
        mantissa[..point as usize].to_string()
    };

    let rendered = rendered.trim_start_matches('0');
    Some(if rendered.is_empty() {
        "0".to_string()
    } else {
        rendered.to_string()
    })
}
