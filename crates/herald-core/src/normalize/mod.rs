//! Normalize - 行の生の値を正規化する純粋関数群
//!
//! - phone: 電話番号の正規形
//! - timestamp: 送信時刻の決定（Clock と運用タイムゾーンを注入）

pub mod phone;
pub mod timestamp;

pub use self::phone::{PhoneNormalizer, normalize_phone};
pub use self::timestamp::{
    ParsedInstant, Resolution, TimestampResolver, TimestampSource, parse_datetime,
};

/// Spreadsheet renderings of "no value".
const BLANK_MARKERS: &[&str] = &["nan", "none", "null", "nat"];

/// Trim an optional text cell; blanks and `NaN`-style markers become `None`.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || BLANK_MARKERS
            .iter()
            .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", None)]
    #[case("   ", None)]
    #[case("NaN", None)]
    #[case("nan", None)]
    #[case("None", None)]
    #[case(" https://cdn.example.com/a.png ", Some("https://cdn.example.com/a.png"))]
    #[case("Asha", Some("Asha"))]
    fn blank_markers_become_none(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_text(raw).as_deref(), expected);
    }
}
