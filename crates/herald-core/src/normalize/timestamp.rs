//! Timestamp resolver - 行から送信時刻を 1 つ決める
//!
//! # 優先順位
//! 1. datetime 列
//! 2. date 列 + time 列（空白で連結）
//! 3. それ以外の列で日付らしい値（電話番号・メディア列は除く）
//! 4. どれも駄目なら `now + no_date_offset`
//!
//! 解析は「オフセット付き → ISO → 日先 → 月先」の順に試す。
//! オフセットなしの値は運用タイムゾーンの壁時計として扱い、
//! オフセット付きの値は運用タイムゾーンに変換する。

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::zone::OperatingZone;
use crate::ingest::ColumnMap;
use crate::ports::Clock;

/// Delay (seconds) applied to rows that yield no usable instant.
pub const DEFAULT_NO_DATE_OFFSET_SECS: i64 = 5;

/// Cheap pre-filter for the column scan.
static DATE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,4}[-/:\s]\d{1,4}").unwrap());

/// Pulls a date (with optional time) out of surrounding prose.
static EMBEDDED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}(?:[ T]\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp][Mm])?)?",
    )
    .unwrap()
});

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M %z",
];

const ISO_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M:%S %p",
    "%d/%m/%Y %I:%M %p",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d-%m-%Y %I:%M %p",
    "%d.%m.%Y %H:%M",
    "%d/%m/%y %H:%M",
    "%d-%b-%Y %H:%M",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M",
];

const MONTH_FIRST_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m-%d-%Y %H:%M",
    "%b %d %Y %H:%M",
    "%B %d %Y %H:%M",
    "%b %d, %Y %H:%M",
    "%B %d, %Y %H:%M",
];

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const DAY_FIRST_DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%d-%b-%Y", "%d %b %Y", "%d %B %Y",
];

const MONTH_FIRST_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y", "%m-%d-%Y", "%b %d %Y", "%B %d %Y", "%b %d, %Y", "%B %d, %Y",
];

/// Years below this are treated as a format mismatch (`%Y` happily reads `24`).
const MIN_PLAUSIBLE_YEAR: i32 = 1900;

/// How a row's instant was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampSource {
    /// The value carried its own offset; holds the offset as written (`+00:00`).
    Explicit(String),
    /// No offset in the value; holds the assumed-zone label (`Assumed IST`).
    Assumed(String),
    /// No date-like value anywhere in the row.
    NoDateGiven,
    /// A date column had text that could not be parsed.
    Unparseable,
}

impl TimestampSource {
    pub fn label(&self) -> &str {
        match self {
            TimestampSource::Explicit(label) | TimestampSource::Assumed(label) => label,
            TimestampSource::NoDateGiven => "NoDateGiven",
            TimestampSource::Unparseable => "UnparseableDate",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            TimestampSource::NoDateGiven | TimestampSource::Unparseable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub instant: DateTime<FixedOffset>,
    pub source: TimestampSource,
    pub original_value: String,
}

/// Result of parsing a single text value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedInstant {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Parse one free-form date/time value.
///
/// Time-only values (`14:30`) do not parse; a date is always required.
pub fn parse_datetime(text: &str) -> Option<ParsedInstant> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }
    parse_exact(&text).or_else(|| {
        let embedded = EMBEDDED_DATE.find(&text)?;
        if embedded.as_str() == text {
            return None;
        }
        parse_exact(embedded.as_str())
    })
}

fn parse_exact(text: &str) -> Option<ParsedInstant> {
    if let Some(zoned) = parse_zoned(text) {
        return Some(ParsedInstant::Zoned(zoned));
    }
    parse_naive(text).map(ParsedInstant::Naive)
}

fn parse_zoned(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    // `Z` / `UTC` / `GMT` suffixes on an otherwise naive value
    let upper = text.to_ascii_uppercase();
    let naive_part = upper
        .strip_suffix(" UTC")
        .or_else(|| upper.strip_suffix(" GMT"))
        .or_else(|| upper.strip_suffix('Z'))?;
    let naive = parse_naive(text[..naive_part.len()].trim_end())?;
    Some(naive.and_utc().fixed_offset())
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    let datetime_groups = [ISO_FORMATS, DAY_FIRST_FORMATS, MONTH_FIRST_FORMATS];
    for formats in datetime_groups {
        for format in formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, format)
                && dt.year() >= MIN_PLAUSIBLE_YEAR
            {
                return Some(dt);
            }
        }
    }

    let date_groups = [
        ISO_DATE_FORMATS,
        DAY_FIRST_DATE_FORMATS,
        MONTH_FIRST_DATE_FORMATS,
    ];
    for formats in date_groups {
        for format in formats {
            if let Ok(date) = NaiveDate::parse_from_str(text, format)
                && date.year() >= MIN_PLAUSIBLE_YEAR
            {
                return Some(date.and_time(chrono::NaiveTime::MIN));
            }
        }
    }
    None
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map_or("", |s| s.trim())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves the send instant for one table row.
pub struct TimestampResolver<C> {
    zone: OperatingZone,
    clock: C,
    no_date_offset: TimeDelta,
}

impl<C: Clock> TimestampResolver<C> {
    pub fn new(zone: OperatingZone, clock: C) -> Self {
        Self {
            zone,
            clock,
            no_date_offset: TimeDelta::seconds(DEFAULT_NO_DATE_OFFSET_SECS),
        }
    }

    pub fn with_no_date_offset(mut self, offset: TimeDelta) -> Self {
        self.no_date_offset = offset;
        self
    }

    pub fn zone(&self) -> &OperatingZone {
        &self.zone
    }

    pub fn resolve(&self, row: &[String], columns: &ColumnMap) -> Resolution {
        let at = |idx: Option<usize>| cell(row, idx);
        let mut saw_unparseable = false;

        // (a) combined column
        let combined = at(columns.datetime);
        if !combined.is_empty() {
            if let Some(resolution) = self.interpret(combined) {
                return resolution;
            }
            saw_unparseable = true;
        }

        // (b) date + time
        let joined = if columns.date.is_some() && columns.time.is_some() {
            let date = at(columns.date);
            (!date.is_empty()).then(|| format!("{date} {}", at(columns.time)).trim().to_string())
        } else {
            None
        };
        if let Some(joined) = &joined {
            if let Some(resolution) = self.interpret(joined) {
                return resolution;
            }
            saw_unparseable = true;
        } else {
            // date column without a time column
            let date = at(columns.date);
            if !date.is_empty() {
                if let Some(resolution) = self.interpret(date) {
                    return resolution;
                }
                saw_unparseable = true;
            }
        }

        // (c) anything else that looks like a date
        for (idx, value) in row.iter().enumerate() {
            if Some(idx) == columns.phone || Some(idx) == columns.media {
                continue;
            }
            let value = value.trim();
            if value.is_empty() || !DATE_LIKE.is_match(value) {
                continue;
            }
            if let Some(resolution) = self.interpret(value) {
                return resolution;
            }
        }

        // (d) fallback
        let original_value = if !combined.is_empty() {
            combined.to_string()
        } else {
            joined.unwrap_or_else(|| at(columns.date).to_string())
        };
        let instant = self.zone.convert(&(self.clock.now() + self.no_date_offset));
        let source = if saw_unparseable {
            TimestampSource::Unparseable
        } else {
            TimestampSource::NoDateGiven
        };
        Resolution {
            instant,
            source,
            original_value,
        }
    }

    fn interpret(&self, text: &str) -> Option<Resolution> {
        let (instant, source) = match parse_datetime(text)? {
            ParsedInstant::Zoned(dt) => (
                self.zone.convert(&dt),
                TimestampSource::Explicit(dt.offset().to_string()),
            ),
            ParsedInstant::Naive(naive) => (
                self.zone.localize(naive),
                TimestampSource::Assumed(self.zone.assumed_label()),
            ),
        };
        Some(Resolution {
            instant,
            source,
            original_value: text.to_string(),
        })
    }
}
