//! Column detection - ヘッダー名から列の役割を推定する
//!
//! 候補名の表はデータとして持つ。表を差し替えれば別の言語・別の業務の
//! シートにも対応できる。

use serde::{Deserialize, Serialize};

pub const NAME_CANDIDATES: &[&str] = &["name", "full name", "fullname", "patient"];

pub const PHONE_CANDIDATES: &[&str] = &["mobile", "phone", "contact", "number", "mobile_number"];

pub const MEDIA_CANDIDATES: &[&str] = &["media", "media_path", "image", "url", "file", "media_url"];

pub const DATETIME_CANDIDATES: &[&str] = &[
    "datetime",
    "date_time",
    "date/time",
    "date time",
    "timestamp",
    "scheduled_at",
    "scheduled",
    "sendtime",
    "send_time",
    "send_date",
    "time",
    "date",
];

pub const DATE_CANDIDATES: &[&str] = &["date", "send_date", "day"];

pub const TIME_CANDIDATES: &[&str] = &["time", "send_time", "hour", "minute"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Name,
    Phone,
    Media,
    DateTime,
    Date,
    Time,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 6] = [
        ColumnRole::Name,
        ColumnRole::Phone,
        ColumnRole::Media,
        ColumnRole::DateTime,
        ColumnRole::Date,
        ColumnRole::Time,
    ];

    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Name => NAME_CANDIDATES,
            ColumnRole::Phone => PHONE_CANDIDATES,
            ColumnRole::Media => MEDIA_CANDIDATES,
            ColumnRole::DateTime => DATETIME_CANDIDATES,
            ColumnRole::Date => DATE_CANDIDATES,
            ColumnRole::Time => TIME_CANDIDATES,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnRole::Name => "name",
            ColumnRole::Phone => "phone",
            ColumnRole::Media => "media",
            ColumnRole::DateTime => "datetime",
            ColumnRole::Date => "date",
            ColumnRole::Time => "time",
        }
    }
}

/// Find the header for a role.
///
/// An exact (case-insensitive) match on any candidate wins over a substring
/// match. Within each pass candidates are tried in order, so earlier entries
/// in the table take priority.
pub fn resolve_column<S: AsRef<str>>(headers: &[S], candidates: &[&str]) -> Option<usize> {
    let lowered: Vec<String> = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect();

    candidates
        .iter()
        .find_map(|cand| lowered.iter().position(|h| h == cand))
        .or_else(|| {
            candidates
                .iter()
                .find_map(|cand| lowered.iter().position(|h| h.contains(cand)))
        })
}

/// Column indices for every role; `None` when no header matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub name: Option<usize>,
    pub phone: Option<usize>,
    pub media: Option<usize>,
    pub datetime: Option<usize>,
    pub date: Option<usize>,
    pub time: Option<usize>,
}

impl ColumnMap {
    pub fn detect<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            name: resolve_column(headers, NAME_CANDIDATES),
            phone: resolve_column(headers, PHONE_CANDIDATES),
            media: resolve_column(headers, MEDIA_CANDIDATES),
            datetime: resolve_column(headers, DATETIME_CANDIDATES),
            date: resolve_column(headers, DATE_CANDIDATES),
            time: resolve_column(headers, TIME_CANDIDATES),
        }
    }

    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        match role {
            ColumnRole::Name => self.name,
            ColumnRole::Phone => self.phone,
            ColumnRole::Media => self.media,
            ColumnRole::DateTime => self.datetime,
            ColumnRole::Date => self.date,
            ColumnRole::Time => self.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["Name", "Mobile", "Media"], PHONE_CANDIDATES, Some(1))]
    #[case(&["Patient Name", "Contact No"], PHONE_CANDIDATES, Some(1))]
    #[case(&["Patient Name", "Contact No"], NAME_CANDIDATES, Some(0))]
    #[case(&["Phone Number", "mobile_number"], PHONE_CANDIDATES, Some(1))]
    #[case(&["notes"], PHONE_CANDIDATES, None)]
    #[case(&["Send Date", "Time"], DATETIME_CANDIDATES, Some(1))]
    #[case(&["Image URL"], MEDIA_CANDIDATES, Some(0))]
    #[case(&[" DATE "], DATE_CANDIDATES, Some(0))]
    fn resolves_headers(
        #[case] headers: &[&str],
        #[case] candidates: &[&str],
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(resolve_column(headers, candidates), expected);
    }

    #[test]
    fn exact_match_beats_earlier_substring() {
        // "mobile" is a substring of column 0, but column 1 is an exact "phone"
        let headers = ["mobile_or_landline", "phone"];
        assert_eq!(resolve_column(&headers, PHONE_CANDIDATES), Some(1));
    }

    #[test]
    fn detect_fills_every_role() {
        let map = ColumnMap::detect(&["Name", "Mobile", "Date", "Time", "Media URL"]);
        assert_eq!(map.name, Some(0));
        assert_eq!(map.phone, Some(1));
        assert_eq!(map.date, Some(2));
        assert_eq!(map.time, Some(3));
        assert_eq!(map.media, Some(4));
        assert_eq!(map.get(ColumnRole::DateTime), Some(3));
    }
}
