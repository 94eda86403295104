//! OperatingZone - 内部で扱う時刻はすべてこの固定タイムゾーンに揃える
//!
//! naive な時刻は内部に持ち込まない。取り込み時に `localize` か `convert`
//! のどちらかを必ず通す。

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};

use super::errors::ConfigError;

/// India Standard Time, the default operating zone.
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingZone {
    offset: FixedOffset,
    label: String,
}

impl OperatingZone {
    pub fn new(offset: FixedOffset, label: impl Into<String>) -> Self {
        Self {
            offset,
            label: label.into(),
        }
    }

    /// Parse an offset such as `+05:30` or `-03:00`.
    pub fn parse(offset: &str, label: impl Into<String>) -> Result<Self, ConfigError> {
        let offset: FixedOffset = offset
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidOffset(offset.to_string()))?;
        Ok(Self::new(offset, label))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label written to the audit log for values that carried no zone.
    pub fn assumed_label(&self) -> String {
        format!("Assumed {}", self.label)
    }

    /// Interpret a wall-clock value as local time in this zone.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        let utc = naive - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }

    /// Convert an instant that already carries a zone.
    pub fn convert<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }
}

impl Default for OperatingZone {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        Self::new(offset, "IST")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn localize_keeps_wall_clock() {
        let zone = OperatingZone::default();
        let naive = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let local = zone.localize(naive);

        assert_eq!(local.naive_local(), naive);
        assert_eq!(local.offset().local_minus_utc(), IST_OFFSET_SECS);
        assert_eq!(local.to_rfc3339(), "2024-01-15T14:30:00+05:30");
    }

    #[test]
    fn convert_shifts_explicit_instants() {
        let zone = OperatingZone::default();
        let utc = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        assert_eq!(zone.convert(&utc).to_rfc3339(), "2024-01-15T14:30:00+05:30");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(OperatingZone::parse("+05:30", "IST").is_ok());
        assert!(OperatingZone::parse("five thirty", "IST").is_err());
    }

    #[test]
    fn assumed_label_uses_zone_label() {
        assert_eq!(OperatingZone::default().assumed_label(), "Assumed IST");
    }
}
