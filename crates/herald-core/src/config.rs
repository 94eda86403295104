//! Config - herald.toml + HERALD_* 環境変数
//!
//! 入れ子のキーは `__` で区切る（例: `HERALD_DISPATCH__DELAY_SECS=2.5`）。
//! どのセクションも省略可能で、省略時は既定値になる。

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::app::dispatcher::{DEFAULT_BODY_TEMPLATE, DispatchSettings};
use crate::app::pacing::{DEFAULT_DELAY_SECS, Pacing};
use crate::domain::errors::ConfigError;
use crate::domain::{JobIdentity, OperatingZone};
use crate::impls::TwilioCredentials;
use crate::impls::twilio::DEFAULT_BASE_URL;
use crate::normalize::PhoneNormalizer;
use crate::normalize::timestamp::DEFAULT_NO_DATE_OFFSET_SECS;

pub const DEFAULT_CONFIG_FILE: &str = "herald.toml";
pub const ENV_PREFIX: &str = "HERALD_";

/// Top-level config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub timezone: TimezoneConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    /// Log instead of calling the messaging API.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimezoneConfig {
    /// Offset such as `+05:30`.
    #[serde(default = "default_offset")]
    pub offset: String,
    #[serde(default = "default_zone_label")]
    pub label: String,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            offset: default_offset(),
            label: default_zone_label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Prefixed to bare 10-digit numbers.
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    /// How late a job may become due and still be sent. `0` sends late jobs anyway.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_no_date_offset_secs")]
    pub no_date_offset_secs: i64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_body_template")]
    pub body_template: String,
    #[serde(default)]
    pub identity: JobIdentity,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            grace_secs: default_grace_secs(),
            no_date_offset_secs: default_no_date_offset_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            body_template: default_body_template(),
            identity: JobIdentity::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Sender, `whatsapp:+<number>`.
    pub from: Option<String>,
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from: None,
            base_url: default_twilio_base_url(),
        }
    }
}

impl TwilioConfig {
    /// `None` unless all three values are present. Shape is not checked here.
    pub fn credentials(&self) -> Option<TwilioCredentials> {
        match (&self.account_sid, &self.auth_token, &self.from) {
            (Some(sid), Some(token), Some(from)) => Some(TwilioCredentials::new(sid, token, from)),
            _ => None,
        }
    }
}

impl HeraldConfig {
    /// Load from `path` (default `herald.toml`, missing file is fine) and env.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(path)
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn zone(&self) -> Result<OperatingZone, ConfigError> {
        OperatingZone::parse(&self.timezone.offset, self.timezone.label.clone())
    }

    pub fn phone_normalizer(&self) -> PhoneNormalizer {
        PhoneNormalizer::new(self.phone.country_code.trim())
    }

    pub fn pacing(&self) -> Result<Pacing, ConfigError> {
        Pacing::new(self.dispatch.delay_secs)
    }

    pub fn no_date_offset(&self) -> TimeDelta {
        TimeDelta::seconds(self.dispatch.no_date_offset_secs)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            grace: (self.dispatch.grace_secs > 0).then(|| Duration::from_secs(self.dispatch.grace_secs)),
            send_timeout: Duration::from_secs(self.dispatch.send_timeout_secs),
            body_template: self.dispatch.body_template.clone(),
        }
    }
}

fn default_offset() -> String {
    "+05:30".to_string()
}

fn default_zone_label() -> String {
    "IST".to_string()
}

fn default_country_code() -> String {
    "91".to_string()
}

fn default_delay_secs() -> f64 {
    DEFAULT_DELAY_SECS
}

fn default_grace_secs() -> u64 {
    60
}

fn default_no_date_offset_secs() -> i64 {
    DEFAULT_NO_DATE_OFFSET_SECS
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_body_template() -> String {
    DEFAULT_BODY_TEMPLATE.to_string()
}

fn default_reports_dir() -> String {
    "logs".to_string()
}

fn default_twilio_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_the_clinic_setup() {
        let config = HeraldConfig::default();
        let zone = config.zone().unwrap();
        assert_eq!(zone.label(), "IST");
        assert_eq!(zone.offset().local_minus_utc(), 19_800);
        assert_eq!(config.pacing().unwrap().delay(), Duration::from_secs(1));
        assert_eq!(config.no_date_offset(), TimeDelta::seconds(5));
        assert_eq!(config.dispatch.identity, JobIdentity::ContentAndRow);

        let settings = config.dispatch_settings();
        assert_eq!(settings.grace, Some(Duration::from_secs(60)));
        assert_eq!(settings.send_timeout, Duration::from_secs(30));
        assert_eq!(settings.body_template, "Hello {name}");
        assert!(config.twilio.credentials().is_none());
        assert!(!config.dry_run);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HeraldConfig::figment(&dir.path().join("absent.toml"))
            .extract::<HeraldConfig>()
            .unwrap();
        assert_eq!(config.reports.dir, "logs");
        assert_eq!(config.phone.country_code, "91");
    }

    #[test]
    fn toml_overrides_individual_fields() {
        let file = write_toml(
            r#"
            dry_run = true

            [timezone]
            offset = "-03:00"
            label = "BRT"

            [dispatch]
            delay_secs = 2.5
            grace_secs = 0
            identity = "content_only"

            [twilio]
            account_sid = "AC0123456789abcdef0123456789abcdef"
            auth_token = "0123456789abcdef0123"
            from = "whatsapp:+14155238886"
            "#,
        );

        let config = HeraldConfig::load(Some(file.path())).unwrap();

        assert!(config.dry_run);
        assert_eq!(config.zone().unwrap().assumed_label(), "Assumed BRT");
        assert_eq!(config.pacing().unwrap().delay(), Duration::from_millis(2_500));
        assert_eq!(config.dispatch.identity, JobIdentity::ContentOnly);
        assert_eq!(config.dispatch_settings().grace, None);
        // untouched fields keep their defaults
        assert_eq!(config.dispatch.send_timeout_secs, 30);
        assert_eq!(config.phone.country_code, "91");

        let credentials = config.twilio.credentials().unwrap();
        assert!(credentials.validate().is_ok());
        assert_eq!(config.twilio.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn bad_offset_is_reported() {
        let file = write_toml("[timezone]\noffset = \"IST\"\n");
        let config = HeraldConfig::load(Some(file.path())).unwrap();
        assert!(matches!(config.zone(), Err(ConfigError::InvalidOffset(_))));
    }

    #[test]
    fn wrong_types_fail_to_load() {
        let file = write_toml("[dispatch]\ndelay_secs = \"fast\"\n");
        let err = HeraldConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
