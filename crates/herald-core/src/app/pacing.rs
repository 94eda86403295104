//! Pacing - 送信と送信のあいだの待ち時間
//!
//! オペレーターが実行中に変更でき、ディスパッチャは送信のたびに読み直す。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::errors::ConfigError;

pub const DEFAULT_DELAY_SECS: f64 = 1.0;
pub const MAX_DELAY_SECS: f64 = 60.0;

/// Shared delay, stored in milliseconds.
#[derive(Debug)]
pub struct Pacing {
    delay_ms: AtomicU64,
}

impl Pacing {
    pub fn new(delay_secs: f64) -> Result<Self, ConfigError> {
        let pacing = Self {
            delay_ms: AtomicU64::new(0),
        };
        pacing.set_secs(delay_secs)?;
        Ok(pacing)
    }

    /// Values above the maximum are clamped; negative or non-finite values are rejected.
    pub fn set_secs(&self, delay_secs: f64) -> Result<Duration, ConfigError> {
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            return Err(ConfigError::InvalidDelay(delay_secs));
        }
        let clamped = delay_secs.min(MAX_DELAY_SECS);
        let millis = (clamped * 1000.0).round() as u64;
        self.delay_ms.store(millis, Ordering::Relaxed);
        Ok(Duration::from_millis(millis))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            delay_ms: AtomicU64::new((DEFAULT_DELAY_SECS * 1000.0) as u64),
        }
    }
}
