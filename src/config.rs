//! Process-wide knobs for the registry: parser backend selection, the
//! deadlock-guard timeout, and scratch space for out-of-process parsing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which parser backend `saveModule` should invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KidlSource {
    #[default]
    Internal,
    External,
    /// Development aid: run both backends and require byte-equal output.
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TddbConfig {
    /// Parent directory for parser scratch space.
    pub temp_dir: PathBuf,

    /// Parser backend selection.
    pub kidl_source: KidlSource,

    /// Total time budget for a single lock acquisition before it fails with
    /// `DeadlockSuspected`. Defaults to 120s per the lock manager's
    /// deadlock-guard.
    #[serde(with = "duration_millis")]
    pub max_deadlock_wait: Duration,

    /// Bounded polling interval used while waiting for a lock. Defaults to
    /// 10s; always clamped to be no larger than `max_deadlock_wait`.
    #[serde(with = "duration_millis")]
    pub lock_poll_interval: Duration,
}

impl Default for TddbConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("tddb"),
            kidl_source: KidlSource::default(),
            max_deadlock_wait: Duration::from_millis(120_000),
            lock_poll_interval: Duration::from_millis(10_000),
        }
    }
}

impl TddbConfig {
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_kidl_source(mut self, source: KidlSource) -> Self {
        self.kidl_source = source;
        self
    }

    pub fn with_max_deadlock_wait_ms(mut self, ms: u64) -> Self {
        self.max_deadlock_wait = Duration::from_millis(ms);
        self
    }

    pub fn with_lock_poll_interval_ms(mut self, ms: u64) -> Self {
        self.lock_poll_interval = Duration::from_millis(ms);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.lock_poll_interval.min(self.max_deadlock_wait)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}
