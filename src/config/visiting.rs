use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VisitingConfig {
    /// Request deadline used when a bulk request does not carry its own
    #[serde(default = "default_request_timeout_ms")]
    pub default_request_timeout_ms: u64,

    /// Streaming visits are aborted this long before the request deadline,
    /// so a clean terminal response can still be rendered.
    #[serde(default = "default_streaming_abort_margin_ms")]
    pub streaming_abort_margin_ms: u64,

    /// Default number of unacknowledged documents a visitor may have in flight
    #[serde(default = "default_max_pending")]
    pub default_max_pending: usize,

    /// Interval between inline continuation lines in line-oriented responses
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for VisitingConfig {
    fn default() -> Self {
        Self {
            default_request_timeout_ms: default_request_timeout_ms(),
            streaming_abort_margin_ms: default_streaming_abort_margin_ms(),
            default_max_pending: default_max_pending(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl VisitingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_request_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "default_request_timeout_ms must be > 0".into(),
            )));
        }

        if self.streaming_abort_margin_ms >= self.default_request_timeout_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "streaming_abort_margin_ms {}ms should be less than default_request_timeout_ms {}ms",
                self.streaming_abort_margin_ms, self.default_request_timeout_ms
            ))));
        }

        if self.default_max_pending == 0 {
            return Err(Error::Config(ConfigError::Message(
                "default_max_pending must be > 0".into(),
            )));
        }

        if self.progress_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "progress_interval_ms must be > 0".into(),
            )));
        }

        Ok(())
    }

    pub fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }

    pub fn streaming_abort_margin(&self) -> Duration {
        Duration::from_millis(self.streaming_abort_margin_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

// in ms
fn default_request_timeout_ms() -> u64 {
    180_000
}
fn default_streaming_abort_margin_ms() -> u64 {
    5_000
}
fn default_max_pending() -> usize {
    32
}
fn default_progress_interval_ms() -> u64 {
    1_000
}
