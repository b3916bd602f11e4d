use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Admission control parameters for the single-document operation queue.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    /// Maximum number of operations waiting for the backend.
    /// Zero disables queuing: operations are dispatched once synchronously
    /// and rejected as overload if the backend does not accept them.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Maximum age of the oldest queued operation before new work is rejected
    #[serde(default = "default_max_queue_age_ms")]
    pub max_queue_age_ms: u64,

    /// Period of the dispatch loops' wake-up tick
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: default_max_queue_depth(),
            max_queue_age_ms: default_max_queue_age_ms(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "dispatch_interval_ms must be at least 1ms".into(),
            )));
        }

        if self.max_queue_depth > 0 && self.max_queue_age_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_queue_age_ms must be > 0 when queuing is enabled".into(),
            )));
        }

        Ok(())
    }

    pub fn max_queue_age(&self) -> Duration {
        Duration::from_millis(self.max_queue_age_ms)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }
}

fn default_max_queue_depth() -> usize {
    2048
}
fn default_max_queue_age_ms() -> u64 {
    3000
}
fn default_dispatch_interval_ms() -> u64 {
    1
}
