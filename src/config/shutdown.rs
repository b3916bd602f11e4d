use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShutdownConfig {
    /// Upper bound on the whole shutdown sequence
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// How often queue depth and outstanding operations are polled while draining
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn validate(&self) -> Result<()> {
        if self.deadline_ms == 0 {
            return Err(Error::Config(ConfigError::Message("shutdown deadline_ms must be > 0".into())));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > self.deadline_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "poll_interval_ms {} must be within (0, {}]",
                self.poll_interval_ms, self.deadline_ms
            ))));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_deadline_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    10
}
