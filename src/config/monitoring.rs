use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Whether the gateway records prometheus metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.metrics_enabled {
            tracing::debug!("metrics recording disabled");
        }
        Ok(())
    }
}

fn default_metrics_enabled() -> bool {
    true
}
