//! Configuration management for the document gateway.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`DOCGATE__` prefix)
//! - Component-wise validation
mod monitoring;
mod queue;
mod shutdown;
mod visiting;
pub use monitoring::*;
pub use queue::*;
pub use shutdown::*;
pub use visiting::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

pub(crate) const ENV_PREFIX: &str = "DOCGATE";

/// Main configuration container for the gateway components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    /// Admission control and dispatch loop parameters
    #[serde(default)]
    pub queue: QueueConfig,
    /// Bulk visiting time limits and throttling
    #[serde(default)]
    pub visiting: VisitingConfig,
    /// Graceful shutdown bounds
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Metrics settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for GatewayConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("queue", &self.queue)
            .field("visiting", &self.visiting)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

impl GatewayConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DOCGATE__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that further overrides can be applied with
    /// `with_override_config()`. Callers must call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DOCGATE__QUEUE__MAX_QUEUE_DEPTH", "64");
    /// let cfg = GatewayConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.queue.validate()?;
        self.visiting.validate()?;
        self.shutdown.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}
