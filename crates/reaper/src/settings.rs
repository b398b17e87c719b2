//! Process-level settings
//!
//! Runtime wiring that belongs to the binary, not to the evaluation
//! configuration: which region to talk to and how the metric window
//! is sampled.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Runtime settings
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSettings {
    /// AWS region the providers are built against
    #[serde(default = "default_region")]
    pub aws_region: String,

    /// CloudWatch sampling period in seconds
    #[serde(default = "default_metric_period")]
    pub metric_period_seconds: i64,
}

fn default_region() -> String {
    std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string())
}

fn default_metric_period() -> i64 {
    300
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            aws_region: default_region(),
            metric_period_seconds: default_metric_period(),
        }
    }
}

impl RuntimeSettings {
    /// Load settings from the environment; unparsable values abort
    /// before any provider call
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let parsed: RuntimeSettings = config
            .try_deserialize()
            .context("failed to load runtime settings")?;
        parsed.validate()
    }

    /// Reject malformed values before any provider call
    pub fn validate(self) -> Result<Self> {
        if self.metric_period_seconds <= 0 {
            bail!(
                "metric_period_seconds must be positive, got {}",
                self.metric_period_seconds
            );
        }
        Ok(self)
    }
}
