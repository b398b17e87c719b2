//! Run configuration
//!
//! All recognized options with their defaults, loaded from the
//! environment once at startup and passed down explicitly. Decision
//! logic never reads ambient state.

use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use thiserror::Error;

use crate::models::Action;

/// Configuration errors, raised once at construction before any
/// provider call
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("cpu_threshold must be positive, got {0}")]
    InvalidThreshold(f64),

    #[error("lookback_minutes must be positive, got {0}")]
    InvalidLookback(i64),

    #[error("max_concurrency must be positive")]
    InvalidConcurrency,
}

/// Evaluation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    /// Instances averaging strictly below this utilization are eligible
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f64,

    /// Length of the sample window, ending at evaluation time
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,

    /// Action applied to eligible instances
    #[serde(default = "default_action")]
    pub action: Action,

    /// Tag filter key; with no value set, key presence alone matches
    #[serde(default)]
    pub tag_key: Option<String>,

    /// Tag filter value, only meaningful together with `tag_key`
    #[serde(default)]
    pub tag_value: Option<String>,

    /// When true, decisions are computed and reported but provider
    /// calls only preview
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Instance ids that are never eligible regardless of utilization
    #[serde(
        default,
        rename = "exclude_instance_ids",
        deserialize_with = "comma_separated_set"
    )]
    pub exclude_ids: HashSet<String>,

    /// Bound on concurrent sample fetches
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_cpu_threshold() -> f64 {
    5.0
}

fn default_lookback_minutes() -> i64 {
    60
}

fn default_action() -> Action {
    Action::Stop
}

fn default_dry_run() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    8
}

/// Accept `EXCLUDE_INSTANCE_IDS=i-1,i-2` style values
fn comma_separated_set<'de, D>(deserializer: D) -> Result<HashSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: default_cpu_threshold(),
            lookback_minutes: default_lookback_minutes(),
            action: default_action(),
            tag_key: None,
            tag_value: None,
            dry_run: default_dry_run(),
            exclude_ids: HashSet::new(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl EvaluationConfig {
    /// Load configuration from environment variables
    /// (`CPU_THRESHOLD`, `LOOKBACK_MINUTES`, `ACTION`, `TAG_KEY`,
    /// `TAG_VALUE`, `DRY_RUN`, `EXCLUDE_INSTANCE_IDS`,
    /// `MAX_CONCURRENCY`)
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let parsed: EvaluationConfig = config.try_deserialize()?;
        parsed.validate()
    }

    /// Reject malformed values before any provider call
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.cpu_threshold.is_nan() || self.cpu_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.cpu_threshold));
        }
        if self.lookback_minutes <= 0 {
            return Err(ConfigError::InvalidLookback(self.lookback_minutes));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvaluationConfig::default();
        assert_eq!(config.cpu_threshold, 5.0);
        assert_eq!(config.lookback_minutes, 60);
        assert_eq!(config.action, Action::Stop);
        assert!(config.dry_run);
        assert!(config.exclude_ids.is_empty());
        assert!(config.tag_key.is_none());
    }

    #[test]
    fn test_deserialize_overrides() {
        let config: EvaluationConfig = config::Config::builder()
            .set_override("cpu_threshold", 2.5)
            .unwrap()
            .set_override("action", "terminate")
            .unwrap()
            .set_override("dry_run", false)
            .unwrap()
            .set_override("exclude_instance_ids", "i-abc, i-def,,i-ghi")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.cpu_threshold, 2.5);
        assert_eq!(config.action, Action::Terminate);
        assert!(!config.dry_run);
        assert_eq!(config.exclude_ids.len(), 3);
        assert!(config.exclude_ids.contains("i-def"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<EvaluationConfig, _> = config::Config::builder()
            .set_override("action", "reboot")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_threshold() {
        let config = EvaluationConfig {
            cpu_threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_positive_lookback() {
        let config = EvaluationConfig {
            lookback_minutes: -5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLookback(-5))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = EvaluationConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency)
        ));
    }
}
