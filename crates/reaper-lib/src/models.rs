//! Core data models for the idle reaper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of an instance as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Instance is running and a potential candidate
    Running,
    /// Any other state (stopped, pending, terminating, ...)
    Other,
}

/// Immutable snapshot of one instance for a single evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: String,
    pub tags: HashMap<String, String>,
    pub state: InstanceState,
}

impl InstanceDescriptor {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            tags: HashMap::new(),
            state,
        }
    }

    /// Attach a tag, builder style
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// One observed utilization data point within the lookback window
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    /// CPU utilization in percent (0-100 by convention, not enforced)
    pub value: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Lifecycle action applied to idle instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Stop,
    Terminate,
}

/// Outcome classification for one evaluated instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    /// Instance was idle and a stop was issued (or previewed under dry-run)
    Stopped,
    /// Instance was idle and a terminate was issued (or previewed under dry-run)
    Terminated,
    /// Average utilization was at or above the threshold
    SkippedThreshold,
    /// Instance id is on the exclusion list
    SkippedExcluded,
    /// Instance did not match the configured tag filter
    SkippedFiltered,
    /// Instance was idle but the provider call failed
    Failed,
}

impl ActionTaken {
    /// Returns true for the variants that issue a provider call
    pub fn is_actionable(&self) -> bool {
        matches!(self, ActionTaken::Stopped | ActionTaken::Terminated)
    }
}

/// Decision record, one per evaluated instance per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub instance_id: String,
    pub average_utilization: f64,
    pub action_taken: ActionTaken,
    pub dry_run: bool,
    /// Provider error message when `action_taken` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Decision {
    pub fn new(
        instance_id: impl Into<String>,
        average_utilization: f64,
        action_taken: ActionTaken,
        dry_run: bool,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            average_utilization,
            action_taken,
            dry_run,
            error: None,
        }
    }
}

/// Result of one full run, consumed by the invoking scheduler/log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of candidates considered (one Decision each)
    pub checked: usize,
    pub decisions: Vec<Decision>,
    pub dry_run: bool,
}

impl RunSummary {
    /// Count of decisions that issued (or previewed) a provider call
    pub fn actions_taken(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.action_taken.is_actionable())
            .count()
    }

    /// Count of decisions whose provider call failed
    pub fn actions_failed(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.action_taken == ActionTaken::Failed)
            .count()
    }
}
