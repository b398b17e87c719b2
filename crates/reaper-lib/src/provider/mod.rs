//! Cloud provider boundary
//!
//! The runner talks to the provider through three narrow traits: one
//! to enumerate instances, one to fetch utilization samples, one to
//! apply lifecycle actions. Everything behind these traits is
//! pass-through plumbing; the decision logic lives in the evaluator.

mod ec2;

pub use ec2::{CloudWatchSampleSource, Ec2ActionSink, Ec2InstanceSource};

use crate::models::{Action, InstanceDescriptor, MetricSample};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub use async_trait::async_trait;

/// Enumerates running instances for one evaluation cycle
#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// List instances in the `running` state. Implementations may
    /// pre-filter by tag as an optimization; the evaluator re-checks.
    async fn list_running(&self) -> Result<Vec<InstanceDescriptor>>;
}

/// Fetches utilization samples for a given instance and time window
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch samples in `[start, end]` at the given period. May return
    /// an empty list when the instance has no metric data.
    async fn fetch(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: i64,
    ) -> Result<Vec<MetricSample>>;
}

/// Applies a lifecycle action to one instance
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Stop or terminate the instance. With `preview` set the call
    /// must not mutate provider state.
    async fn apply(&self, instance_id: &str, action: Action, preview: bool) -> Result<()>;
}
