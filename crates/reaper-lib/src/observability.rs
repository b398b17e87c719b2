//! Observability infrastructure for the reaper
//!
//! Provides:
//! - Prometheus metrics (run latency, candidates checked, actions by
//!   outcome, provider errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{ActionTaken, Decision, RunSummary};

/// Histogram buckets for full-run latency (in seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ReaperMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ReaperMetricsInner {
    run_duration_seconds: Histogram,
    instances_checked: IntGauge,
    decisions_total: IntCounterVec,
    fetch_errors: IntGauge,
    action_errors: IntGauge,
}

impl ReaperMetricsInner {
    fn new() -> Self {
        Self {
            run_duration_seconds: register_histogram!(
                "idle_reaper_run_duration_seconds",
                "Wall time of one full evaluation run",
                RUN_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            instances_checked: register_int_gauge!(
                "idle_reaper_instances_checked",
                "Number of candidate instances considered in the last run"
            )
            .expect("Failed to register instances_checked"),

            decisions_total: register_int_counter_vec!(
                "idle_reaper_decisions_total",
                "Decisions made, labelled by outcome",
                &["outcome"]
            )
            .expect("Failed to register decisions_total"),

            fetch_errors: register_int_gauge!(
                "idle_reaper_fetch_errors_total",
                "Sample fetches that degraded to an empty window"
            )
            .expect("Failed to register fetch_errors"),

            action_errors: register_int_gauge!(
                "idle_reaper_action_errors_total",
                "Lifecycle actions that failed at the provider"
            )
            .expect("Failed to register action_errors"),
        }
    }
}

/// Reaper metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ReaperMetrics {
    _private: (),
}

impl Default for ReaperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaperMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ReaperMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ReaperMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the wall time of one run
    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    /// Record how many candidates the last run considered
    pub fn set_instances_checked(&self, count: i64) {
        self.inner().instances_checked.set(count);
    }

    /// Count one decision by outcome
    pub fn inc_decision(&self, action_taken: ActionTaken) {
        let outcome = match action_taken {
            ActionTaken::Stopped => "stopped",
            ActionTaken::Terminated => "terminated",
            ActionTaken::SkippedThreshold => "skipped_threshold",
            ActionTaken::SkippedExcluded => "skipped_excluded",
            ActionTaken::SkippedFiltered => "skipped_filtered",
            ActionTaken::Failed => "failed",
        };
        self.inner()
            .decisions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one sample fetch that degraded to an empty window
    pub fn inc_fetch_errors(&self) {
        self.inner().fetch_errors.inc();
    }

    /// Count one failed provider action
    pub fn inc_action_errors(&self) {
        self.inner().action_errors.inc();
    }
}

/// Structured logger for run events
///
/// Provides consistent JSON-formatted logging for decisions, provider
/// degradations, and run summaries.
#[derive(Clone)]
pub struct RunLogger {
    region: String,
}

impl RunLogger {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    /// Log the start of a run
    pub fn log_run_start(&self, version: &str, dry_run: bool) {
        info!(
            event = "run_started",
            region = %self.region,
            version = %version,
            dry_run = dry_run,
            "Idle reaper run started"
        );
    }

    /// Log one decision
    pub fn log_decision(&self, decision: &Decision) {
        info!(
            event = "decision",
            region = %self.region,
            instance_id = %decision.instance_id,
            average_utilization = decision.average_utilization,
            action_taken = ?decision.action_taken,
            dry_run = decision.dry_run,
            "Instance evaluated"
        );
    }

    /// Log a sample fetch that degraded to an empty window
    pub fn log_fetch_degraded(&self, instance_id: &str, error: &str) {
        warn!(
            event = "fetch_degraded",
            region = %self.region,
            instance_id = %instance_id,
            error = %error,
            "Sample fetch failed, treating window as empty"
        );
    }

    /// Log a provider action failure
    pub fn log_action_failed(&self, instance_id: &str, error: &str) {
        warn!(
            event = "action_failed",
            region = %self.region,
            instance_id = %instance_id,
            error = %error,
            "Lifecycle action failed"
        );
    }

    /// Log the run summary
    pub fn log_summary(&self, summary: &RunSummary) {
        info!(
            event = "run_summary",
            region = %self.region,
            checked = summary.checked,
            actions_taken = summary.actions_taken(),
            actions_failed = summary.actions_failed(),
            dry_run = summary.dry_run,
            "Idle reaper run finished"
        );
    }
}
