//! Run orchestration
//!
//! One run: list instances, fetch samples and evaluate across a
//! bounded task pool, then apply the eligible actions sequentially.
//! Per-instance problems degrade; only listing and configuration
//! failures abort the run.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EvaluationConfig;
use crate::evaluator;
use crate::models::{ActionTaken, Decision, InstanceState, RunSummary};
use crate::observability::{ReaperMetrics, RunLogger};
use crate::provider::{ActionSink, InstanceSource, SampleSource};

/// Default CloudWatch sampling period in seconds
const DEFAULT_PERIOD_SECONDS: i64 = 300;

/// Orchestrates one evaluation run against a set of providers
pub struct Runner {
    config: Arc<EvaluationConfig>,
    instances: Arc<dyn InstanceSource>,
    samples: Arc<dyn SampleSource>,
    actions: Arc<dyn ActionSink>,
    metrics: ReaperMetrics,
    logger: RunLogger,
    period_seconds: i64,
}

impl Runner {
    pub fn new(
        config: EvaluationConfig,
        instances: Arc<dyn InstanceSource>,
        samples: Arc<dyn SampleSource>,
        actions: Arc<dyn ActionSink>,
        logger: RunLogger,
    ) -> Self {
        Self {
            config: Arc::new(config),
            instances,
            samples,
            actions,
            metrics: ReaperMetrics::new(),
            logger,
            period_seconds: DEFAULT_PERIOD_SECONDS,
        }
    }

    /// Set a custom metric sampling period
    pub fn with_period_seconds(mut self, period_seconds: i64) -> Self {
        self.period_seconds = period_seconds;
        self
    }

    /// Execute one full run.
    ///
    /// Fails only when the instance listing itself fails; everything
    /// per-instance is contained in that instance's decision.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();

        let listed = self
            .instances
            .list_running()
            .await
            .context("instance listing failed")?;

        let end = Utc::now();
        let start = end - Duration::minutes(self.config.lookback_minutes);

        // Fan out fetch-and-evaluate, bounded by max_concurrency.
        // Indexed results are re-sorted so output order matches the
        // listing order.
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks: JoinSet<(usize, Decision)> = JoinSet::new();
        let mut indexed: Vec<(usize, Decision)> = Vec::new();

        for (index, instance) in listed.into_iter().enumerate() {
            if instance.state != InstanceState::Running {
                continue;
            }

            // Non-candidates are decided without fetching samples
            if evaluator::pre_screen(&instance, &self.config).is_some() {
                let decision = evaluator::decide(&instance, &[], &self.config)
                    .expect("running instance always yields a decision");
                indexed.push((index, decision));
                continue;
            }

            let config = Arc::clone(&self.config);
            let samples = Arc::clone(&self.samples);
            let semaphore = Arc::clone(&semaphore);
            let metrics = self.metrics.clone();
            let logger = self.logger.clone();
            let period_seconds = self.period_seconds;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");

                // A failed fetch degrades to an empty window for this
                // instance only
                let window = match samples
                    .fetch(&instance.id, start, end, period_seconds)
                    .await
                {
                    Ok(window) => window,
                    Err(err) => {
                        logger.log_fetch_degraded(&instance.id, &format!("{:#}", err));
                        metrics.inc_fetch_errors();
                        Vec::new()
                    }
                };

                let decision = evaluator::decide(&instance, &window, &config)
                    .expect("running instance always yields a decision");
                (index, decision)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            indexed.push(joined.context("evaluation task panicked")?);
        }
        indexed.sort_by_key(|(index, _)| *index);

        let mut decisions: Vec<Decision> = indexed.into_iter().map(|(_, d)| d).collect();

        // Apply actions sequentially; one failure never stops the rest
        for decision in &mut decisions {
            if decision.action_taken.is_actionable() {
                let result = self
                    .actions
                    .apply(&decision.instance_id, self.config.action, self.config.dry_run)
                    .await;

                if let Err(err) = result {
                    let message = format!("{:#}", err);
                    self.logger.log_action_failed(&decision.instance_id, &message);
                    self.metrics.inc_action_errors();
                    decision.action_taken = ActionTaken::Failed;
                    decision.error = Some(message);
                }
            }

            self.logger.log_decision(decision);
            self.metrics.inc_decision(decision.action_taken);
        }

        let summary = RunSummary {
            checked: decisions.len(),
            decisions,
            dry_run: self.config.dry_run,
        };

        self.metrics.set_instances_checked(summary.checked as i64);
        self.metrics.observe_run_duration(started.elapsed().as_secs_f64());
        self.logger.log_summary(&summary);

        Ok(summary)
    }
}
