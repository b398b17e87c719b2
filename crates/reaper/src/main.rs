//! Idle Reaper - scheduled idle-instance shutdown
//!
//! This binary runs once per schedule tick (cron, EventBridge-driven
//! container, or similar), evaluates running instances against the
//! idle threshold, applies the configured action, and prints the run
//! summary as JSON on stdout.

use anyhow::{Context, Result};
use reaper_lib::{
    observability::RunLogger,
    provider::{CloudWatchSampleSource, Ec2ActionSink, Ec2InstanceSource},
    EvaluationConfig, Runner,
};
use rusoto_cloudwatch::CloudWatchClient;
use rusoto_core::Region;
use rusoto_ec2::Ec2Client;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod settings;

const REAPER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting idle-reaper");

    // Load configuration; bad values abort before any provider call
    let settings = settings::RuntimeSettings::load()?;
    let config = EvaluationConfig::load()?;
    info!(
        region = %settings.aws_region,
        cpu_threshold = config.cpu_threshold,
        lookback_minutes = config.lookback_minutes,
        action = ?config.action,
        dry_run = config.dry_run,
        "Reaper configured"
    );

    let region: Region = settings
        .aws_region
        .parse()
        .with_context(|| format!("unknown region {}", settings.aws_region))?;
    let ec2 = Ec2Client::new(region.clone());
    let cloudwatch = CloudWatchClient::new(region.clone());

    let logger = RunLogger::new(region.name());
    logger.log_run_start(REAPER_VERSION, config.dry_run);

    let instances = Ec2InstanceSource::new(ec2.clone())
        .with_tag_filter(config.tag_key.clone(), config.tag_value.clone());

    let runner = Runner::new(
        config,
        Arc::new(instances),
        Arc::new(CloudWatchSampleSource::new(cloudwatch)),
        Arc::new(Ec2ActionSink::new(ec2)),
        logger,
    )
    .with_period_seconds(settings.metric_period_seconds);

    let summary = runner.run().await?;

    // Machine-readable summary for the invoking scheduler/log sink
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
