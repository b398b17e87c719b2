//! EC2 and CloudWatch backed providers
//!
//! Thin adapters from the provider traits to the AWS APIs:
//! DescribeInstances for enumeration, GetMetricStatistics for CPU
//! samples, StopInstances/TerminateInstances for actions. No decision
//! logic lives here.

use super::{ActionSink, InstanceSource, SampleSource};
use crate::models::{Action, InstanceDescriptor, InstanceState, MetricSample};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusoto_cloudwatch::{CloudWatch, CloudWatchClient, Dimension, GetMetricStatisticsInput};
use rusoto_ec2::{
    DescribeInstancesRequest, Ec2, Ec2Client, Filter, StopInstancesRequest,
    TerminateInstancesRequest,
};
use tracing::debug;

/// CloudWatch namespace for EC2 instance metrics
const EC2_NAMESPACE: &str = "AWS/EC2";

/// Metric evaluated for idleness
const CPU_METRIC: &str = "CPUUtilization";

/// Error code EC2 returns when a dry-run request would have succeeded
const DRY_RUN_OPERATION: &str = "DryRunOperation";

/// Lists running EC2 instances via DescribeInstances
pub struct Ec2InstanceSource {
    client: Ec2Client,
    tag_key: Option<String>,
    tag_value: Option<String>,
}

impl Ec2InstanceSource {
    pub fn new(client: Ec2Client) -> Self {
        Self {
            client,
            tag_key: None,
            tag_value: None,
        }
    }

    /// Push the tag filter down to DescribeInstances. Server-side
    /// filtering only narrows the listing; the evaluator re-applies
    /// the filter on whatever comes back.
    pub fn with_tag_filter(mut self, key: Option<String>, value: Option<String>) -> Self {
        self.tag_key = key;
        self.tag_value = value;
        self
    }

    fn filters(&self) -> Vec<Filter> {
        let mut filters = vec![Filter {
            name: Some("instance-state-name".to_string()),
            values: Some(vec!["running".to_string()]),
        }];

        match (&self.tag_key, &self.tag_value) {
            (Some(key), Some(value)) => filters.push(Filter {
                name: Some(format!("tag:{}", key)),
                values: Some(vec![value.clone()]),
            }),
            (Some(key), None) => filters.push(Filter {
                name: Some("tag-key".to_string()),
                values: Some(vec![key.clone()]),
            }),
            (None, _) => {}
        }

        filters
    }
}

#[async_trait]
impl InstanceSource for Ec2InstanceSource {
    async fn list_running(&self) -> Result<Vec<InstanceDescriptor>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let request = DescribeInstancesRequest {
                filters: Some(self.filters()),
                next_token: next_token.clone(),
                ..Default::default()
            };

            let response = self
                .client
                .describe_instances(request)
                .await
                .context("DescribeInstances failed")?;

            for reservation in response.reservations.unwrap_or_default() {
                for instance in reservation.instances.unwrap_or_default() {
                    let Some(id) = instance.instance_id else {
                        continue;
                    };

                    let state = match instance.state.and_then(|s| s.name) {
                        Some(name) if name == "running" => InstanceState::Running,
                        _ => InstanceState::Other,
                    };

                    let tags = instance
                        .tags
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|t| Some((t.key?, t.value?)))
                        .collect();

                    instances.push(InstanceDescriptor { id, tags, state });
                }
            }

            next_token = response.next_token;
            if next_token.is_none() {
                break;
            }
        }

        debug!(count = instances.len(), "Listed running instances");
        Ok(instances)
    }
}

/// Fetches CPU utilization samples via GetMetricStatistics
pub struct CloudWatchSampleSource {
    client: CloudWatchClient,
}

impl CloudWatchSampleSource {
    pub fn new(client: CloudWatchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SampleSource for CloudWatchSampleSource {
    async fn fetch(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: i64,
    ) -> Result<Vec<MetricSample>> {
        let request = GetMetricStatisticsInput {
            namespace: EC2_NAMESPACE.to_string(),
            metric_name: CPU_METRIC.to_string(),
            dimensions: Some(vec![Dimension {
                name: "InstanceId".to_string(),
                value: instance_id.to_string(),
            }]),
            start_time: start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time: end.to_rfc3339_opts(SecondsFormat::Secs, true),
            period: period_seconds,
            statistics: Some(vec!["Average".to_string()]),
            ..Default::default()
        };

        let response = self
            .client
            .get_metric_statistics(request)
            .await
            .with_context(|| format!("GetMetricStatistics failed for {}", instance_id))?;

        let mut samples: Vec<MetricSample> = response
            .datapoints
            .unwrap_or_default()
            .into_iter()
            .filter_map(|point| {
                let value = point.average?;
                let timestamp = point
                    .timestamp
                    .as_deref()
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())?
                    .with_timezone(&Utc);
                Some(MetricSample { timestamp, value })
            })
            .collect();

        // CloudWatch returns datapoints unordered
        samples.sort_by_key(|s| s.timestamp);

        debug!(
            instance_id = %instance_id,
            count = samples.len(),
            "Fetched utilization samples"
        );
        Ok(samples)
    }
}

/// Stops or terminates instances via the EC2 API
pub struct Ec2ActionSink {
    client: Ec2Client,
}

impl Ec2ActionSink {
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionSink for Ec2ActionSink {
    async fn apply(&self, instance_id: &str, action: Action, preview: bool) -> Result<()> {
        let dry_run = preview.then_some(true);
        let instance_ids = vec![instance_id.to_string()];

        let result = match action {
            Action::Stop => self
                .client
                .stop_instances(StopInstancesRequest {
                    instance_ids,
                    dry_run,
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from),
            Action::Terminate => self
                .client
                .terminate_instances(TerminateInstancesRequest {
                    instance_ids,
                    dry_run,
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from),
        };

        match result {
            Ok(()) => Ok(()),
            // EC2 signals a would-have-succeeded dry-run as an error
            Err(err) if preview && err.to_string().contains(DRY_RUN_OPERATION) => {
                debug!(instance_id = %instance_id, "Dry-run preview accepted");
                Ok(())
            }
            Err(err) => Err(err.context(format!("{:?} failed for {}", action, instance_id))),
        }
    }
}
