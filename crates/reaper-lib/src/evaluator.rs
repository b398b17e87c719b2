//! Idle-instance decision logic
//!
//! Pure functions from (instance descriptor, utilization samples,
//! configuration) to a decision. No I/O, no side effects: the output
//! records the intended action and the runner interprets it against
//! the dry-run flag.

use crate::config::EvaluationConfig;
use crate::models::{
    Action, ActionTaken, Decision, InstanceDescriptor, InstanceState, MetricSample,
};

/// Screen an instance before any samples are fetched.
///
/// Returns the skip classification for non-candidates, or `None` when
/// the instance proceeds to aggregation. Filter order is fixed:
/// exclusion list first, then the tag filter. Non-`running` instances
/// are handled by [`decide`] and never reach this point as candidates.
pub fn pre_screen(instance: &InstanceDescriptor, config: &EvaluationConfig) -> Option<ActionTaken> {
    if config.exclude_ids.contains(&instance.id) {
        return Some(ActionTaken::SkippedExcluded);
    }

    if let Some(key) = &config.tag_key {
        let matched = match (instance.tags.get(key), &config.tag_value) {
            (Some(actual), Some(wanted)) => actual == wanted,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matched {
            return Some(ActionTaken::SkippedFiltered);
        }
    }

    None
}

/// Arithmetic mean of the sample values.
///
/// An empty sample list averages to 0.0: an instance with no metric
/// data is treated as idle, so absence of data triggers action. This
/// is deliberate policy and must stay this way.
pub fn average_utilization(samples: &[MetricSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64
}

/// Classify a candidate from its aggregated utilization.
///
/// The threshold comparison is strict: an average exactly equal to
/// `cpu_threshold` is not eligible.
pub fn classify(average: f64, config: &EvaluationConfig) -> ActionTaken {
    if average < config.cpu_threshold {
        match config.action {
            Action::Stop => ActionTaken::Stopped,
            Action::Terminate => ActionTaken::Terminated,
        }
    } else {
        ActionTaken::SkippedThreshold
    }
}

/// Full decision for one instance.
///
/// Returns `None` for non-`running` instances: they are not candidates
/// and produce no decision at all. Excluded instances report an
/// average of 0.0 even when samples were supplied, since exclusion
/// short-circuits before aggregation.
pub fn decide(
    instance: &InstanceDescriptor,
    samples: &[MetricSample],
    config: &EvaluationConfig,
) -> Option<Decision> {
    if instance.state != InstanceState::Running {
        return None;
    }

    if let Some(skip) = pre_screen(instance, config) {
        return Some(Decision::new(&instance.id, 0.0, skip, config.dry_run));
    }

    let average = average_utilization(samples);
    let action_taken = classify(average, config);
    Some(Decision::new(
        &instance.id,
        average,
        action_taken,
        config.dry_run,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    fn samples(values: &[f64]) -> Vec<MetricSample> {
        let now = Utc::now();
        values
            .iter()
            .map(|v| MetricSample::new(now, *v))
            .collect()
    }

    fn running(id: &str) -> InstanceDescriptor {
        InstanceDescriptor::new(id, InstanceState::Running)
    }

    #[test]
    fn test_mean_is_exact() {
        assert_eq!(average_utilization(&samples(&[10.0, 20.0, 30.0])), 20.0);
    }

    #[test]
    fn test_empty_samples_average_zero() {
        assert_eq!(average_utilization(&[]), 0.0);
    }

    #[test]
    fn test_idle_instance_stopped() {
        // i-1: running, no tags, samples [2,3,4], threshold 5 => stopped
        let config = EvaluationConfig::default();
        let decision = decide(&running("i-1"), &samples(&[2.0, 3.0, 4.0]), &config).unwrap();

        assert_eq!(decision.average_utilization, 3.0);
        assert_eq!(decision.action_taken, ActionTaken::Stopped);
        assert!(decision.dry_run);
    }

    #[test]
    fn test_busy_instance_skipped() {
        let config = EvaluationConfig::default();
        let decision = decide(&running("i-1"), &samples(&[50.0, 60.0]), &config).unwrap();

        assert_eq!(decision.action_taken, ActionTaken::SkippedThreshold);
        assert_eq!(decision.average_utilization, 55.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Average exactly at the threshold is not eligible
        let config = EvaluationConfig::default();
        let decision = decide(&running("i-1"), &samples(&[5.0, 5.0]), &config).unwrap();

        assert_eq!(decision.average_utilization, 5.0);
        assert_eq!(decision.action_taken, ActionTaken::SkippedThreshold);
    }

    #[test]
    fn test_exclusion_takes_precedence() {
        // i-2: excluded with idle samples still yields skipped_excluded
        let config = EvaluationConfig {
            exclude_ids: HashSet::from(["i-2".to_string()]),
            ..Default::default()
        };
        let decision = decide(&running("i-2"), &samples(&[1.0]), &config).unwrap();

        assert_eq!(decision.action_taken, ActionTaken::SkippedExcluded);
        // Exclusion short-circuits aggregation
        assert_eq!(decision.average_utilization, 0.0);
    }

    #[test]
    fn test_tag_value_mismatch_filtered() {
        // i-3: filter env=prod, instance tagged env=dev
        let config = EvaluationConfig {
            tag_key: Some("env".to_string()),
            tag_value: Some("prod".to_string()),
            ..Default::default()
        };
        let instance = running("i-3").with_tag("env", "dev");
        let decision = decide(&instance, &samples(&[1.0]), &config).unwrap();

        assert_eq!(decision.action_taken, ActionTaken::SkippedFiltered);
    }

    #[test]
    fn test_tag_key_and_value_match() {
        let config = EvaluationConfig {
            tag_key: Some("env".to_string()),
            tag_value: Some("prod".to_string()),
            ..Default::default()
        };
        let instance = running("i-3").with_tag("env", "prod");
        let decision = decide(&instance, &samples(&[1.0]), &config).unwrap();

        assert_eq!(decision.action_taken, ActionTaken::Stopped);
    }

    #[test]
    fn test_tag_key_only_requires_presence() {
        let config = EvaluationConfig {
            tag_key: Some("autoshutdown".to_string()),
            tag_value: None,
            ..Default::default()
        };

        let tagged = running("i-a").with_tag("autoshutdown", "whatever");
        let untagged = running("i-b");

        assert_eq!(
            decide(&tagged, &[], &config).unwrap().action_taken,
            ActionTaken::Stopped
        );
        assert_eq!(
            decide(&untagged, &[], &config).unwrap().action_taken,
            ActionTaken::SkippedFiltered
        );
    }

    #[test]
    fn test_no_samples_treated_as_idle() {
        // i-4: no samples, action=terminate => average 0.0, terminated
        let config = EvaluationConfig {
            action: Action::Terminate,
            ..Default::default()
        };
        let decision = decide(&running("i-4"), &[], &config).unwrap();

        assert_eq!(decision.average_utilization, 0.0);
        assert_eq!(decision.action_taken, ActionTaken::Terminated);
    }

    #[test]
    fn test_non_running_produces_no_decision() {
        let config = EvaluationConfig::default();
        let stopped = InstanceDescriptor::new("i-5", InstanceState::Other);

        assert!(decide(&stopped, &samples(&[1.0]), &config).is_none());
    }

    #[test]
    fn test_dry_run_does_not_change_classification() {
        let wet = EvaluationConfig {
            dry_run: false,
            ..Default::default()
        };
        let dry = EvaluationConfig {
            dry_run: true,
            ..Default::default()
        };

        let idle = samples(&[1.0, 2.0]);
        let busy = samples(&[80.0]);
        for s in [&idle, &busy] {
            let a = decide(&running("i-1"), s, &wet).unwrap();
            let b = decide(&running("i-1"), s, &dry).unwrap();
            assert_eq!(a.action_taken, b.action_taken);
            assert_eq!(a.average_utilization, b.average_utilization);
        }
    }

    #[test]
    fn test_one_decision_per_running_instance() {
        let config = EvaluationConfig {
            exclude_ids: HashSet::from(["i-2".to_string()]),
            ..Default::default()
        };
        let instances = vec![
            running("i-1"),
            running("i-2"),
            InstanceDescriptor::new("i-3", InstanceState::Other),
            running("i-4"),
        ];

        let decisions: Vec<Decision> = instances
            .iter()
            .filter_map(|instance| decide(instance, &[], &config))
            .collect();

        // i-3 is dropped for state, everything else decided once
        assert_eq!(decisions.len(), 3);
        let ids: Vec<_> = decisions.iter().map(|d| d.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-2", "i-4"]);
    }
}
