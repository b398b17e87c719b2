//! Reaper library for scheduled idle-instance shutdown
//!
//! This crate provides the core functionality for:
//! - Pure idle-instance decision logic
//! - Configuration loading and validation
//! - Provider adapters for EC2 and CloudWatch
//! - Run orchestration with bounded fan-out
//! - Metrics and structured logging

pub mod config;
pub mod evaluator;
pub mod models;
pub mod observability;
pub mod provider;
pub mod runner;

pub use config::{ConfigError, EvaluationConfig};
pub use models::*;
pub use observability::{ReaperMetrics, RunLogger};
pub use runner::Runner;
