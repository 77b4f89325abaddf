//! Scheduler configuration
//!
//! Compile-time defaults plus the runtime `SchedulerConfig` owned by each
//! `Scheduler`. Configs can be built in code or loaded from JSON.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::error::{SchedulerError, SchedulerResult};

/// Owner label the scheduler uses for the rounds it opens itself
pub const DEFAULT_ROUND_OWNER: &str = "DeferredUpdates::run";

/// Accepted shape for owner, origin and job type labels (e.g. `Class::method`)
pub const LABEL_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_.:\\-]{0,254}$";

static LABEL_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(LABEL_PATTERN));

/// How the hosting process delivers responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// A client response is being prepared; stages are honored
    #[default]
    Interactive,
    /// Script/maintenance run; every update is due immediately
    CommandLine,
}

/// What a drain pass does after an update fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the pass at the first failure and propagate it
    #[default]
    FailFast,
    /// Log the failure, keep draining, return the first failure at the end
    Continue,
}

/// Runtime configuration for a `Scheduler`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub execution_mode: ExecutionMode,
    /// Label used when the scheduler opens/closes rounds
    pub round_owner: String,
    pub failure_policy: FailurePolicy,
    /// Minimum depth-0 backlog before opportunistic execution spills jobs.
    /// 0 means enqueueable updates are always spilled.
    pub spill_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Interactive,
            round_owner: DEFAULT_ROUND_OWNER.to_string(),
            failure_policy: FailurePolicy::FailFast,
            spill_threshold: 0,
        }
    }
}

impl SchedulerConfig {
    /// Config for script/maintenance processes
    pub fn command_line() -> Self {
        Self {
            execution_mode: ExecutionMode::CommandLine,
            ..Self::default()
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_spill_threshold(mut self, threshold: usize) -> Self {
        self.spill_threshold = threshold;
        self
    }

    pub fn with_round_owner(mut self, owner: impl Into<String>) -> Self {
        self.round_owner = owner.into();
        self
    }

    pub fn is_command_line(&self) -> bool {
        self.execution_mode == ExecutionMode::CommandLine
    }

    /// Load a config from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        validate_label(&self.round_owner).map_err(|e| SchedulerError::ConfigError {
            setting: "round_owner".to_string(),
            value: self.round_owner.clone(),
            reason: e.to_string(),
        })
    }
}

/// Check an owner, origin or job type label against `LABEL_PATTERN`
pub fn validate_label(label: &str) -> SchedulerResult<()> {
    if label.is_empty() {
        return Err(SchedulerError::InvalidLabel {
            label: label.to_string(),
            reason: "label must not be empty".to_string(),
        });
    }
    let re = (*LABEL_RE).as_ref().map_err(|e| SchedulerError::from(e.clone()))?;
    if !re.is_match(label) {
        return Err(SchedulerError::InvalidLabel {
            label: label.to_string(),
            reason: format!("label must match {}", LABEL_PATTERN),
        });
    }
    Ok(())
}
