//! Probe model - read-only environment checks.
//!
//! A probe inspects one environment condition through the capability set and
//! reports an `Outcome`. Probes are stateless; they are constructed once at
//! registry build time and hold no data between runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::caps::CapSet;
use crate::config::MedicConfig;
use crate::error::MedicError;

/// Probe status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Warning,
    Failed,
}

impl ProbeStatus {
    /// Ordering weight for folding a report into a single status.
    pub fn severity(&self) -> u8 {
        match self {
            ProbeStatus::Ok => 0,
            ProbeStatus::Warning => 1,
            ProbeStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Ok => write!(f, "ok"),
            ProbeStatus::Warning => write!(f, "warning"),
            ProbeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of running one probe. Produced fresh each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: ProbeStatus,
    pub message: String,
    /// Optional numeric reading (available-memory MB, disk-used percent, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    /// Short fault classification when the probe could not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Ok,
            message: message.into(),
            metric: None,
            detail: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Warning,
            message: message.into(),
            metric: None,
            detail: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Failed,
            message: message.into(),
            metric: None,
            detail: None,
        }
    }

    /// Failed outcome carrying the fault classification from a capability error.
    pub fn from_error(err: &MedicError) -> Self {
        Self {
            status: ProbeStatus::Failed,
            message: err.to_string(),
            metric: None,
            detail: Some(err.kind().to_string()),
        }
    }

    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }
}

/// Everything a probe or remediation may touch: capabilities, tool settings,
/// and the timeout bound for each external call.
pub struct ProbeContext<'a> {
    pub caps: CapSet<'a>,
    pub settings: &'a MedicConfig,
    pub call_timeout: Duration,
}

impl<'a> ProbeContext<'a> {
    pub fn new(caps: CapSet<'a>, settings: &'a MedicConfig) -> Self {
        let call_timeout = Duration::from_secs(settings.call_timeout_secs);
        Self {
            caps,
            settings,
            call_timeout,
        }
    }
}

/// A single named check against the environment.
pub trait Probe {
    /// Unique identifier, stable across runs.
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Inspect the environment. Read-only: a probe must not mutate host
    /// state. Capability faults bubble up as `Err` and are captured by the
    /// registry as Failed outcomes.
    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ProbeStatus::Failed.severity() > ProbeStatus::Warning.severity());
        assert!(ProbeStatus::Warning.severity() > ProbeStatus::Ok.severity());
    }

    #[test]
    fn test_outcome_from_error_keeps_kind() {
        let outcome = Outcome::from_error(&MedicError::Timeout(2500));
        assert_eq!(outcome.status, ProbeStatus::Failed);
        assert_eq!(outcome.detail.as_deref(), Some("timeout"));
        assert!(outcome.message.contains("2500"));
    }

    #[test]
    fn test_outcome_with_metric() {
        let outcome = Outcome::warning("available memory low").with_metric(412.0);
        assert_eq!(outcome.metric, Some(412.0));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ProbeStatus::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
