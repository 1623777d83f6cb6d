// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::Emission;
use crate::provenance::VersionRecord;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// How a single execution ended, as classified by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Exit 0 and every declared output pattern matched
    Success,
    /// Non-zero exit, whatever the outputs
    ToolFailure { exit_code: i32 },
    /// Exit 0 but these output patterns matched nothing
    MissingOutput { patterns: Vec<String> },
    /// The process or container could not be started
    LaunchFailure { reason: String },
    /// Wall-clock limit exceeded; the child was killed
    Timeout {
        #[serde(rename = "after_secs", serialize_with = "as_secs")]
        after: Duration,
    },
    /// The run was cancelled while the task was in flight
    Cancelled,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Success => write!(f, "success"),
            ExecutionOutcome::ToolFailure { exit_code } => {
                write!(f, "tool failure (exit code {})", exit_code)
            }
            ExecutionOutcome::MissingOutput { patterns } => {
                write!(f, "missing output ({})", patterns.join(", "))
            }
            ExecutionOutcome::LaunchFailure { reason } => write!(f, "launch failure: {}", reason),
            ExecutionOutcome::Timeout { after } => write!(f, "timed out after {:?}", after),
            ExecutionOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything an executor learned about one task. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub task_id: String,
    pub outcome: ExecutionOutcome,
    pub exit_code: Option<i32>,
    /// One emission per declared output, in declaration order, then versions
    pub emissions: Vec<Emission>,
    pub stdout: String,
    pub stderr: String,
    /// Raw text produced by the version command, when it ran
    pub version_raw: Option<String>,
    pub versions: VersionRecord,
    pub duration: Duration,
    /// Outputs were reused from a previous run
    pub resumed: bool,
}

impl ExecutionResult {
    /// A result for a task that never produced anything.
    pub fn without_outputs(task_id: impl Into<String>, outcome: ExecutionOutcome, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            outcome,
            exit_code: None,
            emissions: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            version_raw: None,
            versions: VersionRecord::new(),
            duration,
            resumed: false,
        }
    }
}

/// Final state of a task in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { resumed: bool },
    /// Predicate evaluated to false
    Skipped,
    /// Execution ended in something other than success
    Failed { outcome: ExecutionOutcome },
    /// A task this one depends on did not succeed
    UpstreamFailed { upstream: String },
    /// A required input came only from skipped tasks
    UpstreamSkipped { upstream: String, slot: String },
    /// Never dispatched because the run was cancelled
    Cancelled,
    /// Instantiation found a configuration error
    Misconfigured { reason: String },
}

impl TaskOutcome {
    /// Success or a deliberate skip.
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. } | TaskOutcome::Skipped)
    }

    /// Only launch failures are worth retrying, and only by a caller that
    /// supplies its own backoff.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(
            self,
            TaskOutcome::Failed {
                outcome: ExecutionOutcome::LaunchFailure { .. }
            }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded { resumed: false } => "SUCCESS",
            TaskOutcome::Succeeded { resumed: true } => "CACHED",
            TaskOutcome::Skipped => "SKIPPED",
            TaskOutcome::Failed { outcome } => match outcome {
                ExecutionOutcome::Success => "SUCCESS",
                ExecutionOutcome::ToolFailure { .. } => "TOOL_FAILURE",
                ExecutionOutcome::MissingOutput { .. } => "MISSING_OUTPUT",
                ExecutionOutcome::LaunchFailure { .. } => "LAUNCH_FAILURE",
                ExecutionOutcome::Timeout { .. } => "TIMEOUT",
                ExecutionOutcome::Cancelled => "CANCELLED",
            },
            TaskOutcome::UpstreamFailed { .. } => "UPSTREAM_FAILED",
            TaskOutcome::UpstreamSkipped { .. } => "UPSTREAM_SKIPPED",
            TaskOutcome::Cancelled => "CANCELLED",
            TaskOutcome::Misconfigured { .. } => "MISCONFIGURED",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Succeeded { .. } | TaskOutcome::Skipped | TaskOutcome::Cancelled => {
                f.write_str(self.label())
            }
            TaskOutcome::Failed { outcome } => write!(f, "{}: {}", self.label(), outcome),
            TaskOutcome::UpstreamFailed { upstream } => {
                write!(f, "{}: '{}' did not succeed", self.label(), upstream)
            }
            TaskOutcome::UpstreamSkipped { upstream, slot } => {
                write!(f, "{}: input '{}' from skipped '{}'", self.label(), slot, upstream)
            }
            TaskOutcome::Misconfigured { reason } => write!(f, "{}: {}", self.label(), reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_launch_failures_are_retry_eligible() {
        let launch = TaskOutcome::Failed {
            outcome: ExecutionOutcome::LaunchFailure {
                reason: "docker: Cannot connect to the Docker daemon".into(),
            },
        };
        assert!(launch.is_retry_eligible());
        assert!(!TaskOutcome::Failed {
            outcome: ExecutionOutcome::ToolFailure { exit_code: 1 }
        }
        .is_retry_eligible());
        assert!(!TaskOutcome::Cancelled.is_retry_eligible());
    }

    #[test]
    fn test_ok_outcomes() {
        assert!(TaskOutcome::Succeeded { resumed: true }.is_ok());
        assert!(TaskOutcome::Skipped.is_ok());
        assert!(!TaskOutcome::UpstreamFailed {
            upstream: "align".into()
        }
        .is_ok());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = TaskOutcome::Failed {
            outcome: ExecutionOutcome::Timeout {
                after: Duration::from_millis(1500),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["outcome"]["kind"], "timeout");
        assert_eq!(json["outcome"]["after_secs"], 1.5);
    }
}
