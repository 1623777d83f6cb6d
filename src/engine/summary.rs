// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::TaskOutcome;
use crate::provenance::VersionRecord;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Exit status when every task succeeded or was skipped.
pub const EXIT_OK: i32 = 0;
/// Exit status when some task did not complete.
pub const EXIT_EXECUTION_FAILURE: i32 = 1;
/// Exit status for a pipeline definition error.
pub const EXIT_CONFIGURATION_ERROR: i32 = 2;

/// Final state of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub process: String,
    pub outcome: TaskOutcome,
    pub exit_code: Option<i32>,
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
    /// Set once the task was dispatched
    pub work_dir: Option<PathBuf>,
    /// Files the task emitted, across all of its output tags
    pub outputs: Vec<PathBuf>,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// What happened in a run, task by task, in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pipeline: String,
    pub tasks: Vec<TaskReport>,
    /// Union of every successful task's versions file
    pub versions: VersionRecord,
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.task(task_id).map(|t| &t.outcome)
    }

    /// Every task succeeded or was skipped.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.outcome.is_ok())
    }

    pub fn is_misconfigured(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.outcome, TaskOutcome::Misconfigured { .. }))
    }

    /// 0 when nothing failed, 2 when a configuration error aborted the run,
    /// 1 for any other task that did not complete.
    pub fn exit_code(&self) -> i32 {
        if self.is_misconfigured() {
            EXIT_CONFIGURATION_ERROR
        } else if self.is_success() {
            EXIT_OK
        } else {
            EXIT_EXECUTION_FAILURE
        }
    }

    pub fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tasks.iter().filter(|t| predicate(&t.outcome)).count()
    }

    /// Plain-text table, one row per task.
    pub fn render_table(&self) -> String {
        let id_width = self
            .tasks
            .iter()
            .map(|t| t.task_id.len())
            .chain(std::iter::once("TASK".len()))
            .max()
            .unwrap_or_default();
        let process_width = self
            .tasks
            .iter()
            .map(|t| t.process.len())
            .chain(std::iter::once("PROCESS".len()))
            .max()
            .unwrap_or_default();

        let mut table = String::new();
        let _ = writeln!(
            table,
            "{:<id_width$}  {:<process_width$}  {:>9}  OUTCOME",
            "TASK", "PROCESS", "DURATION"
        );
        for task in &self.tasks {
            let _ = writeln!(
                table,
                "{:<id_width$}  {:<process_width$}  {:>8.1}s  {}",
                task.task_id,
                task.process,
                task.duration.as_secs_f64(),
                task.outcome
            );
        }
        table
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
