// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for per-task events.
//!
//! This module contains message types for logging events related to:
//! * Task dispatch and completion
//! * Predicate skips and upstream propagation
//! * Work directory reuse on resume

use crate::config::Memory;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;
use tracing::Span;

/// A task was handed to the executor.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use phylowood::config::Memory;
/// use phylowood::observability::messages::task::TaskDispatched;
///
/// let msg = TaskDispatched {
///     task_id: "align@speciesA_T1",
///     process: "MAFFT_ALIGN",
///     cpus: 6,
///     memory: Memory::from_gb(36),
///     environment: "quay.io/biocontainers/mafft:7.490--h779adbc_0",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct TaskDispatched<'a> {
    pub task_id: &'a str,
    pub process: &'a str,
    pub cpus: usize,
    pub memory: Memory,
    pub environment: &'a str,
}

impl Display for TaskDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching task '{}' ({}) with {} cpus, {} in {}",
            self.task_id, self.process, self.cpus, self.memory, self.environment
        )
    }
}

impl StructuredLog for TaskDispatched<'_> {
    fn log(&self) {
        tracing::info!(
            task_id = self.task_id,
            process = self.process,
            cpus = self.cpus,
            memory_mb = self.memory.as_mb(),
            environment = self.environment,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "task",
            span_name = name,
            task_id = self.task_id,
            process = self.process,
            cpus = self.cpus,
        )
    }
}

/// A task finished successfully.
///
/// # Log Level
/// `info!` - Important operational event
pub struct TaskSucceeded<'a> {
    pub task_id: &'a str,
    pub duration: Duration,
    pub emitted: usize,
}

impl Display for TaskSucceeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' succeeded in {:?} with {} output artifacts",
            self.task_id, self.duration, self.emitted
        )
    }
}

impl StructuredLog for TaskSucceeded<'_> {
    fn log(&self) {
        tracing::info!(
            task_id = self.task_id,
            duration_ms = self.duration.as_millis() as u64,
            emitted = self.emitted,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("task_succeeded", span_name = name, task_id = self.task_id)
    }
}

/// A task ended in an execution error.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct TaskFailed<'a> {
    pub task_id: &'a str,
    pub outcome: &'a dyn Display,
    pub stderr_tail: &'a str,
}

impl Display for TaskFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task '{}' failed: {}", self.task_id, self.outcome)
    }
}

impl StructuredLog for TaskFailed<'_> {
    fn log(&self) {
        tracing::error!(
            task_id = self.task_id,
            outcome = %self.outcome,
            stderr_tail = self.stderr_tail,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "task_failed",
            span_name = name,
            task_id = self.task_id,
            outcome = %self.outcome,
        )
    }
}

/// A task's predicate evaluated to false.
///
/// # Log Level
/// `info!` - Expected, deliberate skip
pub struct TaskSkipped<'a> {
    pub task_id: &'a str,
    pub process: &'a str,
}

impl Display for TaskSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Skipping task '{}' ({}): run predicate is false",
            self.task_id, self.process
        )
    }
}

impl StructuredLog for TaskSkipped<'_> {
    fn log(&self) {
        tracing::info!(task_id = self.task_id, process = self.process, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("task_skipped", span_name = name, task_id = self.task_id)
    }
}

/// A task will not run because something upstream did not succeed.
///
/// # Log Level
/// `warn!` - Consequence of an earlier failure
pub struct TaskNotRun<'a> {
    pub task_id: &'a str,
    pub reason: &'a dyn Display,
}

impl Display for TaskNotRun<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task '{}' not run: {}", self.task_id, self.reason)
    }
}

impl StructuredLog for TaskNotRun<'_> {
    fn log(&self) {
        tracing::warn!(task_id = self.task_id, reason = %self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("task_not_run", span_name = name, task_id = self.task_id)
    }
}

/// Previous outputs in the work directory were reused.
///
/// # Log Level
/// `info!` - Important operational event
pub struct TaskResumed<'a> {
    pub task_id: &'a str,
    pub work_dir: &'a Path,
}

impl Display for TaskResumed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Reusing cached outputs for task '{}' from {}",
            self.task_id,
            self.work_dir.display()
        )
    }
}

impl StructuredLog for TaskResumed<'_> {
    fn log(&self) {
        tracing::info!(
            task_id = self.task_id,
            work_dir = %self.work_dir.display(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("task_resumed", span_name = name, task_id = self.task_id)
    }
}

/// Best-effort termination of a container did not go through.
///
/// # Log Level
/// `warn!` - Possible leftover container
pub struct ContainerKillFailed<'a> {
    pub task_id: &'a str,
    pub container: &'a str,
    pub error: &'a dyn Display,
}

impl Display for ContainerKillFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Could not stop container '{}' of task '{}': {}",
            self.container, self.task_id, self.error
        )
    }
}

impl StructuredLog for ContainerKillFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            task_id = self.task_id,
            container = self.container,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "container_kill_failed",
            span_name = name,
            task_id = self.task_id,
            container = self.container,
        )
    }
}

/// Signalling the process group of an interrupted task failed; its
/// processes may outlive the task.
///
/// # Log Level
/// `warn!` - Recoverable issue
pub struct ProcessKillFailed<'a> {
    pub task_id: &'a str,
    pub pid: u32,
    pub error: &'a dyn Display,
}

impl Display for ProcessKillFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Could not kill process group {} of task '{}': {}",
            self.pid, self.task_id, self.error
        )
    }
}

impl StructuredLog for ProcessKillFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            task_id = self.task_id,
            pid = self.pid,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "process_kill_failed",
            span_name = name,
            task_id = self.task_id,
            pid = self.pid,
        )
    }
}

/// A bookkeeping file could not be written to a task's work directory.
///
/// # Log Level
/// `warn!` - Recoverable issue
pub struct WorkFileWriteFailed<'a> {
    pub task_id: &'a str,
    pub path: &'a Path,
    pub error: &'a dyn Display,
}

impl Display for WorkFileWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Could not write {} for task '{}': {}",
            self.path.display(),
            self.task_id,
            self.error
        )
    }
}

impl StructuredLog for WorkFileWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            task_id = self.task_id,
            path = %self.path.display(),
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "work_file_write_failed",
            span_name = name,
            task_id = self.task_id,
            path = %self.path.display(),
        )
    }
}
