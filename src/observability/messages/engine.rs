// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline run lifecycle and scheduling events.
//!
//! This module contains message types for logging events related to:
//! * Run start, completion and cancellation
//! * Configuration errors found while the run is in progress
//! * Failure strategy decisions

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A pipeline run started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use phylowood::observability::messages::engine::RunStarted;
///
/// let msg = RunStarted {
///     pipeline: "phylogeny",
///     task_count: 5,
///     max_concurrency: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunStarted<'a> {
    pub pipeline: &'a str,
    pub task_count: usize,
    pub max_concurrency: usize,
}

impl Display for RunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting pipeline '{}': {} tasks, max_concurrency={}",
            self.pipeline, self.task_count, self.max_concurrency
        )
    }
}

impl StructuredLog for RunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            task_count = self.task_count,
            max_concurrency = self.max_concurrency,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run",
            span_name = name,
            pipeline = self.pipeline,
            task_count = self.task_count,
            max_concurrency = self.max_concurrency,
        )
    }
}

/// Every task of a run reached a final state.
///
/// # Log Level
/// `info!` when nothing failed, `warn!` otherwise
///
/// # Example
/// ```
/// use phylowood::observability::messages::engine::RunCompleted;
/// use std::time::Duration;
///
/// let msg = RunCompleted {
///     pipeline: "phylogeny",
///     succeeded: 4,
///     skipped: 1,
///     failed: 0,
///     duration: Duration::from_secs(95),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunCompleted<'a> {
    pub pipeline: &'a str,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl Display for RunCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' finished in {:?}: {} succeeded, {} skipped, {} did not complete",
            self.pipeline, self.duration, self.succeeded, self.skipped, self.failed
        )
    }
}

impl StructuredLog for RunCompleted<'_> {
    fn log(&self) {
        if self.failed == 0 {
            tracing::info!(
                pipeline = self.pipeline,
                succeeded = self.succeeded,
                skipped = self.skipped,
                failed = self.failed,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        } else {
            tracing::warn!(
                pipeline = self.pipeline,
                succeeded = self.succeeded,
                skipped = self.skipped,
                failed = self.failed,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run_completed",
            span_name = name,
            pipeline = self.pipeline,
            failed = self.failed,
        )
    }
}

/// The run was cancelled; undispatched tasks will not start.
///
/// # Log Level
/// `warn!` - Run is ending early
pub struct RunCancelled<'a> {
    pub pipeline: &'a str,
    pub reason: &'a str,
}

impl Display for RunCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cancelling pipeline '{}': {}", self.pipeline, self.reason)
    }
}

impl StructuredLog for RunCancelled<'_> {
    fn log(&self) {
        tracing::warn!(pipeline = self.pipeline, reason = self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("run_cancelled", span_name = name, pipeline = self.pipeline)
    }
}

/// A configuration error surfaced after the run had started.
///
/// # Log Level
/// `error!` - Aborts the run
///
/// # Example
/// ```
/// use phylowood::observability::messages::engine::TaskMisconfigured;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "unknown profile 'process_huge'");
/// let msg = TaskMisconfigured {
///     task_id: "tree",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct TaskMisconfigured<'a> {
    pub task_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for TaskMisconfigured<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' cannot be instantiated, aborting run: {}",
            self.task_id, self.error
        )
    }
}

impl StructuredLog for TaskMisconfigured<'_> {
    fn log(&self) {
        tracing::error!(task_id = self.task_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("task_misconfigured", span_name = name, task_id = self.task_id)
    }
}

/// Fail-fast is in effect and a task failed.
///
/// # Log Level
/// `warn!` - Run is ending early
pub struct FailFastTriggered<'a> {
    pub task_id: &'a str,
}

impl Display for FailFastTriggered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' failed under fail_fast; cancelling remaining tasks",
            self.task_id
        )
    }
}

impl StructuredLog for FailFastTriggered<'_> {
    fn log(&self) {
        tracing::warn!(task_id = self.task_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("fail_fast", span_name = name, task_id = self.task_id)
    }
}
