// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline definition validation warnings and errors.
//!
//! This module contains message types for logging events related to:
//! * Task graph validation
//! * Cyclic, unresolved and duplicate task detection
//! * Samplesheet normalization warnings

use crate::errors::ValidationError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Cyclic dependency detected in the task graph.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use phylowood::observability::messages::validation::CyclicDependencyDetected;
///
/// let cycle = vec!["align", "tree", "align"];
/// let msg = CyclicDependencyDetected {
///     cycle: &cycle,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct CyclicDependencyDetected<'a> {
    pub cycle: &'a [&'a str],
}

impl Display for CyclicDependencyDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cyclic dependency detected: {}", self.cycle.join(" -> "))
    }
}

impl StructuredLog for CyclicDependencyDetected<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
        )
    }
}

/// A task depends on a task id that does not exist.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use phylowood::observability::messages::validation::UnresolvedDependency;
///
/// let msg = UnresolvedDependency {
///     task_id: "tree",
///     missing_dependency: "algin",
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct UnresolvedDependency<'a> {
    pub task_id: &'a str,
    pub missing_dependency: &'a str,
}

impl Display for UnresolvedDependency<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' depends on '{}' which does not exist",
            self.task_id, self.missing_dependency
        )
    }
}

impl StructuredLog for UnresolvedDependency<'_> {
    fn log(&self) {
        tracing::error!(
            task_id = self.task_id,
            missing_dependency = self.missing_dependency,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            task_id = self.task_id,
            missing_dependency = self.missing_dependency,
        )
    }
}

/// Two tasks share an id.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct DuplicateTaskId<'a> {
    pub task_id: &'a str,
}

impl Display for DuplicateTaskId<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Duplicate task ID: '{}'", self.task_id)
    }
}

impl StructuredLog for DuplicateTaskId<'_> {
    fn log(&self) {
        tracing::error!(task_id = self.task_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            task_id = self.task_id,
        )
    }
}

/// Log one graph validation error through its dedicated message type.
pub fn log_validation_error(error: &ValidationError) {
    match error {
        ValidationError::CyclicDependency { cycle } => {
            let cycle: Vec<&str> = cycle.iter().map(String::as_str).collect();
            CyclicDependencyDetected { cycle: &cycle }.log();
        }
        ValidationError::UnresolvedDependency {
            task_id,
            missing_dependency,
        } => UnresolvedDependency {
            task_id,
            missing_dependency,
        }
        .log(),
        ValidationError::DuplicateTaskId { task_id } => DuplicateTaskId { task_id }.log(),
    }
}

/// Pipeline definition validation started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use phylowood::observability::messages::validation::ValidationStarted;
///
/// let msg = ValidationStarted {
///     task_count: 5,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ValidationStarted {
    pub task_count: usize,
}

impl Display for ValidationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Validating pipeline definition with {} tasks",
            self.task_count
        )
    }
}

impl StructuredLog for ValidationStarted {
    fn log(&self) {
        tracing::info!(task_count = self.task_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::INFO,
            "span_name",
            name = name,
            task_count = self.task_count,
        )
    }
}

/// Pipeline definition validation passed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ValidationCompleted {
    pub task_count: usize,
}

impl Display for ValidationCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline definition valid: {} tasks",
            self.task_count
        )
    }
}

impl StructuredLog for ValidationCompleted {
    fn log(&self) {
        tracing::info!(task_count = self.task_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::INFO,
            "span_name",
            name = name,
            task_count = self.task_count,
        )
    }
}

/// Pipeline definition validation failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ValidationFailed {
    pub error_count: usize,
}

impl Display for ValidationFailed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline definition validation failed with {} errors",
            self.error_count
        )
    }
}

impl StructuredLog for ValidationFailed {
    fn log(&self) {
        tracing::error!(error_count = self.error_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            error_count = self.error_count,
        )
    }
}

/// A samplesheet species name contained spaces and was rewritten.
///
/// # Log Level
/// `warn!` - Input was changed
///
/// # Example
/// ```
/// use phylowood::observability::messages::validation::SampleNameSanitized;
///
/// let msg = SampleNameSanitized {
///     original: "Homo sapiens",
///     sanitized: "Homo_sapiens",
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct SampleNameSanitized<'a> {
    pub original: &'a str,
    pub sanitized: &'a str,
}

impl Display for SampleNameSanitized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Spaces have been replaced by underscores for sample: {}",
            self.original
        )
    }
}

impl StructuredLog for SampleNameSanitized<'_> {
    fn log(&self) {
        tracing::warn!(
            original = self.original,
            sanitized = self.sanitized,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::WARN,
            "span_name",
            name = name,
            sample = self.sanitized,
        )
    }
}

/// A samplesheet passed every check and its normalized form was written.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SamplesheetChecked<'a> {
    pub sample_count: usize,
    pub output: &'a std::path::Path,
}

impl Display for SamplesheetChecked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Samplesheet valid: {} samples written to {}",
            self.sample_count,
            self.output.display()
        )
    }
}

impl StructuredLog for SamplesheetChecked<'_> {
    fn log(&self) {
        tracing::info!(
            sample_count = self.sample_count,
            output = %self.output.display(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::INFO,
            "span_name",
            name = name,
            sample_count = self.sample_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let cycle = ["align", "tree", "align"];
        let msg = CyclicDependencyDetected { cycle: &cycle };
        assert_eq!(msg.to_string(), "Cyclic dependency detected: align -> tree -> align");
    }

    #[test]
    fn test_sanitized_display() {
        let msg = SampleNameSanitized {
            original: "Homo sapiens",
            sanitized: "Homo_sapiens",
        };
        assert_eq!(
            msg.to_string(),
            "Spaces have been replaced by underscores for sample: Homo sapiens"
        );
    }
}
