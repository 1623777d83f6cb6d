// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur during task graph validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A circular dependency was detected in the task graph
    CyclicDependency {
        /// The cycle path showing the circular dependency
        cycle: Vec<String>,
    },
    /// A task references a dependency that doesn't exist
    UnresolvedDependency {
        /// The task that has the unresolved dependency
        task_id: String,
        /// The dependency that couldn't be resolved
        missing_dependency: String,
    },
    /// Two tasks share the same ID
    DuplicateTaskId {
        /// The duplicate task ID
        task_id: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnresolvedDependency {
                task_id,
                missing_dependency,
            } => {
                write!(
                    f,
                    "Task '{}' depends on '{}' which does not exist",
                    task_id, missing_dependency
                )
            }
            ValidationError::DuplicateTaskId { task_id } => {
                write!(f, "Duplicate task ID: '{}'", task_id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors detected before any task dispatches. Each one aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read pipeline definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse pipeline definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation failed:\n{}", join_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Task '{task_id}' references unknown process '{process}'")]
    UnknownProcess { task_id: String, process: String },

    #[error("Unknown builtin process '{name}'")]
    UnknownBuiltin { name: String },

    #[error("Process '{name}' is defined more than once")]
    DuplicateProcess { name: String },

    #[error("Unknown run profile '{name}'")]
    UnknownRunProfile { name: String },

    #[error("Task '{task_id}': input '{slot}' consumes channel '{tag}' which no upstream task emits")]
    UnknownChannel {
        task_id: String,
        slot: String,
        tag: String,
    },

    #[error("Task '{task_id}': samplesheet has no column '{column}'")]
    UnknownSampleColumn { task_id: String, column: String },

    #[error("Task '{task_id}': invalid 'when' predicate: {source}")]
    InvalidPredicate {
        task_id: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Task '{task_id}' uses samplesheet sources but the pipeline declares no samplesheet")]
    MissingSamplesheet { task_id: String },

    #[error("Task '{task_id}': {source}")]
    Route {
        task_id: String,
        #[source]
        source: crate::errors::RouteError,
    },

    #[error(transparent)]
    ProcessSpec(#[from] crate::errors::ProcessSpecError),

    #[error(transparent)]
    Instantiate(#[from] crate::errors::InstantiateError),

    #[error(transparent)]
    Samplesheet(#[from] crate::errors::SamplesheetError),
}

fn join_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
