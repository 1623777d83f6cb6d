// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::summary::{EXIT_CONFIGURATION_ERROR, EXIT_EXECUTION_FAILURE};
use serde::Deserialize;

/// How the engine reacts when a task ends in an execution error.
///
/// Execution errors are always fatal to the failing task and to every task
/// that consumes its outputs. The strategy only decides what happens to the
/// branches of the graph that do not depend on the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Cancel the whole run on the first execution error
    FailFast,
    /// Let independent branches run to completion
    #[default]
    ContinueOnError,
}

/// Errors that end a `run` invocation outside of task outcomes.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] crate::errors::ConfigError),

    #[error("Failed to prepare work directory: {0}")]
    WorkDir(#[source] std::io::Error),

    #[error("Work directory {} holds files phylowood did not create; choose an empty or new directory", .path.display())]
    ForeignWorkDir { path: std::path::PathBuf },

    #[error(transparent)]
    Provenance(#[from] crate::errors::ProvenanceError),

    #[error("Failed to write run summary: {0}")]
    Summary(#[source] std::io::Error),

    #[error("Failed to serialize run summary: {0}")]
    SummaryFormat(#[from] serde_json::Error),
}

impl RunError {
    /// Process exit status for this error: configuration problems are 2,
    /// everything else 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => EXIT_CONFIGURATION_ERROR,
            _ => EXIT_EXECUTION_FAILURE,
        }
    }
}
