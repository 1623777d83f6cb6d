// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for turning a process specification into a dispatch-ready task.

use crate::errors::ProfileError;
use crate::process::Arity;
use thiserror::Error;

/// Failures while parsing or rendering a script/tag template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Malformed placeholder '{{{{ {expression} }}}}': {reason}")]
    Malformed { expression: String, reason: String },

    #[error("Unresolved placeholder '{name}'")]
    UnresolvedPlaceholder { name: String },

    #[error("Unknown template function '{name}'")]
    UnknownFunction { name: String },

    #[error("Template function '{function}' failed: {reason}")]
    FunctionFailed { function: String, reason: String },
}

/// Failures while evaluating a run predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("Predicate references unknown param '{key}'")]
    UnknownParam { key: String },

    #[error("Predicate references unknown ext key '{key}'")]
    UnknownExt { key: String },
}

/// A process definition that can never produce a valid task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessSpecError {
    #[error("Process definition has an empty name")]
    EmptyName,

    #[error("Process '{process}' declares input '{name}' more than once")]
    DuplicateInput { process: String, name: String },

    #[error("Process '{process}' declares emit tag '{emit}' more than once")]
    DuplicateEmit { process: String, emit: String },

    #[error("Process '{process}' uses reserved emit tag '{emit}'")]
    ReservedEmit { process: String, emit: String },

    #[error("Process '{process}' declares invalid output pattern '{pattern}': {reason}")]
    InvalidOutputPattern {
        process: String,
        pattern: String,
        reason: String,
    },

    #[error("Invalid version pattern '{pattern}': {reason}")]
    InvalidVersionPattern { pattern: String, reason: String },

    #[error("Process '{process}': {source}")]
    Template {
        process: String,
        #[source]
        source: TemplateError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstantiateError {
    #[error("Task '{task_id}': input '{slot}' declares {arity:?} arity but received {supplied} artifact(s)")]
    ArityMismatch {
        task_id: String,
        slot: String,
        arity: Arity,
        supplied: usize,
    },

    #[error("Task '{task_id}': required input '{slot}' comes from skipped task '{upstream}'")]
    UpstreamSkipped {
        task_id: String,
        slot: String,
        upstream: String,
    },

    #[error("Task '{task_id}': {source}")]
    PredicateEvalError {
        task_id: String,
        #[source]
        source: PredicateError,
    },

    #[error("Task '{task_id}': {source}")]
    TemplateRenderError {
        task_id: String,
        #[source]
        source: TemplateError,
    },

    #[error("Task '{task_id}': {source}")]
    Profile {
        task_id: String,
        #[source]
        source: ProfileError,
    },
}

impl InstantiateError {
    /// Everything but an upstream skip indicates a malformed pipeline definition.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, InstantiateError::UpstreamSkipped { .. })
    }
}
