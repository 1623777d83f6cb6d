// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::path::{Path, PathBuf};

/// What an artifact carries: a file on disk or a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactValue {
    File(PathBuf),
    Value(String),
}

/// A unit of data flowing between tasks.
///
/// `id` identifies the sample an artifact belongs to (it follows the data
/// through every task that consumes it), `produced_by` names the task that
/// emitted it and is `None` for pipeline sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub value: ArtifactValue,
    pub id: Option<String>,
    pub produced_by: Option<String>,
}

impl Artifact {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            value: ArtifactValue::File(path.into()),
            id: None,
            produced_by: None,
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: ArtifactValue::Value(value.into()),
            id: None,
            produced_by: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_producer(mut self, task_id: impl Into<String>) -> Self {
        self.produced_by = Some(task_id.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.value {
            ArtifactValue::File(path) => Some(path),
            ArtifactValue::Value(_) => None,
        }
    }

    /// Name the artifact has inside a task's scratch directory: the file name
    /// for files, the raw text for values.
    pub fn staged_name(&self) -> String {
        match &self.value {
            ArtifactValue::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            ArtifactValue::Value(v) => v.clone(),
        }
    }
}
