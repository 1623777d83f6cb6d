// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::Memory;
use serde::Serialize;
use std::path::PathBuf;

/// Everything about a task that templates may read besides its inputs and
/// params. Built once per task by the instantiator and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskContext {
    pub task_id: String,
    pub process: String,
    /// Rendered tag, when the process declares one
    pub tag: Option<String>,
    pub cpus: usize,
    pub memory: Memory,
    pub work_dir: PathBuf,
    /// Extra tool arguments, inserted verbatim by `{{ args }}`
    pub ext_args: String,
}
