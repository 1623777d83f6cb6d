// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::ExecutionResult;
use crate::process::ResolvedTask;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runs one resolved task to completion.
///
/// The task is taken by value: once handed over it cannot be dispatched
/// again. Implementations never fail outright; every way a run can end is
/// an [`ExecutionOutcome`](crate::engine::ExecutionOutcome) inside the result.
/// When `cancel` fires, in-flight work must be terminated best-effort and
/// the result reported as cancelled.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: ResolvedTask, cancel: CancellationToken) -> ExecutionResult;

    /// Short name for logs, e.g. `local` or `docker`.
    fn name(&self) -> &'static str;
}
