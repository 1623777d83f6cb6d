// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline execution: the dependency-driven engine, its resource pool and
//! the outcome types every executor reports with.

mod outcome;
pub mod plan;
mod reactive;
mod resource_pool;
pub mod summary;
#[cfg(test)]
mod integration_tests;

pub use outcome::{ExecutionOutcome, ExecutionResult, TaskOutcome};
pub use plan::{PipelinePlan, PlannedTask};
pub use reactive::{EngineOptions, PipelineEngine};
pub use resource_pool::{ResourceGuard, ResourcePool};
pub use summary::{RunSummary, TaskReport};
