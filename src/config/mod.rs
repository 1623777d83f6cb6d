// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod dependency_graph;
mod loader;
mod profiles;
mod runtime;
mod samplesheet;
mod validation;

pub mod consts;

pub use dependency_graph::DependencyGraph;
pub use loader::{
    load_and_validate_config, load_config, BuiltinProcess, Config, ExecutorOptions, ForEach,
    InputSource, ProcessConfig, RunOverrides, RunProfile, TaskConfig,
};
pub use profiles::{
    select_environment, ContainerRefs, EngineCapabilities, EngineKind, EnvironmentRef, Memory,
    ProfileResolver, ProfileTable, ResolvedResources, ResourceCeiling, ResourceProfile, Walltime,
};
pub use runtime::{expanded_id, Runtime, RuntimeBuilder};
pub use samplesheet::{
    check_samplesheet, Sample, Samplesheet, MIN_POPULATED_COLUMNS, SAMPLESHEET_HEADER,
};
pub use validation::validate_dependency_graph;
