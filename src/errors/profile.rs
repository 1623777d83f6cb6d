// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while resolving a resource label into an allocation and environment.

use crate::config::{EngineKind, Memory};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("Unknown resource profile '{label}'")]
    UnknownProfile { label: String },

    #[error("No environment reference is configured for label '{label}' under the {engine} engine")]
    NoEnvironmentAvailable { label: String, engine: EngineKind },

    #[error(
        "Profile '{label}' requests {cpus} cpus / {memory} which exceeds the pool ceiling of {max_cpus} cpus / {max_memory}"
    )]
    ExceedsResourceCeiling {
        label: String,
        cpus: usize,
        memory: Memory,
        max_cpus: usize,
        max_memory: Memory,
    },
}
