// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod execution;
mod instantiate;
mod profile;
mod provenance;
mod route;
mod samplesheet;

pub use config::{ConfigError, ValidationError};
pub use execution::{FailureStrategy, RunError};
pub use instantiate::{InstantiateError, PredicateError, ProcessSpecError, TemplateError};
pub use profile::ProfileError;
pub use provenance::ProvenanceError;
pub use route::RouteError;
pub use samplesheet::SamplesheetError;
