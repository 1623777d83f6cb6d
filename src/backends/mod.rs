// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Executor backends for phylowood tasks.
//!
//! Every backend implements [`TaskExecutor`](crate::traits::TaskExecutor):
//! it receives a fully resolved task and reports how it ended.
//!
//! # Available Backends
//!
//! ## Process Backend
//! Runs the rendered `.command.sh` as a child process:
//! - **local**: `bash .command.sh` on the host
//! - **docker**: `docker run --rm` with the scratch directory mounted
//! - **singularity**: `singularity exec` with the scratch directory bound
//!
//! ## Stub Backend (Test-Only)
//! Scripted outcomes per task id, for engine tests. Not available in
//! production builds.
//!
//! # Example
//! ```rust
//! use phylowood::backends::process::ProcessExecutor;
//! use phylowood::config::EngineKind;
//! use phylowood::traits::TaskExecutor;
//!
//! let executor = ProcessExecutor::new(EngineKind::Docker).with_resume(true);
//! assert_eq!(executor.name(), "docker");
//! ```

pub mod process;
#[cfg(test)]
pub mod stub;
