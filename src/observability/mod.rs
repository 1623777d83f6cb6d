// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout phylowood. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep log wording next to the fields it reports
//! * Provide consistent, structured logging output
//!
//! Every message also implements [`StructuredLog`](messages::StructuredLog),
//! which emits it at its natural level with its fields attached.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - Run lifecycle, cancellation and fail-fast events
//! * `messages::task` - Task dispatch, completion, skip and failure events
//! * `messages::validation` - Pipeline definition and samplesheet warnings and errors
//! * `messages::provenance` - Tool version capture degradations
//!
//! # Usage
//!
//! ```rust
//! use phylowood::observability::messages::engine::RunCancelled;
//! use phylowood::observability::messages::StructuredLog;
//!
//! let msg = RunCancelled {
//!     pipeline: "phylogeny",
//!     reason: "interrupted",
//! };
//!
//! tracing::warn!("{}", msg);
//! msg.log();
//! ```

pub mod messages;
