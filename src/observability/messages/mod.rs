// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] for emitting the same event with typed fields, so log
//! text never lives as a string literal at the call site.
//!
//! # Organization
//!
//! * `engine` - pipeline run lifecycle and scheduling events
//! * `task` - per-task instantiation and execution events
//! * `validation` - pipeline definition validation warnings and errors
//! * `provenance` - tool version capture events
//!
//! # Usage Pattern
//!
//! ```rust
//! use phylowood::observability::messages::engine::RunStarted;
//! use phylowood::observability::messages::StructuredLog;
//!
//! let msg = RunStarted {
//!     pipeline: "phylogeny",
//!     task_count: 5,
//!     max_concurrency: 4,
//! };
//!
//! msg.log();
//! ```

use tracing::Span;

pub mod engine;
pub mod provenance;
pub mod task;
pub mod validation;

/// A log event that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the event at its natural level.
    fn log(&self);

    /// A span carrying the same fields, for scoping follow-up events.
    fn span(&self, name: &str) -> Span;
}
