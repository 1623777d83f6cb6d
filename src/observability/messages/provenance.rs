// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for tool version capture.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::Span;

/// A tool's version output could not be parsed; the version is recorded as unknown.
///
/// # Log Level
/// `warn!` - Degraded provenance, the run continues
pub struct VersionUnparsable<'a> {
    pub process: &'a str,
    pub tool: &'a str,
    pub raw: &'a str,
}

impl Display for VersionUnparsable<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Could not parse {} version for process '{}' from output {:?}, recording as unknown",
            self.tool, self.process, self.raw
        )
    }
}

impl StructuredLog for VersionUnparsable<'_> {
    fn log(&self) {
        tracing::warn!(
            process = self.process,
            tool = self.tool,
            raw_length = self.raw.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "version_unparsable",
            span_name = name,
            process = self.process,
            tool = self.tool,
        )
    }
}

/// Two records disagree on a tool version; the first one is kept.
///
/// # Log Level
/// `warn!` - Conflicting provenance
pub struct VersionConflict<'a> {
    pub process: &'a str,
    pub tool: &'a str,
    pub kept: &'a str,
    pub ignored: &'a str,
}

impl Display for VersionConflict<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Conflicting {} versions for process '{}': keeping {}, ignoring {}",
            self.tool, self.process, self.kept, self.ignored
        )
    }
}

impl StructuredLog for VersionConflict<'_> {
    fn log(&self) {
        tracing::warn!(
            process = self.process,
            tool = self.tool,
            kept = self.kept,
            ignored = self.ignored,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "version_conflict",
            span_name = name,
            process = self.process,
            tool = self.tool,
        )
    }
}

/// The run-level software versions file was written.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SoftwareVersionsWritten<'a> {
    pub path: &'a Path,
    pub process_count: usize,
}

impl Display for SoftwareVersionsWritten<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Wrote software versions for {} processes to {}",
            self.process_count,
            self.path.display()
        )
    }
}

impl StructuredLog for SoftwareVersionsWritten<'_> {
    fn log(&self) {
        tracing::info!(
            path = %self.path.display(),
            process_count = self.process_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "software_versions",
            span_name = name,
            path = %self.path.display(),
        )
    }
}
