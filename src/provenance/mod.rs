// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tool version capture.
//!
//! Every task's rendered script ends with a trailer that runs the process's
//! version command and stores its combined output next to the task outputs.
//! After a successful run the executor hands that raw text to [`record`],
//! which applies the process's [`ExtractionRule`]. A version that cannot be
//! parsed is recorded as `unknown`: provenance never fails a task.

mod record;
mod rule;

pub use record::VersionRecord;
pub use rule::ExtractionRule;

use crate::config::consts::UNKNOWN_VERSION;
use crate::observability::messages::provenance::VersionUnparsable;
use crate::observability::messages::StructuredLog;

/// Build a single-entry record from raw version output.
pub fn record(process: &str, tool: &str, raw: &str, rule: &ExtractionRule) -> VersionRecord {
    let version = rule.extract(raw).unwrap_or_else(|| {
        VersionUnparsable { process, tool, raw }.log();
        UNKNOWN_VERSION.to_string()
    });

    let mut record = VersionRecord::new();
    record.insert(process, tool, version);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_parses_version() {
        let rule = ExtractionRule::new()
            .with_strip_prefix("v")
            .with_strip_parenthetical();
        let record = record("MAFFT_ALIGN", "mafft", "v7.490 (2021-12-14)", &rule);
        assert_eq!(record.get("MAFFT_ALIGN", "mafft"), Some("7.490"));
    }

    #[test]
    fn test_record_falls_back_to_unknown() {
        let rule = ExtractionRule::new().with_pattern(r"version ([0-9.]+)").unwrap();
        let record = record("FASTTREE", "fasttree", "", &rule);
        assert_eq!(record.get("FASTTREE", "fasttree"), Some(UNKNOWN_VERSION));
    }
}
