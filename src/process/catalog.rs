// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process definitions for the wrapped phylogenetics tools.
//!
//! | builtin        | process        | consumes        | emits                          |
//! |----------------|----------------|-----------------|--------------------------------|
//! | `mafft`        | `MAFFT_ALIGN`  | `fasta`         | `fas` (`*_mafft.fa`)           |
//! | `fasttree`     | `FASTTREE`     | `alignment`     | `phylogeny` (`*_ft.treefile`)  |
//! | `veryfasttree` | `VERYFASTTREE` | `alignment`     | `phylogeny` (`*_vft.treefile`) |
//!
//! Both tree builders run single-threaded on alignments of up to 14
//! sequences and use the full allocation above that.

use crate::config::ContainerRefs;
use crate::errors::ProcessSpecError;
use crate::process::{InputDecl, OutputDecl, ProcessSpec, VersionCapture};
use crate::provenance::ExtractionRule;

pub const BUILTIN_NAMES: &[&str] = &["mafft", "fasttree", "veryfasttree"];

const BIOCONTAINERS_SINGULARITY: &str = "https://depot.galaxyproject.org/singularity";
const BIOCONTAINERS_REGISTRY: &str = "quay.io/biocontainers";

fn biocontainer(image: &str) -> ContainerRefs {
    ContainerRefs {
        singularity: Some(format!("{}/{}", BIOCONTAINERS_SINGULARITY, image)),
        registry: Some(format!("{}/{}", BIOCONTAINERS_REGISTRY, image)),
    }
}

/// Look up a builtin process by its short name.
pub fn builtin(name: &str) -> Result<Option<ProcessSpec>, ProcessSpecError> {
    match name {
        "mafft" => mafft().map(Some),
        "fasttree" => fasttree().map(Some),
        "veryfasttree" => veryfasttree().map(Some),
        _ => Ok(None),
    }
}

pub fn mafft() -> Result<ProcessSpec, ProcessSpecError> {
    ProcessSpec::builder(
        "MAFFT_ALIGN",
        "process_medium",
        "mafft --thread {{ task.cpus }} {{ args }} {{ fasta }} > {{ prefix(fasta) }}_mafft.fa",
    )
    .tag("{{ prefix(fasta) }}")
    .input(InputDecl::file("fasta"))
    .output(OutputDecl::file("fas", "*_mafft.fa"))
    .container(biocontainer("mafft:7.490--h779adbc_0"))
    .version(VersionCapture {
        tool: "mafft".into(),
        command: "mafft --version".into(),
        rule: ExtractionRule::new()
            .with_strip_prefix("v")
            .with_strip_parenthetical(),
    })
    .build()
}

pub fn fasttree() -> Result<ProcessSpec, ProcessSpecError> {
    ProcessSpec::builder(
        "FASTTREE",
        "process_medium",
        "export OMP_NUM_THREADS={{ threads_above(alignment) }}\n\
         FastTree {{ args }} {{ alignment }} > {{ prefix(alignment) }}_ft.treefile",
    )
    .tag("{{ prefix(alignment) }}")
    .input(InputDecl::file("alignment"))
    .output(OutputDecl::file("phylogeny", "*_ft.treefile"))
    .container(biocontainer("fasttree:2.1.10--h516909a_4"))
    .version(VersionCapture {
        tool: "fasttree".into(),
        command: "FastTree -expert 2>&1 | head -n 1".into(),
        rule: pattern_rule(r"FastTree (?:version )?([0-9][0-9.]*)")?,
    })
    .build()
}

pub fn veryfasttree() -> Result<ProcessSpec, ProcessSpecError> {
    ProcessSpec::builder(
        "VERYFASTTREE",
        "process_medium",
        "VeryFastTree -threads {{ threads_above(alignment) }} {{ args }} {{ alignment }} > {{ prefix(alignment) }}_vft.treefile",
    )
    .tag("{{ prefix(alignment) }}")
    .input(InputDecl::file("alignment"))
    .output(OutputDecl::file("phylogeny", "*_vft.treefile"))
    .container(biocontainer("veryfasttree:4.0.03--h4ac6f70_0"))
    .version(VersionCapture {
        tool: "veryfasttree".into(),
        command: "VeryFastTree -help 2>&1 | head -n 1".into(),
        rule: pattern_rule(r"VeryFastTree (?:version )?v?([0-9][0-9.]*)")?,
    })
    .build()
}

fn pattern_rule(pattern: &str) -> Result<ExtractionRule, ProcessSpecError> {
    ExtractionRule::new()
        .with_pattern(pattern)
        .map_err(|e| ProcessSpecError::InvalidVersionPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_build() {
        for name in BUILTIN_NAMES {
            let spec = builtin(name).unwrap().unwrap();
            assert!(spec.container().singularity.is_some());
            assert!(spec.container().registry.is_some());
            assert!(spec.version().is_some());
        }
        assert!(builtin("raxml").unwrap().is_none());
    }

    #[test]
    fn test_version_rules_parse_tool_banners() {
        let ft = fasttree().unwrap();
        let rule = &ft.version().unwrap().rule;
        assert_eq!(
            rule.extract("FastTree version 2.1.10 Double precision (No SSE3)").as_deref(),
            Some("2.1.10")
        );

        let vft = veryfasttree().unwrap();
        let rule = &vft.version().unwrap().rule;
        assert_eq!(rule.extract("VeryFastTree 4.0.03 (built ...)").as_deref(), Some("4.0.03"));

        let mafft = mafft().unwrap();
        let rule = &mafft.version().unwrap().rule;
        assert_eq!(rule.extract("v7.490 (2021-12-14)").as_deref(), Some("7.490"));
    }
}
