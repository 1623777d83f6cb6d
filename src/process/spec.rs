// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Declarative process descriptions.
//!
//! A [`ProcessSpec`] states what one wrapped tool needs (typed input slots,
//! a resource label, container references), what it produces (emit tags with
//! glob patterns) and how to run it (a script template plus an optional
//! version command). Specs are immutable once built and are shared between
//! every task that runs the same process.

use crate::config::consts::VERSIONS_TAG;
use crate::config::{ContainerRefs, Walltime};
use crate::errors::ProcessSpecError;
use crate::process::template::ScriptTemplate;
use crate::process::Predicate;
use crate::provenance::ExtractionRule;
use crate::utils::glob_to_regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    File,
    Value,
}

/// How many artifacts a slot takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// Exactly one
    #[default]
    Single,
    /// One or more
    Multiple,
}

impl Arity {
    /// Whether `count` artifacts satisfy this arity. Optional slots also take zero.
    pub fn accepts(&self, count: usize, optional: bool) -> bool {
        if count == 0 {
            return optional;
        }
        match self {
            Arity::Single => count == 1,
            Arity::Multiple => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Single => f.write_str("single"),
            Arity::Multiple => f.write_str("multiple"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputDecl {
    pub name: String,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub arity: Arity,
    #[serde(default)]
    pub optional: bool,
}

impl InputDecl {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::File,
            arity: Arity::Single,
            optional: false,
        }
    }

    pub fn value(name: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Value,
            ..Self::file(name)
        }
    }

    pub fn multiple(mut self) -> Self {
        self.arity = Arity::Multiple;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDecl {
    pub emit: String,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub arity: Arity,
    /// Glob matched against the task's scratch directory after a zero exit
    pub pattern: String,
}

impl OutputDecl {
    pub fn file(emit: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            emit: emit.into(),
            kind: ValueKind::File,
            arity: Arity::Single,
            pattern: pattern.into(),
        }
    }

    pub fn multiple(mut self) -> Self {
        self.arity = Arity::Multiple;
        self
    }
}

/// Command printing the tool's version, and how to parse what it prints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionCapture {
    pub tool: String,
    pub command: String,
    #[serde(default)]
    pub rule: ExtractionRule,
}

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    name: String,
    tag: Option<ScriptTemplate>,
    label: String,
    inputs: Vec<InputDecl>,
    outputs: Vec<OutputDecl>,
    when: Predicate,
    script: ScriptTemplate,
    container: ContainerRefs,
    version: Option<VersionCapture>,
    time: Option<Walltime>,
}

impl ProcessSpec {
    pub fn builder(
        name: impl Into<String>,
        label: impl Into<String>,
        script: impl Into<String>,
    ) -> ProcessSpecBuilder {
        ProcessSpecBuilder {
            name: name.into(),
            label: label.into(),
            script: script.into(),
            tag: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            when: Predicate::Always,
            container: ContainerRefs::default(),
            version: None,
            time: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&ScriptTemplate> {
        self.tag.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn inputs(&self) -> &[InputDecl] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&InputDecl> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn outputs(&self) -> &[OutputDecl] {
        &self.outputs
    }

    /// Emit tags in declaration order, followed by the implicit versions tag.
    pub fn emit_tags(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .iter()
            .map(|o| o.emit.as_str())
            .chain(std::iter::once(VERSIONS_TAG))
    }

    pub fn when(&self) -> &Predicate {
        &self.when
    }

    pub fn script(&self) -> &ScriptTemplate {
        &self.script
    }

    pub fn container(&self) -> &ContainerRefs {
        &self.container
    }

    pub fn version(&self) -> Option<&VersionCapture> {
        self.version.as_ref()
    }

    pub fn time(&self) -> Option<Walltime> {
        self.time
    }
}

pub struct ProcessSpecBuilder {
    name: String,
    label: String,
    script: String,
    tag: Option<String>,
    inputs: Vec<InputDecl>,
    outputs: Vec<OutputDecl>,
    when: Predicate,
    container: ContainerRefs,
    version: Option<VersionCapture>,
    time: Option<Walltime>,
}

impl ProcessSpecBuilder {
    pub fn tag(mut self, template: impl Into<String>) -> Self {
        self.tag = Some(template.into());
        self
    }

    pub fn input(mut self, input: InputDecl) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputDecl) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.when = predicate;
        self
    }

    pub fn container(mut self, container: ContainerRefs) -> Self {
        self.container = container;
        self
    }

    pub fn version(mut self, version: VersionCapture) -> Self {
        self.version = Some(version);
        self
    }

    pub fn time(mut self, time: Walltime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn build(self) -> Result<ProcessSpec, ProcessSpecError> {
        if self.name.trim().is_empty() {
            return Err(ProcessSpecError::EmptyName);
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(ProcessSpecError::DuplicateInput {
                    process: self.name.clone(),
                    name: input.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for output in &self.outputs {
            if output.emit == VERSIONS_TAG {
                return Err(ProcessSpecError::ReservedEmit {
                    process: self.name.clone(),
                    emit: output.emit.clone(),
                });
            }
            if !seen.insert(output.emit.as_str()) {
                return Err(ProcessSpecError::DuplicateEmit {
                    process: self.name.clone(),
                    emit: output.emit.clone(),
                });
            }
            if let Err(e) = glob_to_regex(&output.pattern) {
                return Err(ProcessSpecError::InvalidOutputPattern {
                    process: self.name.clone(),
                    pattern: output.pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let template_err = |source| ProcessSpecError::Template {
            process: self.name.clone(),
            source,
        };
        let script = ScriptTemplate::parse(self.script.clone()).map_err(template_err)?;
        let tag = self
            .tag
            .clone()
            .map(ScriptTemplate::parse)
            .transpose()
            .map_err(template_err)?;

        Ok(ProcessSpec {
            name: self.name,
            tag,
            label: self.label,
            inputs: self.inputs,
            outputs: self.outputs,
            when: self.when,
            script,
            container: self.container,
            version: self.version,
            time: self.time,
        })
    }
}

/// Inline process definition as written in a pipeline file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProcessSpecDef {
    name: String,
    label: String,
    script: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    inputs: Vec<InputDecl>,
    #[serde(default)]
    outputs: Vec<OutputDecl>,
    #[serde(default)]
    when: Predicate,
    #[serde(default)]
    container: ContainerRefs,
    #[serde(default)]
    version: Option<VersionCapture>,
    #[serde(default)]
    time: Option<Walltime>,
}

impl TryFrom<ProcessSpecDef> for ProcessSpec {
    type Error = ProcessSpecError;

    fn try_from(def: ProcessSpecDef) -> Result<Self, Self::Error> {
        ProcessSpecBuilder {
            name: def.name,
            label: def.label,
            script: def.script,
            tag: def.tag,
            inputs: def.inputs,
            outputs: def.outputs,
            when: def.when,
            container: def.container,
            version: def.version,
            time: def.time,
        }
        .build()
    }
}

impl<'de> Deserialize<'de> for ProcessSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let def = ProcessSpecDef::deserialize(deserializer)?;
        ProcessSpec::try_from(def).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::Single.accepts(1, false));
        assert!(!Arity::Single.accepts(2, false));
        assert!(!Arity::Single.accepts(0, false));
        assert!(Arity::Single.accepts(0, true));
        assert!(Arity::Multiple.accepts(5, false));
        assert!(!Arity::Multiple.accepts(0, false));
    }

    #[test]
    fn test_builder_rejects_duplicate_inputs() {
        let err = ProcessSpec::builder("ALIGN", "process_medium", "mafft {{ fasta }}")
            .input(InputDecl::file("fasta"))
            .input(InputDecl::file("fasta"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ProcessSpecError::DuplicateInput {
                process: "ALIGN".into(),
                name: "fasta".into()
            }
        );
    }

    #[test]
    fn test_builder_rejects_reserved_emit() {
        let err = ProcessSpec::builder("ALIGN", "process_medium", "true")
            .output(OutputDecl::file("versions", "*.yml"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProcessSpecError::ReservedEmit { .. }));
    }

    #[test]
    fn test_builder_rejects_bad_template() {
        let err = ProcessSpec::builder("ALIGN", "process_medium", "mafft {{ fasta")
            .build()
            .unwrap_err();
        assert!(matches!(err, ProcessSpecError::Template { .. }));
    }

    #[test]
    fn test_emit_tags_end_with_versions() {
        let spec = ProcessSpec::builder("ALIGN", "process_medium", "true")
            .output(OutputDecl::file("fas", "*_mafft.fa"))
            .build()
            .unwrap();
        assert_eq!(spec.emit_tags().collect::<Vec<_>>(), vec!["fas", "versions"]);
    }

    #[test]
    fn test_deserialize_inline_process() {
        let yaml = r#"
name: COUNT_LINES
label: process_single
tag: "{{ prefix(reads) }}"
inputs:
  - { name: reads, arity: multiple }
  - { name: mode, kind: value, optional: true }
outputs:
  - { emit: counts, pattern: "*.count" }
when: { param: count_lines }
script: "wc -l {{ reads }} > lines.count"
container:
  registry: docker.io/library/busybox:1.36
version:
  tool: coreutils
  command: "wc --version | head -1"
  rule: { pattern: '([0-9]+\.[0-9]+)' }
time: 30m
"#;
        let spec: ProcessSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.name(), "COUNT_LINES");
        assert_eq!(spec.inputs()[0].arity, Arity::Multiple);
        assert_eq!(spec.input("mode").map(|i| i.kind), Some(ValueKind::Value));
        assert!(spec.tag().is_some());
        assert_eq!(spec.time().map(|t| t.duration().as_secs()), Some(1_800));
        assert!(matches!(spec.when(), Predicate::Param { .. }));
    }

    #[test]
    fn test_deserialize_reports_spec_errors() {
        let yaml = "name: X\nlabel: process_low\nscript: 'echo {{ oops'\n";
        let err = serde_yaml::from_str::<ProcessSpec>(yaml).unwrap_err();
        assert!(err.to_string().contains("Unterminated"));
    }
}
