// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Resource profile resolution.
//!
//! A process declares a resource *label* (`process_medium`, `process_high`, ...)
//! and a pair of container references. Resolving a label looks up the cpu and
//! memory allocation in a [`ProfileTable`] and picks the environment reference
//! through a small decision table keyed on the engine capabilities:
//!
//! | engine        | pull docker override | singularity ref | registry ref | result                 |
//! |---------------|----------------------|-----------------|--------------|------------------------|
//! | singularity   | no                   | set             | any          | singularity reference  |
//! | any           | any                  | any             | set          | registry reference     |
//! | any           | any                  | unset           | unset        | `NoEnvironmentAvailable` |
//!
//! Resolution is pure: the same `(label, capabilities, references)` always
//! yields the same [`ResolvedResources`], so callers may cache the result.
//!
//! # Example
//! ```
//! use phylowood::config::{ContainerRefs, EngineCapabilities, EngineKind, ProfileResolver, ProfileTable};
//!
//! let resolver = ProfileResolver::new(
//!     ProfileTable::builtin(),
//!     EngineCapabilities { kind: EngineKind::Singularity, pull_docker_container: false },
//! );
//! let refs = ContainerRefs {
//!     singularity: Some("https://depot.galaxyproject.org/singularity/mafft:7.490--h779adbc_0".into()),
//!     registry: Some("quay.io/biocontainers/mafft:7.490--h779adbc_0".into()),
//! };
//!
//! let resolved = resolver.resolve("process_medium", &refs).unwrap();
//! assert_eq!(resolved.cpus, 6);
//! assert!(resolved.environment.reference().starts_with("https://"));
//! ```

use crate::errors::ProfileError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Memory amount in bytes, written in configs as `36.GB`, `36 GB` or `512MB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "QuantitySpec", into = "String")]
pub struct Memory(u64);

impl Memory {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_gb(gb: u64) -> Self {
        Self(gb * GIB)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Whole megabytes, rounded down
    pub fn as_mb(&self) -> u64 {
        self.0 / MIB
    }

    /// Whole gigabytes, rounded down
    pub fn as_gb(&self) -> u64 {
        self.0 / GIB
    }

    pub fn saturating_sub(self, other: Memory) -> Memory {
        Memory(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Memory) -> Memory {
        Memory(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= GIB && self.0 % GIB == 0 {
            write!(f, "{} GB", self.0 / GIB)
        } else if self.0 >= MIB && self.0 % MIB == 0 {
            write!(f, "{} MB", self.0 / MIB)
        } else {
            write!(f, "{} B", self.0)
        }
    }
}

impl FromStr for Memory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, unit) = split_quantity(s)?;
        let multiplier = match unit.to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "KB" | "K" => KIB,
            "MB" | "M" => MIB,
            "GB" | "G" => GIB,
            "TB" | "T" => TIB,
            other => return Err(format!("unknown memory unit '{}' in '{}'", other, s)),
        };
        Ok(Memory((amount * multiplier as f64).round() as u64))
    }
}

impl From<Memory> for String {
    fn from(memory: Memory) -> Self {
        memory.to_string()
    }
}

impl TryFrom<QuantitySpec> for Memory {
    type Error = String;

    fn try_from(spec: QuantitySpec) -> Result<Self, Self::Error> {
        match spec {
            QuantitySpec::Number(bytes) => Ok(Memory(bytes)),
            QuantitySpec::Text(text) => text.parse(),
        }
    }
}

/// Wall-clock limit written as `20.h`, `30.m`, `90s` or `1.d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuantitySpec", into = "String")]
pub struct Walltime(Duration);

impl Walltime {
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for Walltime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, unit) = split_quantity(s)?;
        let seconds = match unit.to_ascii_lowercase().as_str() {
            "" | "s" | "sec" => 1.0,
            "m" | "min" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            other => return Err(format!("unknown time unit '{}' in '{}'", other, s)),
        };
        Ok(Walltime(Duration::from_secs_f64(amount * seconds)))
    }
}

impl From<Walltime> for String {
    fn from(walltime: Walltime) -> Self {
        format!("{}s", walltime.0.as_secs())
    }
}

impl TryFrom<QuantitySpec> for Walltime {
    type Error = String;

    fn try_from(spec: QuantitySpec) -> Result<Self, Self::Error> {
        match spec {
            QuantitySpec::Number(seconds) => Ok(Walltime(Duration::from_secs(seconds))),
            QuantitySpec::Text(text) => text.parse(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuantitySpec {
    Number(u64),
    Text(String),
}

/// Split `"36.GB"` / `"36 GB"` / `"6.5GB"` into `(36.0, "GB")`.
fn split_quantity(s: &str) -> Result<(f64, &str), String> {
    let s = s.trim();
    let split_at = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split_at);
    let number = number.trim_end_matches('.');
    let amount: f64 = number
        .parse()
        .map_err(|_| format!("invalid quantity '{}'", s))?;
    Ok((amount, unit.trim()))
}

/// Container engine the run executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Run scripts directly on the host
    #[default]
    Local,
    Docker,
    Singularity,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::Local => "local",
            EngineKind::Docker => "docker",
            EngineKind::Singularity => "singularity",
        };
        f.write_str(name)
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "none" => Ok(EngineKind::Local),
            "docker" => Ok(EngineKind::Docker),
            "singularity" | "apptainer" => Ok(EngineKind::Singularity),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// Capability flags of the execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct EngineCapabilities {
    #[serde(default)]
    pub kind: EngineKind,
    /// Run registry images even under singularity instead of the prebuilt singularity image
    #[serde(default)]
    pub pull_docker_container: bool,
}

/// The two references a process can declare for its environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContainerRefs {
    pub singularity: Option<String>,
    pub registry: Option<String>,
}

/// Environment a task executes inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "format", content = "reference", rename_all = "snake_case")]
pub enum EnvironmentRef {
    /// Archive-format singularity image URI
    Singularity(String),
    /// Registry-qualified container image
    Registry(String),
}

impl EnvironmentRef {
    pub fn reference(&self) -> &str {
        match self {
            EnvironmentRef::Singularity(r) | EnvironmentRef::Registry(r) => r,
        }
    }
}

impl fmt::Display for EnvironmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reference())
    }
}

struct EnvironmentRule {
    applies: fn(&EngineCapabilities) -> bool,
    pick: fn(&ContainerRefs) -> Option<EnvironmentRef>,
}

fn singularity_native(caps: &EngineCapabilities) -> bool {
    caps.kind == EngineKind::Singularity && !caps.pull_docker_container
}

fn any_engine(_: &EngineCapabilities) -> bool {
    true
}

fn singularity_ref(refs: &ContainerRefs) -> Option<EnvironmentRef> {
    refs.singularity.clone().map(EnvironmentRef::Singularity)
}

fn registry_ref(refs: &ContainerRefs) -> Option<EnvironmentRef> {
    refs.registry.clone().map(EnvironmentRef::Registry)
}

/// Evaluated top to bottom; the first applicable rule with a configured reference wins.
const ENVIRONMENT_RULES: &[EnvironmentRule] = &[
    EnvironmentRule {
        applies: singularity_native,
        pick: singularity_ref,
    },
    EnvironmentRule {
        applies: any_engine,
        pick: registry_ref,
    },
];

/// Pick the environment reference for a set of engine capabilities.
pub fn select_environment(
    capabilities: &EngineCapabilities,
    refs: &ContainerRefs,
) -> Option<EnvironmentRef> {
    ENVIRONMENT_RULES
        .iter()
        .filter(|rule| (rule.applies)(capabilities))
        .find_map(|rule| (rule.pick)(refs))
}

/// Cpu, memory and optional time limit behind a resource label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResourceProfile {
    pub cpus: usize,
    pub memory: Memory,
    #[serde(default)]
    pub time: Option<Walltime>,
}

impl ResourceProfile {
    pub const fn new(cpus: usize, memory: Memory) -> Self {
        Self {
            cpus,
            memory,
            time: None,
        }
    }
}

/// Label to profile lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable(HashMap<String, ResourceProfile>);

impl ProfileTable {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// The conventional labels used by the wrapped process definitions.
    pub fn builtin() -> Self {
        let hours = |h: u64| Some(Walltime(Duration::from_secs(h * 3600)));
        let table = HashMap::from([
            (
                "process_single".to_string(),
                ResourceProfile { cpus: 1, memory: Memory::from_gb(6), time: hours(4) },
            ),
            (
                "process_low".to_string(),
                ResourceProfile { cpus: 2, memory: Memory::from_gb(12), time: hours(4) },
            ),
            (
                "process_medium".to_string(),
                ResourceProfile { cpus: 6, memory: Memory::from_gb(36), time: hours(8) },
            ),
            (
                "process_high".to_string(),
                ResourceProfile { cpus: 12, memory: Memory::from_gb(72), time: hours(16) },
            ),
            (
                "process_long".to_string(),
                ResourceProfile { cpus: 2, memory: Memory::from_gb(12), time: hours(20) },
            ),
            (
                "process_high_memory".to_string(),
                ResourceProfile { cpus: 12, memory: Memory::from_gb(200), time: hours(16) },
            ),
        ]);
        Self(table)
    }

    pub fn insert(&mut self, label: impl Into<String>, profile: ResourceProfile) {
        self.0.insert(label.into(), profile);
    }

    /// Overlay pipeline-specific labels on top of this table.
    pub fn with_overrides(mut self, overrides: &HashMap<String, ResourceProfile>) -> Self {
        for (label, profile) in overrides {
            self.0.insert(label.clone(), *profile);
        }
        self
    }

    pub fn get(&self, label: &str) -> Option<&ResourceProfile> {
        self.0.get(label)
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Upper bound on what any single task, and all running tasks together, may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCeiling {
    pub cpus: usize,
    pub memory: Memory,
}

/// Outcome of resolving a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResources {
    pub cpus: usize,
    pub memory: Memory,
    pub time: Option<Duration>,
    pub environment: EnvironmentRef,
}

#[derive(Debug, Clone)]
pub struct ProfileResolver {
    table: ProfileTable,
    capabilities: EngineCapabilities,
    ceiling: Option<ResourceCeiling>,
}

impl ProfileResolver {
    pub fn new(table: ProfileTable, capabilities: EngineCapabilities) -> Self {
        Self {
            table,
            capabilities,
            ceiling: None,
        }
    }

    pub fn with_ceiling(mut self, ceiling: ResourceCeiling) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    pub fn ceiling(&self) -> Option<ResourceCeiling> {
        self.ceiling
    }

    /// Resolve `label` into an allocation and an environment reference.
    pub fn resolve(
        &self,
        label: &str,
        refs: &ContainerRefs,
    ) -> Result<ResolvedResources, ProfileError> {
        let profile = self
            .table
            .get(label)
            .ok_or_else(|| ProfileError::UnknownProfile {
                label: label.to_string(),
            })?;

        if let Some(ceiling) = self.ceiling {
            if profile.cpus > ceiling.cpus || profile.memory > ceiling.memory {
                return Err(ProfileError::ExceedsResourceCeiling {
                    label: label.to_string(),
                    cpus: profile.cpus,
                    memory: profile.memory,
                    max_cpus: ceiling.cpus,
                    max_memory: ceiling.memory,
                });
            }
        }

        let environment = select_environment(&self.capabilities, refs).ok_or_else(|| {
            ProfileError::NoEnvironmentAvailable {
                label: label.to_string(),
                engine: self.capabilities.kind,
            }
        })?;

        Ok(ResolvedResources {
            cpus: profile.cpus,
            memory: profile.memory,
            time: profile.time.map(|t| t.duration()),
            environment,
        })
    }
}
