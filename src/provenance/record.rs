// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ProvenanceError;
use crate::observability::messages::provenance::VersionConflict;
use crate::observability::messages::StructuredLog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Process identity to tool to version.
///
/// Append-only: an entry, once present, is never overwritten. Serialized in
/// the usual `versions.yml` layout:
///
/// ```yaml
/// MAFFT_ALIGN:
///   mafft: '7.490'
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionRecord(BTreeMap<String, BTreeMap<String, String>>);

impl VersionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns `false`, keeping the existing value, when the
    /// process already records a different version of `tool`.
    pub fn insert(
        &mut self,
        process: impl Into<String>,
        tool: impl Into<String>,
        version: impl Into<String>,
    ) -> bool {
        let process = process.into();
        let tool = tool.into();
        let version = version.into();
        let tools = self.0.entry(process.clone()).or_default();
        match tools.get(&tool) {
            Some(existing) if *existing != version => {
                VersionConflict {
                    process: &process,
                    tool: &tool,
                    kept: existing,
                    ignored: &version,
                }
                .log();
                false
            }
            Some(_) => true,
            None => {
                tools.insert(tool, version);
                true
            }
        }
    }

    /// Merge `other` into this record.
    pub fn union(&mut self, other: &VersionRecord) {
        for (process, tools) in &other.0 {
            for (tool, version) in tools {
                self.insert(process.clone(), tool.clone(), version.clone());
            }
        }
    }

    pub fn get(&self, process: &str, tool: &str) -> Option<&str> {
        self.0.get(process)?.get(tool).map(String::as_str)
    }

    pub fn processes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn read_from(path: &Path) -> Result<Self, ProvenanceError> {
        let text = fs::read_to_string(path).map_err(|source| ProvenanceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ProvenanceError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the record, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<(), ProvenanceError> {
        let io_err = |source| ProvenanceError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = self.to_yaml().map_err(|source| ProvenanceError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, yaml).map_err(io_err)
    }
}

impl FromIterator<(String, String, String)> for VersionRecord {
    fn from_iter<I: IntoIterator<Item = (String, String, String)>>(iter: I) -> Self {
        let mut record = VersionRecord::new();
        for (process, tool, version) in iter {
            record.insert(process, tool, version);
        }
        record
    }
}
