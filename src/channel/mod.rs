// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed channels between tasks.
//!
//! A task's outputs leave it as [`Emission`]s, one per emit tag. A downstream
//! task names, per input slot, the tag it consumes (or supplies literal
//! artifacts); [`route`] binds upstream emissions to those slots.

mod router;

pub use router::route;

use crate::process::Artifact;
use std::collections::BTreeMap;

/// The artifacts a task produced under one emit tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub producer: String,
    pub tag: String,
    pub artifacts: Vec<Artifact>,
}

/// What an upstream task left behind for its dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamReport {
    Completed {
        task_id: String,
        emissions: Vec<Emission>,
    },
    /// Predicate was false: nothing was emitted under `tags`
    Skipped { task_id: String, tags: Vec<String> },
    Failed { task_id: String },
}

impl UpstreamReport {
    pub fn task_id(&self) -> &str {
        match self {
            UpstreamReport::Completed { task_id, .. }
            | UpstreamReport::Skipped { task_id, .. }
            | UpstreamReport::Failed { task_id } => task_id,
        }
    }
}

/// Where a slot's artifacts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    Channel { tag: String },
    Literal(Vec<Artifact>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotBinding {
    Bound(Vec<Artifact>),
    /// Every producer of the slot's tag was skipped
    UpstreamSkipped { upstream: String },
}

/// Slot name to binding, handed to the instantiator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundInputs(BTreeMap<String, SlotBinding>);

impl BoundInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: impl Into<String>, binding: SlotBinding) {
        self.0.insert(slot.into(), binding);
    }

    pub fn get(&self, slot: &str) -> Option<&SlotBinding> {
        self.0.get(slot)
    }

    pub fn take(&mut self, slot: &str) -> Option<SlotBinding> {
        self.0.remove(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SlotBinding)> {
        self.0.iter()
    }
}
