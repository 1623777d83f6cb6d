// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::{BoundInputs, SlotSource};
use crate::config::{validate_dependency_graph, DependencyGraph};
use crate::errors::ValidationError;
use crate::process::{ExtValues, Predicate, ProcessSpec, TaskRequest};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One node of a pipeline: a process bound to where its inputs come from.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub id: String,
    pub spec: Arc<ProcessSpec>,
    /// Upstream tasks in declaration order; routing follows this order
    pub depends_on: Vec<String>,
    pub sources: BTreeMap<String, SlotSource>,
    pub ext: ExtValues,
    pub when: Predicate,
}

impl PlannedTask {
    pub fn request(&self, inputs: BoundInputs) -> TaskRequest {
        TaskRequest {
            task_id: self.id.clone(),
            spec: self.spec.clone(),
            inputs,
            ext: self.ext.clone(),
            when: self.when.clone(),
        }
    }
}

/// A validated, acyclic set of tasks ready to hand to the engine.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    name: String,
    tasks: Vec<PlannedTask>,
    dependents: DependencyGraph,
}

impl PipelinePlan {
    pub fn new(name: impl Into<String>, tasks: Vec<PlannedTask>) -> Result<Self, Vec<ValidationError>> {
        validate_dependency_graph(
            tasks
                .iter()
                .map(|t| (t.id.as_str(), t.depends_on.as_slice())),
        )?;
        let dependents = DependencyGraph::from_dependencies(
            tasks
                .iter()
                .map(|t| (t.id.as_str(), t.depends_on.as_slice())),
        );
        Ok(Self {
            name: name.into(),
            tasks,
            dependents,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[PlannedTask] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&PlannedTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get_dependents(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
