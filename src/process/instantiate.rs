// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Turning a process spec plus concrete inputs into a dispatch-ready task.
//!
//! Order of checks for one task:
//!
//! 1. every declared slot is checked against its arity, and slots fed by a
//!    skipped upstream are rejected unless optional,
//! 2. the run predicate (process predicate and task `when`) is evaluated;
//!    `false` yields [`Instantiation::Skipped`],
//! 3. the resource label is resolved to an allocation and environment,
//! 4. the tag and script templates are rendered against an explicit
//!    [`TaskContext`], and the version trailer is appended.

use crate::channel::{BoundInputs, SlotBinding};
use crate::config::{EnvironmentRef, ProfileResolver};
use crate::errors::{InstantiateError, TemplateError};
use crate::process::template::{is_context_name, RenderScope, TemplateFunctions};
use crate::process::{Artifact, ExtValues, Params, Predicate, ProcessSpec, TaskContext};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::consts::COMMAND_VERSION;

const SCRIPT_HEADER: &str = "#!/usr/bin/env bash\nset -euo pipefail\n";

/// Input to [`Instantiator::instantiate`].
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_id: String,
    pub spec: Arc<ProcessSpec>,
    pub inputs: BoundInputs,
    pub ext: ExtValues,
    /// Task-level predicate, combined with the process predicate
    pub when: Predicate,
}

/// A task with everything decided: the executor only has to run it.
///
/// Not `Clone`: a resolved task is dispatched exactly once.
#[derive(Debug)]
pub struct ResolvedTask {
    pub task_id: String,
    pub spec: Arc<ProcessSpec>,
    pub inputs: BTreeMap<String, Vec<Artifact>>,
    pub context: TaskContext,
    pub environment: EnvironmentRef,
    /// Complete `.command.sh` contents, version trailer included
    pub script: String,
    pub timeout: Option<Duration>,
}

impl ResolvedTask {
    pub fn work_dir(&self) -> &Path {
        &self.context.work_dir
    }

    /// All input artifacts in slot declaration order.
    pub fn input_artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.spec
            .inputs()
            .iter()
            .filter_map(|decl| self.inputs.get(&decl.name))
            .flatten()
    }
}

/// A task whose predicate evaluated to false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub task_id: String,
    pub process: String,
    /// Tags the task would have emitted
    pub emit_tags: Vec<String>,
}

#[derive(Debug)]
pub enum Instantiation {
    Ready(ResolvedTask),
    Skipped(SkippedTask),
}

#[derive(Debug, Clone)]
pub struct Instantiator {
    resolver: Arc<ProfileResolver>,
    functions: Arc<TemplateFunctions>,
    params: Arc<Params>,
    work_root: PathBuf,
    default_timeout: Option<Duration>,
}

impl Instantiator {
    pub fn new(
        resolver: ProfileResolver,
        functions: TemplateFunctions,
        params: Params,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            functions: Arc::new(functions),
            params: Arc::new(params),
            work_root: work_root.into(),
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &ProfileResolver {
        &self.resolver
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Planned work directory of a task.
    pub fn work_dir_for(&self, task_id: &str) -> PathBuf {
        let dir_name: String = task_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.work_root.join(dir_name)
    }

    pub fn instantiate(&self, request: TaskRequest) -> Result<Instantiation, InstantiateError> {
        let TaskRequest {
            task_id,
            spec,
            inputs,
            ext,
            when,
        } = request;

        let inputs = self.bind_slots(&task_id, &spec, inputs)?;

        let predicate = spec.when().clone().and(when);
        let should_run = predicate
            .evaluate(&self.params, &ext)
            .map_err(|source| InstantiateError::PredicateEvalError {
                task_id: task_id.clone(),
                source,
            })?;
        if !should_run {
            return Ok(Instantiation::Skipped(SkippedTask {
                process: spec.name().to_string(),
                emit_tags: spec.emit_tags().map(str::to_string).collect(),
                task_id,
            }));
        }

        let resources = self
            .resolver
            .resolve(spec.label(), spec.container())
            .map_err(|source| InstantiateError::Profile {
                task_id: task_id.clone(),
                source,
            })?;

        let mut context = TaskContext {
            task_id: task_id.clone(),
            process: spec.name().to_string(),
            tag: None,
            cpus: resources.cpus,
            memory: resources.memory,
            work_dir: self.work_dir_for(&task_id),
            ext_args: ext_args(&ext),
        };

        let render_err = |source| InstantiateError::TemplateRenderError {
            task_id: task_id.clone(),
            source,
        };

        if let Some(tag) = spec.tag() {
            let rendered = tag.render(&self.scope(&context, &inputs)).map_err(render_err)?;
            context.tag = Some(unquote(rendered.trim()));
        }

        let body = spec
            .script()
            .render(&self.scope(&context, &inputs))
            .map_err(render_err)?;
        let script = assemble_script(&body, spec.version().map(|v| v.command.as_str()));

        let timeout = spec
            .time()
            .map(|t| t.duration())
            .or(match (resources.time, self.default_timeout) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            });

        Ok(Instantiation::Ready(ResolvedTask {
            task_id,
            spec,
            inputs,
            context,
            environment: resources.environment,
            script,
            timeout,
        }))
    }

    /// Static checks for a task before anything runs: the resource label
    /// resolves, the predicate only names known keys, and every template
    /// placeholder can be resolved.
    pub fn preflight(
        &self,
        task_id: &str,
        spec: &ProcessSpec,
        ext: &ExtValues,
        when: &Predicate,
    ) -> Result<(), InstantiateError> {
        self.resolver
            .resolve(spec.label(), spec.container())
            .map_err(|source| InstantiateError::Profile {
                task_id: task_id.to_string(),
                source,
            })?;

        spec.when()
            .clone()
            .and(when.clone())
            .evaluate(&self.params, ext)
            .map_err(|source| InstantiateError::PredicateEvalError {
                task_id: task_id.to_string(),
                source,
            })?;

        let known = |name: &str| {
            is_context_name(name)
                || spec.input(name).is_some()
                || name
                    .strip_prefix("params.")
                    .is_some_and(|key| self.params.contains_key(key))
        };
        let templates = spec.tag().into_iter().chain(std::iter::once(spec.script()));
        for template in templates {
            template
                .check(&known, &self.functions)
                .map_err(|source: TemplateError| InstantiateError::TemplateRenderError {
                    task_id: task_id.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    fn scope<'a>(
        &'a self,
        context: &'a TaskContext,
        inputs: &'a BTreeMap<String, Vec<Artifact>>,
    ) -> RenderScope<'a> {
        RenderScope {
            context,
            inputs,
            params: &self.params,
            functions: &self.functions,
        }
    }

    fn bind_slots(
        &self,
        task_id: &str,
        spec: &ProcessSpec,
        mut inputs: BoundInputs,
    ) -> Result<BTreeMap<String, Vec<Artifact>>, InstantiateError> {
        let mut bound = BTreeMap::new();
        for decl in spec.inputs() {
            let artifacts = match inputs.take(&decl.name) {
                Some(SlotBinding::UpstreamSkipped { upstream }) => {
                    if !decl.optional {
                        return Err(InstantiateError::UpstreamSkipped {
                            task_id: task_id.to_string(),
                            slot: decl.name.clone(),
                            upstream,
                        });
                    }
                    Vec::new()
                }
                Some(SlotBinding::Bound(artifacts)) => artifacts,
                None => Vec::new(),
            };

            if !decl.arity.accepts(artifacts.len(), decl.optional) {
                return Err(InstantiateError::ArityMismatch {
                    task_id: task_id.to_string(),
                    slot: decl.name.clone(),
                    arity: decl.arity,
                    supplied: artifacts.len(),
                });
            }
            bound.insert(decl.name.clone(), artifacts);
        }
        Ok(bound)
    }
}

fn ext_args(ext: &ExtValues) -> String {
    match ext.get("args") {
        Some(serde_yaml::Value::String(s)) => s.clone(),
        Some(serde_yaml::Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| match v {
                serde_yaml::Value::String(s) => Some(s.clone()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                serde_yaml::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(serde_yaml::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Tags are identifiers, not shell words: drop the quoting the renderer adds.
fn unquote(rendered: &str) -> String {
    rendered
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace(r"'\''", "'"))
        .unwrap_or_else(|| rendered.to_string())
}

/// Header, rendered body and, when the process captures a version, a
/// trailer that stores the version command's combined output without
/// touching the script's exit status.
pub fn assemble_script(body: &str, version_command: Option<&str>) -> String {
    let mut script = String::from(SCRIPT_HEADER);
    script.push_str(body.trim_end());
    script.push('\n');
    if let Some(command) = version_command {
        script.push_str(&format!(
            "( {} ) > {} 2>&1 || true\n",
            command.trim(),
            COMMAND_VERSION
        ));
    }
    script
}
