// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::process::ProcessExecutor;
use crate::channel::{route, Emission, SlotSource, UpstreamReport};
use crate::config::consts::{
    PIPELINE_INFO_DIR, SOFTWARE_VERSIONS_FILE, VERSIONS_TAG, WORK_DIR_MARKER,
};
use crate::config::loader::{Config, InputSource, TaskConfig};
use crate::config::{
    validate_dependency_graph, ProfileResolver, ProfileTable, Sample, Samplesheet,
};
use crate::engine::{EngineOptions, PipelineEngine, PipelinePlan, PlannedTask, RunSummary};
use crate::errors::{ConfigError, ProvenanceError, RunError};
use crate::observability::messages::provenance::SoftwareVersionsWritten;
use crate::observability::messages::StructuredLog;
use crate::process::{Artifact, Instantiator, Predicate, ProcessSpec, TemplateFunctions};
use crate::traits::TaskExecutor;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A pipeline ready to run: the validated plan and the engine that runs it.
pub struct Runtime {
    pub plan: PipelinePlan,
    pub engine: PipelineEngine,
    pub samplesheet: Option<Samplesheet>,
}

impl Runtime {
    pub fn work_root(&self) -> &Path {
        self.engine.instantiator().work_root()
    }

    /// Where the run's unioned versions record is written.
    pub fn software_versions_path(&self) -> PathBuf {
        self.work_root()
            .join(PIPELINE_INFO_DIR)
            .join(SOFTWARE_VERSIONS_FILE)
    }

    /// Create the work root and mark it as ours.
    ///
    /// A root that already holds files but no marker is refused. Without
    /// `resume`, the planned tasks' directories and the run provenance left
    /// by a previous run are removed; nothing else in the root is touched.
    pub fn prepare_work_dir(&self, resume: bool) -> Result<(), RunError> {
        let root = self.work_root();
        let marker = root.join(WORK_DIR_MARKER);
        if root.exists() && !marker.exists() && has_entries(root).map_err(RunError::WorkDir)? {
            return Err(RunError::ForeignWorkDir {
                path: root.to_path_buf(),
            });
        }
        fs::create_dir_all(root).map_err(RunError::WorkDir)?;
        fs::write(&marker, format!("{}\n", self.plan.name())).map_err(RunError::WorkDir)?;

        if !resume {
            let instantiator = self.engine.instantiator();
            let owned = self
                .plan
                .tasks()
                .iter()
                .map(|task| instantiator.work_dir_for(&task.id))
                .chain(std::iter::once(root.join(PIPELINE_INFO_DIR)));
            for dir in owned {
                if dir.is_dir() {
                    fs::remove_dir_all(&dir).map_err(RunError::WorkDir)?;
                }
            }
        }
        Ok(())
    }

    pub async fn run(&self, cancel: CancellationToken) -> RunSummary {
        self.engine.run(&self.plan, cancel).await
    }

    /// Write the run's unioned versions record to `pipeline_info/`.
    pub fn write_software_versions(&self, summary: &RunSummary) -> Result<PathBuf, ProvenanceError> {
        let path = self.software_versions_path();
        summary.versions.write_to(&path)?;
        SoftwareVersionsWritten {
            path: &path,
            process_count: summary.versions.len(),
        }
        .log();
        Ok(path)
    }
}

/// Pipeline runtime builder - turns a pipeline definition into a plan and an engine.
///
/// Building performs every check that can be made before a task runs:
///
/// - every task names a known process,
/// - the task graph is acyclic and every dependency exists,
/// - every consumed channel is emitted by a direct upstream and single
///   inputs are not fed by several producers,
/// - every resource label resolves within the ceiling,
/// - predicates and templates only reference known names.
///
/// Any failure is a [`ConfigError`] and nothing is dispatched.
///
/// # Examples
///
/// ```
/// use phylowood::config::{Config, RuntimeBuilder};
///
/// let config: Config = serde_yaml::from_str(r#"
/// processes:
///   - builtin: fasttree
/// tasks:
///   - id: tree
///     process: FASTTREE
///     inputs:
///       alignment: { files: [speciesA_mafft.fa] }
/// "#).unwrap();
///
/// let plan = RuntimeBuilder::plan(&config).unwrap();
/// assert_eq!(plan.len(), 1);
/// assert_eq!(plan.tasks()[0].spec.name(), "FASTTREE");
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build a runtime that executes tasks as child processes under the
    /// configured container engine.
    pub fn from_config(cfg: &Config, resume: bool) -> Result<Runtime, ConfigError> {
        let executor = ProcessExecutor::new(cfg.engine.kind).with_resume(resume);
        Self::with_executor(cfg, Arc::new(executor))
    }

    /// Build a runtime around any executor.
    pub fn with_executor(
        cfg: &Config,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Runtime, ConfigError> {
        let samplesheet = Self::samplesheet(cfg)?;
        let plan = Self::plan_with(cfg, samplesheet.as_ref())?;
        let instantiator = Self::instantiator(cfg);
        Self::preflight(&plan, &instantiator)?;

        let defaults = EngineOptions::default();
        let options = EngineOptions {
            max_concurrency: cfg
                .executor_options
                .max_concurrency
                .unwrap_or(defaults.max_concurrency),
            failure_strategy: cfg.failure_strategy,
        };
        let engine = PipelineEngine::new(executor, instantiator).with_options(options);

        Ok(Runtime {
            plan,
            engine,
            samplesheet,
        })
    }

    /// Instantiator for the configured profiles, engine, ceiling and params.
    pub fn instantiator(cfg: &Config) -> Instantiator {
        let table = ProfileTable::builtin().with_overrides(&cfg.profiles);
        let mut resolver = ProfileResolver::new(table, cfg.engine);
        if let Some(ceiling) = cfg.executor_options.ceiling() {
            resolver = resolver.with_ceiling(ceiling);
        }
        Instantiator::new(
            resolver,
            TemplateFunctions::builtin(),
            cfg.params.clone(),
            cfg.work_root(),
        )
        .with_default_timeout(cfg.executor_options.timeout_seconds.map(Duration::from_secs))
    }

    /// Read the samplesheet when any task needs one.
    pub fn samplesheet(cfg: &Config) -> Result<Option<Samplesheet>, ConfigError> {
        let Some(user) = cfg.tasks.iter().find(|t| t.uses_samplesheet()) else {
            return Ok(None);
        };
        let path = cfg
            .samplesheet
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSamplesheet {
                task_id: user.id.clone(),
            })?;
        Ok(Some(Samplesheet::read(&cfg.resolve_path(path))?))
    }

    /// Expand the task list into a validated plan, reading the samplesheet if needed.
    pub fn plan(cfg: &Config) -> Result<PipelinePlan, ConfigError> {
        let samplesheet = Self::samplesheet(cfg)?;
        Self::plan_with(cfg, samplesheet.as_ref())
    }

    fn plan_with(
        cfg: &Config,
        samplesheet: Option<&Samplesheet>,
    ) -> Result<PipelinePlan, ConfigError> {
        let specs: HashMap<String, Arc<ProcessSpec>> = cfg
            .process_specs()?
            .into_iter()
            .map(|(name, spec)| (name, Arc::new(spec)))
            .collect();

        let mut resolved = Vec::with_capacity(cfg.tasks.len());
        for task in &cfg.tasks {
            let spec = specs
                .get(&task.process)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownProcess {
                    task_id: task.id.clone(),
                    process: task.process.clone(),
                })?;
            resolved.push((task, spec));
        }
        let process_of: HashMap<&str, Arc<ProcessSpec>> = resolved
            .iter()
            .map(|(task, spec)| (task.id.as_str(), spec.clone()))
            .collect();

        validate_dependency_graph(
            cfg.tasks
                .iter()
                .map(|t| (t.id.as_str(), t.depends_on.as_slice())),
        )
        .map_err(ConfigError::Validation)?;

        let expanded: HashMap<&str, bool> = cfg
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.expands()))
            .collect();

        let mut planned = Vec::new();
        for (task, spec) in resolved {
            check_channels(task, &process_of)?;
            let mut ext = task.ext.clone();
            let when = match ext.remove("when") {
                Some(value) => serde_yaml::from_value::<Predicate>(value).map_err(|source| {
                    ConfigError::InvalidPredicate {
                        task_id: task.id.clone(),
                        source,
                    }
                })?,
                None => Predicate::Always,
            };

            let samples: Vec<Option<&Sample>> = match (task.expands(), samplesheet) {
                (true, Some(sheet)) => sheet.samples().iter().map(Some).collect(),
                (true, None) => {
                    return Err(ConfigError::MissingSamplesheet {
                        task_id: task.id.clone(),
                    })
                }
                (false, _) => vec![None],
            };

            for sample in samples {
                let id = match sample {
                    Some(s) => expanded_id(&task.id, &s.id),
                    None => task.id.clone(),
                };
                let depends_on = task
                    .depends_on
                    .iter()
                    .flat_map(|dep| {
                        let dep_expands = expanded.get(dep.as_str()).copied().unwrap_or(false);
                        upstream_ids(dep, dep_expands, sample, samplesheet)
                    })
                    .collect();
                let sources = slot_sources(cfg, task, sample, samplesheet)?;
                planned.push(PlannedTask {
                    id,
                    spec: spec.clone(),
                    depends_on,
                    sources,
                    ext: ext.clone(),
                    when: when.clone(),
                });
            }
        }

        PipelinePlan::new(cfg.pipeline_name(), planned).map_err(ConfigError::Validation)
    }

    /// Static checks over every planned task.
    ///
    /// Routing is exercised against the tags each upstream's process can
    /// emit, which catches ambiguous and unbound inputs before dispatch.
    pub fn preflight(plan: &PipelinePlan, instantiator: &Instantiator) -> Result<(), ConfigError> {
        for task in plan.tasks() {
            let upstreams: Vec<UpstreamReport> = task
                .depends_on
                .iter()
                .filter_map(|dep| plan.task(dep))
                .map(|upstream| UpstreamReport::Completed {
                    task_id: upstream.id.clone(),
                    emissions: upstream
                        .spec
                        .emit_tags()
                        .chain(std::iter::once(VERSIONS_TAG))
                        .map(|tag| Emission {
                            producer: upstream.id.clone(),
                            tag: tag.to_string(),
                            artifacts: Vec::new(),
                        })
                        .collect(),
                })
                .collect();
            route(&upstreams, task.spec.inputs(), &task.sources).map_err(|source| {
                ConfigError::Route {
                    task_id: task.id.clone(),
                    source,
                }
            })?;

            instantiator.preflight(&task.id, &task.spec, &task.ext, &task.when)?;
        }
        Ok(())
    }
}

fn has_entries(dir: &Path) -> std::io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_some())
}

/// Id of one per-sample expansion of a task.
pub fn expanded_id(task_id: &str, sample_id: &str) -> String {
    format!("{}@{}", task_id, sample_id)
}

/// Every consumed channel must be emitted by a direct upstream.
fn check_channels(
    task: &TaskConfig,
    process_of: &HashMap<&str, Arc<ProcessSpec>>,
) -> Result<(), ConfigError> {
    for (slot, source) in &task.inputs {
        let InputSource::Channel(tag) = source else {
            continue;
        };
        let emitted = tag == VERSIONS_TAG
            || task.depends_on.iter().any(|dep| {
                process_of
                    .get(dep.as_str())
                    .is_some_and(|spec| spec.emit_tags().any(|t| t == tag))
            });
        if !emitted {
            return Err(ConfigError::UnknownChannel {
                task_id: task.id.clone(),
                slot: slot.clone(),
                tag: tag.clone(),
            });
        }
    }
    Ok(())
}

/// Upstream ids one (possibly expanded) task waits on for `dep`.
///
/// An expanded dependency pairs by sample when the dependent is expanded
/// too, and is gathered in samplesheet order otherwise.
fn upstream_ids(
    dep: &str,
    dep_expands: bool,
    sample: Option<&Sample>,
    samplesheet: Option<&Samplesheet>,
) -> Vec<String> {
    match (dep_expands, sample, samplesheet) {
        (false, _, _) => vec![dep.to_string()],
        (true, Some(sample), _) => vec![expanded_id(dep, &sample.id)],
        (true, None, Some(sheet)) => sheet
            .samples()
            .iter()
            .map(|s| expanded_id(dep, &s.id))
            .collect(),
        (true, None, None) => Vec::new(),
    }
}

fn slot_sources(
    cfg: &Config,
    task: &TaskConfig,
    sample: Option<&Sample>,
    samplesheet: Option<&Samplesheet>,
) -> Result<BTreeMap<String, SlotSource>, ConfigError> {
    let mut sources = BTreeMap::new();
    for (slot, source) in &task.inputs {
        let source = match source {
            InputSource::Channel(tag) => SlotSource::Channel { tag: tag.clone() },
            InputSource::Files(paths) => SlotSource::Literal(
                paths
                    .iter()
                    .map(|p| Artifact::file(cfg.resolve_path(p)))
                    .collect(),
            ),
            InputSource::Values(values) => {
                SlotSource::Literal(values.iter().map(Artifact::value).collect())
            }
            InputSource::Sample(column) => {
                let sheet = samplesheet.ok_or_else(|| ConfigError::MissingSamplesheet {
                    task_id: task.id.clone(),
                })?;
                let rows: Vec<&Sample> = match sample {
                    Some(s) => vec![s],
                    None => sheet.samples().iter().collect(),
                };
                let artifacts = rows
                    .into_iter()
                    .map(|row| sample_artifact(task, sheet, row, column))
                    .collect::<Result<_, _>>()?;
                SlotSource::Literal(artifacts)
            }
        };
        sources.insert(slot.clone(), source);
    }
    Ok(sources)
}

/// The `file` column becomes a file artifact, every other column a value.
fn sample_artifact(
    task: &TaskConfig,
    sheet: &Samplesheet,
    sample: &Sample,
    column: &str,
) -> Result<Artifact, ConfigError> {
    let value = sample
        .column(column)
        .ok_or_else(|| ConfigError::UnknownSampleColumn {
            task_id: task.id.clone(),
            column: column.to_string(),
        })?;
    let artifact = if column == "file" {
        Artifact::file(sheet.fasta_path(sample))
    } else {
        Artifact::value(value)
    };
    Ok(artifact.with_id(sample.id.clone()))
}
