// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::DEFAULT_WORK_DIR;
use crate::config::{EngineCapabilities, EngineKind, Memory, ResourceCeiling, ResourceProfile};
use crate::errors::{ConfigError, FailureStrategy};
use crate::observability::messages::validation::{
    log_validation_error, ValidationCompleted, ValidationFailed, ValidationStarted,
};
use crate::observability::messages::StructuredLog;
use crate::process::{catalog, ExtValues, Params, ProcessSpec};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// A pipeline definition.
///
/// This struct represents the complete definition of a pipeline run: where
/// work happens, which container engine runs the tools, how many tasks may
/// run at once, which processes exist and how tasks wire them together.
/// It is typically loaded from a YAML file with [`load_config`].
///
/// Relative paths (`work_dir`, `samplesheet`, literal `files`) are resolved
/// against the directory of the pipeline file.
///
/// # Example
/// ```yaml
/// name: phylogeny
/// work_dir: work
/// engine:
///   kind: docker
/// executor_options:
///   max_concurrency: 4
///   max_cpus: 12
///   max_memory: 72.GB
/// failure_strategy: continue_on_error
/// samplesheet: samplesheet.csv
/// processes:
///   - builtin: mafft
///   - builtin: fasttree
/// tasks:
///   - id: align
///     process: MAFFT_ALIGN
///     for_each: samples
///     inputs:
///       fasta: { sample: file }
///   - id: tree
///     process: FASTTREE
///     for_each: samples
///     depends_on: [align]
///     inputs:
///       alignment: { channel: fas }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub engine: EngineCapabilities,
    #[serde(default)]
    pub executor_options: ExecutorOptions,
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
    #[serde(default)]
    pub params: Params,
    /// Resource labels added to, or replacing, the builtin profile table
    #[serde(default)]
    pub profiles: HashMap<String, ResourceProfile>,
    /// Named bundles of overrides selectable at launch
    #[serde(default)]
    pub run_profiles: HashMap<String, RunProfile>,
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
    #[serde(default)]
    pub samplesheet: Option<PathBuf>,
    pub tasks: Vec<TaskConfig>,
    /// Directory of the pipeline file; empty for configs parsed from text
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WORK_DIR)
}

/// Executor options.
///
/// # Fields
/// * `max_concurrency` - Maximum number of tasks running at once (optional)
/// * `max_cpus` - Cpus available to all running tasks together (optional)
/// * `max_memory` - Memory available to all running tasks together (optional)
/// * `timeout_seconds` - Default wall-clock limit per task in seconds (optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorOptions {
    pub max_concurrency: Option<usize>,
    pub max_cpus: Option<usize>,
    pub max_memory: Option<Memory>,
    pub timeout_seconds: Option<u64>,
}

impl ExecutorOptions {
    /// Overlay every option set in `other`.
    pub fn merge(&mut self, other: &ExecutorOptions) {
        self.max_concurrency = other.max_concurrency.or(self.max_concurrency);
        self.max_cpus = other.max_cpus.or(self.max_cpus);
        self.max_memory = other.max_memory.or(self.max_memory);
        self.timeout_seconds = other.timeout_seconds.or(self.timeout_seconds);
    }

    /// Resource ceiling, when either limit is set. A missing limit is unbounded.
    pub fn ceiling(&self) -> Option<ResourceCeiling> {
        if self.max_cpus.is_none() && self.max_memory.is_none() {
            return None;
        }
        Some(ResourceCeiling {
            cpus: self.max_cpus.unwrap_or(usize::MAX),
            memory: self
                .max_memory
                .unwrap_or(Memory::from_bytes(u64::MAX)),
        })
    }
}

/// A named set of overrides, chosen with `--profile`.
///
/// # Example
/// ```yaml
/// run_profiles:
///   hpc:
///     engine: { kind: singularity }
///     executor_options: { max_cpus: 64, max_memory: 256.GB }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunProfile {
    #[serde(default)]
    pub engine: Option<EngineCapabilities>,
    #[serde(default)]
    pub executor_options: ExecutorOptions,
    #[serde(default)]
    pub failure_strategy: Option<FailureStrategy>,
    #[serde(default)]
    pub params: Params,
}

/// A process definition: a builtin by short name, or a full inline spec.
///
/// A mapping with a `builtin` key is a builtin reference; anything else is
/// parsed as an inline spec so its field errors are reported as-is.
#[derive(Debug, Clone)]
pub enum ProcessConfig {
    Builtin(BuiltinProcess),
    Inline(ProcessSpec),
}

impl<'de> Deserialize<'de> for ProcessConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        let builtin = value
            .as_mapping()
            .is_some_and(|mapping| mapping.contains_key("builtin"));
        if builtin {
            serde_yaml::from_value(value)
                .map(ProcessConfig::Builtin)
                .map_err(de::Error::custom)
        } else {
            serde_yaml::from_value(value)
                .map(ProcessConfig::Inline)
                .map_err(de::Error::custom)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuiltinProcess {
    pub builtin: String,
}

impl ProcessConfig {
    pub fn to_spec(&self) -> Result<ProcessSpec, ConfigError> {
        match self {
            ProcessConfig::Inline(spec) => Ok(spec.clone()),
            ProcessConfig::Builtin(BuiltinProcess { builtin }) => catalog::builtin(builtin)?
                .ok_or_else(|| ConfigError::UnknownBuiltin {
                    name: builtin.clone(),
                }),
        }
    }
}

/// One task of the pipeline.
///
/// # Fields
/// * `id` - Unique task identifier
/// * `process` - Name of the process the task runs
/// * `depends_on` - Upstream task ids; routing follows this order
/// * `inputs` - Where each input slot gets its artifacts
/// * `ext` - Task extension values, including `args` and `when`
/// * `for_each` - Expand the task once per samplesheet row
///
/// # Example
/// ```yaml
/// id: tree
/// process: FASTTREE
/// depends_on: [align]
/// inputs:
///   alignment: { channel: fas }
/// ext:
///   args: -lg
///   when: { param: build_tree }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub id: String,
    pub process: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub inputs: BTreeMap<String, InputSource>,
    #[serde(default)]
    pub ext: ExtValues,
    #[serde(default)]
    pub for_each: Option<ForEach>,
}

impl TaskConfig {
    pub fn expands(&self) -> bool {
        self.for_each.is_some()
    }

    /// Whether the task reads anything from the samplesheet.
    pub fn uses_samplesheet(&self) -> bool {
        self.expands()
            || self
                .inputs
                .values()
                .any(|source| matches!(source, InputSource::Sample(_)))
    }
}

/// Where an input slot gets its artifacts.
///
/// Written as a single-key mapping:
///
/// ```yaml
/// alignment: { channel: fas }
/// fasta: { files: [data/ecoli.fa] }
/// model: { values: [lg] }
/// fasta: { sample: file }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// Artifacts upstream tasks emitted under this tag
    Channel(String),
    /// Literal files
    Files(Vec<PathBuf>),
    /// Literal values
    Values(Vec<String>),
    /// A samplesheet column: the current sample's value for an expanded
    /// task, every sample's value otherwise
    Sample(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForEach {
    Samples,
}

/// Launch-time overrides, applied on top of the pipeline definition.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub profile: Option<String>,
    pub engine: Option<EngineKind>,
    pub concurrency: Option<usize>,
    pub work_dir: Option<PathBuf>,
}

impl Config {
    /// Pipeline name: the configured one, else `pipeline`. [`load_config`]
    /// fills in the file stem when the definition names none.
    pub fn pipeline_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "pipeline".to_string())
    }

    /// Apply a named run profile, then the individual overrides.
    pub fn apply_overrides(&mut self, overrides: &RunOverrides) -> Result<(), ConfigError> {
        if let Some(name) = &overrides.profile {
            let profile = self
                .run_profiles
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownRunProfile { name: name.clone() })?;
            if let Some(engine) = profile.engine {
                self.engine = engine;
            }
            self.executor_options.merge(&profile.executor_options);
            if let Some(strategy) = profile.failure_strategy {
                self.failure_strategy = strategy;
            }
            self.params.extend(profile.params);
        }
        if let Some(kind) = overrides.engine {
            self.engine.kind = kind;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.executor_options.max_concurrency = Some(concurrency);
        }
        if let Some(work_dir) = &overrides.work_dir {
            self.work_dir = work_dir.clone();
        }
        Ok(())
    }

    /// Resolve a path written in the pipeline file.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn work_root(&self) -> PathBuf {
        self.resolve_path(&self.work_dir)
    }

    /// Process definitions by name.
    pub fn process_specs(&self) -> Result<HashMap<String, ProcessSpec>, ConfigError> {
        let mut specs = HashMap::new();
        for process in &self.processes {
            let spec = process.to_spec()?;
            let name = spec.name().to_string();
            if specs.insert(name.clone(), spec).is_some() {
                return Err(ConfigError::DuplicateProcess { name });
            }
        }
        Ok(specs)
    }
}

/// Load a pipeline definition from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    if cfg.name.is_none() {
        cfg.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }
    Ok(cfg)
}

/// Load and validate a pipeline definition from a YAML file
///
/// This function loads the definition and validates the task graph
/// to ensure it's acyclic and all references are resolved.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;

    ValidationStarted {
        task_count: cfg.tasks.len(),
    }
    .log();

    let nodes = cfg
        .tasks
        .iter()
        .map(|t| (t.id.as_str(), t.depends_on.as_slice()));
    if let Err(validation_errors) = crate::config::validate_dependency_graph(nodes) {
        validation_errors.iter().for_each(log_validation_error);
        ValidationFailed {
            error_count: validation_errors.len(),
        }
        .log();
        return Err(ConfigError::Validation(validation_errors));
    }

    ValidationCompleted {
        task_count: cfg.tasks.len(),
    }
    .log();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_pipeline(dir: &TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join("pipeline.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
processes:
  - builtin: mafft
tasks:
  - id: align
    process: MAFFT_ALIGN
    inputs:
      fasta: { files: [speciesA.fa] }
  - id: tree
    process: FASTTREE
    depends_on: [align]
    inputs:
      alignment: { channel: fas }
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.tasks[1].depends_on, vec!["align"]);
        assert_eq!(cfg.work_dir, PathBuf::from("work"));
        assert_eq!(cfg.engine.kind, EngineKind::Local);
        assert_eq!(cfg.failure_strategy, FailureStrategy::ContinueOnError);
        assert_eq!(
            cfg.tasks[1].inputs["alignment"],
            InputSource::Channel("fas".into())
        );
        assert!(matches!(cfg.processes[0], ProcessConfig::Builtin(_)));
    }

    #[test]
    fn parse_every_input_source_form() {
        let yaml = r#"
samplesheet: samplesheet.csv
tasks:
  - id: tree
    process: FASTTREE
    for_each: samples
    inputs:
      alignment: { channel: fas }
      reference: { files: [data/ref.fa, data/outgroup.fa] }
      model: { values: [lg, wag] }
      fasta: { sample: file }
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let inputs = &cfg.tasks[0].inputs;
        assert_eq!(inputs["alignment"], InputSource::Channel("fas".into()));
        assert_eq!(
            inputs["reference"],
            InputSource::Files(vec![
                PathBuf::from("data/ref.fa"),
                PathBuf::from("data/outgroup.fa")
            ])
        );
        assert_eq!(
            inputs["model"],
            InputSource::Values(vec!["lg".into(), "wag".into()])
        );
        assert_eq!(inputs["fasta"], InputSource::Sample("file".into()));
        assert!(cfg.tasks[0].uses_samplesheet());
    }

    #[test]
    fn test_inline_process_typo_names_the_field() {
        let yaml = r#"
processes:
  - name: COUNT
    label: process_single
    scrpt: grep -c '>' {{ fasta }}
tasks: []
"#;
        let err = serde_yaml::from_str::<Config>(yaml).unwrap_err();
        assert!(err.to_string().contains("scrpt"), "{}", err);

        let yaml = "processes:\n  - { builtin: mafft, label: process_high }\ntasks: []\n";
        let err = serde_yaml::from_str::<Config>(yaml).unwrap_err();
        assert!(err.to_string().contains("label"), "{}", err);
    }

    #[test]
    fn parse_inline_process_and_options() {
        let yaml = r#"
engine: { kind: singularity, pull_docker_container: true }
executor_options:
  max_concurrency: 2
  max_cpus: 12
  max_memory: 72.GB
  timeout_seconds: 600
failure_strategy: fail_fast
profiles:
  process_medium: { cpus: 8, memory: 16.GB }
processes:
  - name: COUNT
    label: process_single
    script: grep -c '>' {{ fasta }} > counts.txt
    inputs:
      - name: fasta
    outputs:
      - emit: counts
        pattern: counts.txt
tasks:
  - id: count
    process: COUNT
    ext:
      args: --fast
      when: { param: count }
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.engine.kind, EngineKind::Singularity);
        assert!(cfg.engine.pull_docker_container);
        assert_eq!(cfg.failure_strategy, FailureStrategy::FailFast);
        assert_eq!(
            cfg.executor_options.ceiling(),
            Some(ResourceCeiling {
                cpus: 12,
                memory: Memory::from_gb(72)
            })
        );
        assert_eq!(cfg.profiles["process_medium"].cpus, 8);
        let specs = cfg.process_specs().unwrap();
        assert_eq!(specs["COUNT"].label(), "process_single");
        assert_eq!(cfg.tasks[0].ext.len(), 2);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let yaml = r#"
tasks:
  - id: align
    process: MAFFT_ALIGN
    depends: [x]
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_processes() {
        let yaml = r#"
processes:
  - builtin: fasttree
  - builtin: fasttree
tasks: []
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            cfg.process_specs(),
            Err(ConfigError::DuplicateProcess { name }) if name == "FASTTREE"
        ));

        let yaml = "processes:\n  - builtin: raxml\ntasks: []\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            cfg.process_specs(),
            Err(ConfigError::UnknownBuiltin { name }) if name == "raxml"
        ));
    }

    #[test]
    fn test_run_profile_and_overrides() {
        let yaml = r#"
executor_options: { max_concurrency: 2, max_cpus: 4 }
run_profiles:
  hpc:
    engine: { kind: singularity }
    executor_options: { max_cpus: 64 }
    params: { build_tree: true }
tasks: []
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.apply_overrides(&RunOverrides {
            profile: Some("hpc".into()),
            concurrency: Some(8),
            work_dir: Some(PathBuf::from("/scratch/run1")),
            ..RunOverrides::default()
        })
        .unwrap();

        assert_eq!(cfg.engine.kind, EngineKind::Singularity);
        assert_eq!(cfg.executor_options.max_cpus, Some(64));
        assert_eq!(cfg.executor_options.max_concurrency, Some(8));
        assert_eq!(cfg.params["build_tree"], serde_yaml::Value::Bool(true));
        assert_eq!(cfg.work_root(), PathBuf::from("/scratch/run1"));

        let err = cfg
            .apply_overrides(&RunOverrides {
                profile: Some("cloud".into()),
                ..RunOverrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRunProfile { name } if name == "cloud"));
    }

    #[test]
    fn test_engine_override_wins_over_profile() {
        let yaml = r#"
run_profiles:
  hpc: { engine: { kind: singularity } }
tasks: []
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.apply_overrides(&RunOverrides {
            profile: Some("hpc".into()),
            engine: Some(EngineKind::Docker),
            ..RunOverrides::default()
        })
        .unwrap();
        assert_eq!(cfg.engine.kind, EngineKind::Docker);
    }

    #[test]
    fn test_load_sets_base_dir_and_name() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(&dir, "tasks: []\n");

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.pipeline_name(), "pipeline");

        let named = dir.path().join("bacteria_trees.yaml");
        fs::write(&named, "tasks: []\n").unwrap();
        assert_eq!(load_config(&named).unwrap().pipeline_name(), "bacteria_trees");

        let unnamed: Config = serde_yaml::from_str("tasks: []\n").unwrap();
        assert_eq!(unnamed.pipeline_name(), "pipeline");
        assert_eq!(cfg.work_root(), dir.path().join("work"));
        assert_eq!(
            cfg.resolve_path(Path::new("data/a.fa")),
            dir.path().join("data/a.fa")
        );
    }

    #[test]
    fn test_load_and_validate_valid_config() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(
            &dir,
            r#"
name: phylogeny
tasks:
  - id: align
    process: MAFFT_ALIGN
  - id: tree
    process: FASTTREE
    depends_on: [align]
"#,
        );

        let cfg = load_and_validate_config(&path).unwrap();
        assert_eq!(cfg.pipeline_name(), "phylogeny");
    }

    #[test]
    fn test_load_and_validate_cyclic_config() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(
            &dir,
            r#"
tasks:
  - id: a
    process: P
    depends_on: [b]
  - id: b
    process: P
    depends_on: [a]
"#,
        );

        let err = load_and_validate_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("Cyclic dependency detected"));
    }

    #[test]
    fn test_load_and_validate_unresolved_dependency() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(
            &dir,
            r#"
tasks:
  - id: tree
    process: FASTTREE
    depends_on: [nonexistent]
"#,
        );

        let err = load_and_validate_config(&path).unwrap_err();
        assert!(err
            .to_string()
            .contains("depends on 'nonexistent' which does not exist"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_malformed_yaml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(&dir, "tasks: [ { id: a\n");
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}
