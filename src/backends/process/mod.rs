// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Executor that runs rendered scripts as child processes.
//!
//! Per task:
//!
//! ```text
//! <work_dir>/
//!   .command.sh          rendered script
//!   .command.out/.err    captured streams
//!   .exitcode            exit status of the script
//!   .command.version     raw version output (moved out of scratch)
//!   versions.yml         parsed version record
//!   <outputs>            files matched by the declared output patterns
//!   .scratch-XXXX/       transient, removed on every exit path
//! ```
//!
//! The script runs inside the scratch directory with its inputs linked in
//! under their staged names. Only declared outputs and the version side
//! output survive the scratch directory.

mod launch;
mod staging;

pub use launch::{launch_failure_code, LaunchPlan};

use crate::channel::Emission;
use crate::config::consts::{
    COMMAND_EXIT_CODE, COMMAND_SCRIPT, COMMAND_STDERR, COMMAND_STDOUT, COMMAND_VERSION,
    VERSIONS_FILE, VERSIONS_TAG,
};
use crate::config::EngineKind;
use crate::engine::{ExecutionOutcome, ExecutionResult};
use crate::observability::messages::task::{
    ContainerKillFailed, ProcessKillFailed, TaskResumed, WorkFileWriteFailed,
};
use crate::observability::messages::StructuredLog;
use crate::process::{Artifact, OutputDecl, ResolvedTask, ValueKind};
use crate::provenance::{self, VersionRecord};
use crate::traits::TaskExecutor;
use async_trait::async_trait;
use staging::{
    is_reusable, list_files, match_outputs, move_file, reset_work_dir, stage_inputs,
    SCRATCH_PREFIX,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs tasks locally, under docker or under singularity.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    engine: EngineKind,
    resume: bool,
    program: Option<String>,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

impl ProcessExecutor {
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            resume: false,
            program: None,
        }
    }

    /// Launch through `program` instead of the engine's own CLI, e.g. a
    /// `podman` binary standing in for `docker`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Reuse work directories left by an identical, successful earlier run.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    async fn run(&self, task: &ResolvedTask, cancel: &CancellationToken) -> ExecutionResult {
        let started = Instant::now();
        let work_dir = task.work_dir().to_path_buf();
        let launch_failure = |reason: String| {
            ExecutionResult::without_outputs(
                task.task_id.clone(),
                ExecutionOutcome::LaunchFailure { reason },
                started.elapsed(),
            )
        };

        if self.resume && is_reusable(&work_dir, &task.script) {
            if let Some(result) = reuse(task, started) {
                TaskResumed {
                    task_id: &task.task_id,
                    work_dir: &work_dir,
                }
                .log();
                return result;
            }
        }

        if let Err(e) = reset_work_dir(&work_dir) {
            return launch_failure(format!("cannot prepare {}: {}", work_dir.display(), e));
        }
        if let Err(e) = fs::write(work_dir.join(COMMAND_SCRIPT), &task.script) {
            return launch_failure(format!("cannot write {}: {}", COMMAND_SCRIPT, e));
        }

        // Dropping the guard removes the scratch directory on every path below.
        let scratch = match tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&work_dir)
        {
            Ok(dir) => dir,
            Err(e) => return launch_failure(format!("cannot create scratch directory: {}", e)),
        };
        let scratch_path = scratch.path().to_path_buf();

        let staged = match stage_inputs(task, &scratch_path) {
            Ok(staged) => staged,
            Err(e) => return launch_failure(format!("cannot stage inputs: {}", e)),
        };
        if let Err(e) = fs::write(scratch_path.join(COMMAND_SCRIPT), &task.script) {
            return launch_failure(format!("cannot stage {}: {}", COMMAND_SCRIPT, e));
        }

        let container_name = container_name(&scratch_path);
        let mut plan = LaunchPlan::build(
            self.engine,
            &task.environment,
            &scratch_path,
            &staged.source_dirs,
            task.context.cpus,
            task.context.memory,
            &container_name,
        );
        if let Some(program) = &self.program {
            plan.program = program.clone();
        }

        let mut command = Command::new(&plan.program);
        command
            .args(&plan.args)
            .current_dir(&scratch_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return launch_failure(format!("cannot start '{}': {}", plan.program, e)),
        };

        let stdout = child.stdout.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let deadline = async {
            match task.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = cancel.cancelled() => Waited::Cancelled,
            _ = deadline => Waited::TimedOut(task.timeout.unwrap_or_default()),
        };

        let interrupted = !matches!(waited, Waited::Exited(_));
        if interrupted {
            if let Some(pid) = child.id() {
                kill_process_group(&task.task_id, pid);
            }
            let _ = child.kill().await;
            if let Some(name) = &plan.container_name {
                stop_container(&task.task_id, name).await;
            }
        }

        let stdout = collect(stdout, interrupted).await;
        let stderr = collect(stderr, interrupted).await;
        let _ = write_work_file(task, &work_dir.join(COMMAND_STDOUT), &stdout);
        let _ = write_work_file(task, &work_dir.join(COMMAND_STDERR), &stderr);

        let status = match waited {
            Waited::Exited(Ok(status)) => status,
            Waited::Exited(Err(e)) => {
                return launch_failure(format!("lost track of '{}': {}", plan.program, e))
            }
            Waited::Cancelled => {
                return finished(task, ExecutionOutcome::Cancelled, None, stdout, stderr, started)
            }
            Waited::TimedOut(after) => {
                return finished(
                    task,
                    ExecutionOutcome::Timeout { after },
                    None,
                    stdout,
                    stderr,
                    started,
                )
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        let exit_code_path = work_dir.join(COMMAND_EXIT_CODE);
        let recorded = write_work_file(task, &exit_code_path, &format!("{}\n", exit_code));

        if exit_code != 0 {
            let outcome = classify_exit(self.engine, &plan.program, exit_code, &stderr);
            return finished(task, outcome, Some(exit_code), stdout, stderr, started);
        }
        // Resume trusts only a recorded zero status, so a clean exit that
        // cannot be recorded is not a success.
        if let Err(e) = recorded {
            return launch_failure(format!("cannot record exit status: {}", e));
        }

        let files = match list_files(&scratch_path, &staged.names) {
            Ok(files) => files,
            Err(e) => return launch_failure(format!("cannot list outputs: {}", e)),
        };
        let matches = match_outputs(&files, task.spec.outputs());
        if !matches.missing.is_empty() {
            let outcome = ExecutionOutcome::MissingOutput {
                patterns: matches.missing,
            };
            return finished(task, outcome, Some(exit_code), stdout, stderr, started);
        }

        let mut emissions = Vec::with_capacity(task.spec.outputs().len() + 1);
        for (decl, relatives) in task.spec.outputs().iter().zip(&matches.matched) {
            let mut artifacts = Vec::with_capacity(relatives.len());
            for relative in relatives {
                match move_file(&scratch_path, &work_dir, relative) {
                    Ok(path) => artifacts.push(output_artifact(task, decl, path)),
                    Err(e) => {
                        return launch_failure(format!("cannot keep output '{}': {}", relative, e))
                    }
                }
            }
            emissions.push(Emission {
                producer: task.task_id.clone(),
                tag: decl.emit.clone(),
                artifacts,
            });
        }

        let version_raw = move_file(&scratch_path, &work_dir, COMMAND_VERSION)
            .ok()
            .and_then(|path| fs::read_to_string(path).ok());
        let versions = record_versions(task, version_raw.as_deref());
        emissions.push(versions_emission(task, &work_dir, &versions));

        drop(scratch);
        ExecutionResult {
            task_id: task.task_id.clone(),
            outcome: ExecutionOutcome::Success,
            exit_code: Some(exit_code),
            emissions,
            stdout,
            stderr,
            version_raw,
            versions,
            duration: started.elapsed(),
            resumed: false,
        }
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, task: ResolvedTask, cancel: CancellationToken) -> ExecutionResult {
        if cancel.is_cancelled() {
            return ExecutionResult::without_outputs(
                task.task_id,
                ExecutionOutcome::Cancelled,
                Duration::ZERO,
            );
        }
        self.run(&task, &cancel).await
    }

    fn name(&self) -> &'static str {
        match self.engine {
            EngineKind::Local => "local",
            EngineKind::Docker => "docker",
            EngineKind::Singularity => "singularity",
        }
    }
}

fn finished(
    task: &ResolvedTask,
    outcome: ExecutionOutcome,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    started: Instant,
) -> ExecutionResult {
    ExecutionResult {
        exit_code,
        stdout,
        stderr,
        ..ExecutionResult::without_outputs(task.task_id.clone(), outcome, started.elapsed())
    }
}

/// Output of a reader task. After an interruption a grandchild may still
/// hold the pipe open, so waiting is bounded.
async fn collect(reader: Option<tokio::task::JoinHandle<Vec<u8>>>, interrupted: bool) -> String {
    let Some(mut handle) = reader else {
        return String::new();
    };
    let bytes = if interrupted {
        match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                handle.abort();
                Vec::new()
            }
        }
    } else {
        handle.await.unwrap_or_default()
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

/// How a non-zero exit is reported: the engine's own launch failure code
/// means the tool never ran.
fn classify_exit(engine: EngineKind, program: &str, exit_code: i32, stderr: &str) -> ExecutionOutcome {
    if launch_failure_code(engine) == Some(exit_code) {
        ExecutionOutcome::LaunchFailure {
            reason: last_line(stderr)
                .unwrap_or_else(|| format!("{} exited with {}", program, exit_code)),
        }
    } else {
        ExecutionOutcome::ToolFailure { exit_code }
    }
}

fn write_work_file(task: &ResolvedTask, path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents).inspect_err(|e| {
        WorkFileWriteFailed {
            task_id: &task.task_id,
            path,
            error: e,
        }
        .log()
    })
}

/// SIGKILL the task's whole process group so grandchildren die with it.
#[cfg(unix)]
fn kill_process_group(task_id: &str, pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // The group is already gone.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => ProcessKillFailed {
            task_id,
            pid,
            error: &e,
        }
        .log(),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_task_id: &str, _pid: u32) {}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(str::to_string)
}

fn container_name(scratch: &Path) -> String {
    let suffix: String = scratch
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("phylowood-{}", suffix)
}

async fn stop_container(task_id: &str, name: &str) {
    let result = Command::new("docker")
        .args(["kill", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        ContainerKillFailed {
            task_id,
            container: name,
            error: &e,
        }
        .log();
    }
}

fn output_artifact(task: &ResolvedTask, decl: &OutputDecl, path: PathBuf) -> Artifact {
    let artifact = match decl.kind {
        ValueKind::File => Artifact::file(path),
        ValueKind::Value => {
            Artifact::value(fs::read_to_string(&path).unwrap_or_default().trim().to_string())
        }
    };
    let artifact = artifact.with_producer(task.task_id.clone());
    match task.input_artifacts().find_map(|a| a.id.clone()) {
        Some(id) => artifact.with_id(id),
        None => artifact,
    }
}

fn record_versions(task: &ResolvedTask, raw: Option<&str>) -> VersionRecord {
    match task.spec.version() {
        Some(capture) => provenance::record(
            task.spec.name(),
            &capture.tool,
            raw.unwrap_or_default(),
            &capture.rule,
        ),
        None => VersionRecord::new(),
    }
}

fn versions_emission(task: &ResolvedTask, work_dir: &Path, versions: &VersionRecord) -> Emission {
    let path = work_dir.join(VERSIONS_FILE);
    let artifacts = match versions.write_to(&path) {
        Ok(()) => vec![Artifact::file(path).with_producer(task.task_id.clone())],
        Err(e) => {
            WorkFileWriteFailed {
                task_id: &task.task_id,
                path: &path,
                error: &e,
            }
            .log();
            Vec::new()
        }
    };
    Emission {
        producer: task.task_id.clone(),
        tag: VERSIONS_TAG.to_string(),
        artifacts,
    }
}

/// Rebuild a successful result from a previous run's work directory, or
/// `None` when its outputs no longer satisfy every declared pattern.
fn reuse(task: &ResolvedTask, started: Instant) -> Option<ExecutionResult> {
    let work_dir = task.work_dir();
    let mut exclude = std::collections::HashSet::new();
    exclude.insert(VERSIONS_FILE.to_string());
    let files = list_files(work_dir, &exclude).ok()?;
    let matches = match_outputs(&files, task.spec.outputs());
    if !matches.missing.is_empty() {
        return None;
    }

    let mut emissions: Vec<Emission> = task
        .spec
        .outputs()
        .iter()
        .zip(&matches.matched)
        .map(|(decl, relatives)| Emission {
            producer: task.task_id.clone(),
            tag: decl.emit.clone(),
            artifacts: relatives
                .iter()
                .map(|r| output_artifact(task, decl, work_dir.join(r)))
                .collect(),
        })
        .collect();

    let version_raw = fs::read_to_string(work_dir.join(COMMAND_VERSION)).ok();
    let versions = VersionRecord::read_from(&work_dir.join(VERSIONS_FILE))
        .unwrap_or_else(|_| record_versions(task, version_raw.as_deref()));
    emissions.push(versions_emission(task, work_dir, &versions));

    Some(ExecutionResult {
        task_id: task.task_id.clone(),
        outcome: ExecutionOutcome::Success,
        exit_code: Some(0),
        emissions,
        stdout: fs::read_to_string(work_dir.join(COMMAND_STDOUT)).unwrap_or_default(),
        stderr: fs::read_to_string(work_dir.join(COMMAND_STDERR)).unwrap_or_default(),
        version_raw,
        versions,
        duration: started.elapsed(),
        resumed: true,
    })
}
