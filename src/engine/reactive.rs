// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::{route, UpstreamReport};
use crate::config::consts::VERSIONS_TAG;
use crate::engine::plan::{PipelinePlan, PlannedTask};
use crate::engine::summary::{RunSummary, TaskReport};
use crate::engine::{ExecutionOutcome, ResourceGuard, ResourcePool, TaskOutcome};
use crate::errors::{ConfigError, FailureStrategy, InstantiateError};
use crate::observability::messages::engine::{
    FailFastTriggered, RunCancelled, RunCompleted, RunStarted, TaskMisconfigured,
};
use crate::observability::messages::task::{
    TaskDispatched, TaskFailed, TaskNotRun, TaskSkipped, TaskSucceeded,
};
use crate::observability::messages::StructuredLog;
use crate::process::{Instantiation, Instantiator, ResolvedTask};
use crate::provenance::VersionRecord;
use crate::traits::TaskExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Lines of stderr carried into a failure log event.
const STDERR_TAIL_LINES: usize = 20;

/// Run-wide knobs of the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub max_concurrency: usize,
    pub failure_strategy: FailureStrategy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            failure_strategy: FailureStrategy::default(),
        }
    }
}

/// Event-driven pipeline engine.
///
/// Every task gets its own tokio task that waits on an unbounded channel
/// for one report from each upstream. A task becomes ready the moment its
/// last upstream reports, so there is no level computation and no central
/// ready queue.
///
/// ## Per-task lifecycle
///
/// 1. Wait for every upstream report; the first failed upstream ends the
///    wait with `UpstreamFailed`.
/// 2. Route upstream emissions into input slots and instantiate.
///    A false predicate ends in `Skipped`. A configuration error ends in
///    `Misconfigured` and cancels the run.
/// 3. Take a concurrency permit, then cpus and memory from the pool.
/// 4. Execute, then report to every dependent.
///
/// Every path reports to dependents exactly once, so no task waits forever.
pub struct PipelineEngine {
    executor: Arc<dyn TaskExecutor>,
    instantiator: Arc<Instantiator>,
    options: EngineOptions,
}

struct RunShared {
    pipeline: String,
    executor: Arc<dyn TaskExecutor>,
    instantiator: Arc<Instantiator>,
    senders: HashMap<String, mpsc::UnboundedSender<UpstreamReport>>,
    semaphore: Arc<Semaphore>,
    pool: Option<ResourcePool>,
    failure_strategy: FailureStrategy,
    cancel: CancellationToken,
}

impl RunShared {
    fn abort_run(&self, reason: &str) {
        if !self.cancel.is_cancelled() {
            RunCancelled {
                pipeline: &self.pipeline,
                reason,
            }
            .log();
            self.cancel.cancel();
        }
    }
}

struct TaskNode {
    task: PlannedTask,
    receiver: mpsc::UnboundedReceiver<UpstreamReport>,
    dependents: Vec<String>,
}

/// Sends this task's report to its dependents. If dropped without having
/// reported, dependents are told the task failed.
struct Notifier {
    task_id: String,
    dependents: Vec<String>,
    shared: Arc<RunShared>,
    sent: bool,
}

impl Notifier {
    fn send(&mut self, report: UpstreamReport) {
        self.sent = true;
        for dependent in &self.dependents {
            if let Some(sender) = self.shared.senders.get(dependent) {
                // A closed receiver means the dependent already finished.
                let _ = sender.send(report.clone());
            }
        }
    }

    fn failed(&mut self) {
        let task_id = self.task_id.clone();
        self.send(UpstreamReport::Failed { task_id });
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if !self.sent {
            self.failed();
        }
    }
}

enum Upstreams {
    Ready(Vec<UpstreamReport>),
    Failed(String),
    Cancelled,
}

struct TaskRun {
    report: TaskReport,
    versions: VersionRecord,
}

impl PipelineEngine {
    pub fn new(executor: Arc<dyn TaskExecutor>, instantiator: Instantiator) -> Self {
        Self {
            executor,
            instantiator: Arc::new(instantiator),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = EngineOptions {
            max_concurrency: options.max_concurrency.max(1),
            ..options
        };
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn instantiator(&self) -> &Instantiator {
        &self.instantiator
    }

    /// Run every task of `plan` to a final state.
    ///
    /// Cancelling `cancel` stops the run: running tasks are killed by their
    /// executor and tasks not yet dispatched end `Cancelled`.
    pub async fn run(&self, plan: &PipelinePlan, cancel: CancellationToken) -> RunSummary {
        let started = Instant::now();
        let run_started = RunStarted {
            pipeline: plan.name(),
            task_count: plan.len(),
            max_concurrency: self.options.max_concurrency,
        };
        run_started.log();
        let run_span = run_started.span("run");

        let mut senders = HashMap::new();
        let mut nodes = Vec::with_capacity(plan.len());
        for task in plan.tasks() {
            let (sender, receiver) = mpsc::unbounded_channel();
            senders.insert(task.id.clone(), sender);
            nodes.push(TaskNode {
                task: task.clone(),
                receiver,
                dependents: plan.dependents(&task.id).to_vec(),
            });
        }

        let shared = Arc::new(RunShared {
            pipeline: plan.name().to_string(),
            executor: self.executor.clone(),
            instantiator: self.instantiator.clone(),
            senders,
            semaphore: Arc::new(Semaphore::new(self.options.max_concurrency)),
            pool: self.instantiator.resolver().ceiling().map(ResourcePool::new),
            failure_strategy: self.options.failure_strategy,
            cancel,
        });

        let handles: Vec<_> = nodes
            .into_iter()
            .map(|node| {
                let fallback = fallback_report(&node.task);
                let handle = tokio::spawn(
                    drive_task(node, shared.clone()).instrument(run_span.clone()),
                );
                (handle, fallback)
            })
            .collect();

        let mut tasks = Vec::with_capacity(handles.len());
        let mut versions = VersionRecord::new();
        for (handle, fallback) in handles {
            match handle.await {
                Ok(run) => {
                    versions.union(&run.versions);
                    tasks.push(run.report);
                }
                Err(e) => tasks.push(TaskReport {
                    outcome: TaskOutcome::Failed {
                        outcome: ExecutionOutcome::LaunchFailure {
                            reason: format!("task driver stopped unexpectedly: {}", e),
                        },
                    },
                    ..fallback
                }),
            }
        }

        let summary = RunSummary {
            pipeline: plan.name().to_string(),
            versions,
            duration: started.elapsed(),
            cancelled: shared.cancel.is_cancelled(),
            tasks,
        };
        RunCompleted {
            pipeline: plan.name(),
            succeeded: summary.count(|o| matches!(o, TaskOutcome::Succeeded { .. })),
            skipped: summary.count(|o| matches!(o, TaskOutcome::Skipped)),
            failed: summary.count(|o| !o.is_ok()),
            duration: summary.duration,
        }
        .log();
        summary
    }
}

fn fallback_report(task: &PlannedTask) -> TaskReport {
    TaskReport {
        task_id: task.id.clone(),
        process: task.spec.name().to_string(),
        outcome: TaskOutcome::Cancelled,
        exit_code: None,
        duration: std::time::Duration::ZERO,
        work_dir: None,
        outputs: Vec::new(),
    }
}

async fn drive_task(mut node: TaskNode, shared: Arc<RunShared>) -> TaskRun {
    let started = Instant::now();
    let mut notifier = Notifier {
        task_id: node.task.id.clone(),
        dependents: std::mem::take(&mut node.dependents),
        shared: shared.clone(),
        sent: false,
    };
    let mut run = TaskRun {
        report: fallback_report(&node.task),
        versions: VersionRecord::new(),
    };

    let outcome = match wait_for_upstreams(&mut node, &shared.cancel).await {
        Upstreams::Ready(reports) => {
            advance(&node.task, reports, &shared, &mut notifier, &mut run).await
        }
        Upstreams::Failed(upstream) => TaskOutcome::UpstreamFailed { upstream },
        Upstreams::Cancelled => TaskOutcome::Cancelled,
    };

    if !notifier.sent {
        notifier.failed();
    }
    match &outcome {
        TaskOutcome::UpstreamFailed { .. }
        | TaskOutcome::UpstreamSkipped { .. }
        | TaskOutcome::Cancelled => TaskNotRun {
            task_id: &node.task.id,
            reason: &outcome,
        }
        .log(),
        _ => {}
    }

    run.report.outcome = outcome;
    run.report.duration = started.elapsed();
    run
}

/// Collect one report per upstream, in `depends_on` order.
async fn wait_for_upstreams(node: &mut TaskNode, cancel: &CancellationToken) -> Upstreams {
    let mut received: HashMap<String, UpstreamReport> = HashMap::new();
    while received.len() < node.task.depends_on.len() {
        // Once the run is cancelled, nothing that is still waiting gets dispatched.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Upstreams::Cancelled,
            report = node.receiver.recv() => match report {
                Some(UpstreamReport::Failed { task_id }) => return Upstreams::Failed(task_id),
                Some(report) => {
                    received.insert(report.task_id().to_string(), report);
                }
                None => return Upstreams::Cancelled,
            },
        }
    }
    if cancel.is_cancelled() {
        return Upstreams::Cancelled;
    }

    Upstreams::Ready(
        node.task
            .depends_on
            .iter()
            .filter_map(|id| received.remove(id))
            .collect(),
    )
}

/// Route, instantiate and, when ready, dispatch.
async fn advance(
    task: &PlannedTask,
    upstreams: Vec<UpstreamReport>,
    shared: &RunShared,
    notifier: &mut Notifier,
    run: &mut TaskRun,
) -> TaskOutcome {
    let inputs = match route(&upstreams, task.spec.inputs(), &task.sources) {
        Ok(inputs) => inputs,
        Err(source) => {
            let error = ConfigError::Route {
                task_id: task.id.clone(),
                source,
            };
            return misconfigured(&task.id, &error, shared);
        }
    };

    match shared.instantiator.instantiate(task.request(inputs)) {
        Ok(Instantiation::Ready(resolved)) => dispatch(resolved, shared, notifier, run).await,
        Ok(Instantiation::Skipped(skipped)) => {
            TaskSkipped {
                task_id: &skipped.task_id,
                process: &skipped.process,
            }
            .log();
            notifier.send(UpstreamReport::Skipped {
                task_id: skipped.task_id,
                tags: skipped.emit_tags,
            });
            TaskOutcome::Skipped
        }
        Err(InstantiateError::UpstreamSkipped { slot, upstream, .. }) => {
            TaskOutcome::UpstreamSkipped { upstream, slot }
        }
        Err(error) => misconfigured(&task.id, &error, shared),
    }
}

fn misconfigured(task_id: &str, error: &dyn std::error::Error, shared: &RunShared) -> TaskOutcome {
    TaskMisconfigured { task_id, error }.log();
    shared.abort_run(&format!("configuration error in task '{}'", task_id));
    TaskOutcome::Misconfigured {
        reason: error.to_string(),
    }
}

async fn dispatch(
    task: ResolvedTask,
    shared: &RunShared,
    notifier: &mut Notifier,
    run: &mut TaskRun,
) -> TaskOutcome {
    let Some(_permit) = acquire_permit(shared).await else {
        return TaskOutcome::Cancelled;
    };
    let _resources: Option<ResourceGuard> = match &shared.pool {
        Some(pool) => {
            let acquired = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => return TaskOutcome::Cancelled,
                acquired = pool.acquire(task.spec.label(), task.context.cpus, task.context.memory) => acquired,
            };
            match acquired {
                Ok(guard) => Some(guard),
                Err(source) => {
                    let error = InstantiateError::Profile {
                        task_id: task.task_id.clone(),
                        source,
                    };
                    return misconfigured(&task.task_id, &error, shared);
                }
            }
        }
        None => None,
    };

    let dispatched = TaskDispatched {
        task_id: &task.task_id,
        process: task.spec.name(),
        cpus: task.context.cpus,
        memory: task.context.memory,
        environment: task.environment.reference(),
    };
    dispatched.log();
    let span = dispatched.span("execute");
    run.report.work_dir = Some(task.work_dir().to_path_buf());

    let task_id = task.task_id.clone();
    let result = shared
        .executor
        .execute(task, shared.cancel.clone())
        .instrument(span)
        .await;
    run.report.exit_code = result.exit_code;

    match result.outcome {
        ExecutionOutcome::Success => {
            run.report.outputs = result
                .emissions
                .iter()
                .filter(|e| e.tag != VERSIONS_TAG)
                .flat_map(|e| e.artifacts.iter().filter_map(|a| a.path()))
                .map(|p| p.to_path_buf())
                .collect();
            TaskSucceeded {
                task_id: &task_id,
                duration: result.duration,
                emitted: run.report.outputs.len(),
            }
            .log();
            run.versions = result.versions;
            notifier.send(UpstreamReport::Completed {
                task_id,
                emissions: result.emissions,
            });
            TaskOutcome::Succeeded {
                resumed: result.resumed,
            }
        }
        ExecutionOutcome::Cancelled => TaskOutcome::Cancelled,
        outcome => {
            TaskFailed {
                task_id: &task_id,
                outcome: &outcome,
                stderr_tail: &stderr_tail(&result.stderr),
            }
            .log();
            notifier.failed();
            if shared.failure_strategy == FailureStrategy::FailFast {
                FailFastTriggered { task_id: &task_id }.log();
                shared.abort_run(&format!("task '{}' failed", task_id));
            }
            TaskOutcome::Failed { outcome }
        }
    }
}

async fn acquire_permit(shared: &RunShared) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => None,
        permit = shared.semaphore.clone().acquire_owned() => permit.ok(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
