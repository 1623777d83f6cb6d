// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::Emission;
use crate::config::consts::VERSIONS_TAG;
use crate::engine::{ExecutionOutcome, ExecutionResult};
use crate::process::{Artifact, ResolvedTask};
use crate::provenance::VersionRecord;
use crate::traits::TaskExecutor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the stub does when a given task is dispatched.
#[derive(Debug, Clone)]
pub enum StubBehaviour {
    /// Emit one artifact per declared output
    Succeed,
    /// End with this outcome and no outputs
    Fail(ExecutionOutcome),
    /// Run until cancelled
    Hang,
}

/// An executor that never launches anything, for testing the engine.
///
/// Records the order tasks were dispatched in and the highest number of
/// tasks it was running at once.
pub struct StubExecutor {
    behaviours: HashMap<String, StubBehaviour>,
    delay: Duration,
    dispatched: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<String, String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl StubExecutor {
    pub fn new() -> Self {
        Self {
            behaviours: HashMap::new(),
            delay: Duration::ZERO,
            dispatched: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// How long each successful or failing task "runs".
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_behaviour(mut self, task_id: &str, behaviour: StubBehaviour) -> Self {
        self.behaviours.insert(task_id.to_string(), behaviour);
        self
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Rendered script of a dispatched task.
    pub fn script(&self, task_id: &str) -> Option<String> {
        self.scripts.lock().unwrap().get(task_id).cloned()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn succeed(task: &ResolvedTask) -> ExecutionResult {
        let mut emissions: Vec<Emission> = task
            .spec
            .outputs()
            .iter()
            .map(|decl| Emission {
                producer: task.task_id.clone(),
                tag: decl.emit.clone(),
                artifacts: vec![Artifact::file(
                    task.work_dir().join(format!("{}.{}", task.task_id, decl.emit)),
                )
                .with_producer(task.task_id.clone())],
            })
            .collect();
        emissions.push(Emission {
            producer: task.task_id.clone(),
            tag: VERSIONS_TAG.to_string(),
            artifacts: Vec::new(),
        });

        let mut versions = VersionRecord::new();
        if let Some(capture) = task.spec.version() {
            versions.insert(task.spec.name(), capture.tool.clone(), "1.0.0");
        }

        ExecutionResult {
            exit_code: Some(0),
            emissions,
            versions,
            ..ExecutionResult::without_outputs(
                task.task_id.clone(),
                ExecutionOutcome::Success,
                Duration::ZERO,
            )
        }
    }
}

impl Default for StubExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TaskExecutor for StubExecutor {
    async fn execute(&self, task: ResolvedTask, cancel: CancellationToken) -> ExecutionResult {
        self.dispatched.lock().unwrap().push(task.task_id.clone());
        self.scripts
            .lock()
            .unwrap()
            .insert(task.task_id.clone(), task.script.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let behaviour = self
            .behaviours
            .get(&task.task_id)
            .cloned()
            .unwrap_or(StubBehaviour::Succeed);

        let finished = match behaviour {
            StubBehaviour::Hang => {
                cancel.cancelled().await;
                false
            }
            _ => tokio::select! {
                _ = tokio::time::sleep(self.delay) => true,
                _ = cancel.cancelled() => false,
            },
        };
        self.running.fetch_sub(1, Ordering::SeqCst);

        if !finished {
            return ExecutionResult::without_outputs(
                task.task_id,
                ExecutionOutcome::Cancelled,
                self.delay,
            );
        }
        match behaviour {
            StubBehaviour::Fail(outcome) => ExecutionResult {
                exit_code: match &outcome {
                    ExecutionOutcome::ToolFailure { exit_code } => Some(*exit_code),
                    _ => Some(0),
                },
                ..ExecutionResult::without_outputs(task.task_id, outcome, self.delay)
            },
            _ => Self::succeed(&task),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
