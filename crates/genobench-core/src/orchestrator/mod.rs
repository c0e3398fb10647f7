//! Run orchestrator: K independent attempts per task over a bounded worker pool.
//!
//! Every task × attempt unit is spawned up front and waits on a semaphore
//! permit, in task-major order. A unit checks the stop flag after acquiring
//! its permit, so cancellation (operator abort or run timeout) stops issuing
//! new attempts while in-flight ones run to completion and are kept.
//!
//! Results are sorted by (task order, attempt index) before they are returned,
//! so the run record does not depend on the concurrency degree or on
//! completion order.

pub mod execution;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{instrument, warn, Instrument};

use crate::counters::RunCounters;
use crate::domain::attempt::{Attempt, AttemptStatus};
use crate::domain::config::{DomainConfig, TaskRef};
use crate::domain::error::{HarnessError, Result, TaskLoadError};
use crate::domain::run::{RunRecord, TaskLoadFailure, TaskRecord};
use crate::domain::task::Task;
use crate::evaluator::EvaluatorRegistry;
use crate::invoker::AgentInvoker;
use crate::obs::{self, RunSpan};
use execution::{run_attempt, unevaluated, AttemptContext};

/// Run-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Attempts per task (K).
    pub runs: u32,
    /// Maximum attempts in flight.
    pub concurrency: usize,
    /// Wall-clock budget per attempt, retries included (seconds).
    pub attempt_timeout_secs: u64,
    /// Retries after a transient invocation failure (0 = invoke once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
    /// Stop issuing attempts after this many seconds.
    pub run_timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runs: 3,
            concurrency: 4,
            attempt_timeout_secs: 300,
            max_retries: 2,
            backoff_base_ms: 500,
            run_timeout_secs: None,
        }
    }
}

impl RunConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Tasks ready to run plus the ones that failed to load.
#[derive(Debug, Default)]
pub struct LoadedTasks {
    pub tasks: Vec<Task>,
    pub failures: Vec<(TaskRef, TaskLoadError)>,
}

impl From<(Vec<Task>, Vec<(TaskRef, TaskLoadError)>)> for LoadedTasks {
    fn from((tasks, failures): (Vec<Task>, Vec<(TaskRef, TaskLoadError)>)) -> Self {
        Self { tasks, failures }
    }
}

pub struct RunOrchestrator {
    config: RunConfig,
    registry: Arc<EvaluatorRegistry>,
    invoker: Arc<dyn AgentInvoker>,
}

impl RunOrchestrator {
    pub fn new(
        config: RunConfig,
        registry: Arc<EvaluatorRegistry>,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Self {
        Self {
            config,
            registry,
            invoker,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every loaded task K times.
    ///
    /// `cancel` flipping to `true` stops the run from issuing new attempts. A
    /// dropped sender never cancels.
    #[instrument(skip_all, fields(domain = %domain.domain, runs = self.config.runs))]
    pub async fn run(
        &self,
        domain: &DomainConfig,
        loaded: LoadedTasks,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunRecord> {
        let LoadedTasks { tasks, failures } = loaded;
        if tasks.is_empty() {
            return Err(HarnessError::NoRunnableTasks {
                failed: failures.len(),
            });
        }

        let mut record = RunRecord::new(domain, self.config.runs)?;
        record.load_errors = failures
            .iter()
            .map(|(task_ref, e)| TaskLoadFailure::new(&task_ref.id, e))
            .collect();
        let run_id = record.run_id.to_string();
        let span = RunSpan::new(&run_id, &domain.domain);

        let concurrency = self.config.concurrency.max(1);
        obs::emit_run_started(
            &run_id,
            &domain.domain,
            tasks.len(),
            self.config.runs,
            concurrency,
        );

        let counters = Arc::new(RunCounters::new());
        let ctx = Arc::new(AttemptContext {
            config: self.config.clone(),
            domain: Arc::new(domain.clone()),
            registry: Arc::clone(&self.registry),
            invoker: Arc::clone(&self.invoker),
            counters: Arc::clone(&counters),
        });
        let tasks: Vec<Arc<Task>> = tasks.into_iter().map(Arc::new).collect();

        let (stop_tx, stop_rx) = watch::channel(*cancel.borrow());
        let watcher = tokio::spawn(watch_for_stop(
            run_id.clone(),
            cancel,
            self.config.run_timeout(),
            stop_tx,
        ));

        let sem = Arc::new(Semaphore::new(concurrency));
        let mut handles: Vec<(usize, u32, JoinHandle<Option<Attempt>>)> = Vec::new();

        for (task_idx, task) in tasks.iter().enumerate() {
            for index in 1..=self.config.runs {
                let ctx = Arc::clone(&ctx);
                let task = Arc::clone(task);
                let sem = Arc::clone(&sem);
                let stop_rx = stop_rx.clone();

                let handle = tokio::spawn(
                    async move {
                        let _permit = sem.acquire_owned().await.ok()?;
                        if *stop_rx.borrow() {
                            return None;
                        }
                        Some(run_attempt(&ctx, &task, index).await)
                    }
                    .instrument(span.span()),
                );
                handles.push((task_idx, index, handle));
            }
        }

        let mut records: Vec<TaskRecord> = tasks
            .iter()
            .map(|t| TaskRecord::new(t, &domain.scoring))
            .collect();
        let mut skipped = 0usize;

        for (task_idx, index, handle) in handles {
            match handle.await {
                Ok(Some(attempt)) => records[task_idx].attempts.push(attempt),
                Ok(None) => skipped += 1,
                Err(join_err) => {
                    let task = &tasks[task_idx];
                    warn!(task_id = %task.id, attempt = index, error = %join_err, "attempt worker failed");
                    counters.inc_agent_errors();
                    counters.inc_attempts_completed();
                    records[task_idx].attempts.push(unevaluated(
                        task,
                        index,
                        AttemptStatus::AgentError,
                        format!("attempt worker failed: {}", join_err),
                    ));
                }
            }
        }
        watcher.abort();

        for task_record in &mut records {
            task_record.attempts.sort_by_key(|a| a.index);
        }

        record.tasks = records;
        record.cancelled = skipped > 0;
        record.finished_at = Some(Utc::now());
        record.counters = counters.snapshot();

        counters.flush();
        obs::emit_run_finished(
            &run_id,
            record.duration_ms().unwrap_or(0),
            record.attempt_count(),
            record.cancelled,
        );
        Ok(record)
    }
}

/// Flip `stop` on operator abort or when the run timeout elapses.
async fn watch_for_stop(
    run_id: String,
    cancel: watch::Receiver<bool>,
    run_timeout: Option<Duration>,
    stop: watch::Sender<bool>,
) {
    let reason = tokio::select! {
        _ = wait_cancelled(cancel) => "operator abort",
        _ = deadline(run_timeout) => "run timeout",
    };
    obs::emit_run_cancelled(&run_id, reason);
    let _ = stop.send(true);
}

async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending::<()>().await,
    }
}
