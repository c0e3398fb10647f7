//! Structured observability hooks for benchmark run lifecycle events.
//!
//! Every emitter logs a stable `event = "..."` field so log pipelines can
//! filter on it regardless of the human-readable message. Records emitted
//! while a [`RunSpan`] is entered carry the run id.

use tracing::{info, warn};

use crate::domain::attempt::Attempt;
use crate::domain::error::TaskLoadError;

/// Run-scoped tracing span tagged with the run id and domain.
///
/// Enter it for synchronous sections, or instrument futures (spawned workers
/// do not inherit the caller's span on their own).
///
/// # Example
///
/// ```ignore
/// let span = RunSpan::new("2b1c...", "clinical_genomics");
/// tokio::spawn(work().instrument(span.span()));
/// let _guard = span.enter();
/// ```
#[derive(Debug, Clone)]
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str, domain: &str) -> Self {
        Self {
            span: tracing::info_span!("genobench.run", run_id = %run_id, domain = %domain),
        }
    }

    /// Enter the span until the guard drops. Do not hold across `.await`.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, domain: &str, tasks: usize, runs: u32, concurrency: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        domain = %domain,
        tasks = tasks,
        runs = runs,
        concurrency = concurrency,
    );
}

/// Emit event: one attempt reached a terminal status.
pub fn emit_attempt_finished(task_id: &str, attempt: &Attempt) {
    info!(
        event = "attempt.finished",
        task_id = %task_id,
        attempt = attempt.index,
        status = %attempt.status,
        duration_ms = attempt.duration_ms,
        invocations = attempt.invocations,
    );
}

/// Emit event: transient invocation failure, retrying after a backoff.
pub fn emit_attempt_retry(
    task_id: &str,
    attempt: u32,
    retry: u32,
    backoff_ms: u64,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "attempt.retry",
        task_id = %task_id,
        attempt = attempt,
        retry = retry,
        backoff_ms = backoff_ms,
        error = %error,
    );
}

/// Emit event: an evaluator was unknown or failed.
pub fn emit_evaluator_failed(task_id: &str, evaluator: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "evaluator.failed",
        task_id = %task_id,
        evaluator = %evaluator,
        error = %error,
    );
}

/// Emit event: a task document could not be loaded.
pub fn emit_task_load_failed(task_id: &str, error: &TaskLoadError) {
    warn!(
        event = "task.load_failed",
        task_id = %task_id,
        path = %error.path().display(),
        field = error.field().unwrap_or("-"),
        error = %error,
    );
}

/// Emit event: the run was cancelled; no new attempts will be issued.
pub fn emit_run_cancelled(run_id: &str, reason: &str) {
    warn!(event = "run.cancelled", run_id = %run_id, reason = %reason);
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, attempts: usize, cancelled: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        attempts = attempts,
        cancelled = cancelled,
    );
}

/// Emit event: CI gate evaluated.
pub fn emit_gate_evaluated(domain: &str, pass_at_1: f64, verdict: &str) {
    info!(
        event = "gate.evaluated",
        domain = %domain,
        pass_at_1 = pass_at_1,
        verdict = %verdict,
    );
}
