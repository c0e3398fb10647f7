//! Per-run atomic counters.
//!
//! Counters are incremented at the call site by whichever worker observes the
//! event. Call [`RunCounters::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lightweight atomic counters, owned by one run and shared with its workers.
#[derive(Debug, Default)]
pub struct RunCounters {
    attempts_started: AtomicU64,
    attempts_completed: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    agent_errors: AtomicU64,
    evaluator_failures: AtomicU64,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub attempts_started: u64,
    pub attempts_completed: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub agent_errors: u64,
    pub evaluator_failures: u64,
}

impl RunCounters {
    pub const fn new() -> Self {
        Self {
            attempts_started: AtomicU64::new(0),
            attempts_completed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            agent_errors: AtomicU64::new(0),
            evaluator_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_attempts_started(&self) {
        self.attempts_started.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt reached a terminal status (any status).
    pub fn inc_attempts_completed(&self) {
        self.attempts_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_agent_errors(&self) {
        self.agent_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_evaluator_failures(&self, n: u64) {
        self.evaluator_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            attempts_started: self.attempts_started.load(Ordering::Relaxed),
            attempts_completed: self.attempts_completed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            agent_errors: self.agent_errors.load(Ordering::Relaxed),
            evaluator_failures: self.evaluator_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            attempts_started = s.attempts_started,
            attempts_completed = s.attempts_completed,
            retries = s.retries,
            timeouts = s.timeouts,
            agent_errors = s.agent_errors,
            evaluator_failures = s.evaluator_failures,
        );
    }
}
