//! Run records: the durable outcome of one benchmark run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::Attempt;
use super::config::{DomainConfig, ScoringPolicy};
use super::digest::compute_digest;
use super::error::{Result, TaskLoadError};
use super::task::{Task, TaskCategory};
use crate::counters::CounterSnapshot;

/// Identity of the agent that was benchmarked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentIdentity {
    pub agent: String,
    pub llm: String,
    pub model: String,
    pub provider: String,
    pub max_iterations: u32,
}

/// All attempts of one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: String,
    pub path: PathBuf,
    pub category: TaskCategory,
    /// Effective pass threshold (task override or benchmark default).
    pub pass_threshold: f64,
    /// Sorted by attempt index. Fewer than K entries means the task is incomplete.
    pub attempts: Vec<Attempt>,
}

impl TaskRecord {
    pub fn new(task: &Task, scoring: &ScoringPolicy) -> Self {
        Self {
            task_id: task.id.clone(),
            path: task.path.clone(),
            category: task.category,
            pass_threshold: task.pass_threshold.unwrap_or(scoring.pass_threshold),
            attempts: Vec::new(),
        }
    }
}

/// A task that was excluded because its document failed to load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskLoadFailure {
    pub task_id: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub error: String,
}

impl TaskLoadFailure {
    pub fn new(task_id: &str, error: &TaskLoadError) -> Self {
        Self {
            task_id: task_id.to_string(),
            path: error.path().to_path_buf(),
            field: error.field().map(str::to_string),
            error: error.to_string(),
        }
    }
}

/// One benchmark run over one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    /// Unique identifier for this run.
    pub run_id: Uuid,

    pub domain: String,

    #[serde(default)]
    pub description: String,

    pub agent: AgentIdentity,

    /// SHA-256 of the resolved configuration (paths relative to the domain).
    pub config_digest: String,

    /// Attempts requested per task (K).
    pub runs: u32,

    pub scoring: ScoringPolicy,

    pub started_at: DateTime<Utc>,

    /// None while the run is still executing.
    pub finished_at: Option<DateTime<Utc>>,

    /// Set when the run stopped issuing attempts before all K × tasks ran.
    #[serde(default)]
    pub cancelled: bool,

    /// Tasks in benchmark order.
    pub tasks: Vec<TaskRecord>,

    #[serde(default)]
    pub load_errors: Vec<TaskLoadFailure>,

    #[serde(default)]
    pub counters: CounterSnapshot,
}

/// The part of a [`DomainConfig`] that identifies a run's setup, independent
/// of where the domain lives on disk.
#[derive(Serialize)]
struct Fingerprint<'a> {
    domain: &'a str,
    description: &'a str,
    llm: &'a super::config::LlmDeclaration,
    agent: &'a super::config::AgentDeclaration,
    tasks: Vec<&'a PathBuf>,
    scoring: &'a ScoringPolicy,
    runs: u32,
}

impl RunRecord {
    /// Start a new run record for `config`.
    pub fn new(config: &DomainConfig, runs: u32) -> Result<Self> {
        let config_digest = compute_digest(&Fingerprint {
            domain: &config.domain,
            description: &config.description,
            llm: &config.llm,
            agent: &config.agent,
            tasks: config.tasks.iter().map(|t| &t.path).collect(),
            scoring: &config.scoring,
            runs,
        })?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            domain: config.domain.clone(),
            description: config.description.clone(),
            agent: AgentIdentity {
                agent: config.agent.name.clone(),
                llm: config.llm.name.clone(),
                model: config.llm.model.clone(),
                provider: config.llm.provider.clone(),
                max_iterations: config.agent.max_iterations,
            },
            config_digest,
            runs,
            scoring: config.scoring,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            tasks: Vec::new(),
            load_errors: Vec::new(),
            counters: CounterSnapshot::default(),
        })
    }

    /// Total attempts recorded across all tasks.
    pub fn attempt_count(&self) -> usize {
        self.tasks.iter().map(|t| t.attempts.len()).sum()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}
