//! Error taxonomy for the harness.
//!
//! Configuration and task-load failures propagate to the operator. Attempt- and
//! evaluator-scoped failures never appear here: they are recorded as data on the
//! [`Attempt`](crate::domain::attempt::Attempt) instead.

use std::path::{Path, PathBuf};

/// Malformed or dangling domain configuration. Fatal before any attempt runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read domain config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed domain config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("domain config {path}: missing {field}")]
    MissingField { path: PathBuf, field: String },

    #[error("domain config {path}: invalid {field}: {reason}")]
    InvalidField {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("domain config {path}: duplicate {kind} declaration '{name}'")]
    DuplicateDeclaration {
        path: PathBuf,
        kind: String,
        name: String,
    },

    #[error("domain config {path}: agent '{agent}' references unknown llm '{llm}'")]
    UnknownLlm {
        path: PathBuf,
        agent: String,
        llm: String,
    },

    #[error("domain config {path}: benchmark references unknown agent '{agent}'")]
    UnknownAgent { path: PathBuf, agent: String },

    #[error("domain config {path}: task path '{task}' does not resolve to a file")]
    UnresolvedTask { path: PathBuf, task: String },

    #[error("domain config {path}: duplicate task identifier '{id}'")]
    DuplicateTask { path: PathBuf, id: String },
}

impl ConfigError {
    /// The configuration document the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Io { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::MissingField { path, .. }
            | ConfigError::InvalidField { path, .. }
            | ConfigError::DuplicateDeclaration { path, .. }
            | ConfigError::UnknownLlm { path, .. }
            | ConfigError::UnknownAgent { path, .. }
            | ConfigError::UnresolvedTask { path, .. }
            | ConfigError::DuplicateTask { path, .. } => path,
        }
    }
}

/// Malformed task document. Fatal for that task only.
#[derive(Debug, thiserror::Error)]
pub enum TaskLoadError {
    #[error("cannot read task {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task {path} is not valid JSON: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("task {path}: missing required field `{field}`")]
    MissingField { path: PathBuf, field: String },

    #[error("task {path}: malformed field `{field}`: {reason}")]
    Malformed {
        path: PathBuf,
        field: String,
        reason: String,
    },
}

impl TaskLoadError {
    /// Path of the offending task document.
    pub fn path(&self) -> &Path {
        match self {
            TaskLoadError::Io { path, .. }
            | TaskLoadError::Parse { path, .. }
            | TaskLoadError::MissingField { path, .. }
            | TaskLoadError::Malformed { path, .. } => path,
        }
    }

    /// Offending field name, when the document parsed far enough to know it.
    pub fn field(&self) -> Option<&str> {
        match self {
            TaskLoadError::MissingField { field, .. } | TaskLoadError::Malformed { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}

/// Aggregation over data that cannot produce a meaningful metric.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetricsError {
    #[error("run count K is 0: Pass@1 is undefined")]
    ZeroRuns,

    #[error("task {task_id} has no attempts to aggregate")]
    NoAttempts { task_id: String },

    #[error("task {task_id} has no attempt with index 1")]
    MissingFirstAttempt { task_id: String },

    #[error("no task completed all of its attempts")]
    NoCompletedTasks,
}

/// Umbrella error for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TaskLoad(#[from] TaskLoadError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("no task could be loaded ({failed} load error(s))")]
    NoRunnableTasks { failed: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Whether this error stopped the harness before a verdict could be
    /// produced (bad configuration, unloadable tasks, nothing to aggregate).
    pub fn is_harness_level(&self) -> bool {
        matches!(
            self,
            HarnessError::Config(_)
                | HarnessError::TaskLoad(_)
                | HarnessError::Metrics(_)
                | HarnessError::NoRunnableTasks { .. }
        )
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
