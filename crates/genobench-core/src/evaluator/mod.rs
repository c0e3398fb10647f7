//! Evaluator registry.
//!
//! Evaluators are plain functions registered under a dotted name at startup.
//! After registration the registry is only read, so one instance is shared by
//! every worker behind an `Arc` without locking.
//!
//! Invocation never fails the caller: an unknown name, an `Err`, a panic or a
//! score outside `[0, 1]` all become an errored [`EvaluationRecord`] with score 0.
//!
//! # Modules
//!
//! - [`builtin`]: generic `core.*` evaluators
//! - [`clinical_genomics`]: `clinical_genomics.*` evaluators
//! - [`args`]: typed accessors for `op_args`

pub mod args;
pub mod builtin;
pub mod clinical_genomics;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::attempt::{AgentResponse, EvaluationRecord, EvaluationResult};
use crate::domain::task::{EvaluatorSpec, ResponseExtractor, Task};
use crate::obs;

/// Failure of an evaluator to produce a result.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("unknown evaluator '{0}'")]
    Unknown(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("evaluator panicked: {0}")]
    Panicked(String),

    #[error("score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("{0}")]
    Failed(String),
}

/// Everything an evaluator may look at.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub task_id: &'a str,
    pub question: &'a str,
    pub response: &'a AgentResponse,
    /// The spec's `op_args`, always a JSON object.
    pub args: &'a serde_json::Value,
}

/// A registered evaluator function.
pub type EvaluatorFn =
    Arc<dyn Fn(&EvaluationInput<'_>) -> Result<EvaluationResult, EvaluatorError> + Send + Sync>;

/// Name → evaluator mapping.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, EvaluatorFn>,
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("evaluators", &self.names())
            .finish()
    }
}

impl EvaluatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in evaluator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        clinical_genomics::register(&mut registry);
        registry
    }

    /// Register `f` under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&EvaluationInput<'_>) -> Result<EvaluationResult, EvaluatorError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.evaluators.insert(name.clone(), Arc::new(f)).is_some() {
            tracing::warn!(evaluator = %name, "evaluator re-registered");
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.evaluators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluator names referenced by `tasks` that are not registered.
    pub fn unknown_in<'t>(&self, tasks: &'t [Task]) -> Vec<(&'t str, &'t str)> {
        tasks
            .iter()
            .flat_map(|t| t.evaluators.iter().map(move |e| (t.id.as_str(), e.name.as_str())))
            .filter(|(_, name)| !self.contains(name))
            .collect()
    }

    /// Run one evaluator spec against a response. Never panics.
    pub fn evaluate(
        &self,
        task: &Task,
        spec: &EvaluatorSpec,
        response: &AgentResponse,
    ) -> EvaluationRecord {
        match self.try_evaluate(task, spec, response) {
            Ok(result) => EvaluationRecord {
                evaluator: spec.name.clone(),
                authoritative: spec.authoritative,
                result,
                errored: false,
            },
            Err(e) => {
                obs::emit_evaluator_failed(&task.id, &spec.name, &e);
                errored_record(spec, e.to_string())
            }
        }
    }

    /// Run every evaluator spec of `task`, in order. One record per spec.
    pub fn evaluate_all(&self, task: &Task, response: &AgentResponse) -> Vec<EvaluationRecord> {
        task.evaluators
            .iter()
            .map(|spec| self.evaluate(task, spec, response))
            .collect()
    }

    fn try_evaluate(
        &self,
        task: &Task,
        spec: &EvaluatorSpec,
        response: &AgentResponse,
    ) -> Result<EvaluationResult, EvaluatorError> {
        let evaluator = self
            .evaluators
            .get(&spec.name)
            .ok_or_else(|| EvaluatorError::Unknown(spec.name.clone()))?;

        let extracted;
        let response = match spec.extractor {
            ResponseExtractor::Raw => response,
            ResponseExtractor::Json => match response.as_json() {
                Ok(value) => {
                    extracted = AgentResponse::Structured(value.into_owned());
                    &extracted
                }
                Err(e) => {
                    return Ok(EvaluationResult::fail(format!(
                        "Invalid JSON response: {}",
                        e
                    )))
                }
            },
        };

        let input = EvaluationInput {
            task_id: &task.id,
            question: &task.question,
            response,
            args: &spec.args,
        };

        let result = catch_unwind(AssertUnwindSafe(|| evaluator(&input)))
            .map_err(|payload| EvaluatorError::Panicked(panic_message(payload.as_ref())))??;

        if !(result.score.is_finite() && (0.0..=1.0).contains(&result.score)) {
            return Err(EvaluatorError::ScoreOutOfRange(result.score));
        }
        Ok(result)
    }
}

/// Zero-score record for an evaluator that could not produce a result.
pub fn errored_record(spec: &EvaluatorSpec, feedback: String) -> EvaluationRecord {
    EvaluationRecord {
        evaluator: spec.name.clone(),
        authoritative: spec.authoritative,
        result: EvaluationResult::fail(feedback),
        errored: true,
    }
}

/// Zero-score records for an attempt that never reached evaluation.
pub fn skipped_records(task: &Task, reason: &str) -> Vec<EvaluationRecord> {
    task.evaluators
        .iter()
        .map(|spec| EvaluationRecord {
            evaluator: spec.name.clone(),
            authoritative: spec.authoritative,
            result: EvaluationResult::fail(format!("not evaluated: {}", reason)),
            errored: false,
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
