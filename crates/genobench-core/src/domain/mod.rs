//! Domain models for genobench.
//!
//! Canonical definitions for the core entities:
//! - `Task`: an immutable, validated unit of evaluation
//! - `DomainConfig`: the LLM/agent/benchmark binding for one domain
//! - `Attempt`: one execution of one task, with its evaluation results
//! - `RunRecord`: every attempt of one run, with provenance

pub mod attempt;
pub mod config;
pub mod digest;
pub mod error;
pub mod run;
pub mod task;

pub use attempt::{AgentResponse, Attempt, AttemptStatus, EvaluationRecord, EvaluationResult};
pub use config::{
    AgentDeclaration, BenchmarkDeclaration, Declaration, DomainConfig, LlmDeclaration, PassBand,
    ScoreAggregation, ScoringPolicy, TaskRef, DEFAULT_PASS_THRESHOLD,
};
pub use error::{ConfigError, HarnessError, MetricsError, Result, TaskLoadError};
pub use run::{AgentIdentity, RunRecord, TaskLoadFailure, TaskRecord};
pub use task::{EvaluatorSpec, OutputFormat, ResponseExtractor, Task, TaskCategory};
