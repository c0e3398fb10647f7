//! genobench core library
//!
//! Runs every task of a domain K times against an agent, scores each response
//! with registered evaluators, aggregates Pass@1 / Pass@K / zero-score rates
//! and gates CI on the Pass@1 band.
//!
//! Pipeline: [`resolver`] → [`task_repo`] → [`orchestrator`] (using
//! [`invoker`] and [`evaluator`]) → [`metrics`] → [`gate`] → [`reporting`].

pub mod counters;
pub mod domain;
pub mod evaluator;
pub mod gate;
pub mod invoker;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod reporting;
pub mod resolver;
pub mod task_repo;
pub mod telemetry;

pub use counters::{CounterSnapshot, RunCounters};

pub use domain::{
    AgentResponse, Attempt, AttemptStatus, ConfigError, DomainConfig, EvaluationRecord,
    EvaluationResult, EvaluatorSpec, HarnessError, MetricsError, PassBand, Result, RunRecord,
    ScoreAggregation, ScoringPolicy, Task, TaskCategory, TaskLoadError, TaskRecord, TaskRef,
};

pub use evaluator::{EvaluationInput, EvaluatorError, EvaluatorRegistry};

pub use gate::{evaluate_gate, GateStatus, GateVerdict};

pub use invoker::{
    AgentInvoker, AgentTerminalStatus, InvocationRequest, InvocationResponse, InvokeError,
};

pub use metrics::{combine_scores, CategoryMetrics, DomainMetrics, MetricsReport, TaskMetrics};

pub use orchestrator::{LoadedTasks, RunConfig, RunOrchestrator};

pub use reporting::{build_summary, ResultsArtifact, SummaryArtifact, TaskIssue};

pub use resolver::resolve_domain;

pub use task_repo::TaskRepository;

pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
