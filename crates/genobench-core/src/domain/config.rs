//! Domain configuration: the declarations as written and the resolved binding.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One typed declaration in a domain's `config.yaml`.
///
/// Documents are separated by `---` and tagged with `kind:` + `spec:`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "spec", rename_all = "snake_case")]
pub enum Declaration {
    Llm(LlmDeclaration),
    Agent(AgentDeclaration),
    Benchmark(BenchmarkDeclaration),
}

impl Declaration {
    pub fn kind(&self) -> &'static str {
        match self {
            Declaration::Llm(_) => "llm",
            Declaration::Agent(_) => "agent",
            Declaration::Benchmark(_) => "benchmark",
        }
    }
}

/// An LLM identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LlmDeclaration {
    pub name: String,
    /// Provider-side model identifier, e.g. `gpt-4o`.
    pub model: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

/// An agent behaviour profile bound to one LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentDeclaration {
    pub name: String,
    /// Name of an [`LlmDeclaration`].
    pub llm: String,
    #[serde(default)]
    pub instruction: String,
    /// Upper bound on reasoning steps, enforced by the agent itself.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    20
}

/// How evaluator scores of one attempt combine when none is authoritative.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAggregation {
    #[default]
    Mean,
    Min,
}

/// Acceptable Pass@1 band for the CI gate, as fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PassBand {
    pub low: f64,
    pub high: f64,
}

impl Default for PassBand {
    fn default() -> Self {
        Self {
            low: 0.30,
            high: 0.70,
        }
    }
}

/// The benchmark: which agent runs which tasks, and how they are scored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkDeclaration {
    #[serde(default)]
    pub description: String,
    /// Name of an [`AgentDeclaration`].
    pub agent: String,
    /// Task document paths, relative to the domain directory.
    pub tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_threshold: Option<f64>,
    #[serde(default)]
    pub score_aggregation: ScoreAggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_pass_at_1: Option<PassBand>,
}

/// Scoring knobs shared by the metrics engine and the gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringPolicy {
    /// Combined attempt score at or above which an attempt passes.
    pub pass_threshold: f64,
    pub aggregation: ScoreAggregation,
    pub band: PassBand,
}

pub const DEFAULT_PASS_THRESHOLD: f64 = 0.5;

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            aggregation: ScoreAggregation::Mean,
            band: PassBand::default(),
        }
    }
}

/// A task reference whose path resolved to an existing document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRef {
    /// Stable identifier: normalized domain-relative path without extension.
    pub id: String,
    /// Path as written in the benchmark declaration.
    pub path: PathBuf,
    /// Absolute (or domains-root-relative) location on disk.
    pub location: PathBuf,
}

/// A fully bound, runnable domain configuration. Immutable for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainConfig {
    pub domain: String,
    pub domain_dir: PathBuf,
    pub description: String,
    pub llm: LlmDeclaration,
    pub agent: AgentDeclaration,
    pub tasks: Vec<TaskRef>,
    pub scoring: ScoringPolicy,
}
