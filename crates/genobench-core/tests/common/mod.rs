//! Shared fixtures for orchestrator-level tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use genobench_core::domain::{AgentDeclaration, LlmDeclaration};
use genobench_core::invoker::fakes::ScriptedInvoker;
use genobench_core::{
    AgentInvoker, DomainConfig, EvaluationResult, EvaluatorRegistry, EvaluatorSpec, LoadedTasks,
    RunConfig, RunOrchestrator, RunRecord, ScoringPolicy, Task, TaskCategory, TaskRef,
};
use serde_json::{json, Value};
use tokio::sync::watch;

pub fn domain(task_ids: &[&str]) -> DomainConfig {
    DomainConfig {
        domain: "clinical_genomics".to_string(),
        domain_dir: PathBuf::from("domains/clinical_genomics"),
        description: "test domain".to_string(),
        llm: LlmDeclaration {
            name: "gpt4o".to_string(),
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            temperature: Some(0.0),
            base_url: None,
        },
        agent: AgentDeclaration {
            name: "genomics_agent".to_string(),
            llm: "gpt4o".to_string(),
            instruction: "Answer in JSON.".to_string(),
            max_iterations: 10,
        },
        tasks: task_ids
            .iter()
            .map(|id| TaskRef {
                id: id.to_string(),
                path: PathBuf::from(format!("{id}.json")),
                location: PathBuf::from(format!("domains/clinical_genomics/{id}.json")),
            })
            .collect(),
        scoring: ScoringPolicy::default(),
    }
}

pub fn spec(name: &str, args: Value) -> EvaluatorSpec {
    EvaluatorSpec {
        name: name.to_string(),
        extractor: Default::default(),
        args,
        authoritative: false,
    }
}

/// A task scored by `core.contains_all` on `term`.
pub fn task(id: &str, term: &str) -> Task {
    Task {
        id: id.to_string(),
        path: PathBuf::from(format!("{id}.json")),
        category: TaskCategory::VariantInterpretation,
        question: format!("Question for {id}"),
        output_format: None,
        tool_manifest: vec!["clinvar".to_string()],
        evaluators: vec![spec("core.contains_all", json!({ "terms": [term] }))],
        pass_threshold: None,
    }
}

pub fn run_config(runs: u32) -> RunConfig {
    RunConfig {
        runs,
        concurrency: 2,
        attempt_timeout_secs: 30,
        max_retries: 2,
        backoff_base_ms: 100,
        run_timeout_secs: None,
    }
}

/// A registry with the built-ins plus `test.score`, which returns the number
/// in the response's `score` field.
pub fn registry() -> EvaluatorRegistry {
    let mut registry = EvaluatorRegistry::with_builtins();
    registry.register("test.score", |input| {
        let score = input
            .response
            .as_json()
            .ok()
            .and_then(|v| v.get("score").and_then(Value::as_f64))
            .unwrap_or(0.0);
        Ok(EvaluationResult::scored(score, score >= 0.5, format!("score {score}")))
    });
    registry
}

pub fn score_task(id: &str) -> Task {
    let mut task = task(id, "unused");
    task.evaluators = vec![spec("test.score", json!({}))];
    task
}

pub async fn run_with(
    config: RunConfig,
    registry: EvaluatorRegistry,
    invoker: Arc<dyn AgentInvoker>,
    tasks: Vec<Task>,
) -> RunRecord {
    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let domain = domain(&ids);
    let (_tx, rx) = watch::channel(false);
    RunOrchestrator::new(config, Arc::new(registry), invoker)
        .run(&domain, LoadedTasks { tasks, failures: vec![] }, rx)
        .await
        .unwrap()
}

pub async fn run_scripted(
    config: RunConfig,
    invoker: Arc<ScriptedInvoker>,
    tasks: Vec<Task>,
) -> RunRecord {
    run_with(config, registry(), invoker, tasks).await
}
