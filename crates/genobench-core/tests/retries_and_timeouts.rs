//! Retry, backoff, timeout and terminal-status handling per attempt.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{run_config, run_scripted, score_task};
use genobench_core::invoker::fakes::{ScriptStep, ScriptedInvoker};
use genobench_core::{AgentResponse, AgentTerminalStatus, AttemptStatus, RunConfig};
use serde_json::json;

fn ok() -> ScriptStep {
    ScriptStep::json(json!({"score": 1.0}))
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried_with_backoff() {
    let invoker = Arc::new(ScriptedInvoker::new(ok()).script(
        "t1",
        1,
        [
            ScriptStep::Transient("429 rate limited".into()),
            ScriptStep::Transient("connection reset".into()),
            ok(),
        ],
    ));

    let record = run_scripted(run_config(1), Arc::clone(&invoker), vec![score_task("t1")]).await;

    let attempt = &record.tasks[0].attempts[0];
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert_eq!(attempt.invocations, 3);
    // 100ms then 200ms of backoff on the paused clock.
    assert!(attempt.duration_ms >= 300, "duration {}", attempt.duration_ms);
    assert_eq!(invoker.call_count("t1", 1), 3);
    assert_eq!(record.counters.retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_mark_agent_error() {
    let invoker = Arc::new(ScriptedInvoker::new(ScriptStep::Transient("503".into())));

    let record = run_scripted(run_config(1), Arc::clone(&invoker), vec![score_task("t1")]).await;

    let attempt = &record.tasks[0].attempts[0];
    assert_eq!(attempt.status, AttemptStatus::AgentError);
    assert_eq!(attempt.invocations, 3);
    assert!(attempt.error.as_deref().unwrap_or("").contains("503"));
    assert!(attempt.evaluations.iter().all(|e| e.result.score == 0.0 && !e.errored));
    assert_eq!(record.counters.agent_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_is_not_retried() {
    let invoker = Arc::new(
        ScriptedInvoker::new(ok()).script("t1", 1, [ScriptStep::Fatal("invalid api key".into())]),
    );

    let record = run_scripted(run_config(1), Arc::clone(&invoker), vec![score_task("t1")]).await;

    assert_eq!(record.tasks[0].attempts[0].status, AttemptStatus::AgentError);
    assert_eq!(invoker.call_count("t1", 1), 1);
    assert_eq!(record.counters.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_agent_times_out_without_retry() {
    let invoker = Arc::new(ScriptedInvoker::new(ok()).script("t1", 1, [ScriptStep::Hang]));
    let config = RunConfig {
        attempt_timeout_secs: 5,
        ..run_config(2)
    };

    let record = run_scripted(config, Arc::clone(&invoker), vec![score_task("t1")]).await;

    let attempts = &record.tasks[0].attempts;
    assert_eq!(attempts[0].status, AttemptStatus::Timeout);
    assert!(attempts[0].evaluations.iter().all(|e| e.result.score == 0.0));
    assert_eq!(invoker.call_count("t1", 1), 1);
    assert_eq!(attempts[1].status, AttemptStatus::Completed);
    assert_eq!(record.counters.timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_covers_backoff() {
    let invoker = Arc::new(ScriptedInvoker::new(ScriptStep::Transient("busy".into())));
    let config = RunConfig {
        attempt_timeout_secs: 1,
        backoff_base_ms: 800,
        ..run_config(1)
    };

    let record = run_scripted(config, invoker, vec![score_task("t1")]).await;

    // 800ms + 1600ms of backoff cannot fit in a 1s budget.
    assert_eq!(record.tasks[0].attempts[0].status, AttemptStatus::Timeout);
}

#[tokio::test]
async fn test_step_limit_response_is_still_scored() {
    let invoker = Arc::new(ScriptedInvoker::new(ScriptStep::Finish(
        AgentTerminalStatus::StepLimitReached,
        AgentResponse::Structured(json!({"score": 0.7})),
    )));

    let record = run_scripted(run_config(1), invoker, vec![score_task("t1")]).await;

    let attempt = &record.tasks[0].attempts[0];
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert_eq!(attempt.error.as_deref(), Some("step limit reached"));
    assert_eq!(attempt.evaluations[0].result.score, 0.7);
}

#[tokio::test]
async fn test_agent_reported_failure_keeps_response() {
    let invoker = Arc::new(ScriptedInvoker::new(ScriptStep::Finish(
        AgentTerminalStatus::Failed,
        AgentResponse::Text("tool server unreachable".into()),
    )));

    let record = run_scripted(run_config(1), invoker, vec![score_task("t1")]).await;

    let attempt = &record.tasks[0].attempts[0];
    assert_eq!(attempt.status, AttemptStatus::AgentError);
    assert_eq!(
        attempt.response,
        Some(AgentResponse::Text("tool server unreachable".into()))
    );
}

#[tokio::test]
async fn test_request_carries_task_and_agent_settings() {
    let invoker = Arc::new(ScriptedInvoker::new(ok()));
    let config = RunConfig {
        attempt_timeout_secs: 42,
        ..run_config(2)
    };

    run_scripted(config, Arc::clone(&invoker), vec![score_task("t1")]).await;

    let mut calls = invoker.calls();
    calls.sort_by_key(|c| c.attempt);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].attempt, 1);
    assert_eq!(calls[1].attempt, 2);
    assert_eq!(calls[0].question, "Question for t1");
    assert_eq!(calls[0].tool_manifest, vec!["clinvar"]);
    assert_eq!(calls[0].step_limit, 10);
    assert_eq!(calls[0].timeout, Duration::from_secs(42));
    assert_eq!(calls[0].model, "gpt-4o");
}
