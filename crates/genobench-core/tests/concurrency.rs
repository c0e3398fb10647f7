//! Bounded parallelism and determinism across concurrency degrees.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{registry, run_config, run_scripted, run_with, score_task};
use genobench_core::invoker::fakes::{ScriptStep, ScriptedInvoker};
use genobench_core::invoker::InvokeResult;
use genobench_core::{
    metrics, AgentInvoker, AgentResponse, InvocationRequest, InvocationResponse, RunConfig, Task,
};
use serde_json::json;

/// Tracks the peak number of concurrent invocations.
#[derive(Default)]
struct GaugeInvoker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl AgentInvoker for GaugeInvoker {
    async fn invoke(&self, _request: &InvocationRequest) -> InvokeResult<InvocationResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(InvocationResponse::completed(AgentResponse::Structured(
            json!({"score": 1.0}),
        )))
    }
}

fn tasks(n: usize) -> Vec<Task> {
    (0..n).map(|i| score_task(&format!("t{i}"))).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_attempts_never_exceed_concurrency() {
    let invoker = Arc::new(GaugeInvoker::default());
    let config = RunConfig {
        concurrency: 3,
        ..run_config(2)
    };

    let record = run_with(config, registry(), invoker.clone(), tasks(6)).await;

    assert_eq!(record.attempt_count(), 12);
    let peak = invoker.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 1);
}

fn scripted() -> ScriptedInvoker {
    // Uneven latencies so completion order differs from issue order.
    ScriptedInvoker::new(ScriptStep::json(json!({"score": 0.0})))
        .script(
            "t0",
            1,
            [ScriptStep::Delay(
                Duration::from_millis(300),
                AgentResponse::Structured(json!({"score": 1.0})),
            )],
        )
        .script("t1", 2, [ScriptStep::json(json!({"score": 0.6}))])
        .script("t2", 1, [ScriptStep::Fatal("boom".into())])
        .script(
            "t3",
            3,
            [ScriptStep::Delay(
                Duration::from_millis(10),
                AgentResponse::Structured(json!({"score": 0.9})),
            )],
        )
}

#[tokio::test(start_paused = true)]
async fn test_results_do_not_depend_on_concurrency() {
    let mut reports = Vec::new();
    for concurrency in [1, 4, 16] {
        let config = RunConfig {
            concurrency,
            ..run_config(3)
        };
        let record = run_scripted(config, Arc::new(scripted()), tasks(4)).await;
        for task in &record.tasks {
            let indices: Vec<u32> = task.attempts.iter().map(|a| a.index).collect();
            assert_eq!(indices, vec![1, 2, 3]);
        }
        reports.push(metrics::compute(&record).unwrap());
    }

    assert_eq!(reports[0], reports[1]);
    assert_eq!(reports[1], reports[2]);
    let ids: Vec<&str> = reports[0].tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2", "t3"]);
}

#[tokio::test]
async fn test_zero_concurrency_is_clamped_to_one() {
    let config = RunConfig {
        concurrency: 0,
        ..run_config(1)
    };
    let invoker = Arc::new(ScriptedInvoker::new(ScriptStep::json(json!({"score": 1.0}))));

    let record = run_scripted(config, invoker, tasks(2)).await;
    assert_eq!(record.attempt_count(), 2);
}
