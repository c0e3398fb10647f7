//! Report emission and metric recomputation from a stored results document.

mod common;

use std::sync::Arc;

use common::{run_config, run_scripted, score_task};
use genobench_core::invoker::fakes::{ScriptStep, ScriptedInvoker};
use genobench_core::reporting::{self, RESULTS_FILE, SUMMARY_JSON_FILE};
use genobench_core::{build_summary, metrics, GateStatus, ResultsArtifact, SummaryArtifact};
use serde_json::json;

async fn sample_run() -> genobench_core::RunRecord {
    let invoker = Arc::new(
        ScriptedInvoker::new(ScriptStep::json(json!({"score": 0.0})))
            .script("t1", 1, [ScriptStep::json(json!({"score": 1.0}))])
            .script("t2", 1, [ScriptStep::json(json!({"score": 1.0 / 11.0}))])
            .script("t2", 2, [ScriptStep::json(json!({"score": 0.6}))])
            .script("t3", 1, [ScriptStep::Fatal("context length exceeded".into())]),
    );
    run_scripted(
        run_config(2),
        invoker,
        vec![score_task("t1"), score_task("t2"), score_task("t3")],
    )
    .await
}

#[tokio::test]
async fn test_recomputed_metrics_are_identical() {
    let record = sample_run().await;
    let dir = tempfile::tempdir().unwrap();

    let summary = build_summary(&record);
    let artifact = ResultsArtifact::new(record.clone());
    let paths = reporting::write_reports(dir.path(), Some(&artifact), &summary).unwrap();
    assert_eq!(paths.results, Some(dir.path().join(RESULTS_FILE)));

    let stored = reporting::read_results_json(&dir.path().join(RESULTS_FILE)).unwrap();
    assert_eq!(stored.run.run_id, record.run_id);

    // Non-dyadic scores survive the JSON round trip bit for bit.
    let t2 = stored.run.tasks.iter().find(|t| t.task_id == "t2").unwrap();
    assert_eq!(t2.attempts[0].evaluations[0].result.score, 1.0 / 11.0);

    let first = metrics::compute(&stored.run).unwrap();
    let second = metrics::compute(&stored.run).unwrap();
    assert_eq!(first, second);
    assert_eq!(Some(&first), summary.metrics.as_ref());

    let again = build_summary(&stored.run);
    assert_eq!(again.verdict, summary.verdict);
    assert_eq!(again.issues, summary.issues);
}

#[tokio::test]
async fn test_summary_reports_verdict_and_issues() {
    let record = sample_run().await;
    let summary = build_summary(&record);

    // t1 passes on attempt 1, t2 only on attempt 2, t3 never.
    let verdict = summary.verdict.as_ref().unwrap();
    assert_eq!(verdict.status, GateStatus::Pass);
    assert!((verdict.pass_at_1 - 1.0 / 3.0).abs() < 1e-9);
    let domain = &summary.metrics.as_ref().unwrap().domain;
    assert!((domain.pass_at_k_rate - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(summary.issues.len(), 1);
    assert_eq!(summary.issues[0].task_id, "t3");
    assert_eq!(summary.issues[0].kind, "agent_error");
    assert!(summary.issues[0].detail.contains("context length exceeded"));

    let md = reporting::render_summary_md(&summary);
    assert!(md.contains("# Benchmark Summary: clinical_genomics"));
    assert!(md.contains("**pass**"));
    assert!(md.contains("| `t2` | no | yes |"));
    assert!(md.contains("`t3` agent_error x1"));
}

#[tokio::test]
async fn test_summary_without_metrics_is_still_written() {
    let mut record = sample_run().await;
    for task in &mut record.tasks {
        task.attempts.truncate(1);
    }
    let dir = tempfile::tempdir().unwrap();

    let summary = build_summary(&record);
    assert!(summary.verdict.is_none());
    reporting::write_reports(dir.path(), None, &summary).unwrap();

    assert!(!dir.path().join(RESULTS_FILE).exists());
    let text = std::fs::read_to_string(dir.path().join(SUMMARY_JSON_FILE)).unwrap();
    let stored: SummaryArtifact = serde_json::from_str(&text).unwrap();
    assert!(stored.metrics.is_none());
    assert!(stored.metrics_error.unwrap().contains("no task"));
}

#[tokio::test]
async fn test_results_document_carries_provenance() {
    let record = sample_run().await;
    let artifact = ResultsArtifact::new(record);
    let value = serde_json::to_value(&artifact).unwrap();

    assert_eq!(value["schema_version"], "1.0");
    assert_eq!(value["domain"], "clinical_genomics");
    assert_eq!(value["runs"], 2);
    assert!(value["config_digest"].as_str().unwrap().len() == 64);
    assert_eq!(value["agent"]["model"], "gpt-4o");
    assert_eq!(value["tasks"][0]["attempts"][0]["index"], 1);
    assert_eq!(value["counters"]["attempts_completed"], 6);
}
