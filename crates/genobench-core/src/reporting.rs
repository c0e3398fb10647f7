//! Report emitter: `results.json`, `summary.json` and `summary.md`.
//!
//! `results.json` holds the full [`RunRecord`] and is the input for
//! recomputing metrics later. The summary carries metrics, the gate verdict
//! and per-task issues; it is still written when metrics cannot be computed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::attempt::AttemptStatus;
use crate::domain::run::{RunRecord, TaskLoadFailure};
use crate::gate::{evaluate_gate, pct, GateVerdict};
use crate::metrics::{self, MetricsReport};
use crate::obs;

pub const SCHEMA_VERSION: &str = "1.0";
pub const RESULTS_FILE: &str = "results.json";
pub const SUMMARY_JSON_FILE: &str = "summary.json";
pub const SUMMARY_MD_FILE: &str = "summary.md";

/// The persisted run document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub run: RunRecord,
}

impl ResultsArtifact {
    pub fn new(run: RunRecord) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run,
        }
    }
}

/// A task whose attempts did not all complete cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskIssue {
    pub task_id: String,
    /// `agent_error`, `timeout`, `evaluator_error` or `task_load_error`.
    pub kind: String,
    pub count: usize,
    /// First error message observed for this kind.
    pub detail: String,
}

/// The persisted summary document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub domain: String,
    pub runs: u32,
    pub config_digest: String,
    pub cancelled: bool,
    pub metrics: Option<MetricsReport>,
    pub verdict: Option<GateVerdict>,
    /// Why metrics are absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
    pub issues: Vec<TaskIssue>,
    pub load_errors: Vec<TaskLoadFailure>,
}

/// Compute metrics and the gate verdict for `run`.
pub fn build_summary(run: &RunRecord) -> SummaryArtifact {
    let (metrics, verdict, metrics_error) = match metrics::compute(run) {
        Ok(report) => {
            let verdict = evaluate_gate(&report.domain, run.scoring.band);
            obs::emit_gate_evaluated(&run.domain, verdict.pass_at_1, verdict.status.as_str());
            (Some(report), Some(verdict), None)
        }
        Err(e) => (None, None, Some(e.to_string())),
    };

    SummaryArtifact {
        schema_version: SCHEMA_VERSION.to_string(),
        generated_at: Utc::now(),
        run_id: run.run_id,
        domain: run.domain.clone(),
        runs: run.runs,
        config_digest: run.config_digest.clone(),
        cancelled: run.cancelled,
        metrics,
        verdict,
        metrics_error,
        issues: task_issues(run),
        load_errors: run.load_errors.clone(),
    }
}

/// Non-completed attempts grouped by task and status, then load errors.
pub fn task_issues(run: &RunRecord) -> Vec<TaskIssue> {
    let mut issues = Vec::new();
    for task in &run.tasks {
        let mut by_status: BTreeMap<AttemptStatus, (usize, String)> = BTreeMap::new();
        for attempt in task
            .attempts
            .iter()
            .filter(|a| a.status != AttemptStatus::Completed)
        {
            let detail = attempt.error.clone().unwrap_or_else(|| {
                attempt
                    .evaluations
                    .iter()
                    .find(|e| e.errored)
                    .map(|e| format!("{}: {}", e.evaluator, e.result.feedback))
                    .unwrap_or_default()
            });
            let entry = by_status.entry(attempt.status).or_insert((0, detail));
            entry.0 += 1;
        }
        issues.extend(by_status.into_iter().map(|(status, (count, detail))| TaskIssue {
            task_id: task.task_id.clone(),
            kind: status.as_str().to_string(),
            count,
            detail,
        }));
    }
    issues.extend(run.load_errors.iter().map(|e| TaskIssue {
        task_id: e.task_id.clone(),
        kind: "task_load_error".to_string(),
        count: 1,
        detail: e.error.clone(),
    }));
    issues
}

/// Write results.json in pretty JSON format.
pub fn write_results_json(path: &Path, artifact: &ResultsArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize results artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Read a results.json written by [`write_results_json`].
pub fn read_results_json(path: &Path) -> Result<ResultsArtifact> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parse {:?}", path))
}

/// Write summary.json in pretty JSON format.
pub fn write_summary_json(path: &Path, artifact: &SummaryArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize summary artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the human summary.
pub fn render_summary_md(summary: &SummaryArtifact) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Benchmark Summary: {}\n\n", summary.domain));
    out.push_str(&format!(
        "- run: `{}`\n- runs per task (K): {}\n- config digest: `{}`\n",
        summary.run_id, summary.runs, summary.config_digest
    ));
    if summary.cancelled {
        out.push_str("- **cancelled**: not every attempt was issued\n");
    }
    out.push('\n');

    match (&summary.metrics, &summary.verdict) {
        (Some(metrics), Some(verdict)) => {
            let d = &metrics.domain;
            out.push_str("## Verdict\n");
            out.push_str(&format!("**{}**: {}\n\n", verdict.status, verdict.reason));

            out.push_str("## Domain\n");
            out.push_str(&format!(
                "- tasks evaluated: {}\n- Pass@1: {}\n- Pass@{}: {}\n- zero-score rate: {}\n- mean score: {:.3}\n\n",
                d.tasks_evaluated,
                pct(d.pass_at_1_rate),
                d.runs,
                pct(d.pass_at_k_rate),
                pct(d.zero_score_rate),
                d.mean_score,
            ));

            if !d.categories.is_empty() {
                out.push_str("## Categories\n");
                out.push_str("| category | tasks | Pass@1 | Pass@K | zero-score |\n");
                out.push_str("|---|---|---|---|---|\n");
                for c in &d.categories {
                    out.push_str(&format!(
                        "| {} | {} | {} | {} | {} |\n",
                        c.category,
                        c.tasks,
                        pct(c.pass_at_1_rate),
                        pct(c.pass_at_k_rate),
                        pct(c.zero_score_rate),
                    ));
                }
                out.push('\n');
            }

            out.push_str("## Tasks\n");
            out.push_str("| task | Pass@1 | Pass@K | best | mean |\n");
            out.push_str("|---|---|---|---|---|\n");
            for t in &metrics.tasks {
                out.push_str(&format!(
                    "| `{}` | {} | {} | {:.2} | {:.2} |\n",
                    t.task_id,
                    mark(t.pass_at_1),
                    mark(t.pass_at_k),
                    t.best_score,
                    t.mean_score,
                ));
            }
            out.push('\n');

            if !d.incomplete_tasks.is_empty() {
                out.push_str("## Incomplete Tasks\n");
                for id in &d.incomplete_tasks {
                    out.push_str(&format!("- `{}`\n", id));
                }
                out.push('\n');
            }
        }
        _ => {
            out.push_str("## Verdict\n");
            out.push_str(&format!(
                "No verdict: {}\n\n",
                summary
                    .metrics_error
                    .as_deref()
                    .unwrap_or("metrics unavailable")
            ));
        }
    }

    if !summary.issues.is_empty() {
        out.push_str("## Issues\n");
        for issue in &summary.issues {
            out.push_str(&format!(
                "- `{}` {} x{}: {}\n",
                issue.task_id, issue.kind, issue.count, issue.detail
            ));
        }
    }
    out
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "yes"
    } else {
        "no"
    }
}

/// Write summary.md.
pub fn write_summary_md(path: &Path, summary: &SummaryArtifact) -> Result<()> {
    let md = render_summary_md(summary);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Paths of the files written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub results: Option<PathBuf>,
    pub summary_json: PathBuf,
    pub summary_md: PathBuf,
}

/// Write every report into `dir`, creating it if needed. `results` is skipped
/// when `None` (summaries recomputed from an existing results document).
pub fn write_reports(
    dir: &Path,
    results: Option<&ResultsArtifact>,
    summary: &SummaryArtifact,
) -> Result<ReportPaths> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;

    let results_path = match results {
        Some(artifact) => {
            let path = dir.join(RESULTS_FILE);
            write_results_json(&path, artifact)?;
            Some(path)
        }
        None => None,
    };
    let summary_json = dir.join(SUMMARY_JSON_FILE);
    write_summary_json(&summary_json, summary)?;
    let summary_md = dir.join(SUMMARY_MD_FILE);
    write_summary_md(&summary_md, summary)?;

    Ok(ReportPaths {
        results: results_path,
        summary_json,
        summary_md,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterSnapshot;
    use crate::domain::attempt::{Attempt, EvaluationRecord, EvaluationResult};
    use crate::domain::config::ScoringPolicy;
    use crate::domain::run::{AgentIdentity, TaskRecord};
    use crate::domain::task::TaskCategory;
    use crate::gate::GateStatus;
    use serde_json::json;

    fn attempt(index: u32, status: AttemptStatus, score: f64) -> Attempt {
        Attempt {
            index,
            status,
            response: None,
            duration_ms: 10,
            invocations: 1,
            error: (status != AttemptStatus::Completed).then(|| "boom".to_string()),
            evaluations: vec![EvaluationRecord {
                evaluator: "core.json_valid".to_string(),
                authoritative: false,
                result: EvaluationResult::scored(score, score >= 0.5, ""),
                errored: false,
            }],
            format_warnings: vec![],
        }
    }

    fn run() -> RunRecord {
        RunRecord {
            run_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("uuid"),
            domain: "clinical_genomics".to_string(),
            description: String::new(),
            agent: AgentIdentity {
                agent: "a".to_string(),
                llm: "l".to_string(),
                model: "m".to_string(),
                provider: "openai".to_string(),
                max_iterations: 20,
            },
            config_digest: "abc".to_string(),
            runs: 1,
            scoring: ScoringPolicy::default(),
            started_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("parse RFC3339")
                .with_timezone(&Utc),
            finished_at: None,
            cancelled: false,
            tasks: vec![
                TaskRecord {
                    task_id: "tasks/a".to_string(),
                    path: PathBuf::from("tasks/a.json"),
                    category: TaskCategory::VariantInterpretation,
                    pass_threshold: 0.5,
                    attempts: vec![attempt(1, AttemptStatus::AgentError, 0.0)],
                },
                TaskRecord {
                    task_id: "tasks/b".to_string(),
                    path: PathBuf::from("tasks/b.json"),
                    category: TaskCategory::CohortAnalysis,
                    pass_threshold: 0.5,
                    attempts: vec![attempt(1, AttemptStatus::Completed, 1.0)],
                },
            ],
            load_errors: vec![],
            counters: CounterSnapshot::default(),
        }
    }

    #[test]
    fn results_artifact_flattens_run() {
        let raw = serde_json::to_value(ResultsArtifact::new(run())).expect("serialize");
        let obj = raw.as_object().expect("object");
        assert!(obj.contains_key("schema_version"));
        assert!(obj.contains_key("generated_at"));
        assert!(obj.contains_key("run_id"));
        assert!(obj.contains_key("tasks"));
        assert_eq!(raw["tasks"][1]["attempts"][0]["status"], json!("completed"));
    }

    #[test]
    fn summary_reports_verdict_and_issues() {
        let summary = build_summary(&run());
        let verdict = summary.verdict.as_ref().expect("verdict");
        assert_eq!(verdict.status, GateStatus::Pass);
        assert_eq!(verdict.pass_at_1, 0.5);
        assert_eq!(summary.issues.len(), 1);
        assert_eq!(summary.issues[0].task_id, "tasks/a");
        assert_eq!(summary.issues[0].kind, "agent_error");
        assert_eq!(summary.issues[0].detail, "boom");
    }

    #[test]
    fn summary_survives_missing_metrics() {
        let mut record = run();
        record.runs = 2;
        let summary = build_summary(&record);
        assert!(summary.metrics.is_none());
        assert!(summary.verdict.is_none());
        assert!(summary.metrics_error.is_some());

        let md = render_summary_md(&summary);
        assert!(md.contains("No verdict"));
    }

    #[test]
    fn summary_markdown_lists_tasks_and_categories() {
        let md = render_summary_md(&build_summary(&run()));
        assert!(md.starts_with("# Benchmark Summary: clinical_genomics\n"));
        assert!(md.contains("**pass**"));
        assert!(md.contains("- Pass@1: 50.0%"));
        assert!(md.contains("| `tasks/b` | yes | yes | 1.00 | 1.00 |"));
        assert!(md.contains("| cohort_analysis | 1 |"));
        assert!(md.contains("- `tasks/a` agent_error x1: boom"));
    }

    #[test]
    fn reports_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out");
        let results = ResultsArtifact::new(run());
        let summary = build_summary(&results.run);
        let paths = write_reports(&out, Some(&results), &summary).expect("write");

        let back = read_results_json(paths.results.as_ref().expect("results path")).expect("read");
        assert_eq!(back, results);
        assert!(paths.summary_md.exists());
        assert!(paths.summary_json.exists());
    }
}
