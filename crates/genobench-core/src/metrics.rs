//! Metrics engine: Pass@1, Pass@K and zero-score statistics.
//!
//! Pure functions over a [`RunRecord`]. Nothing here performs I/O or reads a
//! clock, so recomputing over a stored results document yields identical
//! metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::attempt::{Attempt, AttemptStatus, EvaluationRecord};
use crate::domain::config::ScoreAggregation;
use crate::domain::error::MetricsError;
use crate::domain::run::{RunRecord, TaskRecord};
use crate::domain::task::TaskCategory;

/// Combine one attempt's evaluator scores into a single score.
///
/// When any evaluator is authoritative only the authoritative scores count.
/// An attempt without evaluations scores 0.
pub fn combine_scores(evaluations: &[EvaluationRecord], aggregation: ScoreAggregation) -> f64 {
    let authoritative: Vec<f64> = evaluations
        .iter()
        .filter(|e| e.authoritative)
        .map(|e| e.result.score)
        .collect();
    let scores: Vec<f64> = if authoritative.is_empty() {
        evaluations.iter().map(|e| e.result.score).collect()
    } else {
        authoritative
    };
    if scores.is_empty() {
        return 0.0;
    }
    match aggregation {
        ScoreAggregation::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
        ScoreAggregation::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

/// Aggregate over all attempts of one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskMetrics {
    pub task_id: String,
    pub category: TaskCategory,
    pub attempts: usize,
    /// Combined score per attempt, by attempt index.
    pub scores: Vec<f64>,
    pub pass_threshold: f64,
    pub pass_at_1: bool,
    pub pass_at_k: bool,
    pub mean_score: f64,
    pub best_score: f64,
    /// Every attempt scored exactly 0.
    pub zero_score: bool,
    /// Attempt count per terminal status.
    pub statuses: BTreeMap<AttemptStatus, usize>,
}

/// Per-category rates (unweighted means over the category's tasks).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryMetrics {
    pub category: TaskCategory,
    pub tasks: usize,
    pub pass_at_1_rate: f64,
    pub pass_at_k_rate: f64,
    pub zero_score_rate: f64,
}

/// Aggregate over all fully attempted tasks of a domain. Rates are fractions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainMetrics {
    pub domain: String,
    /// K.
    pub runs: u32,
    /// Tasks that completed all K attempts and enter the rates.
    pub tasks_evaluated: usize,
    pub pass_at_1_rate: f64,
    pub pass_at_k_rate: f64,
    pub zero_score_rate: f64,
    pub mean_score: f64,
    pub categories: Vec<CategoryMetrics>,
    /// Tasks with fewer than K attempts (cancelled runs).
    pub incomplete_tasks: Vec<String>,
    /// Tasks excluded because their document failed to load.
    pub failed_to_load: Vec<String>,
}

/// Task and domain metrics for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsReport {
    pub tasks: Vec<TaskMetrics>,
    pub domain: DomainMetrics,
}

/// Metrics for one task's attempts.
pub fn task_metrics(
    record: &TaskRecord,
    runs: u32,
    aggregation: ScoreAggregation,
) -> Result<TaskMetrics, MetricsError> {
    if runs == 0 {
        return Err(MetricsError::ZeroRuns);
    }
    if record.attempts.is_empty() {
        return Err(MetricsError::NoAttempts {
            task_id: record.task_id.clone(),
        });
    }
    let first = first_attempt(&record.attempts).ok_or_else(|| MetricsError::MissingFirstAttempt {
        task_id: record.task_id.clone(),
    })?;

    let mut attempts: Vec<&Attempt> = record.attempts.iter().collect();
    attempts.sort_by_key(|a| a.index);

    let threshold = record.pass_threshold;
    let scores: Vec<f64> = attempts
        .iter()
        .map(|a| combine_scores(&a.evaluations, aggregation))
        .collect();
    let mut statuses = BTreeMap::new();
    for attempt in &attempts {
        *statuses.entry(attempt.status).or_insert(0) += 1;
    }

    Ok(TaskMetrics {
        task_id: record.task_id.clone(),
        category: record.category,
        attempts: attempts.len(),
        pass_at_1: combine_scores(&first.evaluations, aggregation) >= threshold,
        pass_at_k: scores.iter().any(|s| *s >= threshold),
        mean_score: scores.iter().sum::<f64>() / scores.len() as f64,
        best_score: scores.iter().copied().fold(0.0, f64::max),
        zero_score: scores.iter().all(|s| *s == 0.0),
        pass_threshold: threshold,
        scores,
        statuses,
    })
}

/// Metrics for a whole run.
///
/// Tasks with fewer than K attempts are listed as incomplete and kept out of
/// the rates. Fails when K is 0 or when no task completed.
pub fn compute(run: &RunRecord) -> Result<MetricsReport, MetricsError> {
    if run.runs == 0 {
        return Err(MetricsError::ZeroRuns);
    }
    let aggregation = run.scoring.aggregation;

    let mut tasks = Vec::new();
    let mut incomplete_tasks = Vec::new();
    for record in &run.tasks {
        if !is_complete(record, run.runs) {
            incomplete_tasks.push(record.task_id.clone());
            continue;
        }
        tasks.push(task_metrics(record, run.runs, aggregation)?);
    }
    if tasks.is_empty() {
        return Err(MetricsError::NoCompletedTasks);
    }

    let mut by_category: BTreeMap<TaskCategory, Vec<&TaskMetrics>> = BTreeMap::new();
    for task in &tasks {
        by_category.entry(task.category).or_default().push(task);
    }
    let categories = by_category
        .into_iter()
        .map(|(category, members)| CategoryMetrics {
            category,
            tasks: members.len(),
            pass_at_1_rate: rate(&members, |t| t.pass_at_1),
            pass_at_k_rate: rate(&members, |t| t.pass_at_k),
            zero_score_rate: rate(&members, |t| t.zero_score),
        })
        .collect();

    let all: Vec<&TaskMetrics> = tasks.iter().collect();
    let domain = DomainMetrics {
        domain: run.domain.clone(),
        runs: run.runs,
        tasks_evaluated: tasks.len(),
        pass_at_1_rate: rate(&all, |t| t.pass_at_1),
        pass_at_k_rate: rate(&all, |t| t.pass_at_k),
        zero_score_rate: rate(&all, |t| t.zero_score),
        mean_score: all.iter().map(|t| t.mean_score).sum::<f64>() / all.len() as f64,
        categories,
        incomplete_tasks,
        failed_to_load: run.load_errors.iter().map(|e| e.task_id.clone()).collect(),
    };

    Ok(MetricsReport { tasks, domain })
}

fn is_complete(record: &TaskRecord, runs: u32) -> bool {
    (1..=runs).all(|i| record.attempts.iter().any(|a| a.index == i))
}

fn first_attempt(attempts: &[Attempt]) -> Option<&Attempt> {
    attempts.iter().find(|a| a.index == 1)
}

fn rate(tasks: &[&TaskMetrics], pred: impl Fn(&TaskMetrics) -> bool) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    tasks.iter().filter(|t| pred(t)).count() as f64 / tasks.len() as f64
}
