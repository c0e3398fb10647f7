//! CI gate: is the domain's Pass@1 inside the acceptable difficulty band?
//!
//! A benchmark that almost every agent passes no longer discriminates, and one
//! almost nobody passes is likely broken. The gate maps [`DomainMetrics`] and a
//! [`PassBand`] to a [`GateVerdict`] carrying the numbers that justified it.
//! No I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::config::PassBand;
use crate::metrics::DomainMetrics;

/// Gate outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    /// Pass@1 above the band.
    FailTooEasy,
    /// Pass@1 below the band.
    FailTooHard,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Pass => "pass",
            GateStatus::FailTooEasy => "fail_too_easy",
            GateStatus::FailTooHard => "fail_too_hard",
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, GateStatus::Pass)
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The gate decision and the numbers behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    pub status: GateStatus,
    pub pass_at_1: f64,
    pub band: PassBand,
    /// Human-readable explanation.
    pub reason: String,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.status.passed()
    }
}

/// Evaluate domain metrics against `band`. Both bounds are inclusive.
pub fn evaluate_gate(metrics: &DomainMetrics, band: PassBand) -> GateVerdict {
    let pass_at_1 = metrics.pass_at_1_rate;
    let (status, reason) = if pass_at_1 > band.high {
        (
            GateStatus::FailTooEasy,
            format!(
                "Pass@1 {} is above the acceptable maximum {}",
                pct(pass_at_1),
                pct(band.high)
            ),
        )
    } else if pass_at_1 < band.low {
        (
            GateStatus::FailTooHard,
            format!(
                "Pass@1 {} is below the acceptable minimum {}",
                pct(pass_at_1),
                pct(band.low)
            ),
        )
    } else {
        (
            GateStatus::Pass,
            format!(
                "Pass@1 {} is within [{}, {}]",
                pct(pass_at_1),
                pct(band.low),
                pct(band.high)
            ),
        )
    };

    GateVerdict {
        status,
        pass_at_1,
        band,
        reason,
    }
}

/// Render a fraction as a percentage with one decimal.
pub fn pct(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pass_at_1: f64) -> DomainMetrics {
        DomainMetrics {
            domain: "clinical_genomics".to_string(),
            runs: 3,
            tasks_evaluated: 20,
            pass_at_1_rate: pass_at_1,
            pass_at_k_rate: pass_at_1,
            zero_score_rate: 0.0,
            mean_score: pass_at_1,
            categories: vec![],
            incomplete_tasks: vec![],
            failed_to_load: vec![],
        }
    }

    #[test]
    fn test_band_outcomes() {
        let band = PassBand::default();
        assert_eq!(
            evaluate_gate(&metrics(0.85), band).status,
            GateStatus::FailTooEasy
        );
        assert_eq!(
            evaluate_gate(&metrics(0.10), band).status,
            GateStatus::FailTooHard
        );
        assert_eq!(evaluate_gate(&metrics(0.45), band).status, GateStatus::Pass);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let band = PassBand::default();
        assert!(evaluate_gate(&metrics(0.30), band).passed());
        assert!(evaluate_gate(&metrics(0.70), band).passed());
    }

    #[test]
    fn test_verdict_carries_numbers() {
        let verdict = evaluate_gate(&metrics(0.85), PassBand::default());
        assert_eq!(verdict.pass_at_1, 0.85);
        assert_eq!(verdict.band, PassBand::default());
        assert!(verdict.reason.contains("85.0%"));
        assert!(verdict.reason.contains("70.0%"));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&GateStatus::FailTooHard).expect("serialize");
        assert_eq!(json, "\"fail_too_hard\"");
        assert_eq!(GateStatus::FailTooEasy.to_string(), "fail_too_easy");
    }
}
