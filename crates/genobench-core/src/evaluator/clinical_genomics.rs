//! `clinical_genomics.*` evaluators.
//!
//! Each evaluator runs a fixed set of weighted checks over a JSON object
//! response. The score is the fraction of available points earned; the pass
//! decision uses a per-evaluator cut-off on that fraction.

use serde_json::{Map, Value};

use super::args::{bool_or, f64_or, required_str, required_str_list, usize_or};
use super::{EvaluationInput, EvaluatorError, EvaluatorRegistry};
use crate::domain::attempt::EvaluationResult;

const EVIDENCE_LEVELS: [&str; 7] = [
    "fda",
    "nccn",
    "clinical trial",
    "level 1",
    "level 2",
    "level a",
    "level b",
];

pub fn register(registry: &mut EvaluatorRegistry) {
    registry
        .register(
            "clinical_genomics.validate_variant_classification",
            validate_variant_classification,
        )
        .register(
            "clinical_genomics.validate_treatment_recommendation",
            validate_treatment_recommendation,
        )
        .register(
            "clinical_genomics.validate_clinical_trial_match",
            validate_clinical_trial_match,
        );
}

/// Weighted checklist accumulator.
struct Scorecard {
    earned: f64,
    max: f64,
    issues: Vec<String>,
}

impl Scorecard {
    fn new(max: f64) -> Self {
        Self {
            earned: 0.0,
            max,
            issues: Vec::new(),
        }
    }

    fn check(&mut self, ok: bool, points: f64, issue: impl FnOnce() -> String) {
        if ok {
            self.earned += points;
        } else {
            self.issues.push(issue());
        }
    }

    fn finish(self, pass_fraction: f64) -> EvaluationResult {
        let fraction = self.earned / self.max;
        let mut feedback = format!(
            "Score: {}/{} ({:.0}%)",
            self.earned,
            self.max,
            fraction * 100.0
        );
        if !self.issues.is_empty() {
            feedback.push_str("\nIssues: ");
            feedback.push_str(&self.issues.join("; "));
        }
        EvaluationResult::scored(fraction, fraction >= pass_fraction, feedback)
    }
}

/// ACMG/AMP variant classification. Out of 5 points, passes at 80%.
pub fn validate_variant_classification(
    input: &EvaluationInput<'_>,
) -> Result<EvaluationResult, EvaluatorError> {
    let expected_tier = required_str(input.args, "expected_tier")?;
    let expected_codes = required_str_list(input.args, "expected_codes")?;
    let min_confidence = f64_or(input.args, "min_confidence", 0.8)?;
    let must_have_reference = bool_or(input.args, "must_have_reference", true)?;
    let id_pattern =
        regex::Regex::new(r"\d{6,}").map_err(|e| EvaluatorError::Failed(e.to_string()))?;

    let data = match response_object(input) {
        Ok(data) => data,
        Err(result) => return Ok(result),
    };
    let mut card = Scorecard::new(5.0);

    let pathogenicity = data
        .get("pathogenicity")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let expected_lower = expected_tier.to_lowercase();
    let tier_ok = !pathogenicity.is_empty()
        && (pathogenicity.contains(&expected_lower) || expected_lower.contains(&pathogenicity));
    card.check(tier_ok, 1.0, || {
        format!(
            "Pathogenicity: expected '{}', got '{}'",
            expected_tier,
            display(data.get("pathogenicity"))
        )
    });

    let codes: Vec<String> = match data.get("evidence_codes") {
        Some(Value::Array(items)) => items.iter().map(loose_str).collect(),
        _ => Vec::new(),
    };
    let matched = expected_codes
        .iter()
        .filter(|code| codes.iter().any(|c| c.contains(code.as_str())))
        .count();
    card.check(
        matched as f64 >= expected_codes.len() as f64 * 0.6,
        1.5,
        || {
            format!(
                "Evidence codes: expected {:?}, got {:?} (only {}/{} matched)",
                expected_codes,
                codes,
                matched,
                expected_codes.len()
            )
        },
    );

    match data.get("confidence").map_or(Some(0.0), as_number) {
        Some(confidence) => card.check(confidence >= min_confidence, 1.0, || {
            format!("Confidence too low: {} < {}", confidence, min_confidence)
        }),
        None => card.check(false, 1.0, || {
            format!("Invalid confidence value: {}", display(data.get("confidence")))
        }),
    }

    let recommendation = data
        .get("clinical_recommendation")
        .filter(|v| truthy(v))
        .map(loose_str)
        .unwrap_or_default();
    card.check(recommendation.trim().chars().count() > 20, 0.75, || {
        "Clinical recommendation missing or too brief".to_string()
    });

    if must_have_reference {
        let references = as_items(data.get("references"));
        if references.is_empty() {
            card.check(false, 0.75, || "References missing".to_string());
        } else {
            let valid = references.iter().any(|r| {
                let r = loose_str(r).to_lowercase();
                r.contains("clinvar") || r.contains("pmid") || id_pattern.is_match(&r)
            });
            card.check(valid, 0.75, || {
                "No valid ClinVar/PubMed references found".to_string()
            });
        }
    } else {
        card.check(true, 0.75, String::new);
    }

    Ok(card.finish(0.8))
}

/// Treatment recommendation for a genomic variant. Out of 4 points, passes at 75%.
pub fn validate_treatment_recommendation(
    input: &EvaluationInput<'_>,
) -> Result<EvaluationResult, EvaluatorError> {
    let expected_therapies = required_str_list(input.args, "expected_therapies")?;
    let must_include_evidence = bool_or(input.args, "must_include_evidence", true)?;
    let check_contraindications = bool_or(input.args, "check_contraindications", true)?;

    let data = match response_object(input) {
        Ok(data) => data,
        Err(result) => return Ok(result),
    };
    let mut card = Scorecard::new(4.0);

    let recommended: Vec<String> = as_items(data.get("recommended_therapies"))
        .into_iter()
        .map(|v| loose_str(v).to_lowercase())
        .collect();
    let matched = expected_therapies
        .iter()
        .filter(|t| {
            let t = t.to_lowercase();
            recommended.iter().any(|r| r.contains(&t))
        })
        .count();
    card.check(
        matched as f64 >= expected_therapies.len() as f64 * 0.7,
        1.6,
        || {
            format!(
                "Therapies: expected {:?}, got {:?}",
                expected_therapies, recommended
            )
        },
    );

    if must_include_evidence {
        let evidence = data
            .get("evidence_level")
            .map(loose_str)
            .unwrap_or_default()
            .to_lowercase();
        card.check(
            EVIDENCE_LEVELS.iter().any(|level| evidence.contains(level)),
            1.2,
            || {
                format!(
                    "Evidence level missing or invalid: {}",
                    display(data.get("evidence_level"))
                )
            },
        );
    } else {
        card.check(true, 1.2, String::new);
    }

    if check_contraindications {
        let addressed = data.get("contraindications").is_some_and(truthy);
        card.check(addressed, 0.6, || "Contraindications not addressed".to_string());
    } else {
        card.check(true, 0.6, String::new);
    }

    let dosing = data
        .get("dosing")
        .filter(|v| truthy(v))
        .or_else(|| data.get("dosing_considerations").filter(|v| truthy(v)))
        .map(loose_str)
        .unwrap_or_default();
    card.check(dosing.trim().chars().count() > 10, 0.6, || {
        "Dosing considerations missing or incomplete".to_string()
    });

    Ok(card.finish(0.75))
}

/// Clinical trial matching. Out of 4 points, passes at 75%.
pub fn validate_clinical_trial_match(
    input: &EvaluationInput<'_>,
) -> Result<EvaluationResult, EvaluatorError> {
    let min_trials = usize_or(input.args, "min_trials", 3)?;
    let must_check_eligibility = bool_or(input.args, "must_check_eligibility", true)?;

    let data = match response_object(input) {
        Ok(data) => data,
        Err(result) => return Ok(result),
    };
    let mut card = Scorecard::new(4.0);

    // `trials` wins over `matched_trials` whenever it is present.
    let trials: &[Value] = match data.get("trials").or_else(|| data.get("matched_trials")) {
        Some(Value::Array(items)) => items,
        _ => &[],
    };
    let rendered: Vec<String> = trials.iter().map(|t| t.to_string().to_lowercase()).collect();

    card.check(trials.len() >= min_trials, 1.2, || {
        format!(
            "Expected at least {} trials, found {}",
            min_trials,
            trials.len()
        )
    });

    let complete = trials
        .iter()
        .zip(&rendered)
        .filter(|(trial, text)| {
            let Some(trial) = trial.as_object() else {
                return false;
            };
            let has_id = text.contains("nct") || trial.contains_key("trial_id");
            let has_phase = trial.contains_key("phase");
            let has_title = trial.contains_key("title") || trial.contains_key("name");
            has_id && has_phase && has_title
        })
        .count();
    card.check(complete as f64 >= min_trials as f64 * 0.7, 1.6, || {
        format!(
            "Only {}/{} trials have complete information",
            complete,
            trials.len()
        )
    });

    if must_check_eligibility {
        let assessed = rendered
            .iter()
            .any(|t| t.contains("eligibility") || t.contains("eligible"));
        card.check(assessed, 0.8, || "Eligibility criteria not assessed".to_string());
    } else {
        card.check(true, 0.8, String::new);
    }

    let located = rendered
        .iter()
        .any(|t| t.contains("location") || t.contains("site") || t.contains("country"));
    card.check(located, 0.4, || "Location information missing".to_string());

    Ok(card.finish(0.75))
}

/// The response as a JSON object, or the failing result to report instead.
fn response_object<'a>(
    input: &'a EvaluationInput<'_>,
) -> Result<std::borrow::Cow<'a, Map<String, Value>>, EvaluationResult> {
    use std::borrow::Cow;

    let value = input
        .response
        .as_json()
        .map_err(|e| EvaluationResult::fail(format!("Invalid JSON response: {}", e)))?;
    match value {
        Cow::Borrowed(Value::Object(map)) => Ok(Cow::Borrowed(map)),
        Cow::Owned(Value::Object(map)) => Ok(Cow::Owned(map)),
        _ => Err(EvaluationResult::fail(
            "Evaluation error: response is not a JSON object",
        )),
    }
}

/// Strings as-is, everything else in JSON notation.
fn loose_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display(value: Option<&Value>) -> String {
    value.map(loose_str).unwrap_or_else(|| "none".to_string())
}

/// Numbers and numeric strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-null, non-empty, non-zero, non-false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A list field; a single truthy scalar counts as a one-item list.
fn as_items(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) if truthy(other) => vec![other],
        _ => Vec::new(),
    }
}
