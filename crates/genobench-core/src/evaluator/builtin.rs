//! Generic `core.*` evaluators.

use serde_json::Value;

use super::args::{bool_or, required_str, required_str_list};
use super::{EvaluationInput, EvaluatorError, EvaluatorRegistry};
use crate::domain::attempt::{AgentResponse, EvaluationResult};

pub fn register(registry: &mut EvaluatorRegistry) {
    registry
        .register("core.json_valid", json_valid)
        .register("core.exact_match", exact_match)
        .register("core.contains_all", contains_all)
        .register("core.required_fields", required_fields);
}

/// Passes iff the response parses as JSON.
pub fn json_valid(input: &EvaluationInput<'_>) -> Result<EvaluationResult, EvaluatorError> {
    Ok(match input.response.as_json() {
        Ok(_) => EvaluationResult::pass("response is valid JSON"),
        Err(e) => EvaluationResult::fail(format!("Invalid JSON response: {}", e)),
    })
}

/// Passes iff the trimmed text response equals `expected`.
pub fn exact_match(input: &EvaluationInput<'_>) -> Result<EvaluationResult, EvaluatorError> {
    let expected = required_str(input.args, "expected")?;
    let actual = match input.response {
        AgentResponse::Structured(Value::String(s)) => s.trim().to_string(),
        other => other.as_text().trim().to_string(),
    };
    Ok(if actual == expected.trim() {
        EvaluationResult::pass("exact match")
    } else {
        EvaluationResult::fail(format!("expected '{}', got '{}'", expected, actual))
    })
}

/// Fraction of `terms` found in the response text.
pub fn contains_all(input: &EvaluationInput<'_>) -> Result<EvaluationResult, EvaluatorError> {
    let terms = required_str_list(input.args, "terms")?;
    if terms.is_empty() {
        return Err(EvaluatorError::InvalidArgs("`terms` must not be empty".to_string()));
    }
    let case_sensitive = bool_or(input.args, "case_sensitive", false)?;

    let text = input.response.as_text();
    let haystack = if case_sensitive {
        text.into_owned()
    } else {
        text.to_lowercase()
    };
    let missing: Vec<&str> = terms
        .iter()
        .filter(|term| {
            let needle = if case_sensitive {
                (*term).clone()
            } else {
                term.to_lowercase()
            };
            !haystack.contains(&needle)
        })
        .map(String::as_str)
        .collect();

    let found = terms.len() - missing.len();
    let score = found as f64 / terms.len() as f64;
    let feedback = if missing.is_empty() {
        format!("all {} terms found", terms.len())
    } else {
        format!("{}/{} terms found; missing: {}", found, terms.len(), missing.join(", "))
    };
    Ok(EvaluationResult::scored(score, missing.is_empty(), feedback))
}

/// Fraction of `fields` present at the top level of a JSON object response.
pub fn required_fields(input: &EvaluationInput<'_>) -> Result<EvaluationResult, EvaluatorError> {
    let fields = required_str_list(input.args, "fields")?;
    if fields.is_empty() {
        return Err(EvaluatorError::InvalidArgs("`fields` must not be empty".to_string()));
    }
    let value = match input.response.as_json() {
        Ok(value) => value,
        Err(e) => return Ok(EvaluationResult::fail(format!("Invalid JSON response: {}", e))),
    };
    let Some(object) = value.as_object() else {
        return Ok(EvaluationResult::fail("response is not a JSON object"));
    };

    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| object.get(f.as_str()).map_or(true, Value::is_null))
        .map(String::as_str)
        .collect();
    let present = fields.len() - missing.len();
    let score = present as f64 / fields.len() as f64;
    let feedback = if missing.is_empty() {
        format!("all {} fields present", fields.len())
    } else {
        format!("missing fields: {}", missing.join(", "))
    };
    Ok(EvaluationResult::scored(score, missing.is_empty(), feedback))
}
