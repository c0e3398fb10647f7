//! Attempts and evaluation results.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What the agent handed back: a structured payload or free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum AgentResponse {
    Structured(serde_json::Value),
    Text(String),
}

impl AgentResponse {
    /// Interpret the response as JSON.
    ///
    /// Text is parsed after stripping a surrounding Markdown code fence, which
    /// chat models routinely wrap JSON answers in.
    pub fn as_json(&self) -> Result<Cow<'_, serde_json::Value>, serde_json::Error> {
        match self {
            AgentResponse::Structured(value) => Ok(Cow::Borrowed(value)),
            AgentResponse::Text(text) => {
                serde_json::from_str::<serde_json::Value>(strip_code_fence(text)).map(Cow::Owned)
            }
        }
    }

    /// Render the response as text (structured payloads are serialized).
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            AgentResponse::Text(text) => Cow::Borrowed(text.as_str()),
            AgentResponse::Structured(value) => Cow::Owned(value.to_string()),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Terminal status of an attempt. Exactly one per attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Completed,
    AgentError,
    Timeout,
    EvaluatorError,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Completed => "completed",
            AttemptStatus::AgentError => "agent_error",
            AttemptStatus::Timeout => "timeout",
            AttemptStatus::EvaluatorError => "evaluator_error",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one evaluator invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub passed: bool,
    /// In `[0, 1]`. Binary evaluators emit exactly 0 or 1.
    pub score: f64,
    pub feedback: String,
}

impl EvaluationResult {
    pub fn pass(feedback: impl Into<String>) -> Self {
        Self {
            passed: true,
            score: 1.0,
            feedback: feedback.into(),
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            feedback: feedback.into(),
        }
    }

    /// A continuous score with an explicit pass decision.
    pub fn scored(score: f64, passed: bool, feedback: impl Into<String>) -> Self {
        Self {
            passed,
            score,
            feedback: feedback.into(),
        }
    }
}

/// An [`EvaluationResult`] tagged with the evaluator that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    pub evaluator: String,
    #[serde(default)]
    pub authoritative: bool,
    #[serde(flatten)]
    pub result: EvaluationResult,
    /// The evaluator was unknown or failed; the score was forced to 0.
    #[serde(default)]
    pub errored: bool,
}

/// One execution of one task.
///
/// Every attempt carries exactly one [`EvaluationRecord`] per evaluator spec of
/// its task, whatever its status: attempts that never reached evaluation get
/// zero-score placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    /// 1-based attempt index.
    pub index: u32,
    pub status: AttemptStatus,
    pub response: Option<AgentResponse>,
    pub duration_ms: u64,
    /// Number of agent invocations made, including retries.
    pub invocations: u32,
    pub error: Option<String>,
    pub evaluations: Vec<EvaluationRecord>,
    /// Expected output fields missing from the response (advisory only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub format_warnings: Vec<String>,
}
