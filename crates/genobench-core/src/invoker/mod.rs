//! Agent invoker boundary.
//!
//! The orchestrator only sees [`AgentInvoker`]: one call per invocation, a
//! response plus terminal status on success, and a transient/fatal split on
//! failure. Retries, backoff and timeouts live in the orchestrator.

pub mod fakes;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::attempt::AgentResponse;
use crate::domain::config::DomainConfig;
use crate::domain::task::Task;

/// Everything an agent needs to attempt one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub task_id: String,
    /// 1-based attempt index.
    pub attempt: u32,
    pub question: String,
    pub tool_manifest: Vec<String>,
    /// Maximum agent reasoning/tool steps.
    pub step_limit: u32,
    /// Wall-clock budget for the whole attempt.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub agent: String,
    pub instruction: String,
    pub model: String,
}

impl InvocationRequest {
    pub fn new(config: &DomainConfig, task: &Task, attempt: u32, timeout: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            attempt,
            question: task.question.clone(),
            tool_manifest: task.tool_manifest.clone(),
            step_limit: config.agent.max_iterations,
            timeout,
            agent: config.agent.name.clone(),
            instruction: config.agent.instruction.clone(),
            model: config.llm.model.clone(),
        }
    }
}

/// How the agent run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTerminalStatus {
    #[default]
    Completed,
    /// The agent hit its step limit; the response may be partial.
    StepLimitReached,
    /// The agent gave up or reported an internal failure.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResponse {
    pub response: AgentResponse,
    pub terminal_status: AgentTerminalStatus,
}

impl InvocationResponse {
    pub fn completed(response: AgentResponse) -> Self {
        Self {
            response,
            terminal_status: AgentTerminalStatus::Completed,
        }
    }
}

/// Invocation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    /// Worth retrying: rate limits, connection resets, temporary unavailability.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying cannot help.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl InvokeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, InvokeError::Transient(_))
    }
}

pub type InvokeResult<T> = std::result::Result<T, InvokeError>;

/// Runs an agent against a question.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> InvokeResult<InvocationResponse>;
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_timeout_as_millis() {
        let request = InvocationRequest {
            task_id: "t".into(),
            attempt: 1,
            question: "q".into(),
            tool_manifest: vec!["clinvar".into()],
            step_limit: 20,
            timeout: Duration::from_secs(3),
            agent: "a".into(),
            instruction: String::new(),
            model: "m".into(),
        };
        let raw = serde_json::to_value(&request).expect("serialize");
        assert_eq!(raw["timeout"], 3000);
        let back: InvocationRequest = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(back, request);
    }

    #[test]
    fn test_invoke_error_kind() {
        assert!(InvokeError::Transient("429".into()).is_transient());
        assert!(!InvokeError::Fatal("401".into()).is_transient());
        assert_eq!(InvokeError::Fatal("bad".into()).to_string(), "fatal: bad");
    }

    #[test]
    fn test_terminal_status_serde() {
        let status: AgentTerminalStatus =
            serde_json::from_str("\"step_limit_reached\"").expect("deserialize");
        assert_eq!(status, AgentTerminalStatus::StepLimitReached);
    }
}
