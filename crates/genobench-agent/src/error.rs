//! Errors raised while building an invoker.
//!
//! Failures during an invocation are reported as
//! [`InvokeError`](genobench_core::InvokeError) instead, so the orchestrator
//! can tell transient from fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// No program given for the subprocess invoker.
    #[error("agent command is empty")]
    EmptyCommand,

    /// Unsupported LLM provider for the chat invoker.
    #[error("unsupported provider '{0}' (expected an OpenAI-compatible provider)")]
    UnsupportedProvider(String),

    /// HTTP client construction failed.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Http(err.to_string())
    }
}
