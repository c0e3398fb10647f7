//! Subprocess agent invoker.
//!
//! The agent runs as a child process per invocation. The
//! [`InvocationRequest`] is written to its stdin as one JSON document and the
//! answer is read from stdout:
//!
//! - stdout that parses as JSON is a structured response, anything else is text
//! - an object of the form `{"response": ..., "status": "..."}` (no other keys)
//!   is an envelope carrying the agent's terminal status
//! - exit code 75 (`EX_TEMPFAIL`) is a transient failure, any other non-zero
//!   exit is fatal
//!
//! The child is killed when the invocation future is dropped, which is how the
//! orchestrator's attempt timeout reaches it.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use genobench_core::invoker::InvokeResult;
use genobench_core::{
    AgentInvoker, AgentResponse, AgentTerminalStatus, InvocationRequest, InvocationResponse,
    InvokeError,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::AgentError;

/// Exit code an agent uses to ask for a retry.
pub const EX_TEMPFAIL: i32 = 75;

/// Longest stderr excerpt carried in an error message.
const STDERR_EXCERPT: usize = 512;

/// Runs `program args...` once per invocation.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandInvoker {
    /// Build from a command line split into program and arguments.
    pub fn new(command: Vec<String>) -> Result<Self, AgentError> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or(AgentError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
            env: Vec::new(),
        })
    }

    /// Extra environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AgentInvoker for CommandInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> InvokeResult<InvocationResponse> {
        let start = Instant::now();
        let payload = serde_json::to_vec(request)
            .map_err(|e| InvokeError::Fatal(format!("failed to encode request: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InvokeError::Fatal(format!("failed to spawn {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // The agent may exit without reading its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(program = %self.program, "agent closed stdin early");
                }
                Err(e) => {
                    return Err(InvokeError::Transient(format!(
                        "failed to write request: {}",
                        e
                    )))
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| InvokeError::Transient(format!("failed to wait for agent: {}", e)))?;

        debug!(
            program = %self.program,
            task_id = %request.task_id,
            attempt = request.attempt,
            exit_code = ?output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "agent process exited"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_exit(output.status.code(), &stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_output(&stdout))
    }
}

/// Map a failed exit to an invocation error.
fn classify_exit(code: Option<i32>, stderr: &str) -> InvokeError {
    let detail = excerpt(stderr.trim());
    match code {
        Some(EX_TEMPFAIL) => InvokeError::Transient(format!("agent asked for retry: {}", detail)),
        Some(code) => InvokeError::Fatal(format!("agent exited with code {}: {}", code, detail)),
        None => InvokeError::Fatal(format!("agent terminated by signal: {}", detail)),
    }
}

fn excerpt(text: &str) -> &str {
    if text.len() <= STDERR_EXCERPT {
        return text;
    }
    let mut end = STDERR_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    response: Value,
    #[serde(default)]
    status: AgentTerminalStatus,
}

/// Interpret agent stdout.
fn parse_output(stdout: &str) -> InvocationResponse {
    let trimmed = stdout.trim();
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return InvocationResponse::completed(AgentResponse::Text(trimmed.to_string()));
    };

    if let Ok(envelope) = Envelope::deserialize(&value) {
        let response = match envelope.response {
            Value::String(text) => AgentResponse::Text(text),
            other => AgentResponse::Structured(other),
        };
        return InvocationResponse {
            response,
            terminal_status: envelope.status,
        };
    }

    InvocationResponse::completed(AgentResponse::Structured(value))
}
