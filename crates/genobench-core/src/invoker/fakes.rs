//! In-memory agent invoker for tests.
//!
//! [`ScriptedInvoker`] replays a fixed script of outcomes per
//! `(task id, attempt index)`. Retries of the same attempt consume successive
//! steps; an attempt with no (remaining) script falls back to the default step.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    AgentInvoker, AgentTerminalStatus, InvocationRequest, InvocationResponse, InvokeError,
    InvokeResult,
};
use crate::domain::attempt::AgentResponse;

/// One scripted invocation outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Respond(AgentResponse),
    /// Respond with a non-default terminal status.
    Finish(AgentTerminalStatus, AgentResponse),
    /// Sleep, then respond.
    Delay(Duration, AgentResponse),
    Transient(String),
    Fatal(String),
    /// Never return.
    Hang,
    Panic(String),
}

impl ScriptStep {
    pub fn json(value: serde_json::Value) -> Self {
        ScriptStep::Respond(AgentResponse::Structured(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        ScriptStep::Respond(AgentResponse::Text(text.into()))
    }
}

#[derive(Debug)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<(String, u32), VecDeque<ScriptStep>>>,
    default: ScriptStep,
    calls: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedInvoker {
    /// An invoker that answers every unscripted call with `default`.
    pub fn new(default: ScriptStep) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the invocations of one attempt, in call order.
    pub fn script(
        self,
        task_id: &str,
        attempt: u32,
        steps: impl IntoIterator<Item = ScriptStep>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((task_id.to_string(), attempt), steps.into_iter().collect());
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<InvocationRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, task_id: &str, attempt: u32) -> usize {
        self.calls()
            .iter()
            .filter(|r| r.task_id == task_id && r.attempt == attempt)
            .count()
    }

    fn next_step(&self, request: &InvocationRequest) -> ScriptStep {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&(request.task_id.clone(), request.attempt))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> InvokeResult<InvocationResponse> {
        match self.next_step(request) {
            ScriptStep::Respond(response) => Ok(InvocationResponse::completed(response)),
            ScriptStep::Finish(terminal_status, response) => Ok(InvocationResponse {
                response,
                terminal_status,
            }),
            ScriptStep::Delay(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(InvocationResponse::completed(response))
            }
            ScriptStep::Transient(msg) => Err(InvokeError::Transient(msg)),
            ScriptStep::Fatal(msg) => Err(InvokeError::Fatal(msg)),
            ScriptStep::Hang => std::future::pending().await,
            ScriptStep::Panic(msg) => panic!("{}", msg),
        }
    }
}
