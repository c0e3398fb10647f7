//! Execution of a single attempt: timeout, retry with exponential backoff,
//! then evaluation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::RunConfig;
use crate::counters::RunCounters;
use crate::domain::attempt::{AgentResponse, Attempt, AttemptStatus};
use crate::domain::config::DomainConfig;
use crate::domain::task::Task;
use crate::evaluator::{skipped_records, EvaluatorRegistry};
use crate::invoker::{
    AgentInvoker, AgentTerminalStatus, InvocationRequest, InvocationResponse, InvokeError,
};
use crate::obs;

/// Read-only state shared by every worker of one run.
pub(crate) struct AttemptContext {
    pub config: RunConfig,
    pub domain: Arc<DomainConfig>,
    pub registry: Arc<EvaluatorRegistry>,
    pub invoker: Arc<dyn AgentInvoker>,
    pub counters: Arc<RunCounters>,
}

/// Backoff before retry number `retry` (1-based): `base * 2^(retry - 1)`.
pub fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 2u64.saturating_pow(retry.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Run attempt `index` of `task` to a terminal status. Never fails.
pub(crate) async fn run_attempt(ctx: &AttemptContext, task: &Task, index: u32) -> Attempt {
    ctx.counters.inc_attempts_started();
    let started = Instant::now();
    let timeout = ctx.config.attempt_timeout();
    let request = InvocationRequest::new(&ctx.domain, task, index, timeout);

    // The timeout bounds the whole retry loop, backoff sleeps included.
    let mut invocations = 0u32;
    let outcome = tokio::time::timeout(timeout, invoke_with_retry(ctx, &request, &mut invocations)).await;

    let mut attempt = match outcome {
        Err(_elapsed) => {
            ctx.counters.inc_timeouts();
            unevaluated(
                task,
                index,
                AttemptStatus::Timeout,
                format!("attempt exceeded {}s timeout", timeout.as_secs()),
            )
        }
        Ok(Err(e)) => {
            ctx.counters.inc_agent_errors();
            unevaluated(task, index, AttemptStatus::AgentError, e.to_string())
        }
        Ok(Ok(InvocationResponse {
            terminal_status: AgentTerminalStatus::Failed,
            response,
        })) => {
            ctx.counters.inc_agent_errors();
            let mut attempt = unevaluated(
                task,
                index,
                AttemptStatus::AgentError,
                "agent reported failure".to_string(),
            );
            attempt.response = Some(response);
            attempt
        }
        Ok(Ok(InvocationResponse {
            terminal_status,
            response,
        })) => {
            let mut attempt = evaluate(ctx, task, index, response);
            if terminal_status == AgentTerminalStatus::StepLimitReached {
                attempt.error = Some("step limit reached".to_string());
            }
            attempt
        }
    };

    attempt.invocations = invocations;
    attempt.duration_ms = started.elapsed().as_millis() as u64;
    ctx.counters.inc_attempts_completed();
    obs::emit_attempt_finished(&task.id, &attempt);
    attempt
}

async fn invoke_with_retry(
    ctx: &AttemptContext,
    request: &InvocationRequest,
    invocations: &mut u32,
) -> Result<InvocationResponse, InvokeError> {
    let mut retry = 0u32;
    loop {
        *invocations += 1;
        match ctx.invoker.invoke(request).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && retry < ctx.config.max_retries => {
                retry += 1;
                let delay = backoff_delay(ctx.config.backoff_base_ms, retry);
                ctx.counters.inc_retries();
                obs::emit_attempt_retry(
                    &request.task_id,
                    request.attempt,
                    retry,
                    delay.as_millis() as u64,
                    &e,
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn evaluate(ctx: &AttemptContext, task: &Task, index: u32, response: AgentResponse) -> Attempt {
    let evaluations = ctx.registry.evaluate_all(task, &response);
    let errored = evaluations.iter().filter(|e| e.errored).count();
    if errored > 0 {
        ctx.counters.add_evaluator_failures(errored as u64);
    }

    let format_warnings = match &task.output_format {
        Some(format) => {
            let value = response
                .as_json()
                .map(|v| v.into_owned())
                .unwrap_or(serde_json::Value::Null);
            format.missing_fields(&value)
        }
        None => Vec::new(),
    };

    Attempt {
        index,
        status: if errored > 0 {
            AttemptStatus::EvaluatorError
        } else {
            AttemptStatus::Completed
        },
        response: Some(response),
        duration_ms: 0,
        invocations: 0,
        error: None,
        evaluations,
        format_warnings,
    }
}

/// An attempt that never reached evaluation: one zero record per evaluator spec.
pub(crate) fn unevaluated(task: &Task, index: u32, status: AttemptStatus, error: String) -> Attempt {
    Attempt {
        index,
        status,
        response: None,
        duration_ms: 0,
        invocations: 0,
        error: Some(error),
        evaluations: skipped_records(task, status.as_str()),
        format_warnings: Vec::new(),
    }
}
