//! OpenAI-compatible chat completions invoker.
//!
//! One `POST {base_url}/chat/completions` per invocation. The agent
//! instruction is the system message and the task question the user message.
//! The answer comes back as text; evaluators that need JSON parse it.

use async_trait::async_trait;
use genobench_core::invoker::InvokeResult;
use genobench_core::{
    AgentInvoker, AgentResponse, AgentTerminalStatus, DomainConfig, InvocationRequest,
    InvocationResponse, InvokeError,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AgentError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Providers speaking the OpenAI chat completions protocol.
const COMPATIBLE_PROVIDERS: &[&str] = &["openai", "openai_compatible", "azure_openai", "vllm"];

/// Chat endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    pub base_url: String,
    pub temperature: Option<f32>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            temperature: None,
            api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }
}

impl ChatConfig {
    /// Settings from the domain's LLM declaration, with the key and a default
    /// base URL taken from the environment.
    pub fn from_domain(config: &DomainConfig) -> Result<Self, AgentError> {
        let provider = config.llm.provider.to_lowercase();
        if !COMPATIBLE_PROVIDERS.contains(&provider.as_str()) {
            return Err(AgentError::UnsupportedProvider(config.llm.provider.clone()));
        }
        let mut chat = ChatConfig::default();
        if let Some(url) = &config.llm.base_url {
            chat.base_url = url.clone();
        }
        chat.temperature = config.llm.temperature;
        Ok(chat)
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

pub struct ChatInvoker {
    config: ChatConfig,
    http_client: reqwest::Client,
}

impl ChatInvoker {
    pub fn new(config: ChatConfig) -> Result<Self, AgentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("genobench/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ChatInvoker {
            config,
            http_client,
        })
    }

    pub fn from_domain(config: &DomainConfig) -> Result<Self, AgentError> {
        Self::new(ChatConfig::from_domain(config)?)
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

#[async_trait]
impl AgentInvoker for ChatInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> InvokeResult<InvocationResponse> {
        let body = request_body(request, self.config.temperature);

        let mut builder = self
            .http_client
            .post(self.config.endpoint())
            .timeout(request.timeout)
            .json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let completion: Value = response
            .json()
            .await
            .map_err(|e| InvokeError::Fatal(format!("malformed completion: {}", e)))?;
        debug!(
            task_id = %request.task_id,
            attempt = request.attempt,
            model = %request.model,
            "chat completion received"
        );
        parse_completion(&completion)
    }
}

fn request_body(request: &InvocationRequest, temperature: Option<f32>) -> Value {
    let mut messages = Vec::new();
    if !request.instruction.trim().is_empty() {
        messages.push(json!({"role": "system", "content": request.instruction}));
    }
    messages.push(json!({"role": "user", "content": request.question}));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    body
}

fn classify_send_error(err: reqwest::Error) -> InvokeError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        InvokeError::Transient(err.to_string())
    } else {
        InvokeError::Fatal(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> InvokeError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        InvokeError::Transient(message)
    } else {
        InvokeError::Fatal(message)
    }
}

/// Pull the first choice's content out of a completion.
fn parse_completion(completion: &Value) -> InvokeResult<InvocationResponse> {
    let choice = completion
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| InvokeError::Fatal("completion has no choices".to_string()))?;
    let content = choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| InvokeError::Fatal("completion has no message content".to_string()))?;

    let terminal_status = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("length") => AgentTerminalStatus::StepLimitReached,
        _ => AgentTerminalStatus::Completed,
    };
    Ok(InvocationResponse {
        response: AgentResponse::Text(content.to_string()),
        terminal_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request() -> InvocationRequest {
        InvocationRequest {
            task_id: "variant_interpretation/brca1".into(),
            attempt: 1,
            question: "Classify NM_007294.4:c.5266dupC".into(),
            tool_manifest: vec!["clinvar".into()],
            step_limit: 20,
            timeout: Duration::from_secs(30),
            agent: "genomics_agent".into(),
            instruction: "You are a clinical genomics assistant.".into(),
            model: "gpt-4o".into(),
        }
    }

    #[test]
    fn test_request_body() {
        let body = request_body(&request(), Some(0.0));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Classify NM_007294.4:c.5266dupC");
        assert_eq!(body["temperature"], 0.0);

        let mut bare = request();
        bare.instruction = String::new();
        let body = request_body(&bare, None);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn test_parse_completion() {
        let completion = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "{\"classification\": \"pathogenic\"}"},
                "finish_reason": "stop"
            }]
        });
        let parsed = parse_completion(&completion).expect("parse");
        assert_eq!(parsed.terminal_status, AgentTerminalStatus::Completed);
        assert_eq!(
            parsed.response.as_json().expect("json")["classification"],
            "pathogenic"
        );

        let truncated = json!({"choices": [{"message": {"content": "partial"}, "finish_reason": "length"}]});
        assert_eq!(
            parse_completion(&truncated).expect("parse").terminal_status,
            AgentTerminalStatus::StepLimitReached
        );
    }

    #[test]
    fn test_parse_completion_without_choices_is_fatal() {
        let err = parse_completion(&json!({"choices": []})).expect_err("no choices");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = ChatConfig {
            base_url: "http://localhost:8000/v1/".into(),
            temperature: None,
            api_key: None,
        };
        assert_eq!(config.endpoint(), "http://localhost:8000/v1/chat/completions");
    }
}
