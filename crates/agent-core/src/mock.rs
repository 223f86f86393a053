//! Scripted LLM provider for tests and offline runs.
//!
//! Completions and extractions are served from FIFO queues; every request is
//! recorded so tests can assert on what the agent sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::language::{ActionLanguage, JsonSchemaLanguage};
use crate::provider::{
    Completion, CompletionRequest, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
};
use crate::tool::ToolCall;

const MOCK_MODEL: &str = "mock-model";

/// Mock provider driven by queued responses
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    inner: Arc<RwLock<ScriptedInner>>,
    language: JsonSchemaLanguage,
}

#[derive(Default)]
struct ScriptedInner {
    completions: VecDeque<Result<Completion>>,
    extractions: VecDeque<Result<Value>>,
    requests: Vec<CompletionRequest>,
    extraction_prompts: Vec<String>,
    complete_calls: usize,
    extract_calls: usize,
    latency: Option<Duration>,
    healthy: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        let provider = Self::default();
        provider.inner.write().healthy = true;
        provider
    }

    /// Delay every call, for timeout tests
    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner.write().latency = Some(latency);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.inner.write().healthy = healthy;
    }

    pub fn push_completion(&self, completion: Completion) {
        self.inner.write().completions.push_back(Ok(completion));
    }

    /// Queue a plain-text answer
    pub fn push_message(&self, text: impl Into<String>) {
        self.push_completion(Completion::message(text, MOCK_MODEL));
    }

    /// Queue a single tool call
    pub fn push_tool_call(&self, name: &str, arguments: Value) {
        let arguments: HashMap<String, Value> = match arguments {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        self.push_tool_calls(vec![ToolCall::new(name, arguments).ensure_id()]);
    }

    pub fn push_tool_calls(&self, calls: Vec<ToolCall>) {
        self.push_completion(Completion::tool_calls(calls, MOCK_MODEL));
    }

    /// Queue a failure for the next completion
    pub fn push_error(&self, error: AgentError) {
        self.inner.write().completions.push_back(Err(error));
    }

    pub fn push_extraction(&self, value: Value) {
        self.inner.write().extractions.push_back(Ok(value));
    }

    pub fn push_extraction_error(&self, error: AgentError) {
        self.inner.write().extractions.push_back(Err(error));
    }

    pub fn complete_calls(&self) -> usize {
        self.inner.read().complete_calls
    }

    pub fn extract_calls(&self) -> usize {
        self.inner.read().extract_calls
    }

    /// Completion requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.read().requests.clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.inner.read().requests.last().cloned()
    }

    pub fn extraction_prompts(&self) -> Vec<String> {
        self.inner.read().extraction_prompts.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "Scripted".into(),
            models: self.list_models().await?,
            supports_tools: true,
            supports_structured_output: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.inner.read().healthy)
    }

    fn language(&self) -> &dyn ActionLanguage {
        &self.language
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        {
            let mut inner = self.inner.write();
            inner.complete_calls += 1;
            inner.requests.push(request.clone());
        }
        self.simulate_latency().await;

        let next = self.inner.write().completions.pop_front();
        next.unwrap_or_else(|| Err(AgentError::Provider("scripted provider has no completion queued".into())))
    }

    async fn extract(&self, prompt: &str, _schema: &Value, _options: &GenerationOptions) -> Result<Value> {
        {
            let mut inner = self.inner.write();
            inner.extract_calls += 1;
            inner.extraction_prompts.push(prompt.to_string());
        }
        self.simulate_latency().await;

        let next = self.inner.write().extractions.pop_front();
        next.unwrap_or_else(|| Err(AgentError::Provider("scripted provider has no extraction queued".into())))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: MOCK_MODEL.into(),
            name: "Mock Model".into(),
            context_length: None,
        }])
    }
}
