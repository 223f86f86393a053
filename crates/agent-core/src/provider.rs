//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM providers (Ollama, Gemini, ...)
//! allowing the agent to work with any backend without code changes.
//! Each provider owns the [`ActionLanguage`] that matches its wire format.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{CompletionRequest, LlmProvider};
//!
//! let provider = OllamaProvider::from_env();
//! let completion = provider.complete(&request).await?;
//! match completion.response {
//!     LlmResponse::Message(text) => println!("{text}"),
//!     LlmResponse::ToolCalls(calls) => run_tools(calls).await?,
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::language::ActionLanguage;
use crate::message::Message;
use crate::tool::{ToolCall, ToolSpec};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "gemini-2.0-flash")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> u32 { 2048 }
fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl GenerationOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// One request/response exchange with the provider
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub options: GenerationOptions,
}

/// What the model asked for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LlmResponse {
    /// Natural-language answer
    Message(String),
    /// One or more tool invocations, in provider order
    ToolCalls(Vec<ToolCall>),
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    pub response: LlmResponse,

    /// Any text the model produced alongside tool calls
    #[serde(default)]
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    pub fn message(text: impl Into<String>, model: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            response: LlmResponse::Message(text.clone()),
            content: text,
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>, model: impl Into<String>) -> Self {
        Self {
            response: LlmResponse::ToolCalls(calls),
            content: String::new(),
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::ToolUse),
        }
    }

    /// Build from adapter output: tool calls win over text when present
    pub fn from_parts(text: String, calls: Vec<ToolCall>, model: impl Into<String>) -> Self {
        if calls.is_empty() {
            Self::message(text, model)
        } else {
            Self {
                content: text,
                ..Self::tool_calls(calls, model)
            }
        }
    }

    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "Ollama", "Gemini")
    pub name: String,

    /// Available models
    pub models: Vec<ModelInfo>,

    /// Whether tool/function calling is native (vs. text protocol)
    pub supports_tools: bool,

    /// Whether schema-constrained output is supported
    pub supports_structured_output: bool,
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context_length: Option<u32>,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends. The agent works
/// exclusively through this interface (wrapped in a
/// [`Gateway`](crate::gateway::Gateway)).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider information and capabilities
    async fn info(&self) -> Result<ProviderInfo>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Adapter translating tool specs and responses for this provider
    fn language(&self) -> &dyn ActionLanguage;

    /// One exchange: system prompt, history and tools in, message or tool calls out
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Single-shot call constrained to return data shaped by `schema`.
    /// Returns the raw value; validation happens in the gateway.
    async fn extract(&self, prompt: &str, schema: &Value, options: &GenerationOptions) -> Result<Value>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.temperature, 0.2);
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "llama3.2");
        assert_eq!(GenerationOptions::for_model("gemini-2.0-flash").model, "gemini-2.0-flash");
    }

    #[test]
    fn test_completion_from_parts() {
        let text = Completion::from_parts("done".into(), Vec::new(), "m");
        assert_eq!(text.response, LlmResponse::Message("done".into()));

        let call = ToolCall::new("store_invoice", Default::default());
        let calls = Completion::from_parts("storing".into(), vec![call.clone()], "m");
        assert_eq!(calls.response, LlmResponse::ToolCalls(vec![call]));
        assert_eq!(calls.content, "storing");
        assert_eq!(calls.finish_reason, Some(FinishReason::ToolUse));
    }
}
