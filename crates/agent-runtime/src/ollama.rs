//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference over the
//! `/api/chat` endpoint. Models with native tool support receive tools
//! through the `tools` field; older models fall back to the text protocol.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    language::{ActionLanguage, TextBlockLanguage, parameters_schema, parse_arguments},
    message::{Message, Role},
    provider::{
        Completion, CompletionRequest, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
        TokenUsage,
    },
    tool::{ToolCall, ToolSpec},
};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::env_flag;
use crate::http::{build_client, send_json, strip_code_fence};

const PROVIDER: &str = "Ollama";

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// Send tools through the native `tools` field
    pub native_tools: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
            native_tools: true,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            port: lookup("OLLAMA_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            timeout_secs: lookup("LLM_TIMEOUT_SECS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            native_tools: lookup("OLLAMA_NATIVE_TOOLS")
                .and_then(|v| env_flag(&v))
                .unwrap_or(defaults.native_tools),
        }
    }

    /// Base URL; a host that already carries a port is used as is, and a
    /// host without a scheme gets `http://`
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let host = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        let has_port = host
            .rsplit_once(':')
            .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()));
        if has_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Ollama native function-calling schema
///
/// Tools are `{"type": "function", "function": {...}}` entries; calls come
/// back in `message.tool_calls[].function`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OllamaLanguage;

impl ActionLanguage for OllamaLanguage {
    fn name(&self) -> &str {
        "ollama"
    }

    fn describe(&self, tools: &[ToolSpec]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|spec| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": spec.name,
                            "description": spec.description,
                            "parameters": parameters_schema(spec),
                        }
                    })
                })
                .collect(),
        )
    }

    fn parse_tool_calls(&self, response: &Value) -> Result<Vec<ToolCall>> {
        let Some(calls) = response
            .get("message")
            .and_then(|m| m.get("tool_calls"))
            .and_then(Value::as_array)
        else {
            return Ok(Vec::new());
        };

        calls
            .iter()
            .map(|call| {
                let function = call
                    .get("function")
                    .ok_or_else(|| AgentError::Parse("Ollama tool call without function".into()))?;
                let name = function
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::Parse("Ollama tool call without a name".into()))?;
                let arguments = parse_arguments(function.get("arguments").unwrap_or(&Value::Null))?;
                Ok(ToolCall::new(name, arguments).ensure_id())
            })
            .collect()
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
    language: Box<dyn ActionLanguage>,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let language: Box<dyn ActionLanguage> = if config.native_tools {
            Box::new(OllamaLanguage)
        } else {
            Box::new(TextBlockLanguage)
        };

        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            config,
            language,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OllamaConfig::from_env())
    }

    /// Create with default localhost settings
    pub fn localhost() -> Result<Self> {
        Self::from_config(OllamaConfig::default())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Convert agent messages to Ollama chat messages
    fn convert_messages(&self, system_prompt: &str, messages: &[Message]) -> Vec<Value> {
        let mut converted = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            converted.push(json!({"role": "system", "content": system_prompt}));
        }

        for m in messages {
            let entry = match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::User => json!({"role": "user", "content": m.content}),
                Role::Assistant if self.config.native_tools && m.has_tool_calls() => {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|c| json!({"function": {"name": c.name, "arguments": c.arguments}}))
                        .collect();
                    json!({"role": "assistant", "content": m.content, "tool_calls": calls})
                }
                Role::Assistant => json!({"role": "assistant", "content": m.content}),
                Role::Tool if self.config.native_tools => json!({
                    "role": "tool",
                    "content": m.content,
                    "tool_name": m.name,
                }),
                // Text protocol: tool results appear as user context
                Role::Tool => json!({
                    "role": "user",
                    "content": format!(
                        "[Tool '{}' returned]\n{}",
                        m.name.as_deref().unwrap_or("tool"),
                        m.content
                    ),
                }),
            };
            converted.push(entry);
        }

        converted
    }

    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> Value {
        json!({
            "temperature": opts.temperature,
            "top_p": opts.top_p,
            "num_predict": opts.max_tokens,
        })
    }

    fn usage(response: &Value) -> Option<TokenUsage> {
        let prompt = response.get("prompt_eval_count")?.as_u64()?;
        let completion = response.get("eval_count")?.as_u64()?;
        Some(TokenUsage::new(
            u32::try_from(prompt).unwrap_or(u32::MAX),
            u32::try_from(completion).unwrap_or(u32::MAX),
        ))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: PROVIDER.into(),
            models,
            supports_tools: self.config.native_tools,
            supports_structured_output: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match send_json(PROVIDER, self.client.get(self.url("/api/tags"))).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn language(&self) -> &dyn ActionLanguage {
        self.language.as_ref()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut body = json!({
            "model": request.options.model,
            "messages": self.convert_messages(&request.system_prompt, &request.messages),
            "stream": false,
            "options": Self::build_options(&request.options),
        });
        if self.config.native_tools && !request.tools.is_empty() {
            body["tools"] = self.language.describe(&request.tools);
        }

        tracing::debug!(
            model = %request.options.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Ollama chat request"
        );
        let response = send_json(PROVIDER, self.client.post(self.url("/api/chat")).json(&body)).await?;

        let text = response
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let calls = if self.config.native_tools {
            self.language.parse_tool_calls(&response)?
        } else {
            self.language.parse_tool_calls(&Value::String(text.clone()))?
        };

        Ok(Completion::from_parts(text, calls, request.options.model.clone())
            .with_usage(Self::usage(&response)))
    }

    async fn extract(&self, prompt: &str, schema: &Value, options: &GenerationOptions) -> Result<Value> {
        let body = json!({
            "model": options.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "format": schema,
            "options": Self::build_options(options),
        });

        let response = send_json(PROVIDER, self.client.post(self.url("/api/chat")).json(&body)).await?;
        let content = response
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        serde_json::from_str(strip_code_fence(content))
            .map_err(|e| AgentError::SchemaViolation(format!("Ollama output is not JSON: {}", e)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = send_json(PROVIDER, self.client.get(self.url("/api/tags"))).await?;

        Ok(response
            .get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(|name| ModelInfo {
                        id: name.to_string(),
                        name: name.to_string(),
                        context_length: None, // Not exposed by /api/tags
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::{ParamType, ParameterSchema, ToolResult};
    use std::collections::HashMap;

    fn store_spec() -> ToolSpec {
        ToolSpec::new("store_invoice", "Store an invoice")
            .param(ParameterSchema::required("invoice_data", ParamType::Object, "Extracted invoice"))
    }

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_from_lookup() {
        let env = HashMap::from([
            ("OLLAMA_HOST", "http://gpu-box:8080/"),
            ("OLLAMA_NATIVE_TOOLS", "false"),
        ]);
        let config = OllamaConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url(), "http://gpu-box:8080");
        assert!(!config.native_tools);
    }

    #[test]
    fn test_base_url_without_scheme() {
        let env = HashMap::from([("OLLAMA_HOST", "127.0.0.1:11434")]);
        let config = OllamaConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url(), "http://127.0.0.1:11434");

        let env = HashMap::from([("OLLAMA_HOST", "gpu-box"), ("OLLAMA_PORT", "8080")]);
        let config = OllamaConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url(), "http://gpu-box:8080");
    }

    #[test]
    fn test_language_round_trip() {
        let described = OllamaLanguage.describe(&[store_spec()]);
        assert_eq!(described[0]["type"], "function");
        assert_eq!(described[0]["function"]["name"], "store_invoice");
        assert_eq!(described[0]["function"]["parameters"]["required"], json!(["invoice_data"]));

        let response = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {
                    "name": described[0]["function"]["name"],
                    "arguments": {"invoice_data": {"invoice_number": "INV-001"}}
                }}]
            }
        });
        let calls = OllamaLanguage.parse_tool_calls(&response).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "store_invoice");
        assert_eq!(calls[0].arguments["invoice_data"]["invoice_number"], "INV-001");

        let plain = json!({"message": {"role": "assistant", "content": "Stored."}});
        assert!(OllamaLanguage.parse_tool_calls(&plain).unwrap().is_empty());
    }

    #[test]
    fn test_message_conversion() {
        let provider = OllamaProvider::localhost().unwrap();
        let call = ToolCall::new("store_invoice", HashMap::new()).with_id("c1");
        let messages = vec![
            Message::user("Hello"),
            Message::assistant_tool_calls("", vec![call]),
            Message::tool(&ToolResult::success("store_invoice", "ok").with_id(Some("c1".into()))),
        ];

        let converted = provider.convert_messages("You are helpful.", &messages);
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[2]["tool_calls"][0]["function"]["name"], "store_invoice");
        assert_eq!(converted[3]["role"], "tool");
        assert_eq!(converted[3]["tool_name"], "store_invoice");
    }

    #[test]
    fn test_text_mode_uses_text_block_language() {
        let provider = OllamaProvider::from_config(OllamaConfig {
            native_tools: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.language().name(), "text-block");

        let converted = provider.convert_messages("", &[Message::tool(&ToolResult::failure("x", "boom"))]);
        assert_eq!(converted[0]["role"], "user");
        assert!(converted[0]["content"].as_str().unwrap().starts_with("[Tool 'x' returned]"));
    }
}
