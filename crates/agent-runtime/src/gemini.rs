//! Gemini LLM Provider
//!
//! `LlmProvider` over the Generative Language `generateContent` endpoint.
//! Tools become function declarations with OpenAPI upper-case types;
//! structured extraction forces a single `extract_data` function call.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    language::{ActionLanguage, parameters_schema, parse_arguments},
    message::{Message, Role},
    provider::{
        Completion, CompletionRequest, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
        TokenUsage,
    },
    tool::{ToolCall, ToolSpec},
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::http::{build_client, send_json};

const PROVIDER: &str = "Gemini";
const EXTRACT_FUNCTION: &str = "extract_data";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Gemini provider configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            timeout_secs: 120,
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key: lookup("GEMINI_API_KEY")
                .or_else(|| lookup("GOOGLE_API_KEY"))
                .filter(|k| !k.trim().is_empty()),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: lookup("LLM_TIMEOUT_SECS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// Convert a JSON Schema fragment to the OpenAPI subset Gemini accepts
fn to_openapi_schema(schema: &Value) -> Value {
    let Some(object) = schema.as_object() else {
        return schema.clone();
    };

    let mut converted = Map::new();
    for (key, value) in object {
        match key.as_str() {
            "type" => {
                let ty = match value {
                    Value::String(ty) => Some(ty.as_str()),
                    // ["number", "null"] -> nullable NUMBER
                    Value::Array(types) => {
                        if types.iter().any(|t| t == "null") {
                            converted.insert("nullable".into(), Value::Bool(true));
                        }
                        types.iter().filter_map(Value::as_str).find(|t| *t != "null")
                    }
                    _ => None,
                };
                if let Some(ty) = ty {
                    converted.insert("type".into(), Value::String(ty.to_ascii_uppercase()));
                }
            }
            "properties" => {
                let properties: Map<String, Value> = value
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, prop)| (name.clone(), to_openapi_schema(prop)))
                            .collect()
                    })
                    .unwrap_or_default();
                converted.insert(key.clone(), Value::Object(properties));
            }
            "items" => {
                converted.insert(key.clone(), to_openapi_schema(value));
            }
            "description" | "enum" | "required" | "format" | "nullable" => {
                converted.insert(key.clone(), value.clone());
            }
            // default, additionalProperties, $schema, title, ...
            _ => {}
        }
    }
    Value::Object(converted)
}

fn function_declaration(name: &str, description: &str, parameters: &Value) -> Value {
    let mut declaration = json!({"name": name, "description": description});
    let has_properties = parameters
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|p| !p.is_empty());
    if has_properties {
        declaration["parameters"] = to_openapi_schema(parameters);
    }
    declaration
}

/// Gemini function declarations
#[derive(Clone, Copy, Debug, Default)]
pub struct GeminiLanguage;

impl ActionLanguage for GeminiLanguage {
    fn name(&self) -> &str {
        "gemini"
    }

    fn describe(&self, tools: &[ToolSpec]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|spec| function_declaration(&spec.name, &spec.description, &parameters_schema(spec)))
            .collect();
        json!([{"functionDeclarations": declarations}])
    }

    fn parse_tool_calls(&self, response: &Value) -> Result<Vec<ToolCall>> {
        candidate_parts(response)
            .iter()
            .filter_map(|part| part.get("functionCall"))
            .map(|call| {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::Parse("Gemini function call without a name".into()))?;
                let arguments = parse_arguments(call.get("args").unwrap_or(&Value::Null))?;
                let mut parsed = ToolCall::new(name, arguments);
                parsed.id = call.get("id").and_then(Value::as_str).map(str::to_string);
                Ok(parsed.ensure_id())
            })
            .collect()
    }
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn candidate_text(response: &Value) -> String {
    candidate_parts(response)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

/// Gemini LLM provider
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(GeminiConfig {
            api_key: Some(api_key.into()),
            ..Default::default()
        })
    }

    /// Create from configuration; the API key is required
    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AgentError::Config("GEMINI_API_KEY or GOOGLE_API_KEY must be set".into()))?;

        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            config,
            api_key,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(GeminiConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn generate_url(model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("models/{}:generateContent", model)
    }

    fn post(&self, path: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
    }

    /// Convert agent messages to Gemini `contents`
    ///
    /// Consecutive tool results are grouped into one user turn.
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        let mut contents: Vec<Value> = Vec::new();

        for m in messages {
            match m.role {
                Role::User | Role::System => {
                    contents.push(json!({"role": "user", "parts": [{"text": m.content}]}));
                }
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !m.content.is_empty() {
                        parts.push(json!({"text": m.content}));
                    }
                    for call in &m.tool_calls {
                        parts.push(json!({"functionCall": {"name": call.name, "args": call.arguments}}));
                    }
                    if parts.is_empty() {
                        parts.push(json!({"text": ""}));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => {
                    let response: Value = serde_json::from_str(&m.content)
                        .unwrap_or_else(|_| json!({"result": m.content}));
                    let part = json!({"functionResponse": {
                        "name": m.name.as_deref().unwrap_or_default(),
                        "response": response,
                    }});

                    let grouped = contents.last().is_some_and(|last| {
                        last["role"] == "user"
                            && last["parts"]
                                .as_array()
                                .is_some_and(|p| p.iter().all(|p| p.get("functionResponse").is_some()))
                    });
                    match contents.last_mut().and_then(|last| last["parts"].as_array_mut()) {
                        Some(parts) if grouped => parts.push(part),
                        _ => contents.push(json!({"role": "user", "parts": [part]})),
                    }
                }
            }
        }

        contents
    }

    fn generation_config(opts: &GenerationOptions) -> Value {
        json!({
            "temperature": opts.temperature,
            "topP": opts.top_p,
            "maxOutputTokens": opts.max_tokens,
        })
    }

    fn usage(response: &Value) -> Option<TokenUsage> {
        let meta = response.get("usageMetadata")?;
        let prompt = meta.get("promptTokenCount")?.as_u64()?;
        let completion = meta.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0);
        Some(TokenUsage::new(
            u32::try_from(prompt).unwrap_or(u32::MAX),
            u32::try_from(completion).unwrap_or(u32::MAX),
        ))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: PROVIDER.into(),
            models: self.list_models().await.unwrap_or_default(),
            supports_tools: true,
            supports_structured_output: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .client
            .get(self.url("models"))
            .header("x-goog-api-key", &self.api_key);
        match send_json(PROVIDER, request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Gemini health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn language(&self) -> &dyn ActionLanguage {
        &GeminiLanguage
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut body = json!({
            "contents": Self::convert_messages(&request.messages),
            "generationConfig": Self::generation_config(&request.options),
        });
        if !request.system_prompt.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": request.system_prompt}]});
        }
        if !request.tools.is_empty() {
            body["tools"] = GeminiLanguage.describe(&request.tools);
        }

        tracing::debug!(
            model = %request.options.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Gemini generateContent request"
        );
        let response = send_json(PROVIDER, self.post(&Self::generate_url(&request.options.model), &body)).await?;

        let calls = GeminiLanguage.parse_tool_calls(&response)?;
        Ok(
            Completion::from_parts(candidate_text(&response), calls, request.options.model.clone())
                .with_usage(Self::usage(&response)),
        )
    }

    async fn extract(&self, prompt: &str, schema: &Value, options: &GenerationOptions) -> Result<Value> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "tools": [{"functionDeclarations": [function_declaration(
                EXTRACT_FUNCTION,
                "Extract structured data from the document.",
                schema,
            )]}],
            "toolConfig": {"functionCallingConfig": {
                "mode": "ANY",
                "allowedFunctionNames": [EXTRACT_FUNCTION],
            }},
            "generationConfig": Self::generation_config(options),
        });

        let response = send_json(PROVIDER, self.post(&Self::generate_url(&options.model), &body)).await?;

        GeminiLanguage
            .parse_tool_calls(&response)?
            .into_iter()
            .find(|call| call.name == EXTRACT_FUNCTION)
            .map(|call| Value::Object(call.arguments.into_iter().collect()))
            .ok_or_else(|| AgentError::SchemaViolation("Gemini returned no structured output".into()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let request = self
            .client
            .get(self.url("models"))
            .header("x-goog-api-key", &self.api_key);
        let response = send_json(PROVIDER, request).await?;

        Ok(response
            .get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        let id = m.get("name")?.as_str()?;
                        let id = id.strip_prefix("models/").unwrap_or(id);
                        Some(ModelInfo {
                            id: id.to_string(),
                            name: m
                                .get("displayName")
                                .and_then(Value::as_str)
                                .unwrap_or(id)
                                .to_string(),
                            context_length: m
                                .get("inputTokenLimit")
                                .and_then(Value::as_u64)
                                .and_then(|n| u32::try_from(n).ok()),
                        })
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
            .param(
                ParameterSchema::optional("notes", ParamType::Array, "Notes")
                    .with_items(json!({"type": "string"}))
                    .with_default(json!([])),
            )
    }

    #[test]
    fn test_config_requires_key() {
        let config = GeminiConfig::from_lookup(|_| None);
        assert!(matches!(GeminiProvider::from_config(config), Err(AgentError::Config(_))));

        let env = HashMap::from([("GOOGLE_API_KEY", "abc")]);
        let config = GeminiConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_openapi_schema_conversion() {
        let converted = to_openapi_schema(&json!({
            "type": "object",
            "properties": {
                "total": {"type": ["number", "null"], "description": "Total"},
                "items": {"type": "array", "items": {"type": "string"}, "default": []}
            },
            "required": ["total"],
            "additionalProperties": false
        }));
        assert_eq!(converted["type"], "OBJECT");
        assert_eq!(converted["properties"]["total"]["type"], "NUMBER");
        assert_eq!(converted["properties"]["total"]["nullable"], true);
        assert_eq!(converted["properties"]["items"]["items"]["type"], "STRING");
        assert!(converted["properties"]["items"].get("default").is_none());
        assert!(converted.get("additionalProperties").is_none());
    }

    #[test]
    fn test_language_round_trip() {
        let described = GeminiLanguage.describe(&[store_spec()]);
        let declaration = &described[0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "store_invoice");
        assert_eq!(declaration["parameters"]["properties"]["invoice_data"]["type"], "OBJECT");
        assert_eq!(declaration["parameters"]["required"], json!(["invoice_data"]));

        let response = json!({"candidates": [{"content": {"role": "model", "parts": [
            {"text": "Storing now."},
            {"functionCall": {"name": declaration["name"], "args": {"invoice_data": {"invoice_number": "INV-001"}}}}
        ]}}]});
        let calls = GeminiLanguage.parse_tool_calls(&response).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "store_invoice");
        assert_eq!(calls[0].arguments["invoice_data"]["invoice_number"], "INV-001");
        assert_eq!(candidate_text(&response), "Storing now.");
    }

    #[test]
    fn test_tool_results_are_grouped() {
        let calls = vec![
            ToolCall::new("a", HashMap::new()).with_id("1"),
            ToolCall::new("b", HashMap::new()).with_id("2"),
        ];
        let messages = vec![
            Message::user("go"),
            Message::assistant_tool_calls("", calls),
            Message::tool(&ToolResult::success("a", "ok")),
            Message::tool(&ToolResult::failure("b", "boom")),
        ];

        let contents = GeminiProvider::convert_messages(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"].as_array().unwrap().len(), 2);
        let responses = contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1]["functionResponse"]["name"], "b");
        assert_eq!(responses[1]["functionResponse"]["response"]["error"], "boom");
    }

    #[test]
    fn test_generate_url() {
        assert_eq!(GeminiProvider::generate_url("gemini-2.0-flash"), "models/gemini-2.0-flash:generateContent");
        assert_eq!(GeminiProvider::generate_url("models/gemini-pro"), "models/gemini-pro:generateContent");
    }
}
