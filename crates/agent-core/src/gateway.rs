//! LLM Gateway
//!
//! Wraps an [`LlmProvider`] with the call policy every exchange needs: a
//! per-attempt timeout, bounded retry with exponential backoff for transient
//! provider failures, and schema validation (with one retry) for structured
//! extraction.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Number, Value};

use crate::error::{AgentError, Result};
use crate::language::ActionLanguage;
use crate::message::Message;
use crate::provider::{Completion, CompletionRequest, GenerationOptions, LlmProvider};
use crate::tool::ToolSpec;

/// Extra attempts allowed when structured output fails validation
const STRUCTURED_OUTPUT_RETRIES: usize = 1;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

/// Gateway call policy
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound for a single provider call
    pub timeout: Duration,

    /// Retry policy for retryable provider errors
    pub retry: RetryConfig,

    /// Options used for structured extraction
    pub extraction: GenerationOptions,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
            extraction: GenerationOptions {
                temperature: 0.0,
                ..Default::default()
            },
        }
    }
}

/// Single entry point for all LLM traffic
pub struct Gateway {
    provider: Arc<dyn LlmProvider>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GatewayConfig) -> Self {
        Self { provider, config }
    }

    pub fn with_defaults(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, GatewayConfig::default())
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Adapter of the underlying provider
    pub fn language(&self) -> &dyn ActionLanguage {
        self.provider.language()
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await.unwrap_or(false)
    }

    /// Ask the model for its next step
    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolSpec],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            messages: history.to_vec(),
            tools: tools.to_vec(),
            options: options.clone(),
        };

        self.with_retry("complete", || self.provider.complete(&request))
            .await
    }

    /// Schema-constrained single-shot extraction.
    ///
    /// The provider output is coerced toward the schema and validated. One
    /// further attempt is made on violation; a second violation is returned
    /// as [`AgentError::SchemaViolation`].
    pub async fn extract_structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| AgentError::Config(format!("invalid extraction schema: {}", e)))?;

        let mut violation = String::new();
        for attempt in 0..=STRUCTURED_OUTPUT_RETRIES {
            let raw = match self
                .with_retry("extract", || self.provider.extract(prompt, schema, &self.config.extraction))
                .await
            {
                Ok(raw) => raw,
                Err(AgentError::SchemaViolation(msg)) => {
                    tracing::warn!(attempt, error = %msg, "Structured output rejected by provider adapter");
                    violation = msg;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let coerced = coerce_to_schema(raw, schema);
            let errors: Vec<String> = validator
                .iter_errors(&coerced)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() { e.to_string() } else { format!("{}: {}", path, e) }
                })
                .collect();
            if errors.is_empty() {
                return Ok(coerced);
            }

            violation = errors.join("; ");
            tracing::warn!(attempt, error = %violation, "Structured output does not match schema");
        }

        Err(AgentError::SchemaViolation(violation))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.config.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(self.config.timeout)),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    tracing::warn!(operation, attempt = attempt + 1, error = %e, ?delay, "Retrying provider call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Nudge a provider value toward `schema`.
///
/// Numeric strings (`"$1,500.00"`) become numbers, `"true"`/`"false"` become
/// booleans, numbers and booleans in string fields become strings, and `null`
/// properties that are not required are dropped.
/// Anything that cannot be coerced is left for validation to report.
pub fn coerce_to_schema(value: Value, schema: &Value) -> Value {
    let types = schema_types(schema);
    let expects = |ty: &str| types.iter().any(|t| t == ty);

    match value {
        Value::String(text) if expects("number") || expects("integer") => {
            parse_number(&text, expects("integer") && !expects("number")).map_or(Value::String(text), Value::Number)
        }
        Value::Number(n) if expects("string") && !expects("number") && !expects("integer") => {
            Value::String(n.to_string())
        }
        Value::Bool(b) if expects("string") && !expects("boolean") => Value::String(b.to_string()),
        Value::String(text) if expects("boolean") => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Value::Bool(true),
            "false" | "no" => Value::Bool(false),
            _ => Value::String(text),
        },
        Value::Object(map) => {
            let properties = schema.get("properties").and_then(Value::as_object);
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let mut coerced = Map::new();
            for (key, child) in map {
                if child.is_null() && !required.contains(&key.as_str()) {
                    continue;
                }
                let child = match properties.and_then(|p| p.get(&key)) {
                    Some(child_schema) => coerce_to_schema(child, child_schema),
                    None => child,
                };
                coerced.insert(key, child);
            }
            Value::Object(coerced)
        }
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) => Value::Array(
                items
                    .into_iter()
                    .map(|item| coerce_to_schema(item, item_schema))
                    .collect(),
            ),
            None => Value::Array(items),
        },
        other => other,
    }
}

fn schema_types(schema: &Value) -> Vec<String> {
    match schema.get("type") {
        Some(Value::String(ty)) => vec![ty.to_ascii_lowercase()],
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_ascii_lowercase)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_number(text: &str, integer: bool) -> Option<Number> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();

    if integer {
        if let Ok(n) = cleaned.parse::<i64>() {
            return Some(Number::from(n));
        }
        let f = cleaned.parse::<f64>().ok()?;
        return (f.fract() == 0.0 && f.is_finite()).then(|| Number::from_f64(f)).flatten();
    }

    Number::from_f64(cleaned.parse::<f64>().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;
    use crate::provider::LlmResponse;
    use serde_json::json;

    fn invoice_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "invoice_number": {"type": "string"},
                "total": {"type": "number"},
                "line_items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"quantity": {"type": "number"}}
                    }
                }
            },
            "required": ["invoice_number"]
        })
    }

    fn gateway(provider: &ScriptedProvider, retries: u32) -> Gateway {
        Gateway::new(
            Arc::new(provider.clone()),
            GatewayConfig {
                timeout: Duration::from_secs(5),
                retry: RetryConfig::with_retries(retries),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_delay_increases_and_caps() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(5)
        };
        assert!(config.delay_for_attempt(1) > config.delay_for_attempt(0));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(2));
    }

    #[test]
    fn test_coerce_money_strings() {
        let raw = json!({
            "invoice_number": "INV-001",
            "total": "$1,500.00",
            "date": null,
            "line_items": [{"quantity": "40"}]
        });
        let coerced = coerce_to_schema(raw, &invoice_schema());
        assert_eq!(coerced["total"].as_f64(), Some(1500.0));
        assert_eq!(coerced["line_items"][0]["quantity"].as_f64(), Some(40.0));
        assert!(coerced.get("date").is_none());
        assert_eq!(coerced["invoice_number"], "INV-001");
    }

    #[test]
    fn test_coerce_leaves_garbage_for_validation() {
        let coerced = coerce_to_schema(json!({"total": "about a hundred"}), &invoice_schema());
        assert_eq!(coerced["total"], "about a hundred");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_are_retried() {
        let provider = ScriptedProvider::new();
        provider.push_error(AgentError::RateLimited("429".into()));
        provider.push_error(AgentError::ProviderUnavailable("connection reset".into()));
        provider.push_message("ok");

        let completion = gateway(&provider, 2)
            .complete("sys", &[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.response, LlmResponse::Message("ok".into()));
        assert_eq!(provider.complete_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let provider = ScriptedProvider::new();
        for _ in 0..5 {
            provider.push_error(AgentError::ProviderUnavailable("down".into()));
        }

        let err = gateway(&provider, 2)
            .complete("sys", &[], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
        assert_eq!(provider.complete_calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let provider = ScriptedProvider::new();
        provider.push_error(AgentError::Auth("bad key".into()));
        provider.push_message("never reached");

        let err = gateway(&provider, 3)
            .complete("sys", &[], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Auth(_)));
        assert_eq!(provider.complete_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_provider_error() {
        let provider = ScriptedProvider::new().with_latency(Duration::from_secs(30));
        provider.push_message("late");

        let err = gateway(&provider, 0)
            .complete("sys", &[], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
        assert!(err.is_provider_error());
    }

    #[tokio::test]
    async fn test_extract_coerces_and_validates() {
        let provider = ScriptedProvider::new();
        provider.push_extraction(json!({"invoice_number": "INV-001", "total": "$100.00"}));

        let value = gateway(&provider, 0)
            .extract_structured("Invoice #INV-001", &invoice_schema())
            .await
            .unwrap();
        assert_eq!(value["total"].as_f64(), Some(100.0));
        assert_eq!(provider.extract_calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_retries_once_then_fails() {
        let provider = ScriptedProvider::new();
        provider.push_extraction(json!({"total": 1}));
        provider.push_extraction(json!({"invoice_number": ["INV-003"]}));
        provider.push_extraction(json!({"invoice_number": "INV-003"}));

        let err = gateway(&provider, 0)
            .extract_structured("text", &invoice_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SchemaViolation(ref msg) if msg.contains("/invoice_number")));
        assert_eq!(provider.extract_calls(), 2);
    }

    #[test]
    fn test_coerce_scalars_into_string_fields() {
        let schema = json!({
            "type": "object",
            "properties": {
                "invoice_number": {"type": "string"},
                "paid": {"type": "string"},
                "total": {"type": ["number", "string"]}
            }
        });
        let coerced = coerce_to_schema(json!({"invoice_number": 12345, "paid": true, "total": 9.5}), &schema);
        assert_eq!(coerced["invoice_number"], "12345");
        assert_eq!(coerced["paid"], "true");
        assert_eq!(coerced["total"].as_f64(), Some(9.5));
    }

    #[tokio::test]
    async fn test_extract_numeric_invoice_number() {
        let provider = ScriptedProvider::new();
        provider.push_extraction(json!({"invoice_number": 12345, "total": 100}));

        let value = gateway(&provider, 0)
            .extract_structured("Invoice 12345", &invoice_schema())
            .await
            .unwrap();
        assert_eq!(value["invoice_number"], "12345");
        assert_eq!(provider.extract_calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_second_attempt_succeeds() {
        let provider = ScriptedProvider::new();
        provider.push_extraction_error(AgentError::SchemaViolation("no structured output".into()));
        provider.push_extraction(json!({"invoice_number": "INV-002"}));

        let value = gateway(&provider, 0)
            .extract_structured("text", &invoice_schema())
            .await
            .unwrap();
        assert_eq!(value["invoice_number"], "INV-002");
    }
}
