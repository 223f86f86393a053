//! Action Language Adapters
//!
//! An [`ActionLanguage`] translates [`ToolSpec`]s into the schema a provider
//! expects for function calling, and translates the provider's raw response
//! back into [`ToolCall`]s. Swapping providers means swapping the adapter and
//! the [`LlmProvider`](crate::provider::LlmProvider); the agent loop only
//! ever sees specs and calls.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::{AgentError, Result};
use crate::tool::{ToolCall, ToolSpec};

/// Provider-specific tool schema translation
pub trait ActionLanguage: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Deterministic provider schema for the given tools
    fn describe(&self, tools: &[ToolSpec]) -> Value;

    /// Extract tool calls from a raw provider response.
    /// Plain text responses yield an empty vector.
    fn parse_tool_calls(&self, response: &Value) -> Result<Vec<ToolCall>>;

    /// Tool description to append to the system prompt, for providers that
    /// receive tools as text rather than through a native field
    fn system_prompt_section(&self, _tools: &[ToolSpec]) -> Option<String> {
        None
    }
}

/// JSON Schema object describing a tool's parameters
pub fn parameters_schema(spec: &ToolSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &spec.parameters {
        properties.insert(param.name.clone(), param.to_json_schema());
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Tool arguments as sent by providers: either an object or a JSON-encoded
/// object string. `null` means no arguments.
pub fn parse_arguments(raw: &Value) -> Result<HashMap<String, Value>> {
    match raw {
        Value::Null => Ok(HashMap::new()),
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::String(encoded) if encoded.trim().is_empty() => Ok(HashMap::new()),
        Value::String(encoded) => {
            let decoded: Value = serde_json::from_str(encoded)
                .map_err(|e| AgentError::Parse(format!("tool arguments are not valid JSON: {}", e)))?;
            match decoded {
                Value::Object(_) => parse_arguments(&decoded),
                other => Err(AgentError::Parse(format!("tool arguments must be an object, got {}", other))),
            }
        }
        other => Err(AgentError::Parse(format!("tool arguments must be an object, got {}", other))),
    }
}

/// Generic JSON-Schema function declarations
///
/// Describes tools as `{name, description, parameters}` and parses
/// `{"tool_calls": [{"id", "name", "arguments"}]}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSchemaLanguage;

impl ActionLanguage for JsonSchemaLanguage {
    fn name(&self) -> &str {
        "json-schema"
    }

    fn describe(&self, tools: &[ToolSpec]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|spec| {
                    json!({
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": parameters_schema(spec),
                    })
                })
                .collect(),
        )
    }

    fn parse_tool_calls(&self, response: &Value) -> Result<Vec<ToolCall>> {
        let Some(calls) = response.get("tool_calls") else {
            return Ok(Vec::new());
        };
        let calls = calls
            .as_array()
            .ok_or_else(|| AgentError::Parse("tool_calls must be an array".into()))?;

        calls
            .iter()
            .map(|call| {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::Parse("tool call without a name".into()))?;
                let arguments = parse_arguments(call.get("arguments").unwrap_or(&Value::Null))?;
                let mut parsed = ToolCall::new(name, arguments);
                parsed.id = call.get("id").and_then(Value::as_str).map(str::to_string);
                Ok(parsed.ensure_id())
            })
            .collect()
    }
}

const TOOL_BLOCK_START: &str = "```tool";
const TOOL_BLOCK_END: &str = "```";

/// Text protocol for models without native tool calling
///
/// Tools are listed in the system prompt and the model answers with a
/// fenced block:
///
/// ````text
/// ```tool
/// {"tool": "tool_name", "arguments": {"arg": "value"}}
/// ```
/// ````
///
/// The response passed to [`ActionLanguage::parse_tool_calls`] is the model's
/// text as a JSON string.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextBlockLanguage;

impl TextBlockLanguage {
    fn parse_text(content: &str) -> Option<ToolCall> {
        // Look for ```tool ... ``` blocks
        if let Some(start_idx) = content.find(TOOL_BLOCK_START) {
            let after_marker = &content[start_idx + TOOL_BLOCK_START.len()..];
            if let Some(end_idx) = after_marker.find(TOOL_BLOCK_END) {
                if let Some(call) = Self::decode_call(after_marker[..end_idx].trim()) {
                    return Some(call);
                }
            }
        }

        // Fallback: raw JSON object with a "tool" key
        if !content.contains(r#""tool""#) {
            return None;
        }
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end <= start {
            return None;
        }
        Self::decode_call(&content[start..=end])
    }

    fn decode_call(json_str: &str) -> Option<ToolCall> {
        let raw: Value = serde_json::from_str(json_str).ok()?;
        let name = raw.get("tool").or_else(|| raw.get("name"))?.as_str()?;
        let arguments = parse_arguments(raw.get("arguments").unwrap_or(&Value::Null)).ok()?;

        let call = ToolCall::new(name, arguments);
        Some(match raw.get("id").and_then(Value::as_str) {
            Some(id) => call.with_id(id),
            None => call,
        })
    }
}

impl ActionLanguage for TextBlockLanguage {
    fn name(&self) -> &str {
        "text-block"
    }

    fn describe(&self, tools: &[ToolSpec]) -> Value {
        Value::String(self.system_prompt_section(tools).unwrap_or_default())
    }

    fn parse_tool_calls(&self, response: &Value) -> Result<Vec<ToolCall>> {
        let content = response.as_str().unwrap_or_default();
        Ok(Self::parse_text(content)
            .map(|call| vec![call.ensure_id()])
            .unwrap_or_default())
    }

    fn system_prompt_section(&self, tools: &[ToolSpec]) -> Option<String> {
        if tools.is_empty() {
            return None;
        }

        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
        prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");
        prompt.push_str("Call one tool per response. When you are finished, reply with plain text.\n\n");

        for spec in tools {
            prompt.push_str(&format!("### {}\n", spec.name));
            prompt.push_str(&format!("{}\n", spec.description));

            if !spec.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &spec.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}\n",
                        param.name, param.param_type, required, param.description
                    ));
                }
            }
            prompt.push('\n');
        }

        Some(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ParamType, ParameterSchema};

    fn store_spec() -> ToolSpec {
        ToolSpec::new("store_invoice", "Store an invoice")
            .param(ParameterSchema::required("invoice_data", ParamType::Object, "Extracted invoice"))
            .param(ParameterSchema::optional("overwrite", ParamType::Boolean, "Replace existing"))
            .tags(["invoices", "storage"])
    }

    fn arguments() -> HashMap<String, Value> {
        serde_json::from_value(json!({
            "invoice_data": {"invoice_number": "INV-001", "total": 100.0},
            "overwrite": true
        }))
        .unwrap()
    }

    #[test]
    fn test_describe_preserves_required_and_descriptions() {
        let described = JsonSchemaLanguage.describe(&[store_spec()]);
        let tool = &described[0];
        assert_eq!(tool["name"], "store_invoice");
        assert_eq!(tool["parameters"]["properties"]["invoice_data"]["type"], "object");
        assert_eq!(
            tool["parameters"]["properties"]["invoice_data"]["description"],
            "Extracted invoice"
        );
        assert_eq!(tool["parameters"]["properties"]["overwrite"]["type"], "boolean");
        assert_eq!(tool["parameters"]["required"], json!(["invoice_data"]));

        // deterministic
        assert_eq!(described, JsonSchemaLanguage.describe(&[store_spec()]));
    }

    #[test]
    fn test_json_schema_round_trip() {
        let described = JsonSchemaLanguage.describe(&[store_spec()]);
        let name = described[0]["name"].clone();
        let response = json!({"tool_calls": [{"id": "c1", "name": name, "arguments": arguments()}]});

        let calls = JsonSchemaLanguage.parse_tool_calls(&response).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "store_invoice");
        assert_eq!(calls[0].arguments, arguments());
        assert_eq!(calls[0].id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_json_schema_string_arguments_and_plain_text() {
        let encoded = serde_json::to_string(&arguments()).unwrap();
        let response = json!({"tool_calls": [{"name": "store_invoice", "arguments": encoded}]});
        let calls = JsonSchemaLanguage.parse_tool_calls(&response).unwrap();
        assert_eq!(calls[0].arguments, arguments());
        assert!(calls[0].id.is_some());

        let plain = json!({"content": "All done."});
        assert!(JsonSchemaLanguage.parse_tool_calls(&plain).unwrap().is_empty());

        let broken = json!({"tool_calls": [{"name": "x", "arguments": "{not json"}]});
        assert!(matches!(
            JsonSchemaLanguage.parse_tool_calls(&broken),
            Err(AgentError::Parse(_))
        ));
    }

    #[test]
    fn test_text_block_round_trip() {
        let section = TextBlockLanguage.system_prompt_section(&[store_spec()]).unwrap();
        assert!(section.contains("### store_invoice"));
        assert!(section.contains("`invoice_data` (object) (required)"));

        let content = format!(
            "Let me store that.\n```tool\n{}\n```",
            json!({"tool": "store_invoice", "arguments": arguments()})
        );
        let calls = TextBlockLanguage.parse_tool_calls(&Value::String(content)).unwrap();
        assert_eq!(calls[0].name, "store_invoice");
        assert_eq!(calls[0].arguments, arguments());
    }

    #[test]
    fn test_text_block_string_arguments() {
        let encoded = serde_json::to_string(&arguments()).unwrap();
        let content = format!(
            "```tool\n{}\n```",
            json!({"tool": "store_invoice", "arguments": encoded, "id": "t1"})
        );
        let calls = TextBlockLanguage.parse_tool_calls(&Value::String(content)).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, arguments());
        assert_eq!(calls[0].id.as_deref(), Some("t1"));

        let broken = Value::String("```tool\n{\"tool\": \"store_invoice\", \"arguments\": \"{not json\"}\n```".into());
        assert!(TextBlockLanguage.parse_tool_calls(&broken).unwrap().is_empty());
    }

    #[test]
    fn test_text_block_inline_and_plain() {
        let inline = Value::String(r#"Sure: {"tool": "store_invoice", "arguments": {}}"#.into());
        assert_eq!(TextBlockLanguage.parse_tool_calls(&inline).unwrap().len(), 1);

        let plain = Value::String("Invoice INV-001 stored.".into());
        assert!(TextBlockLanguage.parse_tool_calls(&plain).unwrap().is_empty());
        assert!(TextBlockLanguage.system_prompt_section(&[]).is_none());
    }
}
