//! Tool System
//!
//! Tools are registered explicitly on a [`ToolRegistry`] and invoked by the
//! agent loop. Each tool publishes a [`ToolSpec`] (name, parameters, tags)
//! which action language adapters translate into provider schemas.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Deserialize the arguments into a typed struct
    pub fn parse_args<A: DeserializeOwned>(&self) -> Result<A> {
        let raw: serde_json::Map<String, Value> = self
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(Value::Object(raw))
            .map_err(|e| AgentError::Argument(format!("{}: {}", self.name, e)))
    }

    /// Assign a fresh call ID if the provider did not supply one
    pub fn ensure_id(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(uuid::Uuid::new_v4().to_string());
        }
        self
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// JSON payload fed back to the LLM as the tool turn content
    pub fn to_payload(&self) -> Value {
        if self.success {
            match &self.data {
                Some(data) => serde_json::json!({ "result": data }),
                None => serde_json::json!({ "result": self.output }),
            }
        } else {
            serde_json::json!({ "error": self.output })
        }
    }
}

/// Declared-schema primitive type of a tool parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No declared type; any JSON value
    Any,
}

impl ParamType {
    /// JSON Schema type keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }

    /// Map a JSON Schema type keyword; unknown keywords fall back to string
    pub fn from_json_type(ty: &str) -> Self {
        match ty {
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            _ => ParamType::String,
        }
    }

    /// Whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    /// Element schema for array parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required,
            default: None,
            enum_values: None,
            items: None,
        }
    }

    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self::new(name, param_type, description, true)
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self::new(name, param_type, description, false)
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_items(mut self, items: Value) -> Self {
        self.items = Some(items);
        self
    }

    /// JSON Schema fragment for this parameter
    pub fn to_json_schema(&self) -> Value {
        let mut schema = serde_json::Map::new();
        if self.param_type != ParamType::Any {
            schema.insert("type".into(), Value::String(self.param_type.as_str().into()));
        }
        if !self.description.is_empty() {
            schema.insert("description".into(), Value::String(self.description.clone()));
        }
        if let Some(values) = &self.enum_values {
            schema.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(items) = &self.items {
            schema.insert("items".into(), items.clone());
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        Value::Object(schema)
    }
}

/// Registered tool metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions, in declaration order
    pub parameters: Vec<ParameterSchema>,

    /// Tags for grouping and filtering
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether this spec survives a tag filter; an absent or empty filter keeps everything
    pub fn matches_tags(&self, tags: Option<&BTreeSet<String>>) -> bool {
        match tags {
            Some(wanted) if !wanted.is_empty() => !self.tags.is_disjoint(wanted),
            _ => true,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Derive parameter descriptors from a typed argument struct.
    ///
    /// Field doc comments become descriptions, `Option<T>` fields are
    /// optional and `Vec<T>` fields carry their element schema.
    pub fn from_args<A: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let root = serde_json::to_value(schemars::schema_for!(A)).unwrap_or_default();
        let required: BTreeSet<&str> = root
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut spec = Self::new(name, description);
        if let Some(properties) = root.get("properties").and_then(Value::as_object) {
            for (param_name, raw) in properties {
                let schema = resolve_ref(&root, raw);
                let mut param = ParameterSchema::new(
                    param_name.clone(),
                    param_type_of(&schema),
                    raw.get("description")
                        .or_else(|| schema.get("description"))
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    required.contains(param_name.as_str()),
                );
                if let Some(values) = schema.get("enum").and_then(Value::as_array) {
                    param.enum_values = Some(values.clone());
                }
                if let Some(default) = raw.get("default") {
                    param.default = Some(default.clone());
                }
                if param.param_type == ParamType::Array {
                    if let Some(items) = schema.get("items") {
                        param.items = Some(resolve_ref(&root, items));
                    }
                }
                spec.parameters.push(param);
            }
        }
        spec
    }
}

/// Follow a local `$ref` (directly or through a single-element `allOf`)
fn resolve_ref(root: &Value, schema: &Value) -> Value {
    let reference = schema
        .get("$ref")
        .or_else(|| {
            schema
                .get("allOf")
                .and_then(Value::as_array)
                .and_then(|all| all.first())
                .and_then(|first| first.get("$ref"))
        })
        .and_then(Value::as_str);

    match reference.and_then(|r| r.strip_prefix("#/definitions/")) {
        Some(def) => root
            .get("definitions")
            .and_then(|d| d.get(def))
            .cloned()
            .unwrap_or_else(|| schema.clone()),
        None => schema.clone(),
    }
}

fn param_type_of(schema: &Value) -> ParamType {
    match schema.get("type") {
        Some(Value::String(ty)) => ParamType::from_json_type(ty),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .map_or(ParamType::String, ParamType::from_json_type),
        _ if schema.get("enum").is_some() => ParamType::String,
        _ if schema.get("properties").is_some() => ParamType::Object,
        // `serde_json::Value` fields
        _ => ParamType::Any,
    }
}

/// Check arguments against a spec and fill in defaults.
///
/// Absent optional parameters with a default receive it; `null` counts as
/// absent.
pub fn validate_arguments(
    spec: &ToolSpec,
    arguments: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>> {
    let mut validated = arguments.clone();

    for param in &spec.parameters {
        match arguments.get(&param.name).filter(|v| !v.is_null()) {
            None if param.required => {
                return Err(AgentError::Argument(format!(
                    "{}: missing required parameter '{}'",
                    spec.name, param.name
                )));
            }
            None => {
                if let Some(default) = &param.default {
                    validated.insert(param.name.clone(), default.clone());
                }
            }
            Some(value) => {
                if !param.param_type.accepts(value) {
                    return Err(AgentError::Argument(format!(
                        "{}: parameter '{}' must be of type {}",
                        spec.name, param.name, param.param_type
                    )));
                }
                if let Some(allowed) = &param.enum_values {
                    if !allowed.contains(value) {
                        return Err(AgentError::Argument(format!(
                            "{}: parameter '{}' must be one of {}",
                            spec.name,
                            param.name,
                            Value::Array(allowed.clone())
                        )));
                    }
                }
            }
        }
    }

    Ok(validated)
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Metadata used for registration and provider schemas
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with validated arguments
    async fn execute(&self, call: &ToolCall, ctx: &ActionContext) -> Result<Value>;
}

/// Tool backed by an async function over a typed argument struct
pub struct FnTool<A, F> {
    spec: ToolSpec,
    handler: F,
    _args: PhantomData<fn(A)>,
}

impl<A, F, Fut> FnTool<A, F>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(A, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self {
        Self {
            spec: ToolSpec::from_args::<A>(name, description),
            handler,
            _args: PhantomData,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec = self.spec.tags(tags);
        self
    }
}

#[async_trait]
impl<A, F, Fut> Tool for FnTool<A, F>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(A, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn execute(&self, call: &ToolCall, ctx: &ActionContext) -> Result<Value> {
        let args: A = call.parse_args()?;
        (self.handler)(args, ctx.clone()).await
    }
}

struct RegisteredTool {
    spec: ToolSpec,
    tool: Arc<dyn Tool>,
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let spec = tool.spec();
        if self.tools.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool(spec.name));
        }
        tracing::debug!(tool = %spec.name, tags = ?spec.tags, "Registered tool");
        self.tools.insert(spec.name.clone(), RegisteredTool { spec, tool });
        Ok(())
    }

    /// Register an async function taking a typed argument struct
    pub fn register_fn<A, F, Fut, I, S>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        tags: I,
        handler: F,
    ) -> Result<()>
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(A, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(FnTool::new(name, description, handler).with_tags(tags))
    }

    /// Get a tool's spec by name
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|entry| &entry.spec)
    }

    /// Specs whose tags intersect `tags`; all specs when `tags` is absent or empty
    pub fn get_tools(&self, tags: Option<&BTreeSet<String>>) -> Vec<ToolSpec> {
        self.tools
            .values()
            .filter(|entry| entry.spec.matches_tags(tags))
            .map(|entry| entry.spec.clone())
            .collect()
    }

    /// Specs carrying a single tag
    pub fn get_tools_by_tag(&self, tag: &str) -> Vec<ToolSpec> {
        self.get_tools(Some(&BTreeSet::from([tag.to_string()])))
    }

    /// Invoke a tool by name
    pub async fn invoke(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
        ctx: &ActionContext,
    ) -> Result<Value> {
        self.execute(&ToolCall::new(name, arguments), ctx).await
    }

    /// Execute a tool call
    pub async fn execute(&self, call: &ToolCall, ctx: &ActionContext) -> Result<Value> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        let arguments = validate_arguments(&entry.spec, &call.arguments)?;
        let validated = ToolCall {
            name: call.name.clone(),
            arguments,
            id: call.id.clone(),
        };

        entry.tool.execute(&validated, ctx).await
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct GreetArgs {
        /// Who to greet
        name: String,
        /// How many times
        times: Option<u32>,
        /// Extra words
        #[serde(default)]
        words: Vec<String>,
    }

    fn greet_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn("greet", "Say hello.", ["social"], |args: GreetArgs, ctx: ActionContext| async move {
                ctx.set("last_greeted", json!(args.name));
                let times = args.times.unwrap_or(1) as usize;
                Ok(json!(format!("Hello {}", args.name).repeat(times)))
            })
            .unwrap();
        registry
    }

    fn args(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_spec_from_args() {
        let spec = ToolSpec::from_args::<GreetArgs>("greet", "Say hello.");
        assert_eq!(spec.name, "greet");

        let name = spec.parameters.iter().find(|p| p.name == "name").unwrap();
        assert_eq!(name.param_type, ParamType::String);
        assert!(name.required);
        assert_eq!(name.description, "Who to greet");

        let times = spec.parameters.iter().find(|p| p.name == "times").unwrap();
        assert_eq!(times.param_type, ParamType::Integer);
        assert!(!times.required);

        let words = spec.parameters.iter().find(|p| p.name == "words").unwrap();
        assert_eq!(words.param_type, ParamType::Array);
        assert_eq!(words.items.as_ref().unwrap()["type"], "string");
    }

    #[tokio::test]
    async fn test_invoke_registered_fn() {
        let registry = greet_registry();
        let ctx = ActionContext::new();

        let out = registry
            .invoke("greet", args(json!({"name": "Ada", "times": 2})), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!("Hello AdaHello Ada"));
        assert_eq!(ctx.get("last_greeted"), Some(json!("Ada")));
    }

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        /// Anything to echo back
        value: Value,
    }

    #[tokio::test]
    async fn test_untyped_value_parameter_accepts_any_json() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn("echo", "Echo a value.", ["debug"], |args: EchoArgs, _ctx: ActionContext| async move {
                Ok(args.value)
            })
            .unwrap();

        let param = &registry.get("echo").unwrap().parameters[0];
        assert_eq!(param.param_type, ParamType::Any);
        assert!(param.required);
        assert!(param.to_json_schema().get("type").is_none());

        let ctx = ActionContext::new();
        for value in [json!(1), json!("one"), json!([1, 2]), json!({"n": 1}), json!(true)] {
            let out = registry
                .invoke("echo", args(json!({"value": value.clone()})), &ctx)
                .await
                .unwrap();
            assert_eq!(out, value);
        }

        let err = registry.invoke("echo", HashMap::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Argument(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = greet_registry();
        for name in ["", "nope", "GREET", "greet "] {
            let err = registry
                .invoke(name, HashMap::new(), &ActionContext::new())
                .await
                .unwrap_err();
            assert!(matches!(err, AgentError::UnknownTool(ref n) if n == name));
        }
    }

    #[tokio::test]
    async fn test_missing_and_mistyped_arguments() {
        let registry = greet_registry();
        let ctx = ActionContext::new();

        let err = registry.invoke("greet", HashMap::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Argument(_)));

        let err = registry
            .invoke("greet", args(json!({"name": 7})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Argument(_)));

        let err = registry
            .invoke("greet", args(json!({"name": "Ada", "times": "two"})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Argument(_)));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = greet_registry();
        let err = registry
            .register_fn("greet", "Again.", Vec::<String>::new(), |_: GreetArgs, _| async { Ok(Value::Null) })
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref n) if n == "greet"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_tools_by_tags() {
        let mut registry = ToolRegistry::new();
        for (name, tags) in [
            ("tagged_a", vec!["alpha", "beta"]),
            ("tagged_b", vec!["beta"]),
            ("tagged_c", vec!["gamma"]),
        ] {
            registry
                .register_fn(name, "", tags, |_: GreetArgs, _| async { Ok(Value::Null) })
                .unwrap();
        }

        let names = |specs: Vec<ToolSpec>| specs.into_iter().map(|s| s.name).collect::<Vec<_>>();

        assert_eq!(names(registry.get_tools_by_tag("beta")), vec!["tagged_a", "tagged_b"]);
        assert_eq!(names(registry.get_tools(None)).len(), 3);
        assert_eq!(names(registry.get_tools(Some(&BTreeSet::new()))).len(), 3);

        let wanted = BTreeSet::from(["alpha".to_string(), "gamma".to_string()]);
        assert_eq!(names(registry.get_tools(Some(&wanted))), vec!["tagged_a", "tagged_c"]);
        assert!(registry.get("tagged_b").unwrap().has_tag("beta"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_validate_fills_defaults_and_checks_enum() {
        let spec = ToolSpec::new("datetime", "Get the time")
            .param(
                ParameterSchema::optional("format", ParamType::String, "Output format")
                    .with_default(json!("human"))
                    .with_enum(vec![json!("iso"), json!("human")]),
            );

        let filled = validate_arguments(&spec, &HashMap::new()).unwrap();
        assert_eq!(filled["format"], json!("human"));

        let err = validate_arguments(&spec, &args(json!({"format": "unix"}))).unwrap_err();
        assert!(matches!(err, AgentError::Argument(_)));
    }

    #[test]
    fn test_tool_result_payload() {
        let ok = ToolResult::success("t", "done").with_data(json!({"n": 1}));
        assert_eq!(ok.to_payload(), json!({"result": {"n": 1}}));
        let failed = ToolResult::failure("t", "boom");
        assert_eq!(failed.to_payload(), json!({"error": "boom"}));
    }
}
