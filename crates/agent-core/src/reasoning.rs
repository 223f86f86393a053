//! Reasoning Loop
//!
//! The agent alternates between asking the model for its next step
//! (`Thinking`) and running the tools it requested (`ExecutingTools`) until
//! the model answers in plain text or the iteration cap is hit.
//!
//! ```text
//! Start ─► Thinking ─► Done
//!             │  ▲
//!             ▼  │
//!        ExecutingTools ─► Failed (iteration cap)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::error::{AgentError, Result};
use crate::gateway::{Gateway, GatewayConfig};
use crate::goal::{Goal, render_goals};
use crate::message::{AgentState, Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider, LlmResponse};
use crate::tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSpec};

/// How the agent recognises that the model is finished
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Any reply without tool calls ends the run
    #[default]
    PlainText,

    /// The reply must contain the marker; it is stripped from the final text.
    /// Replies without it get a nudge and count as a cycle.
    DoneMarker(String),
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Maximum think/execute cycles before giving up
    pub max_iterations: usize,

    /// Only offer tools carrying one of these tags (all tools when `None`)
    pub tool_tags: Option<BTreeSet<String>>,

    pub termination: TerminationPolicy,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_tags: None,
            termination: TerminationPolicy::default(),
            generation: GenerationOptions::default(),
        }
    }
}

/// The main Agent struct
pub struct Agent {
    gateway: Arc<Gateway>,
    tools: Arc<ToolRegistry>,
    goals: Vec<Goal>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        gateway: Arc<Gateway>,
        tools: Arc<ToolRegistry>,
        goals: Vec<Goal>,
        config: AgentConfig,
    ) -> Self {
        Self {
            gateway,
            tools,
            goals,
            config,
        }
    }

    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Tools offered to the model on every turn
    pub fn available_tools(&self) -> Vec<ToolSpec> {
        self.tools.get_tools(self.config.tool_tags.as_ref())
    }

    /// Build the full system prompt: goals, then any text-protocol tool section
    pub fn system_prompt(&self) -> String {
        let mut prompt = render_goals(&self.goals);

        if let Some(section) = self
            .gateway
            .language()
            .system_prompt_section(&self.available_tools())
        {
            prompt.push_str("\n\n");
            prompt.push_str(&section);
        }

        if let TerminationPolicy::DoneMarker(marker) = &self.config.termination {
            prompt.push_str(&format!(
                "\n\nWhen the task is complete, reply with a summary that includes {}.",
                marker
            ));
        }

        prompt
    }

    /// Run the agent on a single user input
    pub async fn process(&self, input: &str, ctx: &ActionContext) -> Result<String> {
        let mut conversation = Conversation::from_user(input);
        self.run(&mut conversation, ctx).await
    }

    /// Drive a conversation to a terminal state.
    ///
    /// A conversation that already reached `Done` returns its final answer
    /// without calling the provider or touching `ctx`.
    pub async fn run(&self, conversation: &mut Conversation, ctx: &ActionContext) -> Result<String> {
        if conversation.is_done() {
            return conversation
                .final_response()
                .map(str::to_string)
                .ok_or_else(|| AgentError::Other("finished conversation has no final response".into()));
        }

        if conversation.state() == AgentState::Failed {
            self.close_unanswered_calls(conversation);
        }

        let system_prompt = self.system_prompt();
        let tools = self.available_tools();

        loop {
            conversation.set_state(AgentState::Thinking);
            let completion = match self
                .gateway
                .complete(&system_prompt, conversation.messages(), &tools, &self.config.generation)
                .await
            {
                Ok(completion) => completion,
                Err(e) => {
                    tracing::error!(error = %e, cycles = conversation.cycles(), "Provider call failed");
                    conversation.set_state(AgentState::Failed);
                    return Err(e);
                }
            };

            match completion.response {
                LlmResponse::Message(text) => {
                    if let Some(answer) = self.finished(&text) {
                        conversation.push(Message::assistant(answer.clone()));
                        conversation.set_state(AgentState::Done);
                        tracing::info!(cycles = conversation.cycles(), "Agent run complete");
                        return Ok(answer);
                    }

                    conversation.push(Message::assistant(text));
                    self.check_budget(conversation)?;
                    conversation.push(Message::user(
                        "Continue with the task. Call a tool if more work is needed.",
                    ));
                    conversation.complete_cycle();
                }
                LlmResponse::ToolCalls(calls) => {
                    conversation.push(Message::assistant_tool_calls(completion.content, calls.clone()));
                    self.check_budget(conversation)?;

                    conversation.set_state(AgentState::ExecutingTools);
                    for call in &calls {
                        let result = self.execute_tool(call, ctx).await;
                        conversation.push(Message::tool(&result));
                    }
                    conversation.complete_cycle();
                }
            }
        }
    }

    fn check_budget(&self, conversation: &mut Conversation) -> Result<()> {
        if conversation.cycles() >= self.config.max_iterations {
            tracing::warn!(max = self.config.max_iterations, "Iteration cap reached");
            conversation.set_state(AgentState::Failed);
            return Err(AgentError::MaxIterationsExceeded(self.config.max_iterations));
        }
        Ok(())
    }

    /// Final answer text if this reply ends the run
    fn finished(&self, text: &str) -> Option<String> {
        match &self.config.termination {
            TerminationPolicy::PlainText => Some(text.to_string()),
            TerminationPolicy::DoneMarker(marker) if text.contains(marker.as_str()) => {
                Some(text.replace(marker.as_str(), "").trim().to_string())
            }
            TerminationPolicy::DoneMarker(_) => None,
        }
    }

    /// Answer tool calls a failed run left without results
    fn close_unanswered_calls(&self, conversation: &mut Conversation) {
        for call in conversation.unanswered_tool_calls() {
            tracing::debug!(tool = %call.name, id = ?call.id, "Closing unanswered tool call");
            let result = ToolResult::failure(&call.name, "not executed: the previous run stopped before this call")
                .with_id(call.id.clone());
            conversation.push(Message::tool(&result));
        }
    }

    /// Execute a tool call; failures become error results for the model.
    ///
    /// Only tools passing the agent's tag filter run; anything else is unknown.
    async fn execute_tool(&self, call: &ToolCall, ctx: &ActionContext) -> ToolResult {
        tracing::debug!(tool = %call.name, id = ?call.id, "Executing tool");

        let offered = self
            .tools
            .get(&call.name)
            .is_some_and(|spec| spec.matches_tags(self.config.tool_tags.as_ref()));
        let outcome = if offered {
            self.tools.execute(call, ctx).await
        } else {
            Err(AgentError::UnknownTool(call.name.clone()))
        };

        match outcome {
            Ok(data) => ToolResult::success(&call.name, "completed")
                .with_data(data)
                .with_id(call.id.clone()),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::failure(&call.name, e.to_string()).with_id(call.id.clone())
            }
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    gateway: Option<Arc<Gateway>>,
    gateway_config: GatewayConfig,
    tools: ToolRegistry,
    shared_tools: Option<Arc<ToolRegistry>>,
    goals: Vec<Goal>,
    config: AgentConfig,
    registration_error: Option<AgentError>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            gateway: None,
            gateway_config: GatewayConfig::default(),
            tools: ToolRegistry::new(),
            shared_tools: None,
            goals: Vec::new(),
            config: AgentConfig::default(),
            registration_error: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use an existing gateway (takes precedence over `provider`)
    pub fn gateway(mut self, gateway: Arc<Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn gateway_config(mut self, config: GatewayConfig) -> Self {
        self.gateway_config = config;
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.registration_error.get_or_insert(e);
        }
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn shared_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.shared_tools = Some(tools);
        self
    }

    pub fn goal(mut self, goal: Goal) -> Self {
        self.goals.push(goal);
        self
    }

    pub fn goals(mut self, goals: impl IntoIterator<Item = Goal>) -> Self {
        self.goals.extend(goals);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn tool_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tool_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn termination(mut self, policy: TerminationPolicy) -> Self {
        self.config.termination = policy;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if let Some(e) = self.registration_error {
            return Err(e);
        }

        let gateway = match (self.gateway, self.provider) {
            (Some(gateway), _) => gateway,
            (None, Some(provider)) => Arc::new(Gateway::new(provider, self.gateway_config)),
            (None, None) => return Err(AgentError::Config("Provider is required".into())),
        };
        let tools = self.shared_tools.unwrap_or_else(|| Arc::new(self.tools));

        Ok(Agent::new(gateway, tools, self.goals, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::mock::ScriptedProvider;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::{Value, json};

    #[derive(Deserialize, JsonSchema)]
    struct RememberArgs {
        key: String,
        value: Value,
    }

    #[derive(Deserialize, JsonSchema)]
    struct FailArgs {
        reason: String,
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools
            .register_fn("remember", "Store a value.", ["memory"], |args: RememberArgs, ctx: ActionContext| async move {
                let previous = ctx.set(&args.key, args.value);
                Ok(json!({"updated": previous.is_some()}))
            })
            .unwrap();
        tools
            .register_fn("fail", "Always fails.", ["debug"], |args: FailArgs, _| async move {
                Err::<Value, _>(AgentError::Validation(args.reason))
            })
            .unwrap();
        tools
    }

    fn agent(provider: &ScriptedProvider, max_iterations: usize) -> Agent {
        Agent::builder()
            .provider(Arc::new(provider.clone()))
            .tools(registry())
            .goal(Goal::new("Persona", "You remember things."))
            .max_iterations(max_iterations)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_text_ends_run() {
        let provider = ScriptedProvider::new();
        provider.push_message("Nothing to do.");

        let ctx = ActionContext::new();
        let answer = agent(&provider, 10).process("hello", &ctx).await.unwrap();

        assert_eq!(answer, "Nothing to do.");
        let request = provider.last_request().unwrap();
        assert!(request.system_prompt.starts_with("## Persona\nYou remember things."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.tools.len(), 2);
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let provider = ScriptedProvider::new();
        provider.push_tool_calls(vec![
            ToolCall::new("remember", serde_json::from_value(json!({"key": "a", "value": 1})).unwrap()).with_id("c1"),
            ToolCall::new("remember", serde_json::from_value(json!({"key": "a", "value": 2})).unwrap()).with_id("c2"),
        ]);
        provider.push_message("Stored.");

        let ctx = ActionContext::new();
        let mut conversation = Conversation::from_user("remember a");
        let answer = agent(&provider, 10).run(&mut conversation, &ctx).await.unwrap();

        assert_eq!(answer, "Stored.");
        assert_eq!(ctx.get("a"), Some(json!(2)));
        assert_eq!(conversation.state(), AgentState::Done);
        assert_eq!(conversation.cycles(), 1);

        // user, assistant(calls), tool c1, tool c2, assistant
        let messages = conversation.messages();
        assert_eq!(messages.len(), 5);
        assert!(messages[1].has_tool_calls());
        assert_eq!(messages[2].tool_call_id(), Some("c1"));
        assert_eq!(messages[3].tool_call_id(), Some("c2"));
        assert!(messages[3].content.contains(r#""updated":true"#));

        // second request carried the tool turns
        assert_eq!(provider.requests()[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call("fail", json!({"reason": "missing total"}));
        provider.push_tool_call("nope", json!({}));
        provider.push_message("I could not store it.");

        let mut conversation = Conversation::from_user("go");
        let answer = agent(&provider, 10)
            .run(&mut conversation, &ActionContext::new())
            .await
            .unwrap();

        assert_eq!(answer, "I could not store it.");
        let tool_turns: Vec<&Message> = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_turns.len(), 2);
        assert!(tool_turns[0].content.contains("missing total"));
        assert_eq!(tool_turns[0].name.as_deref(), Some("fail"));
        assert!(tool_turns[1].content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call("remember", json!({"key": "a", "value": 1}));
        provider.push_tool_call("remember", json!({"key": "b", "value": 2}));

        let ctx = ActionContext::new();
        let mut conversation = Conversation::from_user("go");
        let err = agent(&provider, 1).run(&mut conversation, &ctx).await.unwrap_err();

        assert!(matches!(err, AgentError::MaxIterationsExceeded(1)));
        assert_eq!(conversation.state(), AgentState::Failed);
        // the second request was not executed
        assert_eq!(ctx.keys(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_rerun_of_done_conversation_is_idempotent() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call("remember", json!({"key": "a", "value": 1}));
        provider.push_message("Done.");
        provider.push_tool_call("remember", json!({"key": "a", "value": 99}));

        let ctx = ActionContext::new();
        let agent = agent(&provider, 10);
        let mut conversation = Conversation::from_user("go");
        agent.run(&mut conversation, &ctx).await.unwrap();
        let calls = provider.complete_calls();
        let len = conversation.len();

        let again = agent.run(&mut conversation, &ctx).await.unwrap();
        assert_eq!(again, "Done.");
        assert_eq!(provider.complete_calls(), calls);
        assert_eq!(conversation.len(), len);
        assert_eq!(ctx.get("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_provider_error_fails_run() {
        let provider = ScriptedProvider::new();
        provider.push_error(AgentError::Auth("bad key".into()));

        let mut conversation = Conversation::from_user("go");
        let err = agent(&provider, 10)
            .run(&mut conversation, &ActionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Auth(_)));
        assert_eq!(conversation.state(), AgentState::Failed);
        assert!(conversation.state().is_terminal());
    }

    #[tokio::test]
    async fn test_done_marker_policy() {
        let provider = ScriptedProvider::new();
        provider.push_message("Working on it.");
        provider.push_message("All stored. TASK_COMPLETE");

        let agent = Agent::builder()
            .provider(Arc::new(provider.clone()))
            .tools(registry())
            .termination(TerminationPolicy::DoneMarker("TASK_COMPLETE".into()))
            .build()
            .unwrap();

        let mut conversation = Conversation::from_user("go");
        let answer = agent.run(&mut conversation, &ActionContext::new()).await.unwrap();
        assert_eq!(answer, "All stored.");
        assert_eq!(conversation.cycles(), 1);
        assert!(provider.requests()[0].system_prompt.contains("TASK_COMPLETE"));
        assert_eq!(provider.requests()[1].messages.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_tool_tags_limit_offered_tools() {
        let provider = ScriptedProvider::new();
        provider.push_message("ok");

        let agent = Agent::builder()
            .provider(Arc::new(provider.clone()))
            .tools(registry())
            .tool_tags(["memory"])
            .build()
            .unwrap();
        agent.process("hi", &ActionContext::new()).await.unwrap();

        let offered: Vec<String> = provider.last_request().unwrap().tools.into_iter().map(|t| t.name).collect();
        assert_eq!(offered, vec!["remember"]);
    }

    #[tokio::test]
    async fn test_tools_outside_tag_filter_do_not_run() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call("fail", json!({"reason": "should not run"}));
        provider.push_message("ok");

        let agent = Agent::builder()
            .provider(Arc::new(provider.clone()))
            .tools(registry())
            .tool_tags(["memory"])
            .build()
            .unwrap();

        let mut conversation = Conversation::from_user("go");
        agent.run(&mut conversation, &ActionContext::new()).await.unwrap();

        let tool_turn = conversation
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_turn.content.contains("Unknown tool: fail"));
        assert!(!tool_turn.content.contains("should not run"));
    }

    #[tokio::test]
    async fn test_resume_after_failure_closes_pending_calls() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call("remember", json!({"key": "a", "value": 1}));
        provider.push_tool_call("remember", json!({"key": "b", "value": 2}));

        let ctx = ActionContext::new();
        let mut conversation = Conversation::from_user("go");
        agent(&provider, 1).run(&mut conversation, &ctx).await.unwrap_err();
        assert_eq!(conversation.unanswered_tool_calls().len(), 1);

        provider.push_message("Gave up on b.");
        let answer = agent(&provider, 10).run(&mut conversation, &ctx).await.unwrap();

        assert_eq!(answer, "Gave up on b.");
        assert_eq!(conversation.state(), AgentState::Done);
        assert!(conversation.unanswered_tool_calls().is_empty());
        assert_eq!(ctx.keys(), vec!["a".to_string()]);

        // the resumed request carried an error result for the dangling call
        let resumed = provider.last_request().unwrap();
        let last = resumed.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("not executed"));
    }

    #[test]
    fn test_builder_requires_provider() {
        let err = AgentBuilder::new().build().err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
