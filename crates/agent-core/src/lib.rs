//! # agent-core
//!
//! Provider-agnostic agent loop with an explicit tool registry, shared action
//! context and a gateway that owns every LLM call.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Agent                                │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────────┐  │
//! │  │  Reasoning  │  │    Tools    │  │  Gateway                 │  │
//! │  │    Loop     │──│   Registry  │  │  (timeout, retry,        │  │
//! │  │             │──│             │  │   structured output)     │  │
//! │  └──────┬──────┘  └──────┬──────┘  │  ┌────────────────────┐  │  │
//! │         │                │         │  │ LlmProvider        │  │  │
//! │         │         ActionContext    │  │  + ActionLanguage  │  │  │
//! │         └──────────────────────────┼─►└────────────────────┘  │  │
//! │                                    └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Swapping providers means swapping the `LlmProvider` and its
//! `ActionLanguage`; the agent and registry only see `ToolSpec`s and
//! `ToolCall`s.

pub mod context;
pub mod error;
pub mod gateway;
pub mod goal;
pub mod language;
pub mod message;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod tool;

pub use context::{ActionContext, ContextStore, MemoryStore};
pub use error::{AgentError, Result};
pub use gateway::{Gateway, GatewayConfig, RetryConfig};
pub use goal::Goal;
pub use language::{ActionLanguage, JsonSchemaLanguage, TextBlockLanguage};
pub use message::{AgentState, Conversation, Message, Role};
pub use provider::{Completion, CompletionRequest, GenerationOptions, LlmProvider, LlmResponse};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, TerminationPolicy};
pub use tool::{ParamType, ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult, ToolSpec};
