//! # agent-runtime
//!
//! HTTP providers for the agent core.
//!
//! ## Providers
//!
//! - **Ollama** (default): local inference via `/api/chat`, native tool
//!   calling or the text protocol for older models
//! - **Gemini**: Generative Language API function calling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::RuntimeConfig;
//!
//! let runtime = RuntimeConfig::from_env()?;
//! let agent = AgentBuilder::new()
//!     .gateway(runtime.build_gateway()?)
//!     .build()?;
//! ```

pub mod config;
pub mod gemini;
mod http;
pub mod ollama;

pub use config::{ProviderKind, RuntimeConfig};
pub use gemini::{GeminiConfig, GeminiLanguage, GeminiProvider};
pub use ollama::{OllamaConfig, OllamaLanguage, OllamaProvider};
