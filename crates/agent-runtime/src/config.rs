//! Provider selection and gateway policy from the environment.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    AgentError, Gateway, GatewayConfig, GenerationOptions, LlmProvider, Result, RetryConfig,
};
use serde::{Deserialize, Serialize};

use crate::gemini::{DEFAULT_GEMINI_MODEL, GeminiConfig, GeminiProvider};
use crate::ollama::{OllamaConfig, OllamaProvider};

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Parse boolean-ish environment values
pub(crate) fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Supported LLM backends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Gemini,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => DEFAULT_OLLAMA_MODEL,
            ProviderKind::Gemini => DEFAULT_GEMINI_MODEL,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(AgentError::Config(format!(
                "unknown LLM provider '{}' (expected ollama or gemini)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Gemini => write!(f, "gemini"),
        }
    }
}

/// Everything needed to build a gateway
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub provider: ProviderKind,

    /// Model override; the provider default otherwise
    pub model: Option<String>,

    /// Per-call timeout enforced by the gateway
    pub timeout: Duration,

    pub max_retries: u32,

    pub ollama: OllamaConfig,
    pub gemini: GeminiConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            timeout: Duration::from_secs(120),
            max_retries: RetryConfig::default().max_retries,
            ollama: OllamaConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let provider = match lookup("LLM_PROVIDER") {
            Some(name) if !name.trim().is_empty() => name.parse()?,
            _ => defaults.provider,
        };

        Ok(Self {
            provider,
            model: lookup("LLM_MODEL").filter(|m| !m.trim().is_empty()),
            timeout: lookup("LLM_TIMEOUT_SECS")
                .and_then(|t| t.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
            max_retries: lookup("LLM_MAX_RETRIES")
                .and_then(|r| r.parse().ok())
                .unwrap_or(defaults.max_retries),
            ollama: OllamaConfig::from_lookup(&lookup),
            gemini: GeminiConfig::from_lookup(&lookup),
        })
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::for_model(self.model())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            timeout: self.timeout,
            retry: RetryConfig::with_retries(self.max_retries),
            extraction: GenerationOptions {
                temperature: 0.0,
                ..self.generation_options()
            },
        }
    }

    pub fn build_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let provider: Arc<dyn LlmProvider> = match self.provider {
            ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(self.ollama.clone())?),
            ProviderKind::Gemini => Arc::new(GeminiProvider::from_config(self.gemini.clone())?),
        };
        tracing::info!(provider = %self.provider, model = self.model(), "LLM provider configured");
        Ok(provider)
    }

    pub fn build_gateway(&self) -> Result<Arc<Gateway>> {
        Ok(Arc::new(Gateway::new(self.build_provider()?, self.gateway_config())))
    }
}
