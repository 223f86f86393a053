//! Application State

use std::sync::Arc;

use agent_core::{AgentConfig, Gateway};
use invoice_agent::InvoiceStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Gateway wrapping the configured LLM provider
    pub gateway: Arc<Gateway>,

    /// Invoices stored by any endpoint
    pub store: InvoiceStore,

    /// Settings for agents spawned by `/agent/process`
    pub agent_config: AgentConfig,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, agent_config: AgentConfig) -> Self {
        Self {
            gateway,
            store: InvoiceStore::default(),
            agent_config,
        }
    }
}
