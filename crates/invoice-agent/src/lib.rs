//! # invoice-agent
//!
//! Invoice processing on top of `agent-core`: two tools, the goals that
//! steer the agent, and a constructor wiring them together.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   extract_invoice_data   ┌──────────────┐   store_invoice   ┌───────────────┐
//! │ invoice text │ ───────────────────────► │  JSON record │ ────────────────► │ ActionContext │
//! └──────────────┘   (schema-constrained)   └──────────────┘   (validated)     │ [invoice_no]  │
//!                                                                              └───────────────┘
//! ```

pub mod error;
pub mod model;
pub mod schema;
pub mod store;
pub mod svckit;

use std::sync::Arc;

use agent_core::{Agent, AgentConfig, Gateway, Goal, ToolRegistry};

pub use error::{InvoiceError, Result};
pub use model::{Invoice, LineItem, Vendor};
pub use store::{InvoiceStore, StoreOutcome, StoreStatus};
pub use svckit::{extract_invoice_data, store_invoice};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{ExtractInvoiceTool, StoreInvoiceTool};
}

/// Tag shared by every invoice tool
pub const INVOICE_TAG: &str = "invoices";

/// Example document used when no input is given
pub const SAMPLE_INVOICE: &str = r#"INVOICE

Invoice Number: INV-2024-001
Date: January 15, 2024

From:
  Acme Corp
  123 Business Ave, Suite 100
  Springfield, IL 62701

Bill To:
  Widget Industries
  456 Commerce St
  Shelbyville, IL 62565

Description                     Qty    Unit Price    Total
-----------------------------------------------------------
Web Development Services         40      $150.00   $6,000.00
UI/UX Design                     20      $125.00   $2,500.00
Server Hosting (Monthly)          1      $200.00     $200.00
-----------------------------------------------------------
                                        Subtotal:  $8,700.00
                                       Tax (8%):     $696.00
                                          Total:   $9,396.00

Payment Terms: Net 30
Due Date: February 14, 2024
"#;

/// Persona and task for the invoice agent
pub fn invoice_goals() -> Vec<Goal> {
    vec![
        Goal::new(
            "Persona",
            "You are an Invoice Processing Agent, specialized in handling and storing invoice data.",
        ),
        Goal::new(
            "Process Invoices",
            "Your goal is to process invoices by extracting their data and storing it properly. \
             For each invoice:\n\
             1. Extract all important information including numbers, dates, amounts, and line items\n\
             2. Store the extracted data indexed by invoice number\n\
             3. Provide confirmation of successful processing\n\
             4. Handle any errors appropriately",
        ),
    ]
}

/// User turn asking the agent to process a document
pub fn processing_prompt(document_text: &str) -> String {
    format!("Please process the following invoice and store it:\n\n{}", document_text.trim())
}

/// Registry holding both invoice tools
pub fn invoice_tools(gateway: Arc<Gateway>) -> agent_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(tools::ExtractInvoiceTool::new(gateway))?;
    registry.register(tools::StoreInvoiceTool)?;
    Ok(registry)
}

/// Build an agent limited to the invoice tools.
///
/// `config.tool_tags` defaults to the invoice tag when unset.
pub fn create_invoice_agent(gateway: Arc<Gateway>, mut config: AgentConfig) -> agent_core::Result<Agent> {
    if config.tool_tags.is_none() {
        config.tool_tags = Some([INVOICE_TAG.to_string()].into());
    }

    let tools = invoice_tools(gateway.clone())?;
    Ok(Agent::new(gateway, Arc::new(tools), invoice_goals(), config))
}
