//! Invoice Extraction Tool
//!
//! Turns raw invoice text into a structured record through the gateway's
//! schema-constrained extraction.

use std::sync::Arc;

use agent_core::{ActionContext, Gateway, Result as CoreResult, Tool, ToolCall, ToolSpec};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::error::InvoiceError;
use crate::schema::{extraction_prompt, invoice_schema};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractArgs {
    /// Raw text content of the invoice
    pub document_text: String,
}

/// Extract a (possibly partial) invoice record from document text.
///
/// The record is not validated for storage; a provider output that cannot be
/// made to fit the schema surfaces as `SchemaViolation`.
pub async fn extract_invoice_data(gateway: &Gateway, document_text: &str) -> CoreResult<Value> {
    if document_text.trim().is_empty() {
        return Err(InvoiceError::EmptyDocument.into());
    }

    tracing::debug!(chars = document_text.len(), "Extracting invoice data");
    gateway
        .extract_structured(&extraction_prompt(document_text), &invoice_schema())
        .await
}

/// Tool wrapper around [`extract_invoice_data`]
pub struct ExtractInvoiceTool {
    gateway: Arc<Gateway>,
}

impl ExtractInvoiceTool {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ExtractInvoiceTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::from_args::<ExtractArgs>(
            "extract_invoice_data",
            "Extract structured data from invoice text: invoice number, date, vendor, \
             line items, subtotal, tax and total.",
        )
        .tags(["invoices", "document_processing"])
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ActionContext) -> CoreResult<Value> {
        let args: ExtractArgs = call.parse_args()?;
        extract_invoice_data(&self.gateway, &args.document_text).await
    }
}
