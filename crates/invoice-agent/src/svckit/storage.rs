//! Invoice Storage Tool

use agent_core::{ActionContext, Result as CoreResult, Tool, ToolCall, ToolSpec};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::store::{InvoiceStore, StoreOutcome};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StoreArgs {
    /// Invoice record as returned by extract_invoice_data
    pub invoice_data: Map<String, Value>,
}

/// Validate a record and put it in `ctx` under its invoice number.
///
/// Fails without writing if the invoice number or total is missing.
pub fn store_invoice(ctx: &ActionContext, record: &Value) -> Result<StoreOutcome> {
    InvoiceStore::new(ctx.clone()).store_record(record)
}

/// Tool wrapper around [`store_invoice`]
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreInvoiceTool;

#[async_trait]
impl Tool for StoreInvoiceTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::from_args::<StoreArgs>(
            "store_invoice",
            "Store an extracted invoice, indexed by its invoice number. \
             Storing the same number again replaces the earlier record.",
        )
        .tags(["invoices", "storage"])
    }

    async fn execute(&self, call: &ToolCall, ctx: &ActionContext) -> CoreResult<Value> {
        let args: StoreArgs = call.parse_args()?;
        let outcome = store_invoice(ctx, &Value::Object(args.invoice_data))?;
        Ok(serde_json::to_value(outcome)?)
    }
}
