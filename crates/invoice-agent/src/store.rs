//! Invoice Store
//!
//! Typed view over an [`ActionContext`]: each invoice lives under its
//! invoice number. Writes go through the context store's lock, so concurrent
//! stores of the same number resolve last-write-wins.

use agent_core::ActionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::Invoice;

/// Whether a store created or replaced the record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Inserted,
    Updated,
}

/// Result reported by `store_invoice`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub status: StoreStatus,
    pub invoice_number: String,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct InvoiceStore {
    ctx: ActionContext,
}

impl InvoiceStore {
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ActionContext {
        &self.ctx
    }

    /// Store an invoice, overwriting any record with the same number
    pub fn insert(&self, invoice: &Invoice) -> StoreOutcome {
        let previous = self.ctx.set(&invoice.invoice_number, invoice.to_record());
        let (status, verb) = match previous {
            Some(_) => (StoreStatus::Updated, "updated"),
            None => (StoreStatus::Inserted, "stored"),
        };

        tracing::debug!(invoice = %invoice.invoice_number, ?status, "Invoice stored");
        StoreOutcome {
            status,
            invoice_number: invoice.invoice_number.clone(),
            message: format!("Invoice {} {}", invoice.invoice_number, verb),
        }
    }

    /// Validate a raw record and store it
    pub fn store_record(&self, record: &Value) -> Result<StoreOutcome> {
        let invoice = Invoice::from_record(record)?;
        Ok(self.insert(&invoice))
    }

    pub fn get(&self, invoice_number: &str) -> Option<Invoice> {
        self.get_record(invoice_number)
            .and_then(|record| serde_json::from_value(record).ok())
    }

    pub fn get_record(&self, invoice_number: &str) -> Option<Value> {
        self.ctx.get(invoice_number)
    }

    /// All stored invoices, sorted by number
    pub fn list(&self) -> Vec<Invoice> {
        self.records()
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect()
    }

    /// Stored records as JSON, sorted by number
    pub fn records(&self) -> Vec<Value> {
        self.ctx.list().into_iter().map(|(_, record)| record).collect()
    }

    pub fn delete(&self, invoice_number: &str) -> Option<Invoice> {
        self.ctx
            .delete(invoice_number)
            .and_then(|record| serde_json::from_value(record).ok())
    }

    /// Copy every record from another store, returning the numbers copied
    pub fn merge_from(&self, other: &InvoiceStore) -> Vec<String> {
        other
            .ctx
            .list()
            .into_iter()
            .map(|(number, record)| {
                self.ctx.set(&number, record);
                number
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ctx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.is_empty()
    }
}
