//! Service Kit - Agent Tools
//!
//! Invoice tools implementing `agent_core::Tool`, plus the plain functions
//! behind them for callers that skip the agent loop.

mod extract;
mod storage;

pub use extract::{ExtractArgs, ExtractInvoiceTool, extract_invoice_data};
pub use storage::{StoreArgs, StoreInvoiceTool, store_invoice};
