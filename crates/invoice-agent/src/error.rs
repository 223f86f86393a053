//! Error Types for Invoice Processing

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvoiceError>;

#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("Document text is empty")]
    EmptyDocument,

    #[error("Invoice data must be a JSON object")]
    NotAnObject,

    #[error("Missing invoice number")]
    MissingInvoiceNumber,

    #[error("Invoice {0} has no total")]
    MissingTotal(String),

    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount { field: String, value: String },

    #[error("Malformed invoice: {0}")]
    Malformed(String),
}

impl From<InvoiceError> for AgentError {
    fn from(err: InvoiceError) -> Self {
        AgentError::Validation(err.to_string())
    }
}
