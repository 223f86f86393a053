//! HTTP Handlers

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agent_core::AgentError;
use invoice_agent::{InvoiceStore, create_invoice_agent, extract_invoice_data, processing_prompt, store_invoice};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub provider_connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProcessInvoiceRequest {
    pub document_text: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessInvoiceResponse {
    pub status: &'static str,
    pub message: String,
    pub invoice_number: String,
    pub invoice_data: Value,
}

#[derive(Debug, Deserialize)]
pub struct AgentProcessRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub document_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentProcessResponse {
    pub status: &'static str,
    pub agent_response: String,
    /// Invoices stored during this run, by number
    pub stored_invoices: BTreeMap<String, Value>,
    pub run_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<Value>,
    pub count: usize,
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "invoice-processing-agent",
        version: env!("CARGO_PKG_VERSION"),
        provider_connected: state.gateway.health_check().await,
    })
}

/// Extract and store one invoice without the agent loop
pub async fn process_invoice(
    State(state): State<AppState>,
    payload: Result<Json<ProcessInvoiceRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessInvoiceResponse>> {
    let Json(request) = payload?;

    let extracted = extract_invoice_data(&state.gateway, &request.document_text)
        .await
        .map_err(|e| match e {
            AgentError::SchemaViolation(msg) if msg.contains("invoice_number") => {
                ApiError::Unprocessable(format!(
                    "Could not extract an invoice number from the provided text: {}",
                    msg
                ))
            }
            other => other.into(),
        })?;

    let has_number = extracted
        .get("invoice_number")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !has_number {
        return Err(ApiError::Unprocessable(
            "Could not extract an invoice number from the provided text".into(),
        ));
    }

    let outcome = store_invoice(state.store.context(), &extracted)?;
    let invoice_data = state
        .store
        .get_record(&outcome.invoice_number)
        .unwrap_or(extracted);

    tracing::info!(invoice = %outcome.invoice_number, status = ?outcome.status, "Invoice processed");
    Ok(Json(ProcessInvoiceResponse {
        status: "success",
        message: outcome.message,
        invoice_number: outcome.invoice_number,
        invoice_data,
    }))
}

/// Run the full agent loop on a document or free-form message
pub async fn agent_process(
    State(state): State<AppState>,
    payload: Result<Json<AgentProcessRequest>, JsonRejection>,
) -> ApiResult<Json<AgentProcessResponse>> {
    let Json(request) = payload?;

    let prompt = match (request.message, request.document_text) {
        (Some(message), _) if !message.trim().is_empty() => message,
        (_, Some(text)) if !text.trim().is_empty() => processing_prompt(&text),
        _ => return Err(ApiError::BadRequest("Either message or document_text is required".into())),
    };

    let run_id = uuid::Uuid::new_v4().to_string();
    let agent = create_invoice_agent(state.gateway.clone(), state.agent_config.clone())?;

    // Each run writes to its own context; results are copied over afterwards
    let run_store = InvoiceStore::default();
    let agent_response = agent.process(&prompt, run_store.context()).await?;

    let stored_invoices: BTreeMap<String, Value> = run_store.context().list().into_iter().collect();
    let merged = state.store.merge_from(&run_store);
    tracing::info!(%run_id, stored = merged.len(), "Agent run finished");

    Ok(Json(AgentProcessResponse {
        status: "success",
        agent_response,
        stored_invoices,
        run_id,
    }))
}

pub async fn list_invoices(State(state): State<AppState>) -> Json<InvoiceListResponse> {
    let invoices = state.store.records();
    Json(InvoiceListResponse {
        count: invoices.len(),
        invoices,
    })
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .get_record(&invoice_number)
        .map(Json)
        .ok_or_else(|| not_found(&invoice_number))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
) -> ApiResult<StatusCode> {
    match state.store.context().delete(&invoice_number) {
        Some(_) => {
            tracing::info!(invoice = %invoice_number, "Invoice deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(not_found(&invoice_number)),
    }
}

fn not_found(invoice_number: &str) -> ApiError {
    ApiError::NotFound(format!("Invoice {} not found", invoice_number))
}
