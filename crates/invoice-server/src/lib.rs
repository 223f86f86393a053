//! # invoice-server
//!
//! axum HTTP API over the invoice tools and agent.
//!
//! ```text
//! GET    /health             service and provider status
//! POST   /invoices/process   extract + store, no agent loop
//! POST   /agent/process      full agent run
//! GET    /invoices           list stored invoices
//! GET    /invoices/{id}      one invoice
//! DELETE /invoices/{id}      remove an invoice
//! ```

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

use crate::handlers::{agent_process, delete_invoice, get_invoice, health_check, list_invoices, process_invoice};

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/invoices", get(list_invoices))
        .route("/invoices/process", post(process_invoice))
        .route("/invoices/{invoice_number}", get(get_invoice).delete(delete_invoice))
        .route("/agent/process", post(agent_process))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
