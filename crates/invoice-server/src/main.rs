//! Invoice processing HTTP server

use agent_core::AgentConfig;
use agent_runtime::RuntimeConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoice_server::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before reading RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = RuntimeConfig::from_env()?;
    let gateway = runtime.build_gateway()?;

    if gateway.health_check().await {
        tracing::info!(provider = %runtime.provider, "✓ Connected to LLM provider");
    } else {
        tracing::warn!(provider = %runtime.provider, "⚠ LLM provider not reachable - processing requests will fail");
    }

    let mut agent_config = AgentConfig {
        generation: runtime.generation_options(),
        ..Default::default()
    };
    if let Some(max) = std::env::var("AGENT_MAX_ITERATIONS").ok().and_then(|v| v.parse().ok()) {
        agent_config.max_iterations = max;
    }

    let app = router(AppState::new(gateway, agent_config));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Invoice agent server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health            - Health check");
    tracing::info!("  POST   /invoices/process  - Extract and store an invoice");
    tracing::info!("  POST   /agent/process     - Run the invoice agent");
    tracing::info!("  GET    /invoices          - List invoices");
    tracing::info!("  GET    /invoices/{{id}}     - Get an invoice");
    tracing::info!("  DELETE /invoices/{{id}}     - Delete an invoice");

    axum::serve(listener, app).await?;

    Ok(())
}
