//! Run the invoice agent on a document and print its answer.
//!
//! # Examples
//!
//! ```sh
//! # Process the built-in sample invoice with the local Ollama model
//! invoice-agent
//!
//! # Process a file with Gemini
//! GEMINI_API_KEY=... invoice-agent invoice.txt --provider gemini
//! ```

use std::path::{Path, PathBuf};
use std::process;

use agent_core::{ActionContext, AgentConfig};
use agent_runtime::{ProviderKind, RuntimeConfig};
use anyhow::Context;
use clap::Parser;
use invoice_agent::{SAMPLE_INVOICE, create_invoice_agent, processing_prompt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Extract and store an invoice with an LLM agent.
///
/// Reads FILE, or a built-in sample invoice when no file is given.
#[derive(Debug, Parser)]
#[command(name = "invoice-agent", version)]
struct Cli {
    /// Invoice text file to process
    file: Option<PathBuf>,

    /// LLM backend (ollama or gemini)
    #[arg(long, env = "LLM_PROVIDER")]
    provider: Option<ProviderKind>,

    /// Model name; defaults per provider
    #[arg(long, env = "LLM_MODEL")]
    model: Option<String>,

    /// Upper bound on agent reasoning cycles
    #[arg(long, env = "AGENT_MAX_ITERATIONS", default_value_t = 10)]
    max_iterations: usize,
}

fn load_document(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read invoice file {}", path.display())),
        None => Ok(SAMPLE_INVOICE.to_string()),
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let document = load_document(cli.file.as_deref())?;

    let mut runtime = RuntimeConfig::from_env()?;
    if let Some(provider) = cli.provider {
        runtime.provider = provider;
    }
    if cli.model.is_some() {
        runtime.model = cli.model;
    }

    let gateway = runtime.build_gateway()?;
    let config = AgentConfig {
        max_iterations: cli.max_iterations,
        generation: runtime.generation_options(),
        ..Default::default()
    };
    let agent = create_invoice_agent(gateway, config)?;

    let ctx = ActionContext::new();
    let response = agent.process(&processing_prompt(&document), &ctx).await?;
    tracing::info!(stored = ?ctx.keys(), "Invoices stored");
    Ok(response)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(response) => println!("{}", response),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}
