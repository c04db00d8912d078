use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sage_models::config::{SageConfig, TemplatesConfig};
use sage_models::request::AnalysisRequest;
use sage_pipeline::StaticPayloads;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sage", about = "Stock Analysis Grading Engine")]
struct Cli {
    /// Path to configuration file; built-in defaults apply when absent
    #[arg(short, long, default_value = "config/sage.toml")]
    config: String,

    /// Read the analysis document JSON from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

/// Input document: the analysis request plus the raw payload for each
/// signal source Stage 1 should grade.
#[derive(Debug, Deserialize)]
struct AnalysisDocument {
    request: AnalysisRequest,
    #[serde(default)]
    payloads: BTreeMap<String, serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let document_json = if let Some(input_path) = &cli.input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };

    let mut document: AnalysisDocument =
        serde_json::from_str(&document_json).context("Failed to parse analysis document JSON")?;
    if document.request.model_id.trim().is_empty() {
        document.request.model_id = config.llm.model.clone();
    }

    let provider = Arc::new(StaticPayloads::new(document.payloads));
    let orchestrator =
        sage::build_pipeline(&config, provider).context("Failed to build pipeline")?;

    let outcome = sage::analyze(&orchestrator, &document.request).await;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{output}");

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Load config from disk when present; otherwise fall back to defaults
/// with the built-in analyst templates.
fn load_config(path: &str) -> Result<SageConfig> {
    match std::fs::read_to_string(path) {
        Ok(config_str) => {
            let mut config: SageConfig =
                toml::from_str(&config_str).with_context(|| "Failed to parse config")?;
            if config.templates == TemplatesConfig::default() {
                config.templates = TemplatesConfig::builtin();
            }
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SageConfig {
            templates: TemplatesConfig::builtin(),
            ..SageConfig::default()
        }),
        Err(e) => Err(e).with_context(|| format!("Failed to read config: {path}")),
    }
}
