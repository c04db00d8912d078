//! SAGE - Stock Analysis Grading Engine
//!
//! A two-stage LLM grading pipeline for stock signals: Stage 1 grades
//! each signal source independently, Stage 2 consolidates the graded
//! results under a weight table into one overall outlook. Every result
//! lands in a SQLite store keyed so reruns overwrite instead of
//! duplicating.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use sage::models::{AnalysisRequest, Cadence, SageConfig, RunOutcome};
//! use sage::pipeline::{Orchestrator, SourceDataProvider, StaticPayloads};
//! use sage::store::{ResultStore, SqliteStore};
//! ```

pub use sage_models as models;
pub use sage_pipeline as pipeline;
pub use sage_store as store;

use std::sync::Arc;

use sage_models::config::SageConfig;
use sage_models::request::AnalysisRequest;
use sage_models::result::RunOutcome;
use sage_pipeline::llm::OpenAiClient;
use sage_pipeline::sources::SourceDataProvider;
use sage_pipeline::Orchestrator;
use sage_store::SqliteStore;

/// Build an Orchestrator from configuration, wiring the SQLite store
/// and the HTTP LLM client. The source data provider stays a caller
/// concern; the CLI hands in payloads from its input document.
pub fn build_pipeline(
    config: &SageConfig,
    provider: Arc<dyn SourceDataProvider>,
) -> Result<Orchestrator, anyhow::Error> {
    let store = Arc::new(SqliteStore::open(&config.store.sqlite_path)?);
    let client = Arc::new(OpenAiClient::new(&config.llm)?);
    Ok(Orchestrator::new(store, client, provider, config.clone()))
}

/// Run the full two-stage analysis for one request.
pub async fn analyze(orchestrator: &Orchestrator, request: &AnalysisRequest) -> RunOutcome {
    orchestrator.analyze(request).await
}
