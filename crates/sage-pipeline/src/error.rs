use chrono::NaiveDate;
use sage_models::request::Cadence;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid analysis request: {0}")]
    InvalidRequest(String),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("no system-message template configured for cadence '{0}'")]
    MissingTemplate(Cadence),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM returned an empty response")]
    LlmEmptyResponse,

    #[error("grade extraction failed: {0}")]
    GradeExtraction(String),

    #[error("no Stage-1 results for {instrument_id} on {event_date}")]
    NoStage1Data {
        instrument_id: String,
        event_date: NaiveDate,
    },

    #[error("source data unavailable: {0}")]
    SourceData(String),

    #[error("persistence error: {0}")]
    Store(#[from] sage_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stable taxonomy kind exposed to downstream consumers in place of
    /// raw error internals.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::InvalidWeights(_) => "invalid_weights",
            PipelineError::MissingTemplate(_) => "missing_template",
            PipelineError::LlmUnavailable(_) => "llm_unavailable",
            PipelineError::LlmEmptyResponse => "llm_empty_response",
            PipelineError::GradeExtraction(_) => "grade_extraction",
            PipelineError::NoStage1Data { .. } => "no_stage1_data",
            PipelineError::SourceData(_) => "source_data",
            PipelineError::Store(_) => "persistence",
            PipelineError::Json(_) => "json",
        }
    }

    /// Whether a caller-driven retry with backoff may succeed. The
    /// pipeline itself never retries; idempotent upserts make a full
    /// re-run safe.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::LlmUnavailable(_)
                | PipelineError::LlmEmptyResponse
                | PipelineError::SourceData(_)
                | PipelineError::Store(_)
        )
    }
}
