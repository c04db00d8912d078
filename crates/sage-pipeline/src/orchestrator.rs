use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sage_models::config::SageConfig;
use sage_models::request::AnalysisRequest;
use sage_models::result::{
    AnalysisResult, AnalysisVariant, PipelineReport, PipelineStatus, RunOutcome, SourceReport,
    SourceStatus,
};
use sage_store::ResultStore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::llm::{LlmClient, LlmReply};
use crate::parser;
use crate::prompts;
use crate::sources::SourceDataProvider;
use crate::weights;

/// Coordinates the two-stage grading run: Stage-1 fan-out over signal
/// sources, then the Stage-2 consolidation over whatever Stage 1 stored.
pub struct Orchestrator {
    store: Arc<dyn ResultStore>,
    client: Arc<dyn LlmClient>,
    provider: Arc<dyn SourceDataProvider>,
    config: SageConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        client: Arc<dyn LlmClient>,
        provider: Arc<dyn SourceDataProvider>,
        config: SageConfig,
    ) -> Self {
        Self {
            store,
            client,
            provider,
            config,
        }
    }

    /// Run both stages and report the outcome in the structured form
    /// downstream consumers expect. Never panics; every failure mode
    /// collapses into the error taxonomy.
    pub async fn analyze(&self, request: &AnalysisRequest) -> RunOutcome {
        match self.run(request).await {
            Ok(report) if report.status == PipelineStatus::Failed => {
                let detail = format!(
                    "no Stage-1 source produced a graded result for {} on {}",
                    report.instrument_id, report.event_date
                );
                RunOutcome {
                    success: false,
                    report: Some(report),
                    error: Some("no_stage1_data".to_string()),
                    detail: Some(detail),
                }
            }
            Ok(report) => RunOutcome::ok(report),
            Err(e) => RunOutcome::err(e.kind(), e.to_string()),
        }
    }

    /// Full two-stage run. Stage 2 is skipped when Stage 1 stored
    /// nothing usable; that is a `Failed` report, not an `Err`.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            instrument = %request.instrument_id,
            event_date = %request.event_date,
            cadence = %request.cadence,
            "starting analysis run"
        );

        let stage1 = self.run_stage1(request).await?;
        let stored = stage1
            .iter()
            .filter(|r| r.status == SourceStatus::Stored)
            .count();

        if stored == 0 {
            warn!(
                run_id = %run_id,
                instrument = %request.instrument_id,
                "no Stage-1 source stored a graded result, skipping consolidation"
            );
            return Ok(PipelineReport {
                run_id,
                instrument_id: request.instrument_id.clone(),
                event_date: request.event_date,
                status: PipelineStatus::Failed,
                stage1,
                consolidated: None,
            });
        }

        let consolidated = self.run_stage2(request).await?;
        let status = if stored == stage1.len() {
            PipelineStatus::Complete
        } else {
            PipelineStatus::Partial
        };

        info!(
            run_id = %run_id,
            instrument = %request.instrument_id,
            status = ?status,
            consolidated_grade = ?consolidated.grade,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analysis run complete"
        );

        Ok(PipelineReport {
            run_id,
            instrument_id: request.instrument_id.clone(),
            event_date: request.event_date,
            status,
            stage1,
            consolidated: Some(consolidated),
        })
    }

    /// Stage 1: grade each enabled signal source independently and in
    /// parallel. One source failing never aborts the others.
    pub async fn run_stage1(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<SourceReport>, PipelineError> {
        request.validate().map_err(PipelineError::InvalidRequest)?;
        // Fail the whole run up front rather than once per task.
        if self.config.templates.for_cadence(request.cadence).is_none() {
            return Err(PipelineError::MissingTemplate(request.cadence));
        }

        // All rows of one run share a single insertion timestamp so they
        // group under the same natural-key instant.
        let inserted_at = Utc::now();

        let mut handles = Vec::new();
        for source in self.config.enabled_sources() {
            let store = Arc::clone(&self.store);
            let client = Arc::clone(&self.client);
            let provider = Arc::clone(&self.provider);
            let config = self.config.clone();
            let request = request.clone();

            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let outcome =
                    grade_source(&*store, &*client, &*provider, &config, &request, &source, inserted_at)
                        .await;
                (source, outcome, started.elapsed().as_millis() as u64)
            }));
        }

        let mut reports = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((source, Ok(grade), elapsed_ms)) => {
                    info!(source = %source, grade, elapsed_ms, "source graded");
                    reports.push(SourceReport {
                        source,
                        status: SourceStatus::Stored,
                        grade: Some(grade),
                        error: None,
                        elapsed_ms,
                    });
                }
                Ok((source, Err(Stage1Failure::ParseFailed(detail)), elapsed_ms)) => {
                    warn!(source = %source, error = %detail, elapsed_ms, "source output unparsable, placeholder stored");
                    reports.push(SourceReport {
                        source,
                        status: SourceStatus::ParseFailed,
                        grade: None,
                        error: Some(detail),
                        elapsed_ms,
                    });
                }
                Ok((source, Err(Stage1Failure::Failed(e)), elapsed_ms)) => {
                    warn!(source = %source, error = %e, elapsed_ms, "source analysis failed");
                    reports.push(SourceReport {
                        source,
                        status: SourceStatus::Failed,
                        grade: None,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                }
                Err(e) => {
                    error!(error = %e, "source task panicked");
                }
            }
        }

        Ok(reports)
    }

    /// Stage 2: consolidate the graded Stage-1 rows for this
    /// instrument/date into one overall result.
    pub async fn run_stage2(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResult, PipelineError> {
        request.validate().map_err(PipelineError::InvalidRequest)?;

        let rows = self
            .store
            .fetch_stage1(
                &request.instrument_id,
                request.event_date,
                request.is_test,
                request.test_label.as_deref(),
            )
            .await?;
        let priors = latest_graded_per_variant(rows);
        if priors.is_empty() {
            return Err(PipelineError::NoStage1Data {
                instrument_id: request.instrument_id.clone(),
                event_date: request.event_date,
            });
        }

        let weights = weights::resolve_set(request.cadence, request.weights.as_ref(), &self.config)?;
        let (system, user) = prompts::compose_consolidated(request, &priors, &weights, &self.config)?;

        let reply = self
            .client
            .invoke(&system, &user, &request.model_id)
            .await?;

        let inserted_at = Utc::now();
        match parser::parse(&reply.raw_text) {
            Ok(parsed) => {
                let result = build_result(
                    request,
                    AnalysisVariant::Consolidated,
                    parsed.narrative_text,
                    Some(parsed.grade),
                    &reply,
                    inserted_at,
                    Some(weights.to_json()),
                );
                self.store.upsert(&result).await?;
                info!(
                    instrument = %request.instrument_id,
                    grade = parsed.grade,
                    sources = priors.len(),
                    "consolidated result stored"
                );
                Ok(result)
            }
            Err(e @ PipelineError::GradeExtraction(_)) => {
                // Keep the raw reply for audit even though the run fails.
                let placeholder = build_result(
                    request,
                    AnalysisVariant::Consolidated,
                    reply.raw_text.clone(),
                    None,
                    &reply,
                    inserted_at,
                    Some(weights.to_json()),
                );
                self.store.upsert(&placeholder).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

/// Why one Stage-1 task did not store a graded row.
enum Stage1Failure {
    /// Reply text had no extractable grade; placeholder row stored.
    ParseFailed(String),
    /// Data fetch, LLM call or store write failed; nothing stored.
    Failed(PipelineError),
}

async fn grade_source(
    store: &dyn ResultStore,
    client: &dyn LlmClient,
    provider: &dyn SourceDataProvider,
    config: &SageConfig,
    request: &AnalysisRequest,
    source: &str,
    inserted_at: DateTime<Utc>,
) -> Result<f64, Stage1Failure> {
    let payload = provider
        .fetch(source, request)
        .await
        .map_err(Stage1Failure::Failed)?;
    let (system, user) = prompts::compose_single(request, source, &payload, config)
        .map_err(Stage1Failure::Failed)?;
    let reply = client
        .invoke(&system, &user, &request.model_id)
        .await
        .map_err(Stage1Failure::Failed)?;

    let variant = AnalysisVariant::Source(source.to_string());
    match parser::parse(&reply.raw_text) {
        Ok(parsed) => {
            let result = build_result(
                request,
                variant,
                parsed.narrative_text,
                Some(parsed.grade),
                &reply,
                inserted_at,
                None,
            );
            store.upsert(&result).await.map_err(|e| Stage1Failure::Failed(e.into()))?;
            Ok(parsed.grade)
        }
        Err(PipelineError::GradeExtraction(detail)) => {
            let placeholder = build_result(
                request,
                variant,
                reply.raw_text.clone(),
                None,
                &reply,
                inserted_at,
                None,
            );
            store
                .upsert(&placeholder)
                .await
                .map_err(|e| Stage1Failure::Failed(e.into()))?;
            Err(Stage1Failure::ParseFailed(detail))
        }
        Err(e) => Err(Stage1Failure::Failed(e)),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    request: &AnalysisRequest,
    variant: AnalysisVariant,
    narrative_text: String,
    grade: Option<f64>,
    reply: &LlmReply,
    inserted_at: DateTime<Utc>,
    weights_json: Option<String>,
) -> AnalysisResult {
    AnalysisResult {
        inserted_at,
        event_date: request.event_date,
        instrument_id: request.instrument_id.clone(),
        analysis_variant: variant,
        narrative_text,
        grade,
        model_id: request.model_id.clone(),
        weights_json,
        prompt_tokens: reply.prompt_tokens,
        completion_tokens: reply.completion_tokens,
        is_test: request.is_test,
        test_label: request.test_label.clone(),
    }
}

/// Reduce Stage-1 rows to the newest graded row per variant. Rows are
/// expected in ascending `inserted_at` order, so later entries win.
fn latest_graded_per_variant(rows: Vec<AnalysisResult>) -> Vec<AnalysisResult> {
    let mut latest: BTreeMap<String, AnalysisResult> = BTreeMap::new();
    for row in rows {
        if row.grade.is_some() {
            latest.insert(row.analysis_variant.as_str().to_string(), row);
        }
    }
    latest.into_values().collect()
}
