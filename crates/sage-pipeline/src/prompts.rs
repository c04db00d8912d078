use std::fmt::Write as _;

use sage_models::config::SageConfig;
use sage_models::request::AnalysisRequest;
use sage_models::result::AnalysisResult;
use sage_models::weight_set::WeightSet;

use crate::error::PipelineError;

/// Compose the (system, user) message pair for a Stage-1 single-source
/// analysis. The system message is the cadence template; the user message
/// carries the ticker, the event date and the raw source payload.
pub fn compose_single(
    request: &AnalysisRequest,
    source: &str,
    payload: &serde_json::Value,
    config: &SageConfig,
) -> Result<(String, String), PipelineError> {
    let system = system_template(request, config)?;
    let mut user = String::new();
    push_header(&mut user, request);
    let _ = writeln!(user, "Signal source: {source}");
    let _ = writeln!(user, "Data:");
    let _ = write!(user, "{}", pretty_json(payload));
    Ok((system, user))
}

/// Compose the (system, user) message pair for the Stage-2 consolidated
/// analysis. Prior graded Stage-1 results are enumerated with their
/// grades, followed by the weight table the LLM should let steer its
/// conclusion.
pub fn compose_consolidated(
    request: &AnalysisRequest,
    priors: &[AnalysisResult],
    weights: &WeightSet,
    config: &SageConfig,
) -> Result<(String, String), PipelineError> {
    let system = system_template(request, config)?;
    let mut user = String::new();
    push_header(&mut user, request);
    let _ = writeln!(user, "Prior single-source analyses:");
    for prior in priors {
        // run_stage2 filters out placeholder rows before composing
        let grade = prior
            .grade
            .map(|g| format!("{g:.1}"))
            .unwrap_or_else(|| "none".to_string());
        let _ = writeln!(
            user,
            "- {} (grade {grade}): {}",
            prior.analysis_variant, prior.narrative_text
        );
    }
    let _ = writeln!(user, "Weights: {}", weights.to_json());
    let _ = write!(
        user,
        "Consolidate the analyses above into one overall outlook, letting the \
         weights steer how much each source influences your conclusion."
    );
    Ok((system, user))
}

fn system_template(
    request: &AnalysisRequest,
    config: &SageConfig,
) -> Result<String, PipelineError> {
    config
        .templates
        .for_cadence(request.cadence)
        .map(str::to_string)
        .ok_or(PipelineError::MissingTemplate(request.cadence))
}

fn push_header(user: &mut String, request: &AnalysisRequest) {
    let _ = writeln!(user, "Ticker: {}", request.instrument_id);
    let _ = writeln!(user, "Event date: {}", request.event_date);
}

fn pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
