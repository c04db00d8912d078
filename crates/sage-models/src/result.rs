use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::result_schema::NaturalKey;

/// Sentinel variant name for Stage-2 consolidated rows.
pub const CONSOLIDATED_VARIANT: &str = "ALL";

/// Which analysis produced a result row: a single signal source
/// (Stage 1) or the weighted consolidation of all of them (Stage 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AnalysisVariant {
    Source(String),
    Consolidated,
}

impl AnalysisVariant {
    pub fn as_str(&self) -> &str {
        match self {
            AnalysisVariant::Source(name) => name,
            AnalysisVariant::Consolidated => CONSOLIDATED_VARIANT,
        }
    }

    pub fn is_consolidated(&self) -> bool {
        matches!(self, AnalysisVariant::Consolidated)
    }
}

impl From<AnalysisVariant> for String {
    fn from(variant: AnalysisVariant) -> Self {
        variant.as_str().to_string()
    }
}

impl From<String> for AnalysisVariant {
    fn from(s: String) -> Self {
        if s == CONSOLIDATED_VARIANT {
            AnalysisVariant::Consolidated
        } else {
            AnalysisVariant::Source(s)
        }
    }
}

impl std::fmt::Display for AnalysisVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted pipeline output.
///
/// `grade` is on the canonical 1.0-10.0 scale with one decimal digit, or
/// None for a failed run that stored an audit placeholder. `weights_json`
/// is None for Stage-1 single-source rows. Identity is the natural key
/// tuple; see [`NaturalKey`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub inserted_at: DateTime<Utc>,
    pub event_date: NaiveDate,
    pub instrument_id: String,
    pub analysis_variant: AnalysisVariant,
    pub narrative_text: String,
    pub grade: Option<f64>,
    pub model_id: String,
    pub weights_json: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_label: Option<String>,
}

impl AnalysisResult {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            inserted_at: self.inserted_at.to_rfc3339(),
            event_date: self.event_date.to_string(),
            instrument_id: self.instrument_id.clone(),
            analysis_variant: self.analysis_variant.as_str().to_string(),
            is_test: self.is_test,
            test_label: self.test_label.clone().unwrap_or_default(),
        }
    }
}

/// What happened to one Stage-1 source within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Graded result stored.
    Stored,
    /// LLM output was unparsable; audit placeholder stored with no grade.
    ParseFailed,
    /// Source data or LLM call failed; nothing stored.
    Failed,
}

/// Per-source report collected during Stage-1 fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Terminal state of a full two-stage run for one instrument/date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Stage 2 stored and every Stage-1 source succeeded.
    Complete,
    /// Stage 2 stored but some Stage-1 sources failed.
    Partial,
    /// Stage 1 produced zero usable rows; Stage 2 not attempted.
    Failed,
}

/// Full account of one two-stage run. `run_id` correlates the report
/// with log lines emitted during the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub instrument_id: String,
    pub event_date: NaiveDate,
    pub status: PipelineStatus,
    pub stage1: Vec<SourceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated: Option<AnalysisResult>,
}

/// The structured response returned to downstream consumers
/// (chat-bot, report, email collaborators). Raw error internals are
/// never exposed here, only the taxonomy kind and a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<PipelineReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RunOutcome {
    pub fn ok(report: PipelineReport) -> Self {
        Self {
            success: true,
            report: Some(report),
            error: None,
            detail: None,
        }
    }

    pub fn err(kind: &str, detail: String) -> Self {
        Self {
            success: false,
            report: None,
            error: Some(kind.to_string()),
            detail: Some(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(variant: AnalysisVariant) -> AnalysisResult {
        AnalysisResult {
            inserted_at: "2024-01-15T18:30:00Z".parse().unwrap(),
            event_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            instrument_id: "AAPL".to_string(),
            analysis_variant: variant,
            narrative_text: "Strong momentum on rising volume.".to_string(),
            grade: Some(8.5),
            model_id: "gpt-4o-mini".to_string(),
            weights_json: None,
            prompt_tokens: 512,
            completion_tokens: 128,
            is_test: false,
            test_label: None,
        }
    }

    #[test]
    fn variant_string_forms() {
        assert_eq!(AnalysisVariant::Consolidated.as_str(), "ALL");
        assert_eq!(
            AnalysisVariant::Source("news_analysis".to_string()).as_str(),
            "news_analysis"
        );
    }

    #[test]
    fn variant_serde_roundtrip() {
        let json = serde_json::to_string(&AnalysisVariant::Consolidated).unwrap();
        assert_eq!(json, r#""ALL""#);
        let back: AnalysisVariant = serde_json::from_str(&json).unwrap();
        assert!(back.is_consolidated());

        let source: AnalysisVariant =
            serde_json::from_str(r#""technical_analysis""#).unwrap();
        assert_eq!(
            source,
            AnalysisVariant::Source("technical_analysis".to_string())
        );
    }

    #[test]
    fn result_json_roundtrip() {
        let result = sample_result(AnalysisVariant::Source("technical_analysis".to_string()));
        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn natural_key_uses_empty_string_for_missing_label() {
        let result = sample_result(AnalysisVariant::Consolidated);
        let key = result.natural_key();
        assert_eq!(key.analysis_variant, "ALL");
        assert_eq!(key.test_label, "");
        assert!(!key.is_test);
    }

    #[test]
    fn natural_keys_differ_by_inserted_at() {
        let a = sample_result(AnalysisVariant::Consolidated);
        let mut b = a.clone();
        b.inserted_at = "2024-01-16T18:30:00Z".parse().unwrap();
        assert_ne!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn outcome_err_carries_kind_and_detail() {
        let outcome = RunOutcome::err("grade_extraction", "no trailing grade".to_string());
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("grade_extraction"));
        assert!(outcome.report.is_none());
    }
}
