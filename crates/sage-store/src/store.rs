use async_trait::async_trait;
use chrono::NaiveDate;
use sage_models::result::{AnalysisResult, AnalysisVariant};

use crate::error::StoreError;

/// Insert-or-replace persistence keyed by the natural key.
///
/// `upsert` replaces an existing row with an identical key wholesale, so
/// re-running an analysis for the same `inserted_at` is safe to repeat.
/// Concurrent writers on the identical key race to last-write-wins.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn upsert(&self, result: &AnalysisResult) -> Result<(), StoreError>;

    /// All Stage-1 rows (variant != ALL) for one instrument/date/test
    /// discriminator, ordered by `inserted_at` ascending.
    async fn fetch_stage1(
        &self,
        instrument_id: &str,
        event_date: NaiveDate,
        is_test: bool,
        test_label: Option<&str>,
    ) -> Result<Vec<AnalysisResult>, StoreError>;

    /// Every stored row for an instrument/date, both stages. Audit reads.
    async fn fetch_all(
        &self,
        instrument_id: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<AnalysisResult>, StoreError>;
}

/// True for the textual junk that upstream serializations produce for
/// missing values ("nan", "NaN", "null", "None", ...).
fn nan_like(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "nan" | "null" | "none"
    )
}

/// Normalize NaN/null-like representations before a write.
///
/// Optional fields resolve to None, non-finite grades to None, and the
/// NOT NULL narrative to the empty string. A required identity field
/// that cannot be resolved rejects the whole write; a partial row must
/// never reach storage.
pub fn sanitize(result: &AnalysisResult) -> Result<AnalysisResult, StoreError> {
    let mut clean = result.clone();

    let require = |field: &str, value: &str| -> Result<String, StoreError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || nan_like(trimmed) {
            Err(StoreError::InvalidRow(format!(
                "required field {field} is absent or NaN-like: {value:?}"
            )))
        } else {
            Ok(trimmed.to_string())
        }
    };

    clean.instrument_id = require("instrument_id", &result.instrument_id)?;
    clean.model_id = require("model_id", &result.model_id)?;
    if let AnalysisVariant::Source(name) = &result.analysis_variant {
        clean.analysis_variant = AnalysisVariant::Source(require("analysis_variant", name)?);
    }

    if nan_like(&clean.narrative_text) {
        clean.narrative_text = String::new();
    }
    clean.grade = clean.grade.filter(|g| g.is_finite());
    clean.weights_json = clean
        .weights_json
        .filter(|w| !w.trim().is_empty() && !nan_like(w));
    clean.test_label = clean
        .test_label
        .filter(|l| !l.trim().is_empty() && !nan_like(l));

    Ok(clean)
}
