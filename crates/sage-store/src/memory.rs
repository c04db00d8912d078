use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use sage_models::result::AnalysisResult;
use sage_models::result_schema::NaturalKey;

use crate::error::StoreError;
use crate::store::{sanitize, ResultStore};

/// In-memory result store: a map keyed by the natural-key tuple.
///
/// Same upsert and sanitization contract as [`crate::SqliteStore`];
/// used by tests and by embedders that do not need durability.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<NaturalKey, AnalysisResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<NaturalKey, AnalysisResult>>, StoreError> {
        self.rows
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store mutex poisoned: {e}")))
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn upsert(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let clean = sanitize(result)?;
        let mut rows = self.lock()?;
        rows.insert(clean.natural_key(), clean);
        Ok(())
    }

    async fn fetch_stage1(
        &self,
        instrument_id: &str,
        event_date: NaiveDate,
        is_test: bool,
        test_label: Option<&str>,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let rows = self.lock()?;
        let mut matched: Vec<AnalysisResult> = rows
            .values()
            .filter(|r| {
                r.instrument_id == instrument_id
                    && r.event_date == event_date
                    && r.is_test == is_test
                    && r.test_label.as_deref().unwrap_or_default()
                        == test_label.unwrap_or_default()
                    && !r.analysis_variant.is_consolidated()
            })
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.inserted_at);
        Ok(matched)
    }

    async fn fetch_all(
        &self,
        instrument_id: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let rows = self.lock()?;
        let mut matched: Vec<AnalysisResult> = rows
            .values()
            .filter(|r| r.instrument_id == instrument_id && r.event_date == event_date)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            (a.inserted_at, a.analysis_variant.as_str())
                .cmp(&(b.inserted_at, b.analysis_variant.as_str()))
        });
        Ok(matched)
    }
}
