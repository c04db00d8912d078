use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use sage_models::result::{AnalysisResult, AnalysisVariant, CONSOLIDATED_VARIANT};
use sage_models::result_schema::RESULTS_TABLE_DDL;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{sanitize, ResultStore};

const RESULT_COLUMNS: &str = "inserted_at, event_date, instrument_id, analysis_variant, \
     narrative_text, grade, model_id, weights_json, prompt_tokens, completion_tokens, \
     is_test, test_label";

/// SQLite-backed result store.
///
/// The upsert contract is carried by `INSERT OR REPLACE` against the
/// natural-key primary key. Access is synchronized via `Mutex` since
/// `rusqlite::Connection` is not `Sync`; the trait methods do their work
/// synchronously under the lock.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the results database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(RESULTS_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database with the schema applied. For tests and tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(RESULTS_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        inserted_at: row.get(0)?,
        event_date: row.get(1)?,
        instrument_id: row.get(2)?,
        analysis_variant: row.get(3)?,
        narrative_text: row.get(4)?,
        grade: row.get(5)?,
        model_id: row.get(6)?,
        weights_json: row.get(7)?,
        prompt_tokens: row.get(8)?,
        completion_tokens: row.get(9)?,
        is_test: row.get(10)?,
        test_label: row.get(11)?,
    })
}

/// Column-for-column image of one stored row, before timestamp decoding.
struct RawRow {
    inserted_at: String,
    event_date: String,
    instrument_id: String,
    analysis_variant: String,
    narrative_text: String,
    grade: Option<f64>,
    model_id: String,
    weights_json: Option<String>,
    prompt_tokens: u32,
    completion_tokens: u32,
    is_test: bool,
    test_label: String,
}

impl RawRow {
    fn decode(self) -> Result<AnalysisResult, StoreError> {
        let inserted_at = DateTime::parse_from_rfc3339(&self.inserted_at)
            .map_err(|e| StoreError::Corrupt(format!("inserted_at {:?}: {e}", self.inserted_at)))?
            .with_timezone(&Utc);
        let event_date = self
            .event_date
            .parse::<NaiveDate>()
            .map_err(|e| StoreError::Corrupt(format!("event_date {:?}: {e}", self.event_date)))?;
        Ok(AnalysisResult {
            inserted_at,
            event_date,
            instrument_id: self.instrument_id,
            analysis_variant: AnalysisVariant::from(self.analysis_variant),
            narrative_text: self.narrative_text,
            grade: self.grade,
            model_id: self.model_id,
            weights_json: self.weights_json,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            is_test: self.is_test,
            test_label: (!self.test_label.is_empty()).then_some(self.test_label),
        })
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn upsert(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let clean = sanitize(result)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO analysis_results \
             (inserted_at, event_date, instrument_id, analysis_variant, narrative_text, \
              grade, model_id, weights_json, prompt_tokens, completion_tokens, is_test, test_label) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                clean.inserted_at.to_rfc3339(),
                clean.event_date.to_string(),
                clean.instrument_id,
                clean.analysis_variant.as_str(),
                clean.narrative_text,
                clean.grade,
                clean.model_id,
                clean.weights_json,
                clean.prompt_tokens,
                clean.completion_tokens,
                clean.is_test,
                clean.test_label.unwrap_or_default(),
            ],
        )?;
        debug!(
            instrument = %clean.instrument_id,
            variant = %clean.analysis_variant,
            "Result upserted"
        );
        Ok(())
    }

    async fn fetch_stage1(
        &self,
        instrument_id: &str,
        event_date: NaiveDate,
        is_test: bool,
        test_label: Option<&str>,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RESULT_COLUMNS} FROM analysis_results \
             WHERE instrument_id = ?1 AND event_date = ?2 AND is_test = ?3 \
               AND test_label = ?4 AND analysis_variant != ?5 \
             ORDER BY inserted_at ASC"
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    instrument_id,
                    event_date.to_string(),
                    is_test,
                    test_label.unwrap_or_default(),
                    CONSOLIDATED_VARIANT,
                ],
                row_to_result,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::decode).collect()
    }

    async fn fetch_all(
        &self,
        instrument_id: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RESULT_COLUMNS} FROM analysis_results \
             WHERE instrument_id = ?1 AND event_date = ?2 \
             ORDER BY inserted_at ASC, analysis_variant ASC"
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![instrument_id, event_date.to_string()],
                row_to_result,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(variant: &str, inserted_at: &str) -> AnalysisResult {
        AnalysisResult {
            inserted_at: inserted_at.parse().unwrap(),
            event_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            instrument_id: "AAPL".to_string(),
            analysis_variant: AnalysisVariant::from(variant.to_string()),
            narrative_text: format!("{variant} narrative"),
            grade: Some(7.0),
            model_id: "gpt-4o-mini".to_string(),
            weights_json: None,
            prompt_tokens: 100,
            completion_tokens: 40,
            is_test: false,
            test_label: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_fetch_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = make_result("technical_analysis", "2024-01-15T18:30:00Z");
        store.upsert(&result).await.unwrap();

        let rows = store
            .fetch_stage1("AAPL", result.event_date, false, None)
            .await
            .unwrap();
        assert_eq!(rows, vec![result]);
    }

    #[tokio::test]
    async fn identical_key_overwrites_instead_of_duplicating() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = make_result("technical_analysis", "2024-01-15T18:30:00Z");
        let mut second = first.clone();
        second.grade = Some(3.2);
        second.narrative_text = "Revised view.".to_string();

        store.upsert(&first).await.unwrap();
        store.upsert(&second).await.unwrap();

        let rows = store
            .fetch_stage1("AAPL", first.event_date, false, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].grade, Some(3.2));
        assert_eq!(rows[0].narrative_text, "Revised view.");
    }

    #[tokio::test]
    async fn distinct_inserted_at_retains_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = make_result("news_analysis", "2024-01-15T08:00:00Z");
        let second = make_result("news_analysis", "2024-01-15T20:00:00Z");

        store.upsert(&first).await.unwrap();
        store.upsert(&second).await.unwrap();

        let rows = store
            .fetch_stage1("AAPL", first.event_date, false, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].inserted_at < rows[1].inserted_at);
    }

    #[tokio::test]
    async fn stage1_fetch_excludes_consolidated_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_result("technical_analysis", "2024-01-15T18:30:00Z"))
            .await
            .unwrap();
        store
            .upsert(&make_result("ALL", "2024-01-15T18:31:00Z"))
            .await
            .unwrap();

        let stage1 = store
            .fetch_stage1("AAPL", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), false, None)
            .await
            .unwrap();
        assert_eq!(stage1.len(), 1);
        assert!(!stage1[0].analysis_variant.is_consolidated());

        let all = store
            .fetch_all("AAPL", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_rows_are_keyed_apart_from_production() {
        let store = SqliteStore::open_in_memory().unwrap();
        let prod = make_result("technical_analysis", "2024-01-15T18:30:00Z");
        let mut test = prod.clone();
        test.is_test = true;
        test.test_label = Some("experiment-a".to_string());

        store.upsert(&prod).await.unwrap();
        store.upsert(&test).await.unwrap();

        let prod_rows = store
            .fetch_stage1("AAPL", prod.event_date, false, None)
            .await
            .unwrap();
        assert_eq!(prod_rows.len(), 1);

        let test_rows = store
            .fetch_stage1("AAPL", prod.event_date, true, Some("experiment-a"))
            .await
            .unwrap();
        assert_eq!(test_rows.len(), 1);
        assert_eq!(test_rows[0].test_label.as_deref(), Some("experiment-a"));
    }

    #[tokio::test]
    async fn nan_grade_stored_as_null() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut result = make_result("news_analysis", "2024-01-15T18:30:00Z");
        result.grade = Some(f64::NAN);
        store.upsert(&result).await.unwrap();

        let rows = store
            .fetch_stage1("AAPL", result.event_date, false, None)
            .await
            .unwrap();
        assert_eq!(rows[0].grade, None);
    }

    #[tokio::test]
    async fn unresolvable_row_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut result = make_result("technical_analysis", "2024-01-15T18:30:00Z");
        result.model_id = "NaN".to_string();
        assert!(matches!(
            store.upsert(&result).await,
            Err(StoreError::InvalidRow(_))
        ));

        let rows = store
            .fetch_stage1("AAPL", result.event_date, false, None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
