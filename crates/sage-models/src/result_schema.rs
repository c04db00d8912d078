use serde::{Deserialize, Serialize};

/// The SQLite table holding analysis results.
///
/// The natural key is enforced with a primary key over the identity
/// columns so that `INSERT OR REPLACE` implements the upsert contract.
/// `test_label` is stored as an empty string rather than NULL because
/// NULL never compares equal to itself and would defeat key uniqueness.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS analysis_results (
///     inserted_at       TEXT NOT NULL,
///     event_date        TEXT NOT NULL,
///     instrument_id     TEXT NOT NULL,
///     analysis_variant  TEXT NOT NULL,
///     narrative_text    TEXT NOT NULL,
///     grade             REAL,
///     model_id          TEXT NOT NULL,
///     weights_json      TEXT,
///     prompt_tokens     INTEGER NOT NULL,
///     completion_tokens INTEGER NOT NULL,
///     is_test           INTEGER NOT NULL DEFAULT 0,
///     test_label        TEXT NOT NULL DEFAULT '',
///     PRIMARY KEY (inserted_at, event_date, instrument_id,
///                  analysis_variant, is_test, test_label)
/// );
/// ```
pub const RESULTS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS analysis_results (
    inserted_at       TEXT NOT NULL,
    event_date        TEXT NOT NULL,
    instrument_id     TEXT NOT NULL,
    analysis_variant  TEXT NOT NULL,
    narrative_text    TEXT NOT NULL,
    grade             REAL,
    model_id          TEXT NOT NULL,
    weights_json      TEXT,
    prompt_tokens     INTEGER NOT NULL,
    completion_tokens INTEGER NOT NULL,
    is_test           INTEGER NOT NULL DEFAULT 0,
    test_label        TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (inserted_at, event_date, instrument_id, analysis_variant, is_test, test_label)
);
CREATE INDEX IF NOT EXISTS idx_results_instrument_date
    ON analysis_results(instrument_id, event_date);
CREATE INDEX IF NOT EXISTS idx_results_variant
    ON analysis_results(analysis_variant);
";

/// The field tuple that uniquely identifies a persisted result.
///
/// Timestamps and dates are carried in their canonical text form so the
/// key compares identically in SQLite and in the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub inserted_at: String,
    pub event_date: String,
    pub instrument_id: String,
    pub analysis_variant: String,
    pub is_test: bool,
    pub test_label: String,
}
