use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid row rejected before write: {0}")]
    InvalidRow(String),

    #[error("stored row is unreadable: {0}")]
    Corrupt(String),

    #[error("store not available: {0}")]
    Unavailable(String),
}
