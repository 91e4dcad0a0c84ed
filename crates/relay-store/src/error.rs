pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("row not found for key: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Postgres unique-violation (`23505`), surfaced when two callers race
    /// to insert the same `event_id`/key — the loser should reload rather
    /// than treat this as fatal.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            StoreError::Database(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505")
        )
    }
}
