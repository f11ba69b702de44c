use wikidata_client::WikidataError;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Wikidata(#[from] WikidataError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    /// Block responses from the query service: the remaining work must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Wikidata(e) if e.is_fatal())
    }

    /// Store failures are never absorbed by a batch loop.
    pub fn is_persistence(&self) -> bool {
        matches!(self, IngestError::Database(_) | IngestError::Migration(_))
    }
}
