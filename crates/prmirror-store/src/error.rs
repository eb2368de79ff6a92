//! Store error type.

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("json column encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The session's transaction was consumed and not reopened.
    #[error("session is closed")]
    SessionClosed,
}
