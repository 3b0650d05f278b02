use thiserror::Error;

/// Result type for engine setup operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised when wiring processors and cleaners.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A processor or cleaner was bound to a type with no schema.
    #[error("no schema registered for entity key: {0}")]
    UnknownEntityKey(String),

    #[error("model error: {0}")]
    Model(#[from] normcache_model::ModelError),

    #[error("store error: {0}")]
    Store(#[from] normcache_store::StoreError),
}
