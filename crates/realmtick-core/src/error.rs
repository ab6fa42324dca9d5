use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("not initialized: run 'realmtick config init'")]
    NotInitialized,

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("action not found in catalog: {0}")]
    ActionNotFound(String),

    #[error("location not found: {0}")]
    LocationNotFound(String),

    #[error("invalid entity id '{0}': must be non-empty and must not contain '/' or ':'")]
    InvalidEntityId(String),

    #[error("key-value store error: {0}")]
    Store(String),

    #[error("entity store error: {0}")]
    EntityStore(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("rule '{rule}' failed: {reason}")]
    Rule { rule: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TickError {
    /// Whether the queue should schedule another attempt for a job that
    /// failed with this error.
    ///
    /// Not-found conditions are terminal: the entity (or job) was removed
    /// concurrently and retrying cannot change the result.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TickError::EntityNotFound(_)
                | TickError::JobNotFound(_)
                | TickError::InvalidEntityId(_)
                | TickError::NotInitialized
        )
    }
}

pub type Result<T> = std::result::Result<T, TickError>;
