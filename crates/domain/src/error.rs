use std::time::Duration;

/// Every fallible operation in `store`, `platform`, and the FSM driver
/// resolves to one of these; `apps/api` maps them to HTTP status codes and
/// `apps/scheduler` decides retry/backoff from them.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("spacing conflict: {message}")]
    SpacingConflict {
        message: String,
        neighbors: Vec<chrono::DateTime<chrono::Utc>>,
    },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("transient: {0}")]
    Transient(String),

    #[error("terminal: {code}: {message}")]
    Terminal { code: String, message: String },
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::RateLimited { .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
