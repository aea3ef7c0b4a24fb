use thiserror::Error;

/// Errors surfaced by the matchmaking core.
///
/// The first four variants are the validation taxonomy callers are expected to
/// branch on; the remainder wrap transport failures from the store, the event
/// bridge, and the profile directory.
#[derive(Debug, Error)]
pub enum EmberError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("event bridge error: {0}")]
    Events(#[from] redis::RedisError),

    #[error("directory error: {0}")]
    Directory(#[from] reqwest::Error),

    #[error("directory returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmberError {
    /// True for validation failures a scheduler tick treats as recoverable
    /// per-pair outcomes rather than tick-fatal errors.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EmberError::NotFound(_)
                | EmberError::Conflict(_)
                | EmberError::BadRequest(_)
                | EmberError::Forbidden(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EmberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(EmberError::Conflict("dup".into()).is_validation());
        assert!(EmberError::BadRequest("score".into()).is_validation());
        assert!(!EmberError::InvalidResponse("body".into()).is_validation());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = EmberError::Forbidden("not a participant".into());
        assert_eq!(err.to_string(), "forbidden: not a participant");
    }
}
