//! Engine error taxonomy
//!
//! Every engine operation returns `EngineResult<T>`. Optimistic state is
//! always rolled back before one of these reaches the caller.

use crate::repository::RepositoryError;

/// Domain errors surfaced by the engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Caller is not signed in
    #[error("not authenticated")]
    Auth,

    /// Signed in but not allowed to perform the operation
    #[error("permission denied: {0}")]
    Permission(String),

    /// Referenced item or collection does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Input rejected locally, no remote call was made
    #[error("invalid input: {0}")]
    Validation(String),

    /// Remote call failed for infrastructure reasons; caller decides on retry
    #[error("remote call failed: {0}")]
    Transient(String),

    /// Programming error inside the engine
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Short machine-readable category name
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Auth => "auth",
            EngineError::Permission(_) => "permission",
            EngineError::NotFound(_) => "not_found",
            EngineError::Validation(_) => "validation",
            EngineError::Transient(_) => "transient",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unauthenticated => EngineError::Auth,
            RepositoryError::Forbidden(msg) => EngineError::Permission(msg),
            RepositoryError::NotFound(what) => EngineError::NotFound(what),
            RepositoryError::TableMissing(table) => {
                EngineError::NotFound(format!("table {} not provisioned", table))
            }
            RepositoryError::Transport(msg) => EngineError::Transient(msg),
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_mapping() {
        assert_eq!(EngineError::from(RepositoryError::Unauthenticated), EngineError::Auth);
        assert!(matches!(
            EngineError::from(RepositoryError::TableMissing("favorites".into())),
            EngineError::NotFound(_)
        ));
        let transient = EngineError::from(RepositoryError::Transport("timeout".into()));
        assert!(transient.is_retryable());
        assert_eq!(transient.category(), "transient");
    }

    #[test]
    fn test_display() {
        let err = EngineError::Validation("label must not be empty".into());
        assert!(err.to_string().contains("label must not be empty"));
    }
}
