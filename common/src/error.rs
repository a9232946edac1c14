use thiserror::Error;
use tokio::task::JoinError;

/// Failure of a single expansion query, attributed to the lookup that raised it.
///
/// Recoverable at batch level: the scheduler records it against the key and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expansion of {anchor} with synthon {synthon} failed: {message}")]
pub struct BackendError {
    pub anchor: String,
    pub synthon: String,
    pub message: String,
}

impl BackendError {
    pub fn new(anchor: &str, synthon: &str, message: impl Into<String>) -> Self {
        Self {
            anchor: anchor.to_owned(),
            synthon: synthon.to_owned(),
            message: message.into(),
        }
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Cache storage error: {0}")]
    CacheStorage(String),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Errors that must abort the whole run rather than a single lookup.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AppError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_names_the_lookup() {
        let err = BackendError::new("c1ccccc1", "[*]C", "connection reset");
        assert_eq!(
            err.to_string(),
            "expansion of c1ccccc1 with synthon [*]C failed: connection reset"
        );
        let app: AppError = err.into();
        assert!(!app.is_fatal());
    }

    #[test]
    fn storage_failures_are_fatal() {
        let err = AppError::CacheStorage("disk full".into());
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Cache storage error: disk full");
    }
}
