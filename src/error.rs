//! Error types for vidqueue
//!
//! Centralized error handling using thiserror. Per-job failures never surface
//! here; they are captured by the runner and recorded on the job itself.

use thiserror::Error;

/// All error types that can occur at the queue boundary
#[derive(Debug, Error)]
pub enum QueueError {
    /// Request rejected before it reached the queue
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation refused while a quota cooldown holds admission at zero
    #[error("Quota cooldown active until {0}")]
    CooldownActive(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The engine task is gone (shut down or panicked)
    #[error("Queue engine stopped")]
    EngineStopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_error() {
        let err = QueueError::InvalidRequest("prompt is empty".to_string());
        assert_eq!(err.to_string(), "Invalid request: prompt is empty");
    }

    #[test]
    fn test_cooldown_active_error() {
        let err = QueueError::CooldownActive("2026-10-17T10:00:00Z".to_string());
        assert_eq!(err.to_string(), "Quota cooldown active until 2026-10-17T10:00:00Z");
    }

    #[test]
    fn test_storage_error() {
        let err = QueueError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_engine_stopped_error() {
        assert_eq!(QueueError::EngineStopped.to_string(), "Queue engine stopped");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QueueError = io_err.into();
        assert!(matches!(err, QueueError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: QueueError = json_err.into();
        assert!(matches!(err, QueueError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<String>>("{ not: [a list").unwrap_err();
        let err: QueueError = yaml_err.into();
        assert!(matches!(err, QueueError::Yaml(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(QueueError::EngineStopped)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
