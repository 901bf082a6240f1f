//! Error types for the storage layer

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing a store file
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The in-memory state could not be serialized
    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The file exists but does not hold a document we understand
    #[error("Corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StorageError::io(
            "data/warnings.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error.to_string(), "I/O error on data/warnings.json: denied");

        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let error = StorageError::Corrupt {
            path: "data/stats.json".into(),
            source,
        };
        assert!(error.to_string().starts_with("Corrupt store file data/stats.json"));
    }
}
