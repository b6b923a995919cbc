//! Error types for the schema catalog

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Coarse classification of every failure the catalog can report.
///
/// Transports map each kind to exactly one protocol status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    IncompatibleSchema,
    MalformedInput,
    StorageFailure,
}

/// Schema catalog errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Schema metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("Schema not found: metadata {metadata_id} version {version}")]
    VersionNotFound { metadata_id: u64, version: u32 },

    #[error("SerDes not found: {0}")]
    SerDesNotFound(u64),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Schema metadata already exists: {0}")]
    AlreadyExists(String),

    #[error("Incompatible schema: {0}")]
    IncompatibleSchema(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt catalog data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::MetadataNotFound(_)
            | RegistryError::VersionNotFound { .. }
            | RegistryError::SerDesNotFound(_)
            | RegistryError::ContentNotFound(_) => ErrorKind::NotFound,
            RegistryError::AlreadyExists(_) => ErrorKind::Conflict,
            RegistryError::IncompatibleSchema(_) => ErrorKind::IncompatibleSchema,
            RegistryError::InvalidSchema(_) | RegistryError::InvalidInput(_) => {
                ErrorKind::MalformedInput
            }
            RegistryError::Corrupt(_) | RegistryError::Io(_) | RegistryError::Json(_) => {
                ErrorKind::StorageFailure
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_share_kind() {
        let metadata = RegistryError::MetadataNotFound("id 7".to_string());
        let version = RegistryError::VersionNotFound { metadata_id: 7, version: 2 };
        assert_eq!(metadata.kind(), ErrorKind::NotFound);
        assert_eq!(version.kind(), ErrorKind::NotFound);
        assert!(matches!(version, RegistryError::VersionNotFound { .. }));
    }

    #[test]
    fn test_io_is_storage_failure() {
        let err: RegistryError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        let corrupt = RegistryError::Corrupt("gap in versions/1".to_string());
        assert_eq!(corrupt.kind(), ErrorKind::StorageFailure);
    }
}
