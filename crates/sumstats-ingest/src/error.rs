//! Ingestion error taxonomy
//!
//! Every failure that can happen while processing one source file is mapped
//! onto one of these variants at the component boundary. Causes from the
//! storage and HTTP collaborators arrive as `anyhow` chains and are rendered
//! into strings so results stay `Clone` and can be summarised after the run.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Fetch failed for {file}: {cause}")]
    FetchFailed { file: String, cause: String },

    #[error("Schema mismatch in {file}: {detail}")]
    SchemaMismatch { file: String, detail: String },

    #[error("Existence check failed for {key}: {cause}")]
    ExistenceCheckFailed { key: String, cause: String },

    #[error("Write failed for {file} at {key}: {cause}")]
    WriteFailed {
        file: String,
        key: String,
        cause: String,
    },

    #[error("{file}: {failed} of {attempted} partitions failed")]
    PartialPartitionFailure {
        file: String,
        attempted: usize,
        failed: usize,
    },

    #[error("Columnar codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn fetch(file: impl Into<String>, cause: &anyhow::Error) -> Self {
        IngestError::FetchFailed {
            file: file.into(),
            cause: format!("{:#}", cause),
        }
    }

    pub fn schema(file: impl Into<String>, detail: impl Into<String>) -> Self {
        IngestError::SchemaMismatch {
            file: file.into(),
            detail: detail.into(),
        }
    }

    pub fn existence(key: impl Into<String>, cause: &anyhow::Error) -> Self {
        IngestError::ExistenceCheckFailed {
            key: key.into(),
            cause: format!("{:#}", cause),
        }
    }

    pub fn write(file: impl Into<String>, key: impl Into<String>, cause: &anyhow::Error) -> Self {
        IngestError::WriteFailed {
            file: file.into(),
            key: key.into(),
            cause: format!("{:#}", cause),
        }
    }

    /// Short machine-friendly label used in summaries and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::FetchFailed { .. } => "fetch_failed",
            IngestError::SchemaMismatch { .. } => "schema_mismatch",
            IngestError::ExistenceCheckFailed { .. } => "existence_check_failed",
            IngestError::WriteFailed { .. } => "write_failed",
            IngestError::PartialPartitionFailure { .. } => "partial_partition_failure",
            IngestError::Codec(_) => "codec",
            IngestError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cause_keeps_context_chain() {
        let err = std::result::Result::<(), _>::Err(std::io::Error::other("connection reset"))
            .context("GET https://example.org/a.gz")
            .unwrap_err();

        let mapped = IngestError::fetch("a.gz", &err);
        assert_eq!(mapped.kind(), "fetch_failed");
        assert_eq!(
            mapped.to_string(),
            "Fetch failed for a.gz: GET https://example.org/a.gz: connection reset"
        );
    }

    #[test]
    fn test_partial_failure_display() {
        let err = IngestError::PartialPartitionFailure {
            file: "olink_a".to_string(),
            attempted: 23,
            failed: 2,
        };
        assert_eq!(err.to_string(), "olink_a: 2 of 23 partitions failed");
    }
}
