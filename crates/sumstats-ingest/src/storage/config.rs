use serde::{Deserialize, Serialize};
use std::env;

/// Default data-lake region
pub const DEFAULT_REGION: &str = "eu-west-2";

/// Connection settings for the S3-compatible object store
///
/// Keys and bucket come from the [`CredentialProvider`](crate::credentials::CredentialProvider);
/// this only describes where and how to connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Custom endpoint, e.g. a MinIO instance; `None` targets AWS
    pub endpoint: Option<String>,
    pub region: String,
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            path_style: false,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            path_style: true,
        }
    }
}
