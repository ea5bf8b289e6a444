//! Credential providers
//!
//! The pipeline asks for credentials exactly once per run and hands them to
//! the storage and portal clients it constructs. Nothing else reads secrets
//! from the environment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Secrets needed by one run
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Empty means "use the ambient AWS credential chain"
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub portal_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &redact(&self.access_key))
            .field("secret_key", &"***")
            .field("bucket_name", &self.bucket_name)
            .field("portal_token", &self.portal_token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn redact(value: &str) -> String {
    match value.get(..4) {
        Some(head) if value.len() > 8 => format!("{}***", head),
        _ => "***".to_string(),
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(&self) -> Result<Credentials>;
}

/// Reads `S3_ACCESS_KEY`/`AWS_ACCESS_KEY_ID`, `S3_SECRET_KEY`/`AWS_SECRET_ACCESS_KEY`,
/// `S3_BUCKET` and `PORTAL_TOKEN`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn get_credentials(&self) -> Result<Credentials> {
        let var = |primary: &str, fallback: &str| {
            std::env::var(primary)
                .or_else(|_| std::env::var(fallback))
                .unwrap_or_default()
        };

        Ok(Credentials {
            access_key: var("S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"),
            secret_key: var("S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"),
            bucket_name: std::env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
            portal_token: std::env::var("PORTAL_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}

/// Shape of the data-lake secret document
#[derive(Deserialize)]
struct DataLakeSecret {
    #[serde(rename = "s3_access_key_secret_name")]
    access_key: String,
    #[serde(rename = "s3_secret_key_secret_name")]
    secret_key: String,
    #[serde(rename = "s3_bucket_name_secret_name")]
    bucket_name: String,
    #[serde(rename = "UKB_synapseclient_token", default)]
    portal_token: Option<String>,
}

/// Reads the data-lake secret JSON document from a file, e.g. one
/// materialised by the secrets manager agent
#[derive(Debug, Clone)]
pub struct SecretDocumentProvider {
    path: PathBuf,
}

impl SecretDocumentProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(document: &str) -> Result<Credentials> {
        let secret: DataLakeSecret =
            serde_json::from_str(document).context("Secret document is not valid JSON of the expected shape")?;
        Ok(Credentials {
            access_key: secret.access_key,
            secret_key: secret.secret_key,
            bucket_name: secret.bucket_name,
            portal_token: secret.portal_token,
        })
    }
}

#[async_trait]
impl CredentialProvider for SecretDocumentProvider {
    async fn get_credentials(&self) -> Result<Credentials> {
        let document = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read secret document {}", self.path.display()))?;
        Self::parse(&document)
    }
}

/// Fixed credentials, for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider(pub Credentials);

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}
