//! Object storage
//!
//! The pipeline only needs five operations from storage: existence probe,
//! read, write, delete and prefix listing. [`ObjectStore`] captures that
//! contract; [`S3ObjectStore`] talks to S3 or MinIO and
//! [`MemoryObjectStore`] backs tests and dry runs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials as AwsCredentials, Region},
    primitives::ByteStream,
    Client,
};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use crate::credentials::Credentials;

pub mod config;
pub mod memory;

pub use config::StorageConfig;
pub use memory::MemoryObjectStore;

/// Minimal storage contract used by the oracle, writer and fetchers
///
/// Every object store is bound to a single bucket at construction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Every key under `prefix`, pages fetched lazily
    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>>;
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from explicit keys, or from the ambient AWS chain when
    /// no access key was provided
    pub async fn connect(config: &StorageConfig, credentials: &Credentials) -> Result<Self> {
        debug!("Initializing S3 object store with config: {:?}", config);

        if credentials.bucket_name.is_empty() {
            return Err(anyhow!("Bucket name must not be empty"));
        }

        let mut builder = if credentials.access_key.is_empty() {
            let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        } else {
            let keys = AwsCredentials::new(
                &credentials.access_key,
                &credentials.secret_key,
                None,
                None,
                "sumstats-ingest",
            );
            aws_sdk_s3::Config::builder()
                .credentials_provider(keys)
                .region(Region::new(config.region.clone()))
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!("Object store initialized for bucket: {}", credentials.bucket_name);

        Ok(Self::from_client(client, credentials.bucket_name.clone()))
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(anyhow!(
                        "Failed to check existence of s3://{}/{}: {}",
                        self.bucket,
                        key,
                        err
                    ))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download s3://{}/{}", self.bucket, key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(data)
    }

    #[instrument(skip(self, data))]
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/vnd.apache.parquet")
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload s3://{}/{}", self.bucket, key))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;

        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>> {
        // state: None = done, Some(token) = fetch the next page
        let pages = stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok(None);
            };

            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token)
                .send()
                .await
                .with_context(|| format!("Failed to list s3://{}/{}", self.bucket, prefix))?;

            let keys: Vec<Result<String>> = response
                .contents()
                .iter()
                .filter_map(|object| object.key().map(|k| Ok(k.to_string())))
                .collect();

            let next = if response.is_truncated().unwrap_or(false) {
                response.next_continuation_token().map(|t| Some(t.to_string()))
            } else {
                None
            };

            debug!("Listed {} keys under s3://{}/{}", keys.len(), self.bucket, prefix);
            Ok::<_, anyhow::Error>(Some((stream::iter(keys), next)))
        });

        pages.try_flatten().boxed()
    }
}
