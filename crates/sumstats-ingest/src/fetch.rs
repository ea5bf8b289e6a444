//! Raw byte fetchers
//!
//! Fetchers return the payload exactly as served; gzip and tar handling
//! happens in [`crate::tabular`]. Failures are reported once, there is no
//! retry within a run.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::model::{SourceFile, SourceIdentity};
use crate::storage::ObjectStore;

const USER_AGENT: &str = concat!("sumstats-ingest/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 3600;

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>>;
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

async fn read_body(response: reqwest::Response, target: &str) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        bail!("GET {} returned {}", target, status);
    }

    let body = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {}", target))?;
    info!("Downloaded {} ({} MB)", target, body.len() / (1024 * 1024));
    Ok(body.to_vec())
}

/// Plain HTTP(S) downloads for `SourceIdentity::Url`
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>> {
        let SourceIdentity::Url(url) = &file.identity else {
            bail!("HTTP fetcher cannot fetch {}", file.identity);
        };

        debug!("Downloading {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        read_body(response, url).await
    }
}

/// Reads `SourceIdentity::ObjectKey` from the run's bucket
#[derive(Clone)]
pub struct ObjectStoreFetcher {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceFetcher for ObjectStoreFetcher {
    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>> {
        let SourceIdentity::ObjectKey(key) = &file.identity else {
            bail!("Object store fetcher cannot fetch {}", file.identity);
        };
        self.store.get(key).await
    }
}

/// Downloads `SourceIdentity::PortalResource` files from the research-data
/// portal's file endpoint with a bearer token
#[derive(Clone)]
pub struct PortalFetcher {
    client: Client,
    base_url: String,
    token: String,
}

impl PortalFetcher {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            bail!("Portal token must not be empty");
        }
        Ok(Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl SourceFetcher for PortalFetcher {
    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>> {
        let SourceIdentity::PortalResource(id) = &file.identity else {
            bail!("Portal fetcher cannot fetch {}", file.identity);
        };

        let url = format!("{}/{}", self.base_url, id);
        debug!("Downloading portal resource {} ({})", id, file.name);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        read_body(response, &url).await
    }
}

/// Routes each source file to the fetcher for its identity kind
#[derive(Clone, Default)]
pub struct RoutingFetcher {
    http: Option<Arc<dyn SourceFetcher>>,
    object: Option<Arc<dyn SourceFetcher>>,
    portal: Option<Arc<dyn SourceFetcher>>,
}

impl RoutingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.http = Some(fetcher);
        self
    }

    pub fn with_object_store(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.object = Some(fetcher);
        self
    }

    pub fn with_portal(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.portal = Some(fetcher);
        self
    }
}

#[async_trait]
impl SourceFetcher for RoutingFetcher {
    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>> {
        let (route, kind) = match file.identity {
            SourceIdentity::Url(_) => (&self.http, "HTTP"),
            SourceIdentity::ObjectKey(_) => (&self.object, "object store"),
            SourceIdentity::PortalResource(_) => (&self.portal, "portal"),
        };
        let fetcher = route
            .as_ref()
            .ok_or_else(|| anyhow!("No {} fetcher configured for {}", kind, file.identity))?;
        fetcher.fetch(file).await
    }
}

/// Serves fixed payloads by identity, for tests and local replays
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    payloads: HashMap<SourceIdentity, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identity: SourceIdentity, payload: impl Into<Vec<u8>>) -> Self {
        self.payloads.insert(identity, payload.into());
        self
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>> {
        self.payloads
            .get(&file.identity)
            .cloned()
            .ok_or_else(|| anyhow!("No payload for {}", file.identity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[tokio::test]
    async fn test_routing_by_identity() {
        let store = Arc::new(MemoryObjectStore::default());
        store.insert("TER/UKB_Olink/a.parquet", b"merged".to_vec());

        let fetcher = RoutingFetcher::new()
            .with_object_store(Arc::new(ObjectStoreFetcher::new(store)))
            .with_http(Arc::new(
                StaticFetcher::new().with(SourceIdentity::Url("https://x/a.gz".into()), b"gz".to_vec()),
            ));

        let merged = fetcher
            .fetch(&SourceFile::object("TER/UKB_Olink/a.parquet", "a"))
            .await
            .unwrap();
        assert_eq!(merged, b"merged");
        assert_eq!(fetcher.fetch(&SourceFile::url("https://x/a.gz", "a.gz")).await.unwrap(), b"gz");

        let err = fetcher.fetch(&SourceFile::portal("syn1", "a.tar")).await.unwrap_err();
        assert!(err.to_string().contains("No portal fetcher"));
    }

    #[tokio::test]
    async fn test_wrong_identity_kind() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(fetcher.fetch(&SourceFile::object("k", "k")).await.is_err());
    }

    #[test]
    fn test_portal_requires_token() {
        assert!(PortalFetcher::new("https://portal.example.org/files", "").is_err());
    }
}
