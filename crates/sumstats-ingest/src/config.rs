//! Run configuration
//!
//! `IngestConfig` carries the environment-driven knobs of a run;
//! `SourceDefinition` describes one source end to end (profile, manifest,
//! side tables, destination, pool width) and can be loaded from JSON.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, IngestResult};
use crate::lookup::{LookupFormat, LookupSpec};
use crate::manifest::{IdentityKind, ManifestSpec, NameSource};
use crate::normalize::profiles::{self, DECODE_ANNOTATION, UKB_BUILD_MAPPING};
use crate::normalize::SourceProfile;
use crate::storage::StorageConfig;
use crate::tabular::{Delimiter, RawFormat};

/// Default pool width when a definition does not set one
pub const DEFAULT_CONCURRENCY: usize = 4;

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// How a source's raw files are retrieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchKind {
    Http,
    ObjectStore,
    /// Research-data portal; falls back to `PORTAL_BASE_URL` when unset
    Portal {
        #[serde(default)]
        base_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    pub base_prefix: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub profile: SourceProfile,
    pub manifest: ManifestSpec,
    #[serde(default)]
    pub lookups: Vec<LookupSpec>,
    pub fetch: FetchKind,
}

impl SourceDefinition {
    pub fn finngen() -> Self {
        Self {
            name: "finngen".to_string(),
            base_prefix: "TER/FinnGen_r10".to_string(),
            concurrency: 30,
            profile: profiles::finngen(),
            manifest: ManifestSpec {
                path: PathBuf::from("manifest/summary_stats_R10_manifest.tsv"),
                delimiter: Delimiter::Tab,
                identity_column: "path_https".to_string(),
                identity_kind: IdentityKind::Url,
                name: NameSource::GzUrlSegment,
            },
            lookups: Vec::new(),
            fetch: FetchKind::Http,
        }
    }

    pub fn decode() -> Self {
        Self {
            name: "decode".to_string(),
            base_prefix: "TER/deCODE_SomaScan".to_string(),
            concurrency: 4,
            profile: profiles::decode(),
            manifest: ManifestSpec {
                path: PathBuf::from("manifest/decode_protein_manifest.csv"),
                delimiter: Delimiter::Comma,
                identity_column: "urls".to_string(),
                identity_kind: IdentityKind::Url,
                name: NameSource::Column("filename".to_string()),
            },
            lookups: vec![LookupSpec {
                name: DECODE_ANNOTATION.to_string(),
                key: "Resource/assocvariants.annotated.txt.gz".to_string(),
                format: LookupFormat::Delimited(RawFormat::tsv()),
                key_column: "Name".to_string(),
                value_columns: vec!["effectAlleleFreq".to_string()],
            }],
            fetch: FetchKind::Http,
        }
    }

    pub fn ukb_olink() -> Self {
        Self {
            name: "ukb_olink".to_string(),
            base_prefix: "TER/UKB_Olink".to_string(),
            concurrency: 2,
            profile: profiles::ukb_olink(),
            manifest: ManifestSpec {
                path: PathBuf::from("manifest/ukb_ppp_olink_manifest.tsv"),
                delimiter: Delimiter::Tab,
                identity_column: "id".to_string(),
                identity_kind: IdentityKind::PortalResource,
                name: NameSource::Column("name".to_string()),
            },
            lookups: vec![LookupSpec {
                name: UKB_BUILD_MAPPING.to_string(),
                key: "Resource/build_mapping.parquet".to_string(),
                format: LookupFormat::Parquet,
                key_column: "ID".to_string(),
                value_columns: vec!["rsid".to_string(), "POS38".to_string()],
            }],
            fetch: FetchKind::Portal { base_url: None },
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "finngen" => Some(Self::finngen()),
            "decode" => Some(Self::decode()),
            "ukb_olink" | "ukb-olink" => Some(Self::ukb_olink()),
            _ => None,
        }
    }

    /// Load a custom definition; a relative manifest path is resolved
    /// against the definition file's directory
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source definition {}", path.display()))?;
        let definition: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid source definition {}", path.display()))?;
        definition.validate()?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            manifest: definition.manifest.clone().resolve_relative_to(dir),
            ..definition
        })
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.concurrency == 0 {
            return Err(IngestError::Config(format!(
                "Source {} must have a concurrency of at least 1",
                self.name
            )));
        }
        if self.base_prefix.trim_matches('/').is_empty() {
            return Err(IngestError::Config(format!(
                "Source {} must have a non-empty base prefix",
                self.name
            )));
        }
        self.profile.validate()
    }
}

/// Environment-driven run settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestConfig {
    /// Overrides the definition's pool width
    pub concurrency: Option<usize>,
    /// Process only the first N manifest entries
    pub limit: Option<usize>,
    pub portal_base_url: Option<String>,
    /// JSON secret document to read credentials from instead of the environment
    pub secret_document: Option<PathBuf>,
    pub storage: StorageConfig,
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => bail!("Invalid {}: {}", name, value),
        },
        _ => Ok(None),
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            concurrency: parse_var("INGEST_CONCURRENCY")?,
            limit: parse_var("INGEST_LIMIT")?,
            portal_base_url: std::env::var("PORTAL_BASE_URL").ok().filter(|v| !v.is_empty()),
            secret_document: std::env::var("SECRET_DOCUMENT")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            storage: StorageConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            bail!("INGEST_CONCURRENCY must be greater than 0");
        }
        Ok(())
    }

    pub fn concurrency_for(&self, definition: &SourceDefinition) -> usize {
        self.concurrency.unwrap_or(definition.concurrency).max(1)
    }

    pub fn apply_limit<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        items
    }
}
