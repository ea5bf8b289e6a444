//! Source file enumeration
//!
//! A run's inputs come either from a manifest file (one row per source file)
//! or, in repartition mode, from listing legacy merged objects in the bucket.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::layout;
use crate::model::{SourceFile, SourceIdentity};
use crate::storage::ObjectStore;
use crate::tabular::{self, Archive, Delimiter, RawFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Url,
    ObjectKey,
    PortalResource,
}

impl IdentityKind {
    fn identity(self, value: String) -> SourceIdentity {
        match self {
            IdentityKind::Url => SourceIdentity::Url(value),
            IdentityKind::ObjectKey => SourceIdentity::ObjectKey(value),
            IdentityKind::PortalResource => SourceIdentity::PortalResource(value),
        }
    }
}

/// Where a source file's name comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", content = "column", rename_all = "snake_case")]
pub enum NameSource {
    /// A manifest column
    Column(String),
    /// The last `.gz` path segment of a URL identity
    GzUrlSegment,
    /// The identity value itself
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub delimiter: Delimiter,
    pub identity_column: String,
    pub identity_kind: IdentityKind,
    pub name: NameSource,
}

impl ManifestSpec {
    pub async fn load(&self) -> Result<Vec<SourceFile>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read manifest {}", self.path.display()))?;
        let files = self.parse(&data)?;
        info!(
            manifest = %self.path.display(),
            files = files.len(),
            "Loaded manifest"
        );
        Ok(files)
    }

    /// Rows with no identity or no derivable name are skipped with a warning
    pub fn parse(&self, data: &[u8]) -> Result<Vec<SourceFile>> {
        let format = RawFormat {
            delimiter: self.delimiter,
            archive: Archive::None,
        };
        let table = tabular::read_table(data, format).context("Failed to parse manifest")?;

        let identity_index = table
            .column_index(&self.identity_column)
            .with_context(|| format!("Manifest has no column {}", self.identity_column))?;
        let name_index = match &self.name {
            NameSource::Column(column) => Some(
                table
                    .column_index(column)
                    .with_context(|| format!("Manifest has no column {}", column))?,
            ),
            _ => None,
        };

        let mut files = Vec::with_capacity(table.len());
        for (line, row) in table.rows().iter().enumerate() {
            let Some(identity) = row.get(identity_index).cloned().flatten() else {
                warn!(line = line + 1, "Manifest row has no identity, skipping");
                continue;
            };

            let name = match (&self.name, name_index) {
                (NameSource::Column(_), Some(index)) => row.get(index).cloned().flatten(),
                (NameSource::GzUrlSegment, _) => layout::gz_name_from_url(&identity).map(str::to_string),
                _ => Some(identity.clone()),
            };
            let Some(name) = name else {
                warn!(line = line + 1, %identity, "Cannot derive a file name, skipping");
                continue;
            };

            files.push(SourceFile::new(self.identity_kind.identity(identity), name));
        }

        Ok(files)
    }

    pub fn resolve_relative_to(mut self, dir: &Path) -> Self {
        if self.path.is_relative() {
            self.path = dir.join(&self.path);
        }
        self
    }
}

/// Legacy merged objects directly under `base_prefix`, named by their stem
pub async fn list_merged_objects(store: &dyn ObjectStore, base_prefix: &str) -> Result<Vec<SourceFile>> {
    let prefix = format!("{}/", base_prefix.trim_end_matches('/'));
    let keys: Vec<String> = store
        .list(&prefix)
        .try_collect()
        .await
        .with_context(|| format!("Failed to list {}", prefix))?;

    let files: Vec<SourceFile> = keys
        .iter()
        .filter_map(|key| layout::merged_stem(base_prefix, key).map(|stem| SourceFile::object(key.clone(), stem)))
        .collect();

    info!(
        prefix = %prefix,
        listed = keys.len(),
        merged = files.len(),
        "Listed merged objects"
    );
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use std::io::Write;

    #[test]
    fn test_finngen_manifest_names_from_url() {
        let spec = ManifestSpec {
            path: PathBuf::from("unused"),
            delimiter: Delimiter::Tab,
            identity_column: "path_https".into(),
            identity_kind: IdentityKind::Url,
            name: NameSource::GzUrlSegment,
        };
        let data = b"phenocode\tpath_https\n\
                     AB1\thttps://storage.googleapis.com/r10/finngen_R10_AB1.gz\n\
                     AB2\thttps://storage.googleapis.com/r10/readme.txt\n\
                     AB3\t\n";

        let files = spec.parse(data).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "finngen_R10_AB1.gz");
        assert!(matches!(files[0].identity, SourceIdentity::Url(_)));
    }

    #[tokio::test]
    async fn test_decode_manifest_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"urls,filename\nhttps://download.decode.is/a.txt.gz,10000_28_CRYBB2_CRBB2.txt.gz\n")
            .unwrap();

        let spec = ManifestSpec {
            path: file.path().to_path_buf(),
            delimiter: Delimiter::Comma,
            identity_column: "urls".into(),
            identity_kind: IdentityKind::Url,
            name: NameSource::Column("filename".into()),
        };

        let files = spec.load().await.unwrap();
        assert_eq!(files, vec![SourceFile::url("https://download.decode.is/a.txt.gz", "10000_28_CRYBB2_CRBB2.txt.gz")]);
    }

    #[test]
    fn test_missing_identity_column() {
        let spec = ManifestSpec {
            path: PathBuf::from("unused"),
            delimiter: Delimiter::Comma,
            identity_column: "urls".into(),
            identity_kind: IdentityKind::Url,
            name: NameSource::Identity,
        };
        assert!(spec.parse(b"id,name\n1,a\n").is_err());
    }

    #[tokio::test]
    async fn test_list_merged_objects_skips_partitions() {
        let store = MemoryObjectStore::default();
        store.insert("TER/UKB_Olink/a.parquet", b"".to_vec());
        store.insert("TER/UKB_Olink/chr1/a.parquet", b"".to_vec());
        store.insert("TER/UKB_Olink/notes.txt", b"".to_vec());
        store.insert("TER/UKB_Olink_old/b.parquet", b"".to_vec());

        let files = list_merged_objects(&store, "TER/UKB_Olink").await.unwrap();
        assert_eq!(files, vec![SourceFile::object("TER/UKB_Olink/a.parquet", "a")]);
    }
}
