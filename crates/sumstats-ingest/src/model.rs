//! Core data model for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::IngestError;

/// Lowest autosome code
pub const FIRST_CHROMOSOME: i32 = 1;
/// Integer code used for the X chromosome
pub const X_CHROMOSOME: i32 = 23;

/// Every chromosome code a source file may be partitioned into
pub fn all_chromosomes() -> impl Iterator<Item = i32> {
    FIRST_CHROMOSOME..=X_CHROMOSOME
}

pub fn is_valid_chromosome(chr: i32) -> bool {
    (FIRST_CHROMOSOME..=X_CHROMOSOME).contains(&chr)
}

/// Where a source file's raw bytes come from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceIdentity {
    /// Flat-file download
    Url(String),
    /// Object in the data lake bucket
    ObjectKey(String),
    /// Resource id on the research-data portal
    PortalResource(String),
}

impl SourceIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            SourceIdentity::Url(v) | SourceIdentity::ObjectKey(v) | SourceIdentity::PortalResource(v) => v,
        }
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceIdentity::Url(url) => write!(f, "{}", url),
            SourceIdentity::ObjectKey(key) => write!(f, "s3:{}", key),
            SourceIdentity::PortalResource(id) => write!(f, "portal:{}", id),
        }
    }
}

/// One input file, as enumerated by a manifest or a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    pub identity: SourceIdentity,
    /// Human-readable name; the output stem is derived from it
    pub name: String,
}

impl SourceFile {
    pub fn new(identity: SourceIdentity, name: impl Into<String>) -> Self {
        Self {
            identity,
            name: name.into(),
        }
    }

    pub fn url(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SourceIdentity::Url(url.into()), name)
    }

    pub fn object(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SourceIdentity::ObjectKey(key.into()), name)
    }

    pub fn portal(resource_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SourceIdentity::PortalResource(resource_id.into()), name)
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.identity)
    }
}

/// Normalised summary-statistics row shared by every source
///
/// `snp` always starts with `rs` and `chr` is in `1..=23` with X coded as 23.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    #[serde(rename = "SNP")]
    pub snp: String,
    pub chr: i32,
    pub pos: i64,
    pub effect_allele: String,
    pub other_allele: String,
    pub eaf: Option<f64>,
    pub beta: f64,
    pub se: f64,
    pub pval: f64,
    pub mlogp: f64,
    pub file_name: String,
}

/// How much of a source file's output already exists at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionState {
    NotStarted,
    /// Some per-chromosome objects exist; holds the chromosomes still missing
    PartiallyComplete(BTreeSet<i32>),
    Complete,
}

impl CompletionState {
    /// Chromosomes that must not be rewritten because their object exists
    pub fn already_present(&self, chr: i32) -> bool {
        match self {
            CompletionState::NotStarted => false,
            CompletionState::PartiallyComplete(missing) => !missing.contains(&chr),
            CompletionState::Complete => true,
        }
    }
}

/// Result of writing one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Written {
        key: String,
        rows: usize,
        bytes: usize,
        sha256: String,
    },
    /// The destination already existed; nothing was encoded or uploaded
    Skipped { key: String },
}

impl WriteResult {
    pub fn key(&self) -> &str {
        match self {
            WriteResult::Written { key, .. } | WriteResult::Skipped { key } => key,
        }
    }
}

/// Per-chromosome write report for one source file
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOutcome {
    pub chr: i32,
    pub result: Result<WriteResult, IngestError>,
}

/// What happened to the unpartitioned source object after partitioning
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceCleanup {
    #[default]
    NotRequested,
    Deleted,
    /// Partitions are in place but the source object could not be removed
    DeleteFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// The completion oracle found every expected object; nothing fetched
    AlreadyComplete { cleanup: SourceCleanup },
    /// Every partition ended `Written` or `Skipped`
    Completed {
        partitions: Vec<PartitionOutcome>,
        cleanup: SourceCleanup,
    },
    /// Some partitions were written, others failed; a re-run completes the rest
    PartiallyFailed {
        partitions: Vec<PartitionOutcome>,
        error: IngestError,
    },
    Failed(IngestError),
    Cancelled,
}

/// Outcome for one source file, collected by the pipeline driver
#[derive(Debug, Clone, PartialEq)]
pub struct PerFileResult {
    pub file: SourceFile,
    pub outcome: FileOutcome,
    pub elapsed_ms: u64,
}

impl PerFileResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            FileOutcome::AlreadyComplete { .. } | FileOutcome::Completed { .. }
        )
    }

    pub fn partitions(&self) -> &[PartitionOutcome] {
        match &self.outcome {
            FileOutcome::Completed { partitions, .. }
            | FileOutcome::PartiallyFailed { partitions, .. } => partitions,
            _ => &[],
        }
    }

    pub fn written(&self) -> usize {
        self.partitions()
            .iter()
            .filter(|p| matches!(p.result, Ok(WriteResult::Written { .. })))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.partitions()
            .iter()
            .filter(|p| matches!(p.result, Ok(WriteResult::Skipped { .. })))
            .count()
    }

    pub fn bytes_written(&self) -> usize {
        self.partitions()
            .iter()
            .filter_map(|p| match &p.result {
                Ok(WriteResult::Written { bytes, .. }) => Some(*bytes),
                _ => None,
            })
            .sum()
    }

    /// Human-readable failure cause, if the file did not succeed
    pub fn failure(&self) -> Option<String> {
        match &self.outcome {
            FileOutcome::Failed(err) => Some(err.to_string()),
            FileOutcome::PartiallyFailed { error, partitions } => {
                let causes: Vec<String> = partitions
                    .iter()
                    .filter_map(|p| p.result.as_ref().err().map(|e| format!("chr{}: {}", p.chr, e)))
                    .collect();
                Some(format!("{} [{}]", error, causes.join("; ")))
            }
            FileOutcome::Cancelled => Some("cancelled before start".to_string()),
            _ => None,
        }
    }
}
