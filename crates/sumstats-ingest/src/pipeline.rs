//! Pipeline driver
//!
//! Runs the per-file pipeline (oracle, fetch, normalise, partition, write)
//! over a bounded pool. Failures are collected as data: `run` never returns
//! an error and one bad file never stops its siblings.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::codec;
use crate::config::SourceDefinition;
use crate::error::{IngestError, IngestResult};
use crate::fetch::SourceFetcher;
use crate::layout::{self, NameRule};
use crate::lookup::LookupSet;
use crate::model::{
    CanonicalRecord, CompletionState, FileOutcome, PartitionOutcome, PerFileResult, SourceCleanup, SourceFile,
    SourceIdentity, WriteResult,
};
use crate::normalize::{conform, normalize, SourceProfile};
use crate::oracle::CompletionOracle;
use crate::partition::partition;
use crate::storage::ObjectStore;
use crate::tabular;
use crate::writer::IdempotentWriter;

/// What the fetched bytes of a source file are
#[derive(Debug, Clone)]
pub enum InputMode {
    /// Delimited text in the profile's raw layout
    Raw(SourceProfile),
    /// A legacy merged Parquet object to split into partitions
    MergedParquet,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub base_prefix: String,
    pub concurrency: usize,
    pub input: InputMode,
    pub name_rule: NameRule,
    /// Delete the object-store source once every partition is in place
    pub delete_source: bool,
}

impl PipelineOptions {
    pub fn ingest(definition: &SourceDefinition, concurrency: usize) -> Self {
        Self {
            base_prefix: definition.base_prefix.clone(),
            concurrency,
            name_rule: definition.profile.output_name.clone(),
            input: InputMode::Raw(definition.profile.clone()),
            delete_source: false,
        }
    }

    pub fn repartition(base_prefix: impl Into<String>, concurrency: usize) -> Self {
        Self {
            base_prefix: base_prefix.into(),
            concurrency,
            input: InputMode::MergedParquet,
            name_rule: NameRule::default(),
            delete_source: true,
        }
    }
}

#[derive(Clone)]
pub struct PipelineDriver {
    fetcher: Arc<dyn SourceFetcher>,
    lookups: Arc<LookupSet>,
    options: Arc<PipelineOptions>,
    oracle: CompletionOracle,
    writer: IdempotentWriter,
    run_id: Uuid,
}

impl PipelineDriver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn SourceFetcher>,
        lookups: Arc<LookupSet>,
        options: PipelineOptions,
    ) -> Self {
        let oracle = CompletionOracle::new(store.clone(), options.base_prefix.clone());
        // the merged object is the input in repartition mode, not evidence
        let oracle = match options.input {
            InputMode::MergedParquet => oracle.ignoring_merged(),
            InputMode::Raw(_) => oracle,
        };

        Self {
            fetcher,
            lookups,
            writer: IdempotentWriter::new(store, options.base_prefix.clone()),
            oracle,
            options: Arc::new(options),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Process every file; results arrive in completion order
    ///
    /// Files that have not started when `cancel` fires are reported as
    /// `Cancelled`; files in flight finish.
    pub async fn run(&self, files: Vec<SourceFile>, cancel: &CancellationToken) -> Vec<PerFileResult> {
        let total = files.len();
        let width = self.options.concurrency.max(1);
        let span = info_span!("run", run_id = %self.run_id, base_prefix = %self.options.base_prefix);

        async move {
            info!(files = total, concurrency = width, "Starting run");

            stream::iter(files.into_iter().enumerate())
                .map(|(index, file)| {
                    let driver = self.clone();
                    let cancel = cancel.clone();
                    let span = info_span!("file", name = %file.name, index = index + 1, total);

                    async move {
                        if cancel.is_cancelled() {
                            warn!("Run cancelled, not starting");
                            return PerFileResult {
                                file,
                                outcome: FileOutcome::Cancelled,
                                elapsed_ms: 0,
                            };
                        }
                        driver.process_file(file).await
                    }
                    .instrument(span)
                })
                .buffer_unordered(width)
                .collect()
                .await
        }
        .instrument(span)
        .await
    }

    async fn process_file(&self, file: SourceFile) -> PerFileResult {
        let started = Instant::now();
        let outcome = self.process(&file).await;

        match &outcome {
            FileOutcome::Failed(err) => error!(kind = err.kind(), error = %err, "File failed"),
            FileOutcome::PartiallyFailed { error, .. } => warn!(error = %error, "File partially written"),
            _ => {}
        }

        let result = PerFileResult {
            file,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if result.is_success() {
            info!(
                written = result.written(),
                skipped = result.skipped(),
                bytes = result.bytes_written(),
                elapsed_ms = result.elapsed_ms,
                "File done"
            );
        }
        result
    }

    async fn process(&self, file: &SourceFile) -> FileOutcome {
        let stem = self.options.name_rule.stem(&file.name);

        let state = match self.oracle.status(&stem).await {
            Ok(state) => state,
            Err(err) => return FileOutcome::Failed(err),
        };
        if state == CompletionState::Complete {
            info!(%stem, "Already complete, skipping");
            return FileOutcome::AlreadyComplete {
                cleanup: self.cleanup(file).await,
            };
        }

        info!(%stem, ?state, "Ingesting");
        let payload = match self.fetcher.fetch(file).await {
            Ok(payload) => payload,
            Err(err) => return FileOutcome::Failed(IngestError::fetch(file.name.clone(), &err)),
        };

        let partitions = match self.decode_and_partition(payload, file, &stem).await {
            Ok(partitions) => partitions,
            Err(err) => return FileOutcome::Failed(err),
        };

        let mut outcomes = Vec::with_capacity(partitions.len());
        for (chr, records) in &partitions {
            let result = if state.already_present(*chr) {
                Ok(WriteResult::Skipped {
                    key: layout::partition_key(&self.options.base_prefix, *chr, &stem),
                })
            } else {
                self.writer.write_partition(&stem, *chr, records).await
            };
            outcomes.push(PartitionOutcome { chr: *chr, result });
        }

        let attempted = outcomes.len();
        let failed = outcomes.iter().filter(|p| p.result.is_err()).count();

        if failed == 0 {
            return FileOutcome::Completed {
                partitions: outcomes,
                cleanup: self.cleanup(file).await,
            };
        }

        if failed == attempted {
            let first = outcomes
                .into_iter()
                .find_map(|p| p.result.err())
                .unwrap_or_else(|| IngestError::PartialPartitionFailure {
                    file: file.name.clone(),
                    attempted,
                    failed,
                });
            return FileOutcome::Failed(first);
        }

        FileOutcome::PartiallyFailed {
            partitions: outcomes,
            error: IngestError::PartialPartitionFailure {
                file: file.name.clone(),
                attempted,
                failed,
            },
        }
    }

    /// Parse and split off the async runtime
    async fn decode_and_partition(
        &self,
        payload: Vec<u8>,
        file: &SourceFile,
        stem: &str,
    ) -> IngestResult<BTreeMap<i32, Vec<CanonicalRecord>>> {
        let options = self.options.clone();
        let lookups = self.lookups.clone();
        let file_name = file.name.clone();
        let stem = stem.to_string();
        let span = tracing::Span::current();

        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let records = match &options.input {
                InputMode::Raw(profile) => {
                    let raw = tabular::read_table(&payload, profile.format)
                        .map_err(|err| IngestError::schema(file_name.clone(), format!("{:#}", err)))?;
                    normalize(&raw, profile, &lookups, &file_name)?
                }
                InputMode::MergedParquet => {
                    let decoded = codec::decode(payload, &stem)?;
                    let total = decoded.len();
                    let records = conform(decoded, &file_name)?;
                    if records.len() < total {
                        warn!(dropped = total - records.len(), "Dropped merged records without an rsid");
                    }
                    records
                }
            };
            info!(records = records.len(), "Normalized");
            Ok::<_, IngestError>(partition(records))
        });

        task.await
            .map_err(|err| IngestError::Codec(format!("Decode task for {} failed: {}", file.name, err)))?
    }

    async fn cleanup(&self, file: &SourceFile) -> SourceCleanup {
        match (&file.identity, self.options.delete_source) {
            (SourceIdentity::ObjectKey(key), true) => self.writer.remove_source(key).await,
            _ => SourceCleanup::NotRequested,
        }
    }
}

/// Aggregate view of a run, logged at the end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub completed: usize,
    pub already_complete: usize,
    pub partially_failed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub partitions_written: usize,
    pub partitions_skipped: usize,
    pub bytes_written: usize,
    pub sources_deleted: usize,
    /// `(file, cause)` for every file that did not succeed, cancelled ones excluded
    pub failures: Vec<(String, String)>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_results(run_id: Uuid, results: &[PerFileResult], elapsed: Duration) -> Self {
        let mut summary = Self {
            run_id,
            total: results.len(),
            elapsed,
            finished_at: Utc::now(),
            ..Default::default()
        };

        for result in results {
            summary.partitions_written += result.written();
            summary.partitions_skipped += result.skipped();
            summary.bytes_written += result.bytes_written();

            match &result.outcome {
                FileOutcome::AlreadyComplete { cleanup } | FileOutcome::Completed { cleanup, .. } => {
                    if matches!(result.outcome, FileOutcome::AlreadyComplete { .. }) {
                        summary.already_complete += 1;
                    } else {
                        summary.completed += 1;
                    }
                    if *cleanup == SourceCleanup::Deleted {
                        summary.sources_deleted += 1;
                    }
                }
                FileOutcome::PartiallyFailed { .. } => summary.partially_failed += 1,
                FileOutcome::Failed(_) => summary.failed += 1,
                FileOutcome::Cancelled => summary.cancelled += 1,
            }

            if !matches!(result.outcome, FileOutcome::Cancelled) {
                if let Some(cause) = result.failure() {
                    summary.failures.push((result.file.name.clone(), cause));
                }
            }
        }

        summary
    }

    pub fn succeeded(&self) -> usize {
        self.completed + self.already_complete
    }

    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            total = self.total,
            completed = self.completed,
            already_complete = self.already_complete,
            partially_failed = self.partially_failed,
            failed = self.failed,
            cancelled = self.cancelled,
            partitions_written = self.partitions_written,
            partitions_skipped = self.partitions_skipped,
            bytes_written = self.bytes_written,
            sources_deleted = self.sources_deleted,
            elapsed_secs = self.elapsed.as_secs_f64(),
            finished_at = %self.finished_at.to_rfc3339(),
            "Run finished: {} / {} files succeeded",
            self.succeeded(),
            self.total
        );

        for (file, cause) in &self.failures {
            error!(file = %file, "Failed: {}", cause);
        }
    }
}
