//! Completion oracle
//!
//! Decides from existence probes alone how much of a source file's output
//! is already at the destination. No payload is read.

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::layout;
use crate::model::{all_chromosomes, CompletionState};
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct CompletionOracle {
    store: Arc<dyn ObjectStore>,
    base_prefix: String,
    merged_is_evidence: bool,
}

impl CompletionOracle {
    pub fn new(store: Arc<dyn ObjectStore>, base_prefix: impl Into<String>) -> Self {
        Self {
            store,
            base_prefix: base_prefix.into(),
            merged_is_evidence: true,
        }
    }

    /// Do not treat the merged object as proof of completion
    ///
    /// Used when the merged object is itself the input being partitioned.
    pub fn ignoring_merged(mut self) -> Self {
        self.merged_is_evidence = false;
        self
    }

    async fn probe(&self, key: String) -> IngestResult<bool> {
        self.store
            .exists(&key)
            .await
            .map_err(|err| IngestError::existence(key.clone(), &err))
    }

    /// Completion state for the output stem of one source file
    pub async fn status(&self, stem: &str) -> IngestResult<CompletionState> {
        if self.merged_is_evidence && self.probe(layout::merged_key(&self.base_prefix, stem)).await? {
            debug!(stem, "Merged object present");
            return Ok(CompletionState::Complete);
        }

        let probes = all_chromosomes().map(|chr| {
            let key = layout::partition_key(&self.base_prefix, chr, stem);
            async move { self.probe(key).await.map(|present| (chr, present)) }
        });
        let present = try_join_all(probes).await?;

        let missing: BTreeSet<i32> = present
            .iter()
            .filter(|(_, present)| !present)
            .map(|(chr, _)| *chr)
            .collect();

        let state = if missing.is_empty() {
            CompletionState::Complete
        } else if missing.len() == present.len() {
            CompletionState::NotStarted
        } else {
            CompletionState::PartiallyComplete(missing)
        };

        debug!(stem, ?state, "Completion state");
        Ok(state)
    }
}
