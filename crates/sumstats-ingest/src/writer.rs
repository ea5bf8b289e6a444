//! Idempotent partition writer
//!
//! Every destination key is written at most once: the key is probed before
//! anything is encoded, and an existing object is never overwritten.

use std::sync::Arc;
use sumstats_common::checksum::sha256_hex;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{IngestError, IngestResult};
use crate::layout;
use crate::model::{CanonicalRecord, SourceCleanup, WriteResult};
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct IdempotentWriter {
    store: Arc<dyn ObjectStore>,
    base_prefix: String,
}

impl IdempotentWriter {
    pub fn new(store: Arc<dyn ObjectStore>, base_prefix: impl Into<String>) -> Self {
        Self {
            store,
            base_prefix: base_prefix.into(),
        }
    }

    pub fn base_prefix(&self) -> &str {
        &self.base_prefix
    }

    /// Write one chromosome partition of `stem` unless its key already exists
    pub async fn write_partition(
        &self,
        stem: &str,
        chr: i32,
        records: &[CanonicalRecord],
    ) -> IngestResult<WriteResult> {
        let key = layout::partition_key(&self.base_prefix, chr, stem);

        let exists = self
            .store
            .exists(&key)
            .await
            .map_err(|err| IngestError::existence(key.clone(), &err))?;
        if exists {
            debug!(%key, "Partition exists, skipping");
            return Ok(WriteResult::Skipped { key });
        }

        let payload = codec::encode(records)?;
        let bytes = payload.len();
        let sha256 = sha256_hex(&payload);

        self.store
            .put(&key, payload)
            .await
            .map_err(|err| IngestError::write(stem, key.clone(), &err))?;

        info!(%key, rows = records.len(), bytes, "Wrote partition");
        Ok(WriteResult::Written {
            key,
            rows: records.len(),
            bytes,
            sha256,
        })
    }

    /// Delete the unpartitioned source object
    ///
    /// A failed delete is reported, never rolled back into the partitions.
    pub async fn remove_source(&self, key: &str) -> SourceCleanup {
        match self.store.delete(key).await {
            Ok(()) => {
                info!(%key, "Deleted source object");
                SourceCleanup::Deleted
            }
            Err(err) => {
                warn!(%key, error = %format!("{:#}", err), "Failed to delete source object");
                SourceCleanup::DeleteFailed(format!("{:#}", err))
            }
        }
    }
}
