//! Sumstats Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests genomic summary statistics from external sources into the data
//! lake as one Parquet object per chromosome, skipping work already done.
//!
//! # Supported Sources
//!
//! - **FinnGen R10**: endpoint GWAS downloaded over HTTPS
//! - **deCODE SomaScan**: protein GWAS, allele frequencies joined from an annotation table
//! - **UKB-PPP Olink**: pQTL tar archives from the research-data portal
//!
//! # Pipeline
//!
//! For every source file: [`oracle`] decides whether work remains, [`fetch`]
//! retrieves the raw bytes, [`normalize`] maps them onto
//! [`CanonicalRecord`](model::CanonicalRecord)s, [`partition`] groups them by
//! chromosome and [`writer`] stores each group exactly once. [`pipeline`]
//! runs that over a bounded pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sumstats_ingest::config::SourceDefinition;
//! use sumstats_ingest::fetch::HttpFetcher;
//! use sumstats_ingest::lookup::LookupSet;
//! use sumstats_ingest::pipeline::{PipelineDriver, PipelineOptions};
//! use sumstats_ingest::storage::MemoryObjectStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let definition = SourceDefinition::finngen();
//!     let files = definition.manifest.load().await?;
//!
//!     let driver = PipelineDriver::new(
//!         Arc::new(MemoryObjectStore::default()),
//!         Arc::new(HttpFetcher::new()?),
//!         Arc::new(LookupSet::new()),
//!         PipelineOptions::ingest(&definition, definition.concurrency),
//!     );
//!     let results = driver.run(files, &CancellationToken::new()).await;
//!     println!("{} files processed", results.len());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod lookup;
pub mod manifest;
pub mod model;
pub mod normalize;
pub mod oracle;
pub mod partition;
pub mod pipeline;
pub mod storage;
pub mod tabular;
pub mod writer;

pub use error::{IngestError, IngestResult};
