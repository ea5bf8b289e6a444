//! Sumstats Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the summary-statistics ingestion workspace.
//!
//! # Overview
//!
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Error Handling**: the common error and result types
//! - **Checksums**: payload digests recorded for every object written
//!
//! # Example
//!
//! ```no_run
//! use sumstats_common::checksum::sha256_hex;
//! use sumstats_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     // Held until exit so buffered file output is flushed
//!     let _log_guard = init_logging(&LogConfig::from_env()?)?;
//!     let digest = sha256_hex(b"payload");
//!     tracing::info!(%digest, "computed digest");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
