//! Shared fixtures for integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;
use sumstats_ingest::config::SourceDefinition;
use sumstats_ingest::fetch::StaticFetcher;
use sumstats_ingest::lookup::{LookupSet, LookupTable};
use sumstats_ingest::model::SourceFile;
use sumstats_ingest::normalize::profiles::DECODE_ANNOTATION;
use sumstats_ingest::pipeline::{PipelineDriver, PipelineOptions};
use sumstats_ingest::storage::MemoryObjectStore;
use sumstats_ingest::tabular::RawTable;

pub const DECODE_BASE: &str = "TER/deCODE_SomaScan";
pub const DECODE_FILE: &str = "10000_28_CRYBB2_CRBB2.txt.gz";
pub const DECODE_URL: &str = "https://download.decode.is/form/2023/10000_28_CRYBB2_CRBB2.txt.gz";

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Three raw deCODE rows: rs1 on chr1, rs2 on chrX and a row with no rsid
pub fn decode_payload() -> Vec<u8> {
    gzip(
        b"Chrom\tPos\tName\trsids\teffectAllele\totherAllele\tBeta\tPval\tminus_log10_pval\tSE\tN\tImpMAF\n\
          chr1\t100\tchr1:100:A:G\trs1\tA\tG\t0.05\t0.01\t2\t0.02\t1000\t0.1\n\
          chrX\t200\tchrX:200:C:T\trs2\tC\tT\t-0.1\t0.001\t3\t0.03\t1000\t0.2\n\
          chr2\t300\tchr2:300:G:C\t\tG\tC\t0.2\t0.5\t0.3\t0.1\t1000\t0.3\n",
    )
}

pub fn decode_lookups() -> Arc<LookupSet> {
    let raw = RawTable::from_rows(
        &["Name", "effectAlleleFreq"],
        &[&[Some("chr1:100:A:G"), Some("0.12")]],
    );
    let mut set = LookupSet::new();
    set.insert(LookupTable::from_raw(DECODE_ANNOTATION, &raw, "Name", &["effectAlleleFreq".to_string()]).unwrap());
    Arc::new(set)
}

pub fn decode_file() -> SourceFile {
    SourceFile::url(DECODE_URL, DECODE_FILE)
}

pub fn decode_driver(store: Arc<MemoryObjectStore>) -> PipelineDriver {
    let fetcher = StaticFetcher::new().with(decode_file().identity, decode_payload());
    PipelineDriver::new(
        store,
        Arc::new(fetcher),
        decode_lookups(),
        PipelineOptions::ingest(&SourceDefinition::decode(), 4),
    )
}

pub fn partition_key(chr: i32) -> String {
    format!("{}/chr{}/{}.parquet", DECODE_BASE, chr, DECODE_FILE)
}

/// A fresh store holding a copy of every object in `store`
pub fn copy_of(store: &MemoryObjectStore) -> Arc<MemoryObjectStore> {
    let copy = Arc::new(MemoryObjectStore::default());
    for key in store.keys() {
        copy.insert(key.clone(), store.object(&key).unwrap());
    }
    copy
}
