//! HTTP and portal fetcher tests against a mock server
//!
//! These tests validate:
//! - Successful downloads return the body bytes
//! - Non-success statuses surface as errors naming the status
//! - Portal downloads carry the bearer token
//! - A FinnGen file downloaded over HTTP lands as per-chromosome objects

mod common;

use common::gzip;
use std::sync::Arc;
use sumstats_ingest::config::SourceDefinition;
use sumstats_ingest::fetch::{HttpFetcher, PortalFetcher, SourceFetcher};
use sumstats_ingest::lookup::LookupSet;
use sumstats_ingest::model::{FileOutcome, SourceFile};
use sumstats_ingest::pipeline::{PipelineDriver, PipelineOptions};
use sumstats_ingest::storage::MemoryObjectStore;
use sumstats_ingest::{codec, IngestError};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn finngen_payload() -> Vec<u8> {
    gzip(
        b"#chrom\tpos\tref\talt\trsids\tnearest_genes\tpval\tmlogp\tbeta\tsebeta\taf_alt\taf_alt_cases\taf_alt_controls\n\
          1\t13668\tG\tA\trs2691328\tOR4F5\t0.5\t0.30103\t0.01\t0.02\t0.005\t0.004\t0.006\n\
          7\t55000\tC\tT\trs77\tEGFR\t1e-8\t8\t0.3\t0.05\t0.2\t0.21\t0.19\n\
          X\t2700000\tA\tG\trs99\tSRY\t0.01\t2\t-0.1\t0.04\t0.4\t0.41\t0.39\n\
          7\t56000\tC\tG\t\tEGFR\t0.2\t0.69897\t0.1\t0.05\t0.2\t0.21\t0.19\n",
    )
}

// ============================================================================
// HttpFetcher
// ============================================================================

#[tokio::test]
async fn test_http_fetch_returns_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r10/finngen_R10_T2D.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/r10/finngen_R10_T2D.gz", mock_server.uri());
    let body = HttpFetcher::new()
        .unwrap()
        .fetch(&SourceFile::url(url, "finngen_R10_T2D.gz"))
        .await
        .unwrap();

    assert_eq!(body, b"payload");
}

#[tokio::test]
async fn test_http_fetch_reports_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let url = format!("{}/r10/missing.gz", mock_server.uri());
    let err = HttpFetcher::new()
        .unwrap()
        .fetch(&SourceFile::url(url, "missing.gz"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("404"), "unexpected error: {:#}", err);
}

// ============================================================================
// PortalFetcher
// ============================================================================

#[tokio::test]
async fn test_portal_fetch_sends_bearer_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/syn52357899"))
        .and(header("authorization", "Bearer portal-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tar bytes".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = PortalFetcher::new(format!("{}/files/", mock_server.uri()), "portal-token").unwrap();
    let body = fetcher
        .fetch(&SourceFile::portal("syn52357899", "PTPRB_P23467_OID30324_v1_Cardiometabolic_II.tar"))
        .await
        .unwrap();

    assert_eq!(body, b"tar bytes");
}

#[tokio::test]
async fn test_portal_fetch_rejected_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let fetcher = PortalFetcher::new(format!("{}/files", mock_server.uri()), "stale").unwrap();
    let result = fetcher.fetch(&SourceFile::portal("syn1", "a.tar")).await;

    assert!(result.unwrap_err().to_string().contains("401"));
}

// ============================================================================
// Pipeline over HTTP
// ============================================================================

#[tokio::test]
async fn test_finngen_download_is_partitioned() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r10/finngen_R10_T2D.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(finngen_payload()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r10/finngen_R10_GONE.gz"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let definition = SourceDefinition::finngen();
    let store = Arc::new(MemoryObjectStore::default());
    let driver = PipelineDriver::new(
        store.clone(),
        Arc::new(HttpFetcher::new().unwrap()),
        Arc::new(LookupSet::new()),
        PipelineOptions::ingest(&definition, 2),
    );

    let files = vec![
        SourceFile::url(format!("{}/r10/finngen_R10_T2D.gz", mock_server.uri()), "finngen_R10_T2D.gz"),
        SourceFile::url(format!("{}/r10/finngen_R10_GONE.gz", mock_server.uri()), "finngen_R10_GONE.gz"),
    ];
    let results = driver.run(files, &CancellationToken::new()).await;

    let t2d = results.iter().find(|r| r.file.name == "finngen_R10_T2D.gz").unwrap();
    assert!(t2d.is_success(), "unexpected outcome: {:?}", t2d.outcome);
    assert_eq!(t2d.written(), 3);

    let gone = results.iter().find(|r| r.file.name == "finngen_R10_GONE.gz").unwrap();
    assert!(matches!(gone.outcome, FileOutcome::Failed(IngestError::FetchFailed { .. })));

    assert_eq!(
        store.keys(),
        vec![
            "TER/FinnGen_r10/chr1/finngen_R10_T2D.parquet".to_string(),
            "TER/FinnGen_r10/chr23/finngen_R10_T2D.parquet".to_string(),
            "TER/FinnGen_r10/chr7/finngen_R10_T2D.parquet".to_string(),
        ]
    );

    let chr7 = codec::decode(
        store.object("TER/FinnGen_r10/chr7/finngen_R10_T2D.parquet").unwrap(),
        "unused",
    )
    .unwrap();
    assert_eq!(chr7.len(), 1);
    assert_eq!(chr7[0].snp, "rs77");
    assert_eq!(chr7[0].effect_allele, "T");
    assert_eq!(chr7[0].other_allele, "C");
    assert_eq!(chr7[0].eaf, Some(0.2));
    assert_eq!(chr7[0].file_name, "finngen_R10_T2D.gz");
}
