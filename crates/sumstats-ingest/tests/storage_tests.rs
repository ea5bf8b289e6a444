//! S3 object store integration tests
//!
//! These tests verify the S3/MinIO backend including:
//! - Put, get and existence probes
//! - Prefix listing across pages
//! - Delete operations
//! - An idempotent partition write against a real bucket
//!
//! **Requirements**:
//! - MinIO or S3 must be running and accessible
//! - S3_ENDPOINT and S3_BUCKET environment variables must be set
//! - Tests will be skipped if S3_ENDPOINT is not configured
//!
//! **Running tests**:
//! ```bash
//! S3_ENDPOINT=http://localhost:9000 S3_BUCKET=sumstats-test S3_PATH_STYLE=true \
//!     cargo test --test storage_tests
//! ```

use futures::TryStreamExt;
use std::sync::Arc;
use sumstats_ingest::credentials::{CredentialProvider, EnvCredentialProvider};
use sumstats_ingest::model::WriteResult;
use sumstats_ingest::storage::{ObjectStore, S3ObjectStore, StorageConfig};
use sumstats_ingest::writer::IdempotentWriter;
use uuid::Uuid;

/// Creates an S3 store if an endpoint is configured
async fn setup_store() -> Option<S3ObjectStore> {
    if std::env::var("S3_ENDPOINT").is_err() {
        return None;
    }

    let credentials = EnvCredentialProvider.get_credentials().await.ok()?;
    match S3ObjectStore::connect(&StorageConfig::from_env(), &credentials).await {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Failed to create S3 client: {:#}", e);
            None
        }
    }
}

/// Unique prefix so concurrent runs do not collide
fn test_prefix(test_name: &str) -> String {
    format!("test/{}/{}", test_name, Uuid::new_v4())
}

#[tokio::test]
async fn test_put_get_exists_delete() {
    let Some(store) = setup_store().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let key = format!("{}/object.parquet", test_prefix("put_get"));
    assert!(!store.exists(&key).await.unwrap());

    store.put(&key, b"Hello, Storage!".to_vec()).await.unwrap();
    assert!(store.exists(&key).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), b"Hello, Storage!");

    store.delete(&key).await.unwrap();
    assert!(!store.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_get_missing_object_fails() {
    let Some(store) = setup_store().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let key = format!("{}/absent.parquet", test_prefix("missing"));
    assert!(store.get(&key).await.is_err());
}

#[tokio::test]
async fn test_list_prefix() {
    let Some(store) = setup_store().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let prefix = test_prefix("list");
    for name in ["a.parquet", "b.parquet", "chr1/a.parquet"] {
        store.put(&format!("{}/{}", prefix, name), b"x".to_vec()).await.unwrap();
    }

    let mut keys: Vec<String> = store.list(&prefix).try_collect().await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            format!("{}/a.parquet", prefix),
            format!("{}/b.parquet", prefix),
            format!("{}/chr1/a.parquet", prefix),
        ]
    );

    for key in keys {
        store.delete(&key).await.unwrap();
    }
}

#[tokio::test]
async fn test_writer_skips_existing_partition() {
    let Some(store) = setup_store().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let prefix = test_prefix("writer");
    let store: Arc<dyn ObjectStore> = Arc::new(store);
    let writer = IdempotentWriter::new(store.clone(), prefix.clone());
    let records = vec![sumstats_ingest::model::CanonicalRecord {
        snp: "rs1".to_string(),
        chr: 1,
        pos: 100,
        effect_allele: "A".to_string(),
        other_allele: "G".to_string(),
        eaf: Some(0.1),
        beta: 0.05,
        se: 0.01,
        pval: 0.001,
        mlogp: 3.0,
        file_name: "a.gz".to_string(),
    }];

    let first = writer.write_partition("a", 1, &records).await.unwrap();
    assert!(matches!(first, WriteResult::Written { rows: 1, .. }));

    let second = writer.write_partition("a", 1, &records).await.unwrap();
    assert_eq!(second, WriteResult::Skipped { key: first.key().to_string() });

    store.delete(first.key()).await.unwrap();
}
