//! In-memory object store with call counters and failure injection

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::ObjectStore;

#[derive(Default)]
struct Faults {
    put: Vec<String>,
    exists: Vec<String>,
    delete: Vec<String>,
}

/// Object store backed by a sorted map
///
/// Counts every call so tests can assert that re-runs perform zero payload
/// writes, and can be told to fail operations on keys containing a pattern.
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    faults: Mutex<Faults>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    probes: AtomicUsize,
    deletes: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Seed an object without touching the counters
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        locked(&self.objects).insert(key.into(), data.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        locked(&self.objects).contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        locked(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        locked(&self.objects).keys().cloned().collect()
    }

    pub fn fail_puts_matching(&self, pattern: impl Into<String>) {
        locked(&self.faults).put.push(pattern.into());
    }

    pub fn fail_exists_matching(&self, pattern: impl Into<String>) {
        locked(&self.faults).exists.push(pattern.into());
    }

    pub fn fail_deletes_matching(&self, pattern: impl Into<String>) {
        locked(&self.faults).delete.push(pattern.into());
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check_fault(&self, select: impl Fn(&Faults) -> &Vec<String>, op: &str, key: &str) -> Result<()> {
        let faults = locked(&self.faults);
        if select(&faults).iter().any(|pattern| key.contains(pattern.as_str())) {
            return Err(anyhow!("injected {} failure for {}", op, key));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check_fault(|f| &f.exists, "exists", key)?;
        Ok(self.contains(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.object(key)
            .ok_or_else(|| anyhow!("No such key: memory://{}/{}", self.bucket, key))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.check_fault(|f| &f.put, "put", key)?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.insert(key, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_fault(|f| &f.delete, "delete", key)?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        locked(&self.objects).remove(key);
        Ok(())
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>> {
        let keys: Vec<Result<String>> = locked(&self.objects)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(keys).boxed()
    }
}
