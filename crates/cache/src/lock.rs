//! Single-flight commit locking, keyed by fingerprint (§4.2, §5): one lock
//! per fingerprint, held only across the cache-consult / execute / commit
//! region. Held in-process via a keyed async mutex table — the engine
//! coordinates one local driver, not an arbitrary cluster of writers, so a
//! process-local table is sufficient; an `fs4` advisory lock on the record
//! directory additionally guards against a second engine process racing the
//! same cache root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::tokio::AsyncFileExt;
use tokio::fs::OpenOptions;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{CacheError, Result};

/// Process-wide table of in-flight fingerprint locks.
#[derive(Debug, Default)]
pub struct SingleFlightTable {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the in-process lock for `fingerprint`. Holding this guard
    /// across cache-consult / execute / commit (§5) is what makes
    /// concurrent schedulings of the same fingerprint single-flight: the
    /// second caller blocks here until the first either commits or drops
    /// the guard, then re-checks `lookup` and observes the winner's record.
    pub async fn acquire(&self, fingerprint: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.inner.lock().await;
            Arc::clone(table.entry(fingerprint.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        entry.lock_owned().await
    }
}

/// Cross-process advisory lock on the record directory's lockfile, held
/// only while writing the temp directory that will be renamed into place.
pub struct FileLock {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileLock {
    pub async fn acquire(lock_path: PathBuf) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io("create directory", parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .await
            .map_err(|e| CacheError::io("open", &lock_path, e))?;
        file.lock_exclusive().map_err(|e| CacheError::io("flock", &lock_path, e))?;
        Ok(Self { path: lock_path, file: Some(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock happens automatically when the file handle is dropped.
        self.file.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_acquirer_waits_for_first() {
        let table = Arc::new(SingleFlightTable::new());
        let counter = Arc::new(AtomicU32::new(0));

        let t1 = {
            let table = Arc::clone(&table);
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let _guard = table.acquire("fp-a").await;
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _guard2 = table.acquire("fp-a").await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        t1.await.unwrap();
    }

    #[tokio::test]
    async fn different_fingerprints_do_not_block_each_other() {
        let table = SingleFlightTable::new();
        let g1 = table.acquire("fp-a").await;
        let g2 = table.acquire("fp-b").await;
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn file_lock_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        let lock = FileLock::acquire(path.clone()).await.unwrap();
        assert_eq!(lock.path(), path);
        drop(lock);
        let _lock2 = FileLock::acquire(path).await.unwrap();
    }
}
