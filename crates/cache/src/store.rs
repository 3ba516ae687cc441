//! The cache store itself (§4.2): `lookup`, `open_for_write` (via
//! [`CacheStore::acquire`], which folds in the single-flight contract), and
//! `materialize`. A sharded directory layout with a `metadata.json`/
//! outputs-directory split per fingerprint, committed atomically via
//! write-then-rename.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use sykli_core::ir::{CacheOutput, CacheRecord};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::layout;
use crate::lock::{FileLock, SingleFlightTable};

pub struct CacheStore {
    root: PathBuf,
    single_flight: SingleFlightTable,
}

impl CacheStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), single_flight: SingleFlightTable::new() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `lookup(fingerprint) -> record?` (§4.2).
    ///
    /// A record that fails to parse is treated as a miss rather than an
    /// error (§7 `cache_corruption`: "treat as miss and log").
    #[instrument(skip(self))]
    pub async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheRecord>> {
        let dir = layout::record_dir(&self.root, fingerprint);
        let record_path = layout::record_file(&dir);
        match tokio::fs::read(&record_path).await {
            Ok(bytes) => match serde_json::from_slice::<CacheRecord>(&bytes) {
                Ok(record) => {
                    debug!(fingerprint, "cache hit");
                    Ok(Some(record))
                }
                Err(_) => {
                    tracing::warn!(fingerprint, "corrupt cache record, treating as miss");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io("read", &record_path, e)),
        }
    }

    /// Acquire single-flight rights to fill `fingerprint`'s cache entry
    /// (§4.7 step 4). Blocks until any in-flight writer for the same
    /// fingerprint finishes, then re-checks the store: if a record is now
    /// present, returns it to the caller as [`SingleFlight::Follow`] instead
    /// of admitting a second write.
    #[instrument(skip(self))]
    pub async fn acquire(&self, fingerprint: &str) -> Result<SingleFlight> {
        let guard = self.single_flight.acquire(fingerprint).await;

        if let Some(record) = self.lookup(fingerprint).await.unwrap_or(None) {
            debug!(fingerprint, "observed winner's committed record, not re-executing");
            return Ok(SingleFlight::Follow(record));
        }

        let token = Uuid::new_v4().to_string();
        let tmp_dir = layout::tmp_dir(&self.root, &token);
        tokio::fs::create_dir_all(&tmp_dir).await.map_err(|e| CacheError::io("create directory", &tmp_dir, e))?;

        let lock_path = layout::record_dir(&self.root, fingerprint).join(".lock");
        let file_lock = FileLock::acquire(lock_path).await?;

        Ok(SingleFlight::Lead(WriteHandle {
            root: self.root.clone(),
            fingerprint: fingerprint.to_string(),
            tmp_dir,
            _guard: guard,
            _file_lock: file_lock,
            committed: false,
            outputs: Vec::new(),
        }))
    }

    /// `materialize(record, destination)`: copy a record's outputs into a
    /// target-local path.
    #[instrument(skip(self, record))]
    pub async fn materialize(&self, record: &CacheRecord, destination: &Path) -> Result<()> {
        let dir = layout::record_dir(&self.root, &record.fingerprint);
        for output in &record.outputs {
            let src = dir.join(&output.blob_ref);
            let dst = destination.join(&output.name);
            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| CacheError::io("create directory", parent, e))?;
            }
            tokio::fs::copy(&src, &dst).await.map_err(|e| CacheError::io("copy", &src, e))?;
        }
        Ok(())
    }
}

/// Outcome of [`CacheStore::acquire`] (§4.2 single-flight).
pub enum SingleFlight {
    /// This caller won the race and must execute, then commit or drop.
    Lead(WriteHandle),
    /// Another writer already committed a record while we waited.
    Follow(CacheRecord),
}

/// Accepts output blobs and stdout/stderr, committed atomically via a
/// rename from a private temp directory. Dropping without calling
/// [`WriteHandle::commit`] leaves no observable partial record (§4.2
/// "Failure").
pub struct WriteHandle {
    root: PathBuf,
    fingerprint: String,
    tmp_dir: PathBuf,
    _guard: tokio::sync::OwnedMutexGuard<()>,
    _file_lock: FileLock,
    committed: bool,
    outputs: Vec<CacheOutput>,
}

impl WriteHandle {
    pub async fn write_stdout(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_blob("stdout.log", bytes).await
    }

    pub async fn write_stderr(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_blob("stderr.log", bytes).await
    }

    /// Record one output artifact produced by the task (§3 "outputs":
    /// artifact-name -> producer path). `source` is read from the target's
    /// workspace and copied into this record's private outputs directory.
    pub async fn write_output(&mut self, name: &str, source: &Path) -> Result<()> {
        let outputs_dir = self.tmp_dir.join("outputs");
        tokio::fs::create_dir_all(&outputs_dir).await.map_err(|e| CacheError::io("create directory", &outputs_dir, e))?;
        let dest = outputs_dir.join(name);
        let bytes = tokio::fs::read(source).await.map_err(|e| CacheError::io("read", source, e))?;
        tokio::fs::write(&dest, &bytes).await.map_err(|e| CacheError::io("write", &dest, e))?;

        let digest = format!("sha256:{:x}", Sha256::digest(&bytes));
        self.outputs.push(CacheOutput {
            name: name.to_string(),
            blob_ref: format!("outputs/{name}"),
            digest,
        });
        Ok(())
    }

    async fn write_blob(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.tmp_dir.join(file_name);
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| CacheError::io("create", &path, e))?;
        file.write_all(bytes).await.map_err(|e| CacheError::io("write", &path, e))?;
        Ok(())
    }

    /// Commit: write `record.json` into the temp directory, then rename the
    /// whole directory into place. The rename is the atomic commit point —
    /// a crash before it leaves only an orphaned temp directory, never a
    /// half-written record at the canonical path.
    #[instrument(skip(self))]
    pub async fn commit(mut self, exit_status: i32) -> Result<CacheRecord> {
        let record = CacheRecord {
            fingerprint: self.fingerprint.clone(),
            exit_status,
            stdout_bytes_ref: tokio::fs::try_exists(self.tmp_dir.join("stdout.log")).await.unwrap_or(false)
                .then(|| "stdout.log".to_string())
                .unwrap_or_default(),
            stderr_bytes_ref: tokio::fs::try_exists(self.tmp_dir.join("stderr.log")).await.unwrap_or(false)
                .then(|| "stderr.log".to_string())
                .unwrap_or_default(),
            outputs: self.outputs.clone(),
            timestamp: Utc::now(),
        };

        let record_path = self.tmp_dir.join("record.json");
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&record_path, &json).await.map_err(|e| CacheError::io("write", &record_path, e))?;

        let dest = layout::record_dir(&self.root, &self.fingerprint);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| CacheError::io("create directory", parent, e))?;
        }
        // Destination must not exist for the rename to be the sole commit point.
        let _ = tokio::fs::remove_dir_all(&dest).await;
        tokio::fs::rename(&self.tmp_dir, &dest).await.map_err(|e| CacheError::io("rename", &self.tmp_dir, e))?;

        debug!(fingerprint = %self.fingerprint, outputs = record.outputs.len(), "committed cache record");
        self.committed = true;
        Ok(record)
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if !self.committed {
            let tmp_dir = self.tmp_dir.clone();
            // Best-effort cleanup; a leaked temp dir under `root/tmp` is
            // never mistaken for a committed record (different subtree).
            let _ = std::fs::remove_dir_all(&tmp_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        assert!(store.lookup("fp-1").await.unwrap().is_none());

        match store.acquire("fp-1").await.unwrap() {
            SingleFlight::Lead(mut handle) => {
                handle.write_stdout(b"hello\n").await.unwrap();
                handle.commit(0).await.unwrap();
            }
            SingleFlight::Follow(_) => panic!("expected to win the race"),
        }

        let record = store.lookup("fp-1").await.unwrap().unwrap();
        assert_eq!(record.exit_status, 0);
        assert_eq!(record.stdout_bytes_ref, "stdout.log");
    }

    #[tokio::test]
    async fn second_acquirer_follows_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        match store.acquire("fp-2").await.unwrap() {
            SingleFlight::Lead(handle) => {
                handle.commit(0).await.unwrap();
            }
            SingleFlight::Follow(_) => panic!("expected to win the race"),
        }

        match store.acquire("fp-2").await.unwrap() {
            SingleFlight::Follow(record) => assert_eq!(record.fingerprint, "fp-2"),
            SingleFlight::Lead(_) => panic!("expected to follow the winner"),
        }
    }

    #[tokio::test]
    async fn dropped_without_commit_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        {
            let _handle = match store.acquire("fp-3").await.unwrap() {
                SingleFlight::Lead(h) => h,
                SingleFlight::Follow(_) => unreachable!(),
            };
            // dropped without commit
        }

        assert!(store.lookup("fp-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn materialize_copies_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let workspace = tempfile::tempdir().unwrap();
        let artifact = workspace.path().join("binary");
        tokio::fs::write(&artifact, b"payload").await.unwrap();

        let record = match store.acquire("fp-4").await.unwrap() {
            SingleFlight::Lead(mut handle) => {
                handle.write_output("binary", &artifact).await.unwrap();
                handle.commit(0).await.unwrap()
            }
            SingleFlight::Follow(_) => unreachable!(),
        };

        let dest = tempfile::tempdir().unwrap();
        store.materialize(&record, dest.path()).await.unwrap();
        let restored = tokio::fs::read(dest.path().join("binary")).await.unwrap();
        assert_eq!(restored, b"payload");
    }
}
