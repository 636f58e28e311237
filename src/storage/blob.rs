// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filesystem blob store for large ciphertext.
//!
//! Each blob is a `<uuid>.bin` file plus a small `<uuid>.meta.json` sidecar.
//! Writes go to `<uuid>.partial` in fixed-size chunks on a blocking thread
//! and are renamed into place only after the data is flushed and synced, so a
//! reader never sees a half-written blob.
//!
//! Dropping a pending [`BlobStore::write`] (a timeout or a cancelled caller)
//! signals the writer, which stops at the next chunk and removes everything it
//! produced, including a blob it renamed just before noticing.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::BufReader;
use uuid::Uuid;

use super::{StorageError, StoragePaths, StorageResult};

/// Chunk size for streamed writes.
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Sidecar metadata stored next to each blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobMeta {
    pub filename: String,
    pub content_type: String,
    /// Ciphertext length in bytes.
    pub length: u64,
    pub created_at: DateTime<Utc>,
}

/// An open blob: its metadata and a buffered reader over the ciphertext.
pub struct BlobReader {
    pub meta: BlobMeta,
    pub reader: BufReader<File>,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader").field("meta", &self.meta).finish()
    }
}

/// Blob storage rooted at `StoragePaths::blobs_dir`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    paths: StoragePaths,
    initialized: bool,
    /// Writes allowed before every further write fails.
    #[cfg(test)]
    write_budget: Option<Arc<std::sync::atomic::AtomicUsize>>,
}

impl BlobStore {
    /// Create a new BlobStore.
    ///
    /// Does NOT create the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
            #[cfg(test)]
            write_budget: None,
        }
    }

    /// Let `writes` blob writes succeed; later ones fail with an I/O error.
    #[cfg(test)]
    pub(crate) fn with_write_budget(mut self, writes: usize) -> Self {
        self.write_budget = Some(Arc::new(std::sync::atomic::AtomicUsize::new(writes)));
        self
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Create the blob directory. Safe to call multiple times.
    pub fn initialize(&mut self) -> StorageResult<()> {
        std::fs::create_dir_all(self.paths.blobs_dir())?;
        self.initialized = true;
        Ok(())
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    /// Write a blob. The ciphertext is streamed to disk in chunks.
    pub async fn write(&self, id: &Uuid, ciphertext: Vec<u8>, meta: &BlobMeta) -> StorageResult<()> {
        self.ensure_initialized()?;
        #[cfg(test)]
        if let Some(budget) = &self.write_budget {
            let left = budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if left.is_err() {
                return Err(StorageError::Io(io::Error::other("blob write budget exhausted")));
            }
        }

        let job = BlobWrite {
            partial: self.paths.blob_partial(id),
            meta_path: self.paths.blob_meta(id),
            blob: self.paths.blob(id),
            meta: serde_json::to_vec(meta)?,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        let guard = CancelOnDrop(Some(Arc::clone(&job.cancelled)));

        let result = tokio::task::spawn_blocking(move || job.run(&ciphertext))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?;
        guard.disarm();
        result
    }

    /// Open a blob for reading.
    pub async fn open(&self, id: &Uuid) -> StorageResult<BlobReader> {
        self.ensure_initialized()?;

        let file = File::open(self.paths.blob(id))
            .await
            .map_err(|e| not_found_or(e, id))?;
        let meta_bytes = fs::read(self.paths.blob_meta(id))
            .await
            .map_err(|e| not_found_or(e, id))?;
        let meta: BlobMeta = serde_json::from_slice(&meta_bytes)?;

        Ok(BlobReader {
            meta,
            reader: BufReader::new(file),
        })
    }

    /// Delete a blob. Deleting a missing blob is not an error.
    pub async fn delete(&self, id: &Uuid) -> StorageResult<()> {
        self.ensure_initialized()?;

        for path in [
            self.paths.blob(id),
            self.paths.blob_meta(id),
            self.paths.blob_partial(id),
        ] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn exists(&self, id: &Uuid) -> bool {
        fs::metadata(self.paths.blob(id)).await.is_ok()
    }

    /// Write-read-delete check on the blob directory.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.ensure_initialized()?;

        let test_file = self
            .paths
            .blobs_dir()
            .join(format!(".health_check-{}", Uuid::new_v4()));
        let test_data = b"health_check_data";

        fs::write(&test_file, test_data).await?;
        let read_data = fs::read(&test_file).await?;
        fs::remove_file(&test_file).await?;

        if read_data != test_data {
            return Err(StorageError::Io(io::Error::other("health check data mismatch")));
        }
        Ok(())
    }
}

/// One blob write, run to completion on a blocking thread.
struct BlobWrite {
    partial: PathBuf,
    meta_path: PathBuf,
    blob: PathBuf,
    meta: Vec<u8>,
    cancelled: Arc<AtomicBool>,
}

impl BlobWrite {
    fn run(self, ciphertext: &[u8]) -> StorageResult<()> {
        // The flag is read again after the rename
        let result = self
            .write_all(ciphertext)
            .and_then(|()| self.check_cancelled());
        if result.is_err() {
            self.discard();
        }
        result
    }

    fn write_all(&self, ciphertext: &[u8]) -> StorageResult<()> {
        let mut writer = io::BufWriter::new(std::fs::File::create(&self.partial)?);
        for chunk in ciphertext.chunks(WRITE_CHUNK_SIZE) {
            self.check_cancelled()?;
            writer.write_all(chunk)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;

        std::fs::write(&self.meta_path, &self.meta)?;

        // Rename last: the blob only becomes visible once complete
        std::fs::rename(&self.partial, &self.blob)?;
        Ok(())
    }

    fn check_cancelled(&self) -> StorageResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(StorageError::Task("blob write cancelled".to_string()))
        } else {
            Ok(())
        }
    }

    fn discard(&self) {
        for path in [&self.partial, &self.meta_path, &self.blob] {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Raises the cancellation flag unless disarmed.
struct CancelOnDrop(Option<Arc<AtomicBool>>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = &self.0 {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn not_found_or(e: io::Error, id: &Uuid) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(format!("blob {id}"))
    } else {
        StorageError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn setup() -> (TempDir, BlobStore) {
        let temp = TempDir::new().unwrap();
        let mut store = BlobStore::new(StoragePaths::new(temp.path()));
        store.initialize().unwrap();
        (temp, store)
    }

    fn meta(len: usize) -> BlobMeta {
        BlobMeta {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            length: len as u64,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn write_open_read() {
        let (_temp, store) = setup();
        let id = Uuid::new_v4();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        store.write(&id, data.clone(), &meta(data.len())).await.unwrap();
        assert!(store.exists(&id).await);
        assert!(!store.paths().blob_partial(&id).exists());

        let mut blob = store.open(&id).await.unwrap();
        assert_eq!(blob.meta.length, data.len() as u64);
        assert_eq!(blob.meta.filename, "report.pdf");

        let mut read = Vec::new();
        blob.reader.read_to_end(&mut read).await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let (_temp, store) = setup();
        assert!(matches!(
            store.open(&Uuid::new_v4()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_temp, store) = setup();
        let id = Uuid::new_v4();
        store.write(&id, b"abc".to_vec(), &meta(3)).await.unwrap();

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await);
        assert!(matches!(store.open(&id).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn uninitialized_store_refuses_work() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::new(StoragePaths::new(temp.path()));
        assert!(matches!(
            store.write(&Uuid::new_v4(), b"x".to_vec(), &meta(1)).await,
            Err(StorageError::NotInitialized)
        ));
        assert!(store.health_check().await.is_err());
    }

    #[tokio::test]
    async fn health_check_passes() {
        let (_temp, store) = setup();
        store.health_check().await.unwrap();
    }

    fn blob_dir_entries(store: &BlobStore) -> Vec<String> {
        crate::test_support::blob_dir_entries(store.paths())
    }

    #[test]
    fn cancelled_writer_leaves_no_files() {
        let (_temp, store) = setup();
        let id = Uuid::new_v4();
        let job = BlobWrite {
            partial: store.paths().blob_partial(&id),
            meta_path: store.paths().blob_meta(&id),
            blob: store.paths().blob(&id),
            meta: serde_json::to_vec(&meta(3)).unwrap(),
            cancelled: Arc::new(AtomicBool::new(true)),
        };

        assert!(matches!(job.run(b"abc"), Err(StorageError::Task(_))));
        assert!(blob_dir_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn timed_out_write_cleans_up() {
        let (_temp, store) = setup();
        let id = Uuid::new_v4();
        let data = vec![0x5Au8; 32 * 1024 * 1024];

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            store.write(&id, data, &meta(32 * 1024 * 1024)),
        )
        .await;

        match result {
            // Finished inside the deadline
            Ok(written) => {
                written.unwrap();
                assert!(store.exists(&id).await);
            }
            Err(_) => {
                let emptied = crate::test_support::wait_until(
                    std::time::Duration::from_secs(5),
                    || blob_dir_entries(&store).is_empty(),
                )
                .await;
                assert!(emptied, "left behind: {:?}", blob_dir_entries(&store));
            }
        }
    }

    #[tokio::test]
    async fn delete_removes_partial_leftovers() {
        let (_temp, store) = setup();
        let id = Uuid::new_v4();
        std::fs::write(store.paths().blob_partial(&id), b"half").unwrap();

        store.delete(&id).await.unwrap();
        assert!(blob_dir_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn write_budget_fails_later_writes() {
        let (_temp, store) = setup();
        let store = store.with_write_budget(1);
        store.write(&Uuid::new_v4(), b"a".to_vec(), &meta(1)).await.unwrap();
        assert!(matches!(
            store.write(&Uuid::new_v4(), b"b".to_vec(), &meta(1)).await,
            Err(StorageError::Io(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_health_checks_pass() {
        let (_temp, store) = setup();
        let checks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.health_check().await })
            })
            .collect();
        for check in checks {
            check.await.unwrap().unwrap();
        }
        assert!(blob_dir_entries(&store).is_empty());
    }
}
