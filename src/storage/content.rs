// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Opaque ciphertext storage.
//!
//! Small payloads are kept inline in the database, everything else goes to
//! the blob store. Callers only ever see a [`StorageRef`]; the reference kind
//! decides which backend serves it.
//!
//! Every operation is bounded by the configured storage timeout.

use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use super::blob::{BlobMeta, BlobStore};
use super::database::SubmissionDatabase;
use super::{StorageError, StorageRef, StorageResult};

/// Default inline threshold (64 KiB).
pub const DEFAULT_INLINE_THRESHOLD: usize = 64 * 1024;

/// Default timeout for a single storage operation.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Inline ciphertext staged for the record's creating transaction.
#[derive(Debug, Clone)]
pub struct PendingInline {
    pub id: Uuid,
    pub ciphertext: Vec<u8>,
}

/// A readable ciphertext stream with its total length.
pub struct ContentStream {
    pub length: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream").field("length", &self.length).finish()
    }
}

/// Stores and retrieves ciphertext by opaque reference.
#[derive(Clone)]
pub struct ContentStore {
    db: Arc<SubmissionDatabase>,
    blobs: BlobStore,
    timeout: Duration,
    inline_threshold: usize,
}

impl ContentStore {
    pub fn new(
        db: Arc<SubmissionDatabase>,
        blobs: BlobStore,
        timeout: Duration,
        inline_threshold: usize,
    ) -> Self {
        Self {
            db,
            blobs,
            timeout,
            inline_threshold,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Bound applied to each storage operation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a payload of `len` bytes should be stored inline.
    pub fn fits_inline(&self, len: usize) -> bool {
        len < self.inline_threshold
    }

    /// Reserve an inline reference without writing anything yet. The
    /// ciphertext is committed with the record in one transaction.
    pub fn stage_inline(&self, ciphertext: Vec<u8>) -> (StorageRef, PendingInline) {
        let reference = StorageRef::new_inline();
        let pending = PendingInline {
            id: reference.id(),
            ciphertext,
        };
        (reference, pending)
    }

    /// Store a small payload inline, outside of any record transaction.
    pub async fn store_inline(&self, ciphertext: Vec<u8>) -> StorageResult<StorageRef> {
        let reference = StorageRef::new_inline();
        let id = reference.id();
        self.blocking("store inline", move |db| db.put_inline(&id, &ciphertext))
            .await?;
        Ok(reference)
    }

    /// Stream a payload into the blob store under a fresh reference.
    pub async fn store_blob(
        &self,
        ciphertext: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> StorageResult<StorageRef> {
        let reference = StorageRef::new_blob();
        self.write_blob(&reference, ciphertext, filename, content_type)
            .await?;
        Ok(reference)
    }

    /// Stream a payload into the blob store under a reference the caller
    /// reserved with [`StorageRef::new_blob`].
    ///
    /// On failure nothing is left behind under `reference`; deleting it is
    /// still safe.
    pub async fn write_blob(
        &self,
        reference: &StorageRef,
        ciphertext: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let StorageRef::Blob(id) = *reference else {
            return Err(StorageError::InvalidReference(reference.to_string()));
        };
        let meta = BlobMeta {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            length: ciphertext.len() as u64,
            created_at: Utc::now(),
        };
        self.bounded("store blob", self.blobs.write(&id, ciphertext, &meta))
            .await
    }

    /// Fetch inline ciphertext. Blob references are rejected.
    pub async fn fetch_inline(&self, reference: &StorageRef) -> StorageResult<Vec<u8>> {
        let StorageRef::Inline(id) = *reference else {
            return Err(StorageError::InvalidReference(reference.to_string()));
        };
        self.blocking("fetch inline", move |db| db.get_inline(&id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("inline {id}")))
    }

    /// Open a reader over the ciphertext behind any reference.
    pub async fn open_read_stream(&self, reference: &StorageRef) -> StorageResult<ContentStream> {
        match *reference {
            StorageRef::Inline(_) => {
                let bytes = self.fetch_inline(reference).await?;
                Ok(ContentStream {
                    length: bytes.len() as u64,
                    reader: Box::new(Cursor::new(bytes)),
                })
            }
            StorageRef::Blob(id) => {
                let blob = self.bounded("open blob", self.blobs.open(&id)).await?;
                Ok(ContentStream {
                    length: blob.meta.length,
                    reader: Box::new(blob.reader),
                })
            }
        }
    }

    /// Read the full ciphertext behind a reference.
    pub async fn read_all(&self, reference: &StorageRef) -> StorageResult<Vec<u8>> {
        if reference.is_inline() {
            return self.fetch_inline(reference).await;
        }
        let mut stream = self.open_read_stream(reference).await?;
        let capacity = usize::try_from(stream.length).unwrap_or(0);
        self.bounded("read blob", async move {
            let mut buf = Vec::with_capacity(capacity);
            stream.reader.read_to_end(&mut buf).await?;
            Ok(buf)
        })
        .await
    }

    /// Delete the ciphertext behind a reference. Deleting twice succeeds.
    pub async fn delete_ref(&self, reference: &StorageRef) -> StorageResult<()> {
        match *reference {
            StorageRef::Inline(id) => {
                self.blocking("delete inline", move |db| db.delete_inline(&id))
                    .await?;
                Ok(())
            }
            StorageRef::Blob(id) => self.bounded("delete blob", self.blobs.delete(&id)).await,
        }
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        self.bounded("health check", self.blobs.health_check()).await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(operation))?
    }

    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SubmissionDatabase) -> StorageResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        self.bounded(operation, async move {
            tokio::task::spawn_blocking(move || f(db.as_ref()))
                .await
                .map_err(|e| StorageError::Task(e.to_string()))?
        })
        .await
    }
}
