// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent storage for submission records and their ciphertext.
//!
//! ## Storage Layout
//!
//! ```text
//! <DATA_DIR>/
//!   cloak.redb              # records + inline ciphertext (redb, ACID)
//!   blobs/
//!     {uuid}.bin            # ciphertext blob
//!     {uuid}.meta.json      # blob metadata sidecar
//!   audit/
//!     {date}/events.jsonl   # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - Everything stored here is already ciphertext or non-sensitive metadata
//! - DO NOT store passphrases, private keys or plaintext
//! - References handed out by [`ContentStore`] are opaque, tagged strings

pub mod audit;
pub mod blob;
pub mod content;
pub mod database;
mod error;
pub mod ownership;
pub mod paths;
pub mod refs;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditFilter, AuditLog};
pub use blob::{BlobMeta, BlobStore};
pub use content::{ContentStore, ContentStream, PendingInline};
pub use database::SubmissionDatabase;
pub use error::{StorageError, StorageResult};
pub use ownership::{OwnedResource, OwnershipEnforcer};
pub use paths::StoragePaths;
pub use refs::StorageRef;
pub use repository::{
    Flag, LifecycleState, SortOrder, StoredFile, StoredKeyMaterial, SubmissionPage,
    SubmissionQuery, SubmissionRecord, SubmissionRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
