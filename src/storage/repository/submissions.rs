// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Submission repository and lifecycle state machine.
//!
//! ```text
//!   create ──► Active{viewed, flag} ──soft_delete──► Deleted ──purge──► (removed)
//!                  ▲                                   │
//!                  └──────────── restore ◄─────────────┘
//! ```
//!
//! `mark_viewed`, `mark_unviewed` and `set_flag` are only valid while active.
//! `restore` resets the record to `Active{viewed: false, flag: none}`. Once a
//! purge has started the record can only be purged again, never restored.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::crypto::SubmissionKeyMaterial;

use super::super::content::{ContentStore, PendingInline};
use super::super::database::SubmissionDatabase;
use super::super::{OwnedResource, OwnershipEnforcer, StorageError, StorageRef, StorageResult};

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page size a listing may request.
pub const MAX_PAGE_SIZE: usize = 200;

/// Admin triage flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    #[default]
    None,
    Important,
    Urgent,
}

/// Key material as persisted. The passphrase is only present on imported
/// records; new records always recompute it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_hex: Option<String>,
    pub salt_hex: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub public_key_hash: String,
}

impl From<&SubmissionKeyMaterial> for StoredKeyMaterial {
    fn from(material: &SubmissionKeyMaterial) -> Self {
        Self {
            passphrase_hex: None,
            salt_hex: material.salt_hex.clone(),
            public_key: material.public_key.clone(),
            encrypted_private_key: material.encrypted_private_key.clone(),
            public_key_hash: material.public_key_hash.clone(),
        }
    }
}

/// One encrypted attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub original_name: String,
    pub mime_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Ciphertext size in bytes.
    pub ciphertext_size: u64,
    pub storage_ref: StorageRef,
}

/// A stored submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub receipt_code: String,
    /// Principal whose inbox this submission belongs to.
    pub recipient: String,
    pub text_message: StorageRef,
    pub key_material: StoredKeyMaterial,
    #[serde(default)]
    pub files: Vec<StoredFile>,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub viewed_by: Option<String>,
    pub is_flagged: Flag,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state derived from a record's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active { viewed: bool, flag: Flag },
    Deleted { purge_pending: bool },
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Active { .. } => write!(f, "active"),
            LifecycleState::Deleted {
                purge_pending: false,
            } => write!(f, "deleted"),
            LifecycleState::Deleted {
                purge_pending: true,
            } => write!(f, "being purged"),
        }
    }
}

impl SubmissionRecord {
    /// A fresh record in `Active{viewed: false, flag: none}`.
    pub fn new(
        receipt_code: String,
        recipient: String,
        text_message: StorageRef,
        key_material: StoredKeyMaterial,
        files: Vec<StoredFile>,
    ) -> Self {
        Self {
            receipt_code,
            recipient,
            text_message,
            key_material,
            files,
            is_viewed: false,
            viewed_at: None,
            viewed_by: None,
            is_flagged: Flag::None,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            purge_started_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.is_deleted {
            LifecycleState::Deleted {
                purge_pending: self.purge_started_at.is_some(),
            }
        } else {
            LifecycleState::Active {
                viewed: self.is_viewed,
                flag: self.is_flagged,
            }
        }
    }

    /// Every ciphertext reference this record owns.
    pub fn storage_refs(&self) -> Vec<StorageRef> {
        std::iter::once(self.text_message)
            .chain(self.files.iter().map(|f| f.storage_ref))
            .collect()
    }

    fn set_viewed(&mut self, viewed: bool, actor: &str) {
        self.is_viewed = viewed;
        if viewed {
            self.viewed_at = Some(Utc::now());
            self.viewed_by = Some(actor.to_string());
        } else {
            self.viewed_at = None;
            self.viewed_by = None;
        }
    }

    fn ensure_active(&self, action: &'static str) -> StorageResult<()> {
        match self.state() {
            LifecycleState::Active { .. } => Ok(()),
            state => Err(StorageError::InvalidStateTransition {
                action,
                state: state.to_string(),
            }),
        }
    }

    fn ensure_deleted(&self, action: &'static str, allow_purging: bool) -> StorageResult<()> {
        match self.state() {
            LifecycleState::Deleted {
                purge_pending: false,
            } => Ok(()),
            LifecycleState::Deleted {
                purge_pending: true,
            } if allow_purging => Ok(()),
            state => Err(StorageError::InvalidStateTransition {
                action,
                state: state.to_string(),
            }),
        }
    }
}

impl OwnedResource for SubmissionRecord {
    fn owner_id(&self) -> &str {
        &self.recipient
    }

    fn resource_label(&self) -> String {
        format!("submission {}", self.receipt_code)
    }
}

/// Sort order by creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing filters. All filters operate on unencrypted metadata only.
#[derive(Debug, Clone, Default)]
pub struct SubmissionQuery {
    /// Restrict to one recipient's inbox.
    pub recipient: Option<String>,
    pub viewed: Option<bool>,
    pub flag: Option<Flag>,
    /// `true` lists the bin (deleted records), `false` the active inbox.
    pub bin: bool,
    /// Case-insensitive receipt-code substring.
    pub search: Option<String>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SubmissionQuery {
    fn matches(&self, record: &SubmissionRecord) -> bool {
        if record.is_deleted != self.bin {
            return false;
        }
        if let Some(recipient) = &self.recipient {
            if &record.recipient != recipient {
                return false;
            }
        }
        if self.viewed.is_some_and(|v| v != record.is_viewed) {
            return false;
        }
        if self.flag.is_some_and(|f| f != record.is_flagged) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.trim().to_uppercase();
            if !term.is_empty() && !record.receipt_code.contains(&term) {
                return false;
            }
        }
        true
    }
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct SubmissionPage {
    pub items: Vec<SubmissionRecord>,
    /// Matches before pagination.
    pub total: usize,
}

/// Repository for submission records.
///
/// Every mutation is a single read-check-write transaction.
#[derive(Clone)]
pub struct SubmissionRepository {
    db: Arc<SubmissionDatabase>,
}

impl SubmissionRepository {
    pub fn new(db: Arc<SubmissionDatabase>) -> Self {
        Self { db }
    }

    /// Persist a new record and its inline ciphertext atomically.
    pub fn create(&self, record: &SubmissionRecord, inline: &[PendingInline]) -> StorageResult<()> {
        self.db.insert_submission(record, inline)
    }

    /// Get a record by receipt code.
    pub fn get(&self, receipt_code: &str) -> StorageResult<SubmissionRecord> {
        self.db
            .get_submission(receipt_code)?
            .ok_or_else(|| StorageError::NotFound(format!("submission {receipt_code}")))
    }

    /// Filtered, sorted, paginated listing.
    pub fn list(&self, query: &SubmissionQuery) -> StorageResult<SubmissionPage> {
        let mut matching: Vec<SubmissionRecord> = self
            .db
            .list_submissions()?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();

        matching.sort_by(|a, b| {
            let ord = a
                .created_at
                .cmp(&b.created_at)
                .then_with(|| a.receipt_code.cmp(&b.receipt_code));
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matching.len();
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let items = matching.into_iter().skip(query.offset).take(limit).collect();

        Ok(SubmissionPage { items, total })
    }

    /// Cheap read used by the readiness check.
    pub fn health_check(&self) -> StorageResult<()> {
        self.db.health_check()
    }

    pub fn mark_viewed(&self, receipt_code: &str, actor: &str) -> StorageResult<SubmissionRecord> {
        self.db.update_submission(receipt_code, |record| {
            record.verify_ownership(actor)?;
            record.ensure_active("mark viewed")?;
            record.set_viewed(true, actor);
            Ok(())
        })
    }

    pub fn mark_unviewed(&self, receipt_code: &str, actor: &str) -> StorageResult<SubmissionRecord> {
        self.db.update_submission(receipt_code, |record| {
            record.verify_ownership(actor)?;
            record.ensure_active("mark unviewed")?;
            record.set_viewed(false, actor);
            Ok(())
        })
    }

    pub fn set_flag(&self, receipt_code: &str, actor: &str, flag: Flag) -> StorageResult<SubmissionRecord> {
        self.db.update_submission(receipt_code, |record| {
            record.verify_ownership(actor)?;
            record.ensure_active("flag")?;
            record.is_flagged = flag;
            Ok(())
        })
    }

    /// Change the viewed state and the flag in one transaction.
    ///
    /// Either both changes are applied or neither is.
    pub fn update(
        &self,
        receipt_code: &str,
        actor: &str,
        viewed: Option<bool>,
        flag: Option<Flag>,
    ) -> StorageResult<SubmissionRecord> {
        self.db.update_submission(receipt_code, |record| {
            record.verify_ownership(actor)?;
            record.ensure_active("update")?;
            if let Some(viewed) = viewed {
                record.set_viewed(viewed, actor);
            }
            if let Some(flag) = flag {
                record.is_flagged = flag;
            }
            Ok(())
        })
    }

    /// Move a record to the bin.
    pub fn soft_delete(&self, receipt_code: &str, actor: &str) -> StorageResult<SubmissionRecord> {
        self.db.update_submission(receipt_code, |record| {
            record.verify_ownership(actor)?;
            record.ensure_active("delete")?;
            record.is_deleted = true;
            record.deleted_by = Some(actor.to_string());
            record.deleted_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Bring a record back from the bin as unviewed and unflagged.
    pub fn restore(&self, receipt_code: &str, actor: &str) -> StorageResult<SubmissionRecord> {
        self.db.update_submission(receipt_code, |record| {
            record.verify_ownership(actor)?;
            record.ensure_deleted("restore", false)?;
            record.is_deleted = false;
            record.deleted_by = None;
            record.deleted_at = None;
            record.is_viewed = false;
            record.viewed_at = None;
            record.viewed_by = None;
            record.is_flagged = Flag::None;
            Ok(())
        })
    }

    /// Permanently remove a deleted record and all of its ciphertext.
    ///
    /// Content is deleted before the record. If any deletion fails the
    /// record stays in the bin, marked as purge-pending, and the purge can be
    /// retried.
    pub async fn purge(
        &self,
        receipt_code: &str,
        actor: &str,
        content: &ContentStore,
    ) -> StorageResult<SubmissionRecord> {
        let record = {
            let db = Arc::clone(&self.db);
            let receipt = receipt_code.to_string();
            let actor = actor.to_string();
            tokio::task::spawn_blocking(move || {
                db.update_submission(&receipt, |record| {
                    record.verify_ownership(&actor)?;
                    record.ensure_deleted("purge", true)?;
                    if record.purge_started_at.is_none() {
                        record.purge_started_at = Some(Utc::now());
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??
        };

        for reference in record.storage_refs() {
            content.delete_ref(&reference).await?;
        }

        let db = Arc::clone(&self.db);
        let receipt = receipt_code.to_string();
        tokio::task::spawn_blocking(move || db.remove_submission(&receipt))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        Ok(record)
    }
}
