// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded submission database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `submissions`: receipt code → serialized SubmissionRecord
//! - `inline_ciphertext`: inline reference id → ciphertext bytes
//!
//! redb allows one write transaction at a time, so a read-check-write done
//! inside [`SubmissionDatabase::update_submission`] never interleaves with
//! another mutation of the same record.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use super::content::PendingInline;
use super::repository::SubmissionRecord;
use super::{StorageError, StorageResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: receipt code → serialized SubmissionRecord (JSON bytes).
const SUBMISSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("submissions");

/// Inline ciphertext: reference uuid (hyphenated) → ciphertext bytes.
const INLINE_CIPHERTEXT: TableDefinition<&str, &[u8]> = TableDefinition::new("inline_ciphertext");

// =============================================================================
// SubmissionDatabase
// =============================================================================

/// Embedded ACID store for submission records and inline ciphertext.
pub struct SubmissionDatabase {
    db: Database,
}

impl SubmissionDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SUBMISSIONS)?;
            let _ = write_txn.open_table(INLINE_CIPHERTEXT)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Submission records
    // =========================================================================

    /// Insert a new record together with its inline ciphertext.
    ///
    /// Either everything is committed or nothing is. Fails with
    /// `AlreadyExists` if the receipt code is taken.
    pub fn insert_submission(
        &self,
        record: &SubmissionRecord,
        inline: &[PendingInline],
    ) -> StorageResult<()> {
        let json = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SUBMISSIONS)?;
            let taken = table.get(record.receipt_code.as_str())?.is_some();
            if taken {
                return Err(StorageError::AlreadyExists(record.receipt_code.clone()));
            }
            table.insert(record.receipt_code.as_str(), json.as_slice())?;

            let mut inline_table = write_txn.open_table(INLINE_CIPHERTEXT)?;
            for item in inline {
                let key = item.id.to_string();
                inline_table.insert(key.as_str(), item.ciphertext.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a record by receipt code.
    pub fn get_submission(&self, receipt_code: &str) -> StorageResult<Option<SubmissionRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBMISSIONS)?;
        match table.get(receipt_code)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Open a read transaction on both tables without touching any record.
    pub fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SUBMISSIONS)?;
        let _ = read_txn.open_table(INLINE_CIPHERTEXT)?;
        Ok(())
    }

    /// All records, in receipt-code order.
    pub fn list_submissions(&self) -> StorageResult<Vec<SubmissionRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBMISSIONS)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// Apply `mutate` to a record inside a single write transaction.
    ///
    /// If `mutate` returns an error the transaction is aborted and the stored
    /// record is left untouched.
    pub fn update_submission<F>(&self, receipt_code: &str, mutate: F) -> StorageResult<SubmissionRecord>
    where
        F: FnOnce(&mut SubmissionRecord) -> StorageResult<()>,
    {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(SUBMISSIONS)?;
            let current: Option<SubmissionRecord> = match table.get(receipt_code)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            match current {
                None => Err(StorageError::NotFound(format!("submission {receipt_code}"))),
                Some(mut record) => match mutate(&mut record) {
                    Ok(()) => {
                        let json = serde_json::to_vec(&record)?;
                        table.insert(receipt_code, json.as_slice())?;
                        Ok(record)
                    }
                    Err(e) => Err(e),
                },
            }
        };

        match outcome {
            Ok(record) => {
                write_txn.commit()?;
                Ok(record)
            }
            Err(e) => {
                write_txn.abort()?;
                Err(e)
            }
        }
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove_submission(&self, receipt_code: &str) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SUBMISSIONS)?;
            let removed = table.remove(receipt_code)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    // =========================================================================
    // Inline ciphertext
    // =========================================================================

    pub fn put_inline(&self, id: &Uuid, ciphertext: &[u8]) -> StorageResult<()> {
        let key = id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(INLINE_CIPHERTEXT)?;
            table.insert(key.as_str(), ciphertext)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_inline(&self, id: &Uuid) -> StorageResult<Option<Vec<u8>>> {
        let key = id.to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INLINE_CIPHERTEXT)?;
        let value = table.get(key.as_str())?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Delete inline ciphertext. Returns whether it existed.
    pub fn delete_inline(&self, id: &Uuid) -> StorageResult<bool> {
        let key = id.to_string();
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(INLINE_CIPHERTEXT)?;
            let removed = table.remove(key.as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::{StoredKeyMaterial, SubmissionRecord};
    use crate::storage::StorageRef;

    fn temp_db() -> (SubmissionDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = SubmissionDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample_record(receipt: &str, text: StorageRef) -> SubmissionRecord {
        SubmissionRecord::new(
            receipt.to_string(),
            "admin".to_string(),
            text,
            StoredKeyMaterial {
                passphrase_hex: None,
                salt_hex: "00".repeat(16),
                public_key: "pk".to_string(),
                encrypted_private_key: "{}".to_string(),
                public_key_hash: "hash".to_string(),
            },
            Vec::new(),
        )
    }

    #[test]
    fn insert_commits_record_and_inline_together() {
        let (db, _dir) = temp_db();
        let text = StorageRef::new_inline();
        let record = sample_record("CLOAKK-AAAA-BBBB-CCCC", text);
        let inline = vec![PendingInline {
            id: text.id(),
            ciphertext: b"ciphertext".to_vec(),
        }];

        db.insert_submission(&record, &inline).unwrap();

        let stored = db.get_submission("CLOAKK-AAAA-BBBB-CCCC").unwrap().unwrap();
        assert_eq!(stored.text_message, text);
        assert_eq!(db.get_inline(&text.id()).unwrap().unwrap(), b"ciphertext");
    }

    #[test]
    fn duplicate_receipt_is_rejected_without_side_effects() {
        let (db, _dir) = temp_db();
        let first = sample_record("CLOAKK-AAAA-AAAA-AAAA", StorageRef::new_inline());
        db.insert_submission(&first, &[]).unwrap();

        let text = StorageRef::new_inline();
        let second = sample_record("CLOAKK-AAAA-AAAA-AAAA", text);
        let inline = vec![PendingInline {
            id: text.id(),
            ciphertext: b"x".to_vec(),
        }];
        assert!(matches!(
            db.insert_submission(&second, &inline),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(db.get_inline(&text.id()).unwrap().is_none());
    }

    #[test]
    fn failed_update_leaves_record_untouched() {
        let (db, _dir) = temp_db();
        let record = sample_record("CLOAKK-1111-2222-3333", StorageRef::new_inline());
        db.insert_submission(&record, &[]).unwrap();

        let result = db.update_submission("CLOAKK-1111-2222-3333", |r| {
            r.is_viewed = true;
            Err(StorageError::NotInitialized)
        });
        assert!(result.is_err());

        let stored = db.get_submission("CLOAKK-1111-2222-3333").unwrap().unwrap();
        assert!(!stored.is_viewed);
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let (db, _dir) = temp_db();
        assert!(matches!(
            db.update_submission("CLOAKK-0000-0000-0000", |_| Ok(())),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn remove_and_inline_delete_report_existence() {
        let (db, _dir) = temp_db();
        let id = Uuid::new_v4();
        db.put_inline(&id, b"bytes").unwrap();
        assert!(db.delete_inline(&id).unwrap());
        assert!(!db.delete_inline(&id).unwrap());

        let record = sample_record("CLOAKK-9999-8888-7777", StorageRef::new_inline());
        db.insert_submission(&record, &[]).unwrap();
        assert!(db.remove_submission("CLOAKK-9999-8888-7777").unwrap());
        assert!(!db.remove_submission("CLOAKK-9999-8888-7777").unwrap());
        assert!(db.list_submissions().unwrap().is_empty());
    }

    #[test]
    fn health_check_reads_without_records() {
        let (db, _dir) = temp_db();
        db.health_check().unwrap();

        db.insert_submission(&sample_record("CLOAKK-HHHH-0000-0001", StorageRef::new_inline()), &[])
            .unwrap();
        db.health_check().unwrap();
    }
}
