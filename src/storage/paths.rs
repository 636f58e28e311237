// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the data directory layout.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Default base directory for all persistent storage.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Embedded database file (records and inline ciphertext).
    pub fn db_file(&self) -> PathBuf {
        self.root.join("cloak.redb")
    }

    // ========== Blob Paths ==========

    /// Directory containing all ciphertext blobs.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Path to a blob's ciphertext.
    pub fn blob(&self, id: &Uuid) -> PathBuf {
        self.blobs_dir().join(format!("{id}.bin"))
    }

    /// Path to a blob's metadata sidecar.
    pub fn blob_meta(&self, id: &Uuid) -> PathBuf {
        self.blobs_dir().join(format!("{id}.meta.json"))
    }

    /// Temporary path used while a blob is being written.
    pub fn blob_partial(&self, id: &Uuid) -> PathBuf {
        self.blobs_dir().join(format!("{id}.partial"))
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("./data"));
        assert_eq!(paths.db_file(), PathBuf::from("./data/cloak.redb"));
    }

    #[test]
    fn blob_paths_are_correct() {
        let paths = StoragePaths::new("/tmp/test-data");
        let id = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00cf4fc964ff").unwrap();

        assert_eq!(paths.blobs_dir(), PathBuf::from("/tmp/test-data/blobs"));
        assert_eq!(
            paths.blob(&id),
            PathBuf::from("/tmp/test-data/blobs/6f9619ff-8b86-d011-b42d-00cf4fc964ff.bin")
        );
        assert_eq!(
            paths.blob_meta(&id),
            PathBuf::from("/tmp/test-data/blobs/6f9619ff-8b86-d011-b42d-00cf4fc964ff.meta.json")
        );
    }

    #[test]
    fn audit_paths_are_correct() {
        let paths = StoragePaths::new("/srv/cloak");
        assert_eq!(paths.audit_dir(), PathBuf::from("/srv/cloak/audit"));
        assert_eq!(
            paths.audit_events_file("2026-03-01"),
            PathBuf::from("/srv/cloak/audit/2026-03-01/events.jsonl")
        );
    }
}
