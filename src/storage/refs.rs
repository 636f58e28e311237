// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tagged references to stored ciphertext.
//!
//! References serialize as `inline:<uuid>` or `blob:<uuid>`. The kind is part
//! of the value, so an inline id can never be looked up in the blob store or
//! the other way around.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StorageError;

const INLINE_SCHEME: &str = "inline";
const BLOB_SCHEME: &str = "blob";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StorageRef {
    /// Ciphertext kept in the database next to the record.
    Inline(Uuid),
    /// Ciphertext kept in the blob store.
    Blob(Uuid),
}

impl StorageRef {
    pub fn new_inline() -> Self {
        StorageRef::Inline(Uuid::new_v4())
    }

    pub fn new_blob() -> Self {
        StorageRef::Blob(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        match self {
            StorageRef::Inline(id) | StorageRef::Blob(id) => *id,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, StorageRef::Inline(_))
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageRef::Inline(id) => write!(f, "{INLINE_SCHEME}:{id}"),
            StorageRef::Blob(id) => write!(f, "{BLOB_SCHEME}:{id}"),
        }
    }
}

impl FromStr for StorageRef {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, id) = s
            .split_once(':')
            .ok_or_else(|| StorageError::InvalidReference(s.to_string()))?;
        let id = Uuid::parse_str(id).map_err(|_| StorageError::InvalidReference(s.to_string()))?;
        match scheme {
            INLINE_SCHEME => Ok(StorageRef::Inline(id)),
            BLOB_SCHEME => Ok(StorageRef::Blob(id)),
            _ => Err(StorageError::InvalidReference(s.to_string())),
        }
    }
}

impl TryFrom<String> for StorageRef {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageRef> for String {
    fn from(value: StorageRef) -> Self {
        value.to_string()
    }
}
