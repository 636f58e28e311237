// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for record mutations.
//!
//! The auth layer hands the storage layer a verified principal id; every
//! admin mutation checks it against the record's owner before writing.

use super::{StorageError, StorageResult};

/// Trait for resources that have an owner.
pub trait OwnedResource {
    /// Principal id of the owner.
    fn owner_id(&self) -> &str;

    /// Short description used in permission errors.
    fn resource_label(&self) -> String;
}

/// Trait for enforcing ownership on storage operations.
pub trait OwnershipEnforcer {
    /// Verify that the principal owns this resource.
    ///
    /// # Errors
    /// Returns `StorageError::PermissionDenied` if the principal doesn't own the resource.
    fn verify_ownership(&self, principal: &str) -> StorageResult<()>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_ownership(&self, principal: &str) -> StorageResult<()> {
        if self.owner_id() == principal {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied {
                user_id: principal.to_string(),
                resource: self.resource_label(),
            })
        }
    }
}
