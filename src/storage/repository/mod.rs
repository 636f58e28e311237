// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the submission database.

pub mod submissions;

pub use submissions::{
    Flag, LifecycleState, SortOrder, StoredFile, StoredKeyMaterial, SubmissionPage,
    SubmissionQuery, SubmissionRecord, SubmissionRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
