// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator-side access to submissions.

pub mod decryptor;

pub use decryptor::{
    AdminDecryptor, DecryptFailure, DecryptedFile, DecryptedSubmission, FileDownload, FileOutcome,
};
