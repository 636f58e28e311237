// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Anonymous submission intake.

pub mod intake;
pub mod receipt;
pub mod service;

pub use intake::{IncomingFile, SubmissionInput, ALLOWED_MIME_TYPES, MAX_FILES, MAX_FILE_SIZE};
pub use receipt::{generate_receipt_code, is_valid_receipt_code};
pub use service::{SubmissionReceipt, SubmissionService};
