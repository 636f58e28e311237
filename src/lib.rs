// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cloak - Anonymous Encrypted Submission Service
//!
//! Anonymous parties submit a message and up to five files. Each submission
//! gets its own P-521 key material; content is encrypted under a key agreed
//! with the operator's recipient key, so only the operator can read it.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Admin token verification (HS256 JWT)
//! - `crypto` - Key material, key agreement, content encryption
//! - `storage` - Submission database, blob store, audit log
//! - `submission` - Intake validation and the submission pipeline
//! - `admin` - Operator-side decryption

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod state;
pub mod storage;
pub mod submission;

#[cfg(test)]
mod test_support;
