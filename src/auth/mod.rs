// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Admin endpoints require a bearer JWT. Tokens are issued elsewhere; this
//! service only verifies them.
//!
//! ## Auth Flow
//!
//! 1. Client sends `Authorization: Bearer <JWT>`
//! 2. Server verifies the HS256 signature and expiry (60 s clock skew)
//! 3. `role` must be `admin`; `sub` becomes the principal id used for
//!    ownership checks on submission records
//!
//! The submission intake endpoint is anonymous and never inspects headers.

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::{AdminClaims, AdminPrincipal, ADMIN_ROLE};
pub use error::AuthError;
pub use extractor::{verify_token, Admin};
