// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and the verified admin principal.

use serde::{Deserialize, Serialize};

/// Role value that grants access to the admin API.
pub const ADMIN_ROLE: &str = "admin";

/// Claims accepted in admin tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Subject: the principal id records are owned by.
    pub sub: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,
    /// Role name; must be `admin`.
    #[serde(default)]
    pub role: Option<String>,
}

/// A verified admin principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    /// Canonical principal id (`sub` claim).
    pub principal_id: String,
    /// Token expiry (unix seconds).
    pub expires_at: i64,
}

impl AdminPrincipal {
    pub fn id(&self) -> &str {
        &self.principal_id
    }
}
