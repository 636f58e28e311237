// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Receipt codes handed back to anonymous submitters.
//!
//! Format: `CLOAKK-XXXX-XXXX-XXXX`, where the twelve characters are the first
//! twelve hex digits of a random UUID, uppercased.

use uuid::Uuid;

/// Fixed receipt prefix.
pub const RECEIPT_PREFIX: &str = "CLOAKK";

const GROUP_LEN: usize = 4;
const GROUPS: usize = 3;

/// Generate a fresh receipt code.
pub fn generate_receipt_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!(
        "{RECEIPT_PREFIX}-{}-{}-{}",
        &hex[0..4],
        &hex[4..8],
        &hex[8..12]
    )
}

/// Whether `code` has the receipt format.
pub fn is_valid_receipt_code(code: &str) -> bool {
    let mut parts = code.split('-');
    if parts.next() != Some(RECEIPT_PREFIX) {
        return false;
    }
    let groups: Vec<&str> = parts.collect();
    groups.len() == GROUPS
        && groups.iter().all(|g| {
            g.len() == GROUP_LEN
                && g.chars()
                    .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        })
}
