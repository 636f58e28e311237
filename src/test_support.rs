// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use tempfile::TempDir;

use crate::auth::AdminClaims;
use crate::crypto::{KeyMaterialGenerator, RecipientKeyPair};
use crate::state::{AppState, AuthConfig};
use crate::storage::content::{DEFAULT_INLINE_THRESHOLD, DEFAULT_STORAGE_TIMEOUT};
use crate::storage::{AuditLog, BlobStore, ContentStore, StoragePaths, SubmissionDatabase};

pub const TEST_ADMIN: &str = "admin-test";
pub const JWT_SECRET: &[u8] = b"test-jwt-secret";
pub const OPERATOR_SECRET: &str = "test-operator-secret";

/// A fully wired state on a temporary data directory.
pub struct TestContext {
    _temp: TempDir,
    pub paths: StoragePaths,
    pub db: Arc<SubmissionDatabase>,
    pub generator: KeyMaterialGenerator,
    pub recipient: Arc<RecipientKeyPair>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let db = Arc::new(SubmissionDatabase::open(&paths.db_file()).unwrap());
        let mut blobs = BlobStore::new(paths.clone());
        blobs.initialize().unwrap();
        let content = ContentStore::new(
            Arc::clone(&db),
            blobs,
            DEFAULT_STORAGE_TIMEOUT,
            DEFAULT_INLINE_THRESHOLD,
        );
        let generator = KeyMaterialGenerator::new(OPERATOR_SECRET).unwrap();
        let recipient = Arc::new(RecipientKeyPair::generate());

        let state = AppState::new(
            Arc::clone(&db),
            content,
            AuditLog::new(paths.clone()),
            generator.clone(),
            Arc::clone(&recipient),
            TEST_ADMIN,
            AuthConfig::hs256(JWT_SECRET),
        );

        Self {
            _temp: temp,
            paths,
            db,
            generator,
            recipient,
            state,
        }
    }
}

/// Sign a token with arbitrary claims.
pub fn token_with(secret: &[u8], sub: &str, role: Option<&str>, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = AdminClaims {
        sub: sub.to_string(),
        exp: now + ttl_secs,
        iat: now,
        role: role.map(str::to_string),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
}

/// A valid admin token for [`TEST_ADMIN`].
pub fn admin_token() -> String {
    token_with(JWT_SECRET, TEST_ADMIN, Some("admin"), 3600)
}

fn patterned(prefix: &[u8], len: usize) -> Vec<u8> {
    let mut bytes = prefix.to_vec();
    let mut state: u32 = 0x9E37_79B9;
    while bytes.len() < len.max(prefix.len()) {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        bytes.push(state as u8);
    }
    bytes
}

/// PNG signature followed by pseudo-random bytes.
pub fn png_bytes(len: usize) -> Vec<u8> {
    patterned(b"\x89PNG\r\n\x1a\n", len)
}

/// PDF header followed by pseudo-random bytes.
pub fn pdf_bytes(len: usize) -> Vec<u8> {
    patterned(b"%PDF-1.7\n", len)
}

/// File names currently in the blob directory.
pub fn blob_dir_entries(paths: &StoragePaths) -> Vec<String> {
    std::fs::read_dir(paths.blobs_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

/// Poll `condition` until it holds or `within` elapses. Returns whether it held.
pub async fn wait_until(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
