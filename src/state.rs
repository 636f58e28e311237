// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! Every component is constructed once here and handed to the handlers by
//! reference; nothing is looked up globally.

use std::sync::Arc;

use jsonwebtoken::DecodingKey;

use crate::admin::AdminDecryptor;
use crate::config::Config;
use crate::crypto::{KeyMaterialGenerator, RecipientKeyPair};
use crate::error::CloakResult;
use crate::storage::{
    AuditLog, BlobStore, ContentStore, StorageError, StoragePaths, SubmissionDatabase, SubmissionRepository,
};
use crate::submission::SubmissionService;

/// Admin token verification settings.
pub struct AuthConfig {
    decoding_key: DecodingKey,
}

impl AuthConfig {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repository: SubmissionRepository,
    pub content: ContentStore,
    pub submissions: SubmissionService,
    pub decryptor: AdminDecryptor,
    pub audit: AuditLog,
    pub auth_config: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        db: Arc<SubmissionDatabase>,
        content: ContentStore,
        audit: AuditLog,
        generator: KeyMaterialGenerator,
        recipient: Arc<RecipientKeyPair>,
        recipient_id: impl Into<String>,
        auth_config: AuthConfig,
    ) -> Self {
        let repository = SubmissionRepository::new(db);
        let submissions = SubmissionService::new(
            generator.clone(),
            recipient.public_key(),
            recipient_id,
            repository.clone(),
            content.clone(),
            audit.clone(),
        );
        let decryptor = AdminDecryptor::new(recipient, generator, content.clone());

        Self {
            repository,
            content,
            submissions,
            decryptor,
            audit,
            auth_config: Arc::new(auth_config),
        }
    }

    /// Open storage under `config.data_dir` and wire every component.
    pub fn open(config: &Config, recipient: Arc<RecipientKeyPair>) -> CloakResult<Self> {
        let paths = StoragePaths::new(&config.data_dir);
        std::fs::create_dir_all(paths.root()).map_err(StorageError::Io)?;

        let db = Arc::new(SubmissionDatabase::open(&paths.db_file())?);
        let mut blobs = BlobStore::new(paths.clone());
        blobs.initialize()?;
        let content = ContentStore::new(
            Arc::clone(&db),
            blobs,
            config.storage_timeout,
            config.inline_threshold,
        );
        let generator = KeyMaterialGenerator::new(config.operator_secret.as_str())?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            recipient_id = %config.recipient_id,
            inline_threshold = config.inline_threshold,
            "Storage opened"
        );

        Ok(Self::new(
            db,
            content,
            AuditLog::new(paths),
            generator,
            recipient,
            config.recipient_id.clone(),
            AuthConfig::hs256(config.jwt_secret.as_bytes()),
        ))
    }
}
