// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The submission pipeline.
//!
//! validate → key material → content key → encrypt text and files in
//! parallel → write blobs → commit record. A submission is all-or-nothing:
//! any failure after the first blob write deletes every blob written so far
//! and no record is committed.
//!
//! The pipeline runs on its own task. A caller that goes away mid-submission
//! does not interrupt it, so every run ends either committed or rolled back.

use tokio::task::{JoinError, JoinSet};

use crate::crypto::{derive_content_key, ContentCipher, KeyMaterialGenerator, RecipientPublicKey};
use crate::error::{CloakError, CloakResult};
use crate::storage::{
    AuditEvent, AuditEventType, AuditLog, ContentStore, PendingInline, StorageError, StorageRef,
    StoredFile, StoredKeyMaterial, SubmissionRecord, SubmissionRepository,
};

use super::intake::{IncomingFile, SubmissionInput};
use super::receipt::generate_receipt_code;

/// Receipt-code collisions tolerated before giving up.
pub const MAX_RECEIPT_ATTEMPTS: usize = 5;

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub receipt_code: String,
    pub file_count: usize,
}

/// Accepts anonymous submissions.
#[derive(Clone)]
pub struct SubmissionService {
    generator: KeyMaterialGenerator,
    recipient_key: RecipientPublicKey,
    recipient_id: String,
    repository: SubmissionRepository,
    content: ContentStore,
    audit: AuditLog,
}

impl SubmissionService {
    pub fn new(
        generator: KeyMaterialGenerator,
        recipient_key: RecipientPublicKey,
        recipient_id: impl Into<String>,
        repository: SubmissionRepository,
        content: ContentStore,
        audit: AuditLog,
    ) -> Self {
        Self {
            generator,
            recipient_key,
            recipient_id: recipient_id.into(),
            repository,
            content,
            audit,
        }
    }

    /// Validate, encrypt and persist one submission.
    pub async fn submit(&self, mut input: SubmissionInput) -> CloakResult<SubmissionReceipt> {
        input.validate()?;

        let service = self.clone();
        tokio::spawn(async move { service.run(input).await })
            .await
            .map_err(|e| CloakError::StorageWriteFailed(format!("submission task failed: {e}")))?
    }

    async fn run(&self, input: SubmissionInput) -> CloakResult<SubmissionReceipt> {
        let mut written = Vec::new();
        match self.encrypt_and_store(input, &mut written).await {
            Ok(receipt) => {
                tracing::info!(
                    receipt_code = %receipt.receipt_code,
                    files = receipt.file_count,
                    "Submission stored"
                );
                self.audit.record(
                    AuditEvent::new(AuditEventType::SubmissionCreated)
                        .with_resource(receipt.receipt_code.clone())
                        .with_details(serde_json::json!({ "files": receipt.file_count })),
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(error = %e, blobs = written.len(), "Submission aborted");
                for reference in &written {
                    if let Err(cleanup) = self.content.delete_ref(reference).await {
                        tracing::error!(
                            reference = %reference,
                            error = %cleanup,
                            "Failed to remove ciphertext of aborted submission"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn encrypt_and_store(
        &self,
        input: SubmissionInput,
        written: &mut Vec<StorageRef>,
    ) -> CloakResult<SubmissionReceipt> {
        let SubmissionInput {
            text_message,
            files,
        } = input;
        let file_count = files.len();

        // Key material and content key (CPU-bound)
        let generator = self.generator.clone();
        let recipient_key = self.recipient_key.clone();
        let (key_material, content_key) = tokio::task::spawn_blocking(move || -> CloakResult<_> {
            let material = generator.generate()?;
            let key = derive_content_key(
                material.key_pair().secret(),
                recipient_key.as_public_key(),
                &material.salt_hex,
                &material.public_key_hash,
            )?;
            Ok((StoredKeyMaterial::from(&material), key))
        })
        .await
        .map_err(crypto_task_failed)??;
        let cipher = ContentCipher::new(&content_key);

        // Text and every file are encrypted as independent tasks
        let text_task = {
            let cipher = cipher.clone();
            tokio::task::spawn_blocking(move || cipher.encrypt_text(&text_message))
        };

        let mut tasks = JoinSet::new();
        for (index, file) in files.into_iter().enumerate() {
            let cipher = cipher.clone();
            tasks.spawn_blocking(move || {
                let ciphertext = cipher.encrypt_bytes(&file.bytes);
                (index, file, ciphertext)
            });
        }

        let mut encrypted: Vec<Option<(IncomingFile, Vec<u8>)>> = vec![None; file_count];
        while let Some(joined) = tasks.join_next().await {
            let (index, file, ciphertext) = joined.map_err(crypto_task_failed)?;
            encrypted[index] = Some((file, ciphertext?));
        }
        let text_ciphertext = text_task.await.map_err(crypto_task_failed)??;

        // Ciphertext placement
        let mut inline: Vec<PendingInline> = Vec::new();
        let text_bytes = text_ciphertext.into_bytes();
        let text_ref = if self.content.fits_inline(text_bytes.len()) {
            let (reference, pending) = self.content.stage_inline(text_bytes);
            inline.push(pending);
            reference
        } else {
            // Reserved before writing so a failed write is still cleaned up
            let reference = StorageRef::new_blob();
            written.push(reference);
            self.content
                .write_blob(&reference, text_bytes, "message", "application/octet-stream")
                .await?;
            reference
        };

        let mut stored_files = Vec::with_capacity(file_count);
        for (file, ciphertext) in encrypted.into_iter().flatten() {
            let reference = StorageRef::new_blob();
            written.push(reference);
            let ciphertext_size = ciphertext.len() as u64;
            self.content
                .write_blob(&reference, ciphertext, &file.original_name, &file.mime_type)
                .await?;
            stored_files.push(StoredFile {
                original_name: file.original_name,
                mime_type: file.mime_type,
                size: file.bytes.len() as u64,
                ciphertext_size,
                storage_ref: reference,
            });
        }
        if stored_files.len() != file_count {
            return Err(CloakError::EncryptionFailed(
                "not every file was encrypted".to_string(),
            ));
        }

        let record = SubmissionRecord::new(
            generate_receipt_code(),
            self.recipient_id.clone(),
            text_ref,
            key_material,
            stored_files,
        );
        let receipt_code = self.commit(record, inline).await?;

        Ok(SubmissionReceipt {
            receipt_code,
            file_count,
        })
    }

    /// Commit the record, drawing a new receipt code on collision.
    async fn commit(
        &self,
        mut record: SubmissionRecord,
        mut inline: Vec<PendingInline>,
    ) -> CloakResult<String> {
        let mut attempt = 1;
        loop {
            let repository = self.repository.clone();
            let (returned_record, returned_inline, result) =
                tokio::task::spawn_blocking(move || {
                    let result = repository.create(&record, &inline);
                    (record, inline, result)
                })
                .await
                .map_err(|e| CloakError::StorageWriteFailed(format!("commit task failed: {e}")))?;
            record = returned_record;
            inline = returned_inline;

            match result {
                Ok(()) => return Ok(record.receipt_code),
                Err(StorageError::AlreadyExists(_)) if attempt < MAX_RECEIPT_ATTEMPTS => {
                    tracing::warn!(attempt, "Receipt code collision, drawing a new one");
                    attempt += 1;
                    record.receipt_code = generate_receipt_code();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn crypto_task_failed(e: JoinError) -> CloakError {
    CloakError::EncryptionFailed(format!("encryption task failed: {e}"))
}
