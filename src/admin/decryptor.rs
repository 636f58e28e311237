// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-side decryption of stored submissions.
//!
//! The escrowed submission key is unwrapped and checked against the stored
//! public key before anything is decrypted. After that, the text and every
//! file are decrypted independently: a failure is reported per item and
//! never aborts the rest of the view.
//!
//! Files are read and authenticated one sealed segment at a time, so the
//! ciphertext is never held whole. [`AdminDecryptor::verify_submission`]
//! discards each plaintext segment once it has authenticated.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use utoipa::ToSchema;

use crate::crypto::cipher::{FILE_PREFIX_SIZE, SEALED_SEGMENT_SIZE, TAG_SIZE};
use crate::crypto::{
    decode_public_key, derive_content_key, public_key_hash, ContentCipher, ContentKey,
    CryptoError, EphemeralKeyPair, KeyMaterialGenerator, PrivateKeyEnvelope, RecipientKeyPair,
};
use crate::error::{CloakError, CloakResult};
use crate::storage::{
    ContentStore, StorageError, StorageRef, StoredKeyMaterial, SubmissionRecord,
};

/// Why one item of a submission could not be decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecryptFailure {
    /// The submission key could not be recovered.
    KeyMaterial,
    /// The ciphertext is gone.
    NotFound,
    /// The ciphertext could not be read.
    Storage,
    /// The ciphertext did not authenticate.
    Decryption,
}

impl From<&StorageError> for DecryptFailure {
    fn from(e: &StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => DecryptFailure::NotFound,
            _ => DecryptFailure::Storage,
        }
    }
}

/// Outcome for a single attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Decrypted { bytes: Vec<u8> },
    /// Every segment authenticated; the plaintext was not kept.
    Verified,
    Failed { error: DecryptFailure },
}

/// Whether file plaintext is kept after it authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Keep,
    Discard,
}

/// Failure while streaming one file ciphertext.
#[derive(Debug)]
enum StreamFailure {
    Storage(StorageError),
    Crypto(CryptoError),
}

impl From<StorageError> for StreamFailure {
    fn from(e: StorageError) -> Self {
        StreamFailure::Storage(e)
    }
}

impl From<CryptoError> for StreamFailure {
    fn from(e: CryptoError) -> Self {
        StreamFailure::Crypto(e)
    }
}

impl From<StreamFailure> for DecryptFailure {
    fn from(e: StreamFailure) -> Self {
        match e {
            StreamFailure::Storage(e) => DecryptFailure::from(&e),
            StreamFailure::Crypto(_) => DecryptFailure::Decryption,
        }
    }
}

impl From<StreamFailure> for CloakError {
    fn from(e: StreamFailure) -> Self {
        match e {
            StreamFailure::Storage(e) => e.into(),
            StreamFailure::Crypto(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecryptedFile {
    pub index: usize,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub outcome: FileOutcome,
}

impl DecryptedFile {
    pub fn is_decrypted(&self) -> bool {
        matches!(
            self.outcome,
            FileOutcome::Decrypted { .. } | FileOutcome::Verified
        )
    }
}

/// Plaintext view of a submission.
#[derive(Debug, Clone)]
pub struct DecryptedSubmission {
    pub plain_text: Option<String>,
    pub text_error: Option<DecryptFailure>,
    pub files: Vec<DecryptedFile>,
}

/// A single decrypted attachment ready for download.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Recovers submission keys and decrypts stored content.
#[derive(Clone)]
pub struct AdminDecryptor {
    recipient: Arc<RecipientKeyPair>,
    generator: KeyMaterialGenerator,
    content: ContentStore,
}

impl AdminDecryptor {
    pub fn new(
        recipient: Arc<RecipientKeyPair>,
        generator: KeyMaterialGenerator,
        content: ContentStore,
    ) -> Self {
        Self {
            recipient,
            generator,
            content,
        }
    }

    /// Unwrap the escrowed submission key pair.
    ///
    /// The passphrase is taken from the record when present, otherwise
    /// recomputed from the operator secret and the stored salt. The unwrapped
    /// key must match both the stored public key and its hash.
    pub fn reconstruct_key_material(
        &self,
        material: &StoredKeyMaterial,
    ) -> CloakResult<EphemeralKeyPair> {
        if public_key_hash(&material.public_key) != material.public_key_hash {
            return Err(CloakError::DecryptionFailed(
                "public key hash mismatch".to_string(),
            ));
        }

        let passphrase = match &material.passphrase_hex {
            Some(stored) => zeroize::Zeroizing::new(stored.clone()),
            None => self.generator.passphrase_for(&material.salt_hex)?,
        };

        let envelope = PrivateKeyEnvelope::from_json(&material.encrypted_private_key)?;
        let der = envelope.open(&passphrase, material.public_key_hash.as_bytes())?;
        let key_pair = EphemeralKeyPair::from_private_key_der(&der)?;

        let stored_public = decode_public_key(&material.public_key)?;
        if key_pair.public_key() != stored_public {
            return Err(CryptoError::Decryption("private key does not match public key").into());
        }
        Ok(key_pair)
    }

    /// Derive the content key for a record from the recipient side.
    ///
    /// The escrowed key is reconstructed first so that a record whose key
    /// material is inconsistent is rejected before any content is touched.
    pub fn content_key(&self, material: &StoredKeyMaterial) -> CloakResult<ContentKey> {
        let key_pair = self.reconstruct_key_material(material)?;
        Ok(derive_content_key(
            self.recipient.secret(),
            &key_pair.public_key(),
            &material.salt_hex,
            &material.public_key_hash,
        )?)
    }

    async fn cipher_for(&self, record: &SubmissionRecord) -> CloakResult<ContentCipher> {
        let this = self.clone();
        let material = record.key_material.clone();
        let key = tokio::task::spawn_blocking(move || this.content_key(&material))
            .await
            .map_err(|e| CloakError::DecryptionFailed(format!("key task failed: {e}")))??;
        Ok(ContentCipher::new(&key))
    }

    /// Decrypt the text and all files of a record.
    pub async fn decrypt_submission(&self, record: &SubmissionRecord) -> DecryptedSubmission {
        self.open_submission(record, FileMode::Keep).await
    }

    /// Decrypt the text and authenticate every file without keeping file
    /// plaintext. Files come back as [`FileOutcome::Verified`].
    pub async fn verify_submission(&self, record: &SubmissionRecord) -> DecryptedSubmission {
        self.open_submission(record, FileMode::Discard).await
    }

    async fn open_submission(&self, record: &SubmissionRecord, mode: FileMode) -> DecryptedSubmission {
        let cipher = match self.cipher_for(record).await {
            Ok(cipher) => cipher,
            Err(e) => {
                tracing::warn!(
                    receipt_code = %record.receipt_code,
                    error = %e,
                    "Submission key could not be recovered"
                );
                return DecryptedSubmission {
                    plain_text: None,
                    text_error: Some(DecryptFailure::KeyMaterial),
                    files: record
                        .files
                        .iter()
                        .enumerate()
                        .map(|(index, file)| DecryptedFile {
                            index,
                            original_name: file.original_name.clone(),
                            mime_type: file.mime_type.clone(),
                            size: file.size,
                            outcome: FileOutcome::Failed {
                                error: DecryptFailure::KeyMaterial,
                            },
                        })
                        .collect(),
                };
            }
        };

        let mut tasks = JoinSet::new();
        for (index, file) in record.files.iter().enumerate() {
            let content = self.content.clone();
            let cipher = cipher.clone();
            let reference = file.storage_ref;
            tasks.spawn(async move {
                (index, open_file(&content, &cipher, &reference, mode).await)
            });
        }

        let (plain_text, text_error) = match self.decrypt_text(record, cipher).await {
            Ok(text) => (Some(text), None),
            Err(failure) => {
                tracing::warn!(receipt_code = %record.receipt_code, ?failure, "Text decryption failed");
                (None, Some(failure))
            }
        };

        let mut outcomes: Vec<Option<Result<FileOutcome, DecryptFailure>>> =
            vec![None; record.files.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => outcomes[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "File decryption task failed"),
            }
        }

        let files = record
            .files
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (file, outcome))| {
                let outcome = match outcome.unwrap_or(Err(DecryptFailure::Decryption)) {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        tracing::warn!(
                            receipt_code = %record.receipt_code,
                            index,
                            ?error,
                            "File decryption failed"
                        );
                        FileOutcome::Failed { error }
                    }
                };
                DecryptedFile {
                    index,
                    original_name: file.original_name.clone(),
                    mime_type: file.mime_type.clone(),
                    size: file.size,
                    outcome,
                }
            })
            .collect();

        DecryptedSubmission {
            plain_text,
            text_error,
            files,
        }
    }

    async fn decrypt_text(
        &self,
        record: &SubmissionRecord,
        cipher: ContentCipher,
    ) -> Result<String, DecryptFailure> {
        let raw = self
            .content
            .read_all(&record.text_message)
            .await
            .map_err(|e| DecryptFailure::from(&e))?;
        let encoded = String::from_utf8(raw).map_err(|_| DecryptFailure::Decryption)?;
        tokio::task::spawn_blocking(move || cipher.decrypt_text(&encoded))
            .await
            .map_err(|_| DecryptFailure::Decryption)?
            .map_err(|_| DecryptFailure::Decryption)
    }

    /// Decrypt one attachment for download.
    pub async fn decrypt_file(
        &self,
        record: &SubmissionRecord,
        index: usize,
    ) -> CloakResult<FileDownload> {
        let file = record.files.get(index).ok_or_else(|| {
            CloakError::StorageNotFound(format!(
                "file {index} of submission {}",
                record.receipt_code
            ))
        })?;
        let cipher = self.cipher_for(record).await?;

        let mut bytes = Vec::with_capacity(usize::try_from(file.size).unwrap_or(0));
        stream_file(&self.content, &cipher, &file.storage_ref, |segment| {
            bytes.extend_from_slice(&segment)
        })
        .await?;

        Ok(FileDownload {
            original_name: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            bytes,
        })
    }
}

async fn open_file(
    content: &ContentStore,
    cipher: &ContentCipher,
    reference: &StorageRef,
    mode: FileMode,
) -> Result<FileOutcome, DecryptFailure> {
    match mode {
        FileMode::Keep => {
            let mut bytes = Vec::new();
            stream_file(content, cipher, reference, |segment| {
                bytes.extend_from_slice(&segment)
            })
            .await?;
            Ok(FileOutcome::Decrypted { bytes })
        }
        FileMode::Discard => {
            stream_file(content, cipher, reference, |_segment| {}).await?;
            Ok(FileOutcome::Verified)
        }
    }
}

/// Read a file ciphertext segment by segment, handing each authenticated
/// plaintext segment to `sink` in order.
///
/// A segment is the last one when no more than one sealed segment remains.
async fn stream_file<F>(
    content: &ContentStore,
    cipher: &ContentCipher,
    reference: &StorageRef,
    mut sink: F,
) -> Result<(), StreamFailure>
where
    F: FnMut(Vec<u8>),
{
    let mut stream = content.open_read_stream(reference).await?;
    let limit = content.timeout();

    let mut remaining = stream.length;
    if remaining < (FILE_PREFIX_SIZE + TAG_SIZE) as u64 {
        return Err(CryptoError::Decryption("ciphertext too short").into());
    }

    let mut prefix = [0u8; FILE_PREFIX_SIZE];
    read_within(&mut stream.reader, &mut prefix, limit).await?;
    remaining -= FILE_PREFIX_SIZE as u64;
    let mut decryptor = cipher.file_decryptor(&prefix)?;

    let mut segment = vec![0u8; SEALED_SEGMENT_SIZE];
    while remaining > SEALED_SEGMENT_SIZE as u64 {
        read_within(&mut stream.reader, &mut segment, limit).await?;
        sink(decryptor.next_segment(&segment)?);
        remaining -= SEALED_SEGMENT_SIZE as u64;
    }

    // remaining <= SEALED_SEGMENT_SIZE here
    let last = &mut segment[..remaining as usize];
    read_within(&mut stream.reader, last, limit).await?;
    sink(decryptor.last_segment(last)?);
    Ok(())
}

async fn read_within<R>(reader: &mut R, buf: &mut [u8], limit: Duration) -> Result<(), StorageError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    tokio::time::timeout(limit, reader.read_exact(buf))
        .await
        .map_err(|_| StorageError::Timeout("read file segment"))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::FILE_SEGMENT_SIZE;
    use crate::submission::{IncomingFile, SubmissionInput};
    use crate::test_support::{pdf_bytes, png_bytes, TestContext, OPERATOR_SECRET};
    use axum::body::Bytes;

    async fn submit(ctx: &TestContext, files: Vec<(&str, &str, Vec<u8>)>) -> SubmissionRecord {
        let files = files
            .into_iter()
            .map(|(name, mime, bytes)| IncomingFile {
                original_name: name.to_string(),
                mime_type: mime.to_string(),
                bytes: Bytes::from(bytes),
            })
            .collect();
        let receipt = ctx
            .state
            .submissions
            .submit(SubmissionInput {
                text_message: "secret tip".to_string(),
                files,
            })
            .await
            .unwrap();
        ctx.state.repository.get(&receipt.receipt_code).unwrap()
    }

    #[tokio::test]
    async fn reconstructs_matching_key_pair() {
        let ctx = TestContext::new();
        let record = submit(&ctx, vec![]).await;

        let key_pair = ctx
            .state
            .decryptor
            .reconstruct_key_material(&record.key_material)
            .unwrap();
        assert_eq!(
            key_pair.public_key_base64().unwrap(),
            record.key_material.public_key
        );
    }

    #[tokio::test]
    async fn stored_passphrase_is_honored() {
        let ctx = TestContext::new();
        let mut record = submit(&ctx, vec![]).await;

        let passphrase = ctx
            .generator
            .passphrase_for(&record.key_material.salt_hex)
            .unwrap();
        record.key_material.passphrase_hex = Some(passphrase.to_string());
        assert!(ctx
            .state
            .decryptor
            .reconstruct_key_material(&record.key_material)
            .is_ok());

        record.key_material.passphrase_hex = Some("00".repeat(64));
        assert!(matches!(
            ctx.state.decryptor.reconstruct_key_material(&record.key_material),
            Err(CloakError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn wrong_operator_secret_fails_key_material() {
        let ctx = TestContext::new();
        let record = submit(&ctx, vec![("a.png", "image/png", png_bytes(300))]).await;

        let other = AdminDecryptor::new(
            ctx.recipient.clone(),
            KeyMaterialGenerator::new(format!("{OPERATOR_SECRET}-rotated")).unwrap(),
            ctx.state.content.clone(),
        );
        let view = other.decrypt_submission(&record).await;
        assert_eq!(view.plain_text, None);
        assert_eq!(view.text_error, Some(DecryptFailure::KeyMaterial));
        assert_eq!(
            view.files[0].outcome,
            FileOutcome::Failed {
                error: DecryptFailure::KeyMaterial
            }
        );
    }

    #[tokio::test]
    async fn wrong_recipient_key_fails_decryption() {
        let ctx = TestContext::new();
        let record = submit(&ctx, vec![("a.pdf", "application/pdf", pdf_bytes(2_000))]).await;

        let other = AdminDecryptor::new(
            Arc::new(RecipientKeyPair::generate()),
            ctx.generator.clone(),
            ctx.state.content.clone(),
        );
        let view = other.decrypt_submission(&record).await;
        assert_eq!(view.text_error, Some(DecryptFailure::Decryption));
        assert!(!view.files[0].is_decrypted());
        assert!(matches!(
            other.decrypt_file(&record, 0).await,
            Err(CloakError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn tampered_public_key_is_rejected() {
        let ctx = TestContext::new();
        let mut record = submit(&ctx, vec![]).await;

        let imposter = EphemeralKeyPair::generate();
        record.key_material.public_key = imposter.public_key_base64().unwrap();
        record.key_material.public_key_hash = public_key_hash(&record.key_material.public_key);

        assert!(ctx
            .state
            .decryptor
            .reconstruct_key_material(&record.key_material)
            .is_err());
    }

    #[tokio::test]
    async fn one_missing_file_does_not_block_the_rest() {
        let ctx = TestContext::new();
        let png = png_bytes(1_000);
        let pdf = pdf_bytes(1_000);
        let record = submit(
            &ctx,
            vec![
                ("a.png", "image/png", png.clone()),
                ("b.pdf", "application/pdf", pdf.clone()),
            ],
        )
        .await;

        ctx.state
            .content
            .delete_ref(&record.files[0].storage_ref)
            .await
            .unwrap();

        let view = ctx.state.decryptor.decrypt_submission(&record).await;
        assert_eq!(view.plain_text.as_deref(), Some("secret tip"));
        assert_eq!(
            view.files[0].outcome,
            FileOutcome::Failed {
                error: DecryptFailure::NotFound
            }
        );
        assert_eq!(view.files[1].outcome, FileOutcome::Decrypted { bytes: pdf });
    }

    #[tokio::test]
    async fn detail_view_verifies_files_without_keeping_them() {
        let ctx = TestContext::new();
        let record = submit(
            &ctx,
            vec![
                ("a.png", "image/png", png_bytes(3 * FILE_SEGMENT_SIZE + 17)),
                ("b.pdf", "application/pdf", pdf_bytes(500)),
            ],
        )
        .await;

        let view = ctx.state.decryptor.verify_submission(&record).await;
        assert_eq!(view.plain_text.as_deref(), Some("secret tip"));
        assert!(view
            .files
            .iter()
            .all(|file| file.outcome == FileOutcome::Verified && file.is_decrypted()));
    }

    #[tokio::test]
    async fn multi_segment_download_is_byte_exact() {
        let ctx = TestContext::new();
        let png = png_bytes(2 * FILE_SEGMENT_SIZE);
        let record = submit(&ctx, vec![("a.png", "image/png", png.clone())]).await;

        let download = ctx.state.decryptor.decrypt_file(&record, 0).await.unwrap();
        assert_eq!(download.bytes, png);
        assert_eq!(download.original_name, "a.png");
    }

    #[tokio::test]
    async fn truncated_file_fails_authentication() {
        let ctx = TestContext::new();
        let mut record = submit(
            &ctx,
            vec![("a.png", "image/png", png_bytes(2 * FILE_SEGMENT_SIZE + 100))],
        )
        .await;

        let ciphertext = ctx
            .state
            .content
            .read_all(&record.files[0].storage_ref)
            .await
            .unwrap();
        let truncated = ciphertext[..ciphertext.len() - 116].to_vec();
        let reference = StorageRef::new_blob();
        ctx.state
            .content
            .write_blob(&reference, truncated, "a.png", "image/png")
            .await
            .unwrap();
        record.files[0].storage_ref = reference;

        let view = ctx.state.decryptor.verify_submission(&record).await;
        assert_eq!(
            view.files[0].outcome,
            FileOutcome::Failed {
                error: DecryptFailure::Decryption
            }
        );
        assert!(matches!(
            ctx.state.decryptor.decrypt_file(&record, 0).await,
            Err(CloakError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn missing_text_is_tagged() {
        let ctx = TestContext::new();
        let mut record = submit(&ctx, vec![]).await;
        record.text_message = StorageRef::new_inline();

        let view = ctx.state.decryptor.decrypt_submission(&record).await;
        assert_eq!(view.plain_text, None);
        assert_eq!(view.text_error, Some(DecryptFailure::NotFound));
    }

    #[tokio::test]
    async fn file_index_out_of_range() {
        let ctx = TestContext::new();
        let record = submit(&ctx, vec![]).await;
        assert!(matches!(
            ctx.state.decryptor.decrypt_file(&record, 0).await,
            Err(CloakError::StorageNotFound(_))
        ));
    }
}
