// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated content encryption (AES-256-GCM).
//!
//! Text ciphertext is a base64 string of `nonce(12) || ciphertext || tag(16)`.
//!
//! File ciphertext uses the STREAM construction so that it can be opened one
//! segment at a time: `prefix(7) || segment_1 || .. || segment_n`. Each
//! segment seals up to [`FILE_SEGMENT_SIZE`] plaintext bytes plus a tag, and
//! the final segment carries the last-segment marker, so truncation and
//! reordering fail authentication.
//!
//! Text and files use distinct associated data so one cannot be replayed as
//! the other.

use aes_gcm::{
    aead::{
        generic_array::GenericArray,
        rand_core::RngCore,
        stream::{DecryptorBE32, EncryptorBE32},
        AeadCore, AeadInPlace, KeyInit, OsRng, Payload,
    },
    Aes256Gcm, Key, Nonce, Tag,
};
use base64ct::{Base64, Encoding};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{CryptoError, CryptoResult};

/// Size of a content key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Bytes added to a text plaintext (before base64).
pub const CIPHERTEXT_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Plaintext bytes per file segment.
pub const FILE_SEGMENT_SIZE: usize = 64 * 1024;

/// Size of the random nonce prefix that opens a file ciphertext.
pub const FILE_PREFIX_SIZE: usize = 7;

/// Size of a full sealed file segment.
pub const SEALED_SEGMENT_SIZE: usize = FILE_SEGMENT_SIZE + TAG_SIZE;

const TEXT_AAD: &[u8] = b"cloak/text";
const FILE_AAD: &[u8] = b"cloak/file";

/// Symmetric key for one submission's content. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentKey([REDACTED])")
    }
}

/// Encrypts and decrypts message text and file bytes under one content key.
#[derive(Clone)]
pub struct ContentCipher {
    aead: Aes256Gcm,
}

impl ContentCipher {
    pub fn new(key: &ContentKey) -> Self {
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt UTF-8 text into a base64 string.
    pub fn encrypt_text(&self, plaintext: &str) -> CryptoResult<String> {
        let sealed = self.seal(plaintext.as_bytes(), TEXT_AAD)?;
        Ok(Base64::encode_string(&sealed))
    }

    /// Decrypt a base64 text ciphertext.
    pub fn decrypt_text(&self, ciphertext: &str) -> CryptoResult<String> {
        let sealed = Base64::decode_vec(ciphertext.trim())
            .map_err(|_| CryptoError::Decryption("text ciphertext is not base64"))?;
        let plaintext = self.open(&sealed, TEXT_AAD)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption("text plaintext is not UTF-8"))
    }

    /// Encrypt arbitrary binary content into sealed segments.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut prefix = [0u8; FILE_PREFIX_SIZE];
        OsRng.fill_bytes(&mut prefix);
        let mut encryptor =
            EncryptorBE32::<Aes256Gcm>::from_aead(self.aead.clone(), GenericArray::from_slice(&prefix));

        let mut out = Vec::with_capacity(file_ciphertext_len(plaintext.len()));
        out.extend_from_slice(&prefix);

        let mut segments: Vec<&[u8]> = plaintext.chunks(FILE_SEGMENT_SIZE).collect();
        let last = segments.pop().unwrap_or(&[]);
        for segment in segments {
            let sealed = encryptor
                .encrypt_next(file_payload(segment))
                .map_err(|_| segment_encryption_failed())?;
            out.extend_from_slice(&sealed);
        }
        let sealed = encryptor
            .encrypt_last(file_payload(last))
            .map_err(|_| segment_encryption_failed())?;
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypt binary content held in memory. The result is byte-exact with
    /// the original.
    pub fn decrypt_bytes(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < FILE_PREFIX_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption("ciphertext too short"));
        }
        let (prefix, mut body) = ciphertext.split_at(FILE_PREFIX_SIZE);
        let mut decryptor = self.file_decryptor(prefix)?;

        let mut out = Vec::with_capacity(body.len());
        while body.len() > SEALED_SEGMENT_SIZE {
            let (segment, rest) = body.split_at(SEALED_SEGMENT_SIZE);
            out.extend_from_slice(&decryptor.next_segment(segment)?);
            body = rest;
        }
        out.extend_from_slice(&decryptor.last_segment(body)?);
        Ok(out)
    }

    /// Start segment-by-segment decryption of a file ciphertext whose first
    /// [`FILE_PREFIX_SIZE`] bytes are `prefix`.
    pub fn file_decryptor(&self, prefix: &[u8]) -> CryptoResult<FileDecryptor> {
        if prefix.len() != FILE_PREFIX_SIZE {
            return Err(CryptoError::Decryption("ciphertext too short"));
        }
        Ok(FileDecryptor {
            inner: DecryptorBE32::from_aead(self.aead.clone(), GenericArray::from_slice(prefix)),
        })
    }

    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        // Encrypt in place after the nonce so large files are held once.
        let mut out = Vec::with_capacity(plaintext.len() + CIPHERTEXT_OVERHEAD);
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(plaintext);

        let tag = self
            .aead
            .encrypt_in_place_detached(&nonce, aad, &mut out[NONCE_SIZE..])
            .map_err(|_| CryptoError::Encryption("content encryption failed".to_string()))?;
        out.extend_from_slice(tag.as_slice());
        Ok(out)
    }

    fn open(&self, sealed: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < CIPHERTEXT_OVERHEAD {
            return Err(CryptoError::Decryption("ciphertext too short"));
        }

        let (nonce, rest) = sealed.split_at(NONCE_SIZE);
        let (body, tag) = rest.split_at(rest.len() - TAG_SIZE);

        let mut out = body.to_vec();
        self.aead
            .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut out, Tag::from_slice(tag))
            .map_err(|_| CryptoError::Decryption("content authentication failed"))?;
        Ok(out)
    }
}

/// Decrypts one file ciphertext in order, segment by segment.
pub struct FileDecryptor {
    inner: DecryptorBE32<Aes256Gcm>,
}

impl FileDecryptor {
    /// Open a full segment that is not the last one.
    pub fn next_segment(&mut self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        self.inner
            .decrypt_next(file_payload(sealed))
            .map_err(|_| CryptoError::Decryption("content authentication failed"))
    }

    /// Open the final segment.
    pub fn last_segment(self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        self.inner
            .decrypt_last(file_payload(sealed))
            .map_err(|_| CryptoError::Decryption("content authentication failed"))
    }
}

fn file_payload(msg: &[u8]) -> Payload<'_, '_> {
    Payload { msg, aad: FILE_AAD }
}

fn segment_encryption_failed() -> CryptoError {
    CryptoError::Encryption("file segment encryption failed".to_string())
}

/// Ciphertext length for a file of `plaintext_len` bytes.
pub fn file_ciphertext_len(plaintext_len: usize) -> usize {
    let segments = plaintext_len.div_ceil(FILE_SEGMENT_SIZE).max(1);
    FILE_PREFIX_SIZE + plaintext_len + segments * TAG_SIZE
}

/// Plaintext length for a file ciphertext of `ciphertext_len` bytes.
pub fn file_plaintext_len(ciphertext_len: u64) -> Option<u64> {
    let body = ciphertext_len.checked_sub(FILE_PREFIX_SIZE as u64)?;
    let segments = body.div_ceil(SEALED_SEGMENT_SIZE as u64).max(1);
    body.checked_sub(segments * TAG_SIZE as u64)
}
