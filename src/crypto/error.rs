// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Errors raised by the cryptographic primitives.

/// Error type for key material and content encryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The platform random source or primitive could not be initialized.
    #[error("crypto provider unavailable: {0}")]
    Unavailable(String),

    /// Malformed salt, empty secret, bad encoding, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, corrupt or tampered ciphertext, key/curve mismatch.
    ///
    /// The reason is for logs only and never includes secret material.
    #[error("decryption failed: {0}")]
    Decryption(&'static str),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
