// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptography
//!
//! - `keys` - per-submission P-521 key pairs, salts and PBKDF2 passphrases
//! - `envelope` - versioned AES-GCM wrapping of the escrowed private key
//! - `agreement` - ECDH + HKDF content-key derivation against the recipient key
//! - `cipher` - AES-256-GCM for message text, segmented STREAM for file bytes
//!
//! Nothing in this module touches storage or the async runtime. The
//! expensive operations are synchronous and expected to run on blocking
//! threads.

pub mod agreement;
pub mod cipher;
pub mod envelope;
mod error;
pub mod keys;

pub use agreement::{derive_content_key, RecipientKeyPair, RecipientPublicKey};
pub use cipher::{ContentCipher, ContentKey, FileDecryptor};
pub use envelope::PrivateKeyEnvelope;
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    decode_public_key, derive_passphrase, generate_salt, public_key_hash, EphemeralKeyPair,
    KeyMaterialGenerator, SubmissionKeyMaterial,
};
