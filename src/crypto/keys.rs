// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-submission key material.
//!
//! Every submission gets its own P-521 key pair. The private half is escrowed
//! in a [`PrivateKeyEnvelope`] under a passphrase derived with
//! PBKDF2-HMAC-SHA512 from the operator secret and a random salt.
//!
//! ## Parameters
//!
//! | Parameter  | Value            |
//! |------------|------------------|
//! | Curve      | P-521            |
//! | Salt       | 16 random bytes  |
//! | Iterations | 25 000           |
//! | Output     | 64 bytes (hex)   |
//! | Hash       | SHA-512          |

use std::sync::Arc;

use base64ct::{Base64, Encoding};
use p521::elliptic_curve::rand_core::{OsRng, RngCore};
use p521::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p521::{PublicKey, SecretKey};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use super::envelope::PrivateKeyEnvelope;
use super::{CryptoError, CryptoResult};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 25_000;

/// PBKDF2 output length in bytes.
pub const PASSPHRASE_LEN: usize = 64;

/// Generate a random salt, hex-encoded.
pub fn generate_salt() -> CryptoResult<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::Unavailable(e.to_string()))?;
    Ok(hex::encode(salt))
}

/// Decode and length-check a hex salt.
pub fn decode_salt(salt_hex: &str) -> CryptoResult<[u8; SALT_LEN]> {
    let bytes = hex::decode(salt_hex)
        .map_err(|_| CryptoError::InvalidInput("salt is not valid hex".to_string()))?;
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidInput(format!("salt must be exactly {} bytes", SALT_LEN))
    })
}

/// Derive the hex passphrase for a salt. Deterministic in all of its inputs.
pub fn derive_passphrase(
    shared_secret: &str,
    salt_hex: &str,
    iterations: u32,
    key_len: usize,
) -> CryptoResult<Zeroizing<String>> {
    if shared_secret.is_empty() {
        return Err(CryptoError::InvalidInput("shared secret is empty".to_string()));
    }
    if iterations == 0 || key_len == 0 {
        return Err(CryptoError::InvalidInput(
            "iterations and key length must be positive".to_string(),
        ));
    }
    let salt = decode_salt(salt_hex)?;

    let mut out = Zeroizing::new(vec![0u8; key_len]);
    pbkdf2::pbkdf2_hmac::<Sha512>(shared_secret.as_bytes(), &salt, iterations, &mut out);
    Ok(Zeroizing::new(hex::encode(out.as_slice())))
}

/// Base64 SPKI DER encoding of a public key.
pub fn encode_public_key(public_key: &PublicKey) -> CryptoResult<String> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(Base64::encode_string(der.as_bytes()))
}

/// Parse a base64 SPKI DER public key.
pub fn decode_public_key(public_key_b64: &str) -> CryptoResult<PublicKey> {
    let der = Base64::decode_vec(public_key_b64.trim())
        .map_err(|_| CryptoError::Decryption("public key is not base64"))?;
    PublicKey::from_public_key_der(&der).map_err(|_| CryptoError::Decryption("public key is not a P-521 key"))
}

/// Hex SHA-256 of the base64 public key string.
pub fn public_key_hash(public_key_b64: &str) -> String {
    hex::encode(Sha256::digest(public_key_b64.as_bytes()))
}

/// Wrap PKCS#8 DER private key bytes into a JSON envelope.
pub fn encrypt_private_key(
    private_key_der: &[u8],
    passphrase_hex: &str,
    public_key_hash: &str,
) -> CryptoResult<String> {
    PrivateKeyEnvelope::seal(private_key_der, passphrase_hex, public_key_hash.as_bytes())?.to_json()
}

/// Unwrap a JSON envelope back into PKCS#8 DER private key bytes.
pub fn decrypt_private_key(
    envelope_json: &str,
    passphrase_hex: &str,
    public_key_hash: &str,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    PrivateKeyEnvelope::from_json(envelope_json)?.open(passphrase_hex, public_key_hash.as_bytes())
}

/// A P-521 key pair generated for a single submission.
pub struct EphemeralKeyPair {
    secret: SecretKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn from_private_key_der(der: &[u8]) -> CryptoResult<Self> {
        let secret = SecretKey::from_pkcs8_der(der)
            .map_err(|_| CryptoError::Decryption("private key is not PKCS#8 P-521"))?;
        Ok(Self { secret })
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    pub fn public_key_base64(&self) -> CryptoResult<String> {
        encode_public_key(&self.public_key())
    }

    pub fn private_key_der(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let doc = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Everything produced for one submission.
///
/// The passphrase and the live key pair never leave this value; only the
/// public fields are persisted.
pub struct SubmissionKeyMaterial {
    pub salt_hex: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub public_key_hash: String,
    passphrase_hex: Zeroizing<String>,
    key_pair: EphemeralKeyPair,
}

impl SubmissionKeyMaterial {
    pub fn passphrase_hex(&self) -> &str {
        &self.passphrase_hex
    }

    pub fn key_pair(&self) -> &EphemeralKeyPair {
        &self.key_pair
    }
}

impl std::fmt::Debug for SubmissionKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionKeyMaterial")
            .field("salt_hex", &self.salt_hex)
            .field("public_key_hash", &self.public_key_hash)
            .finish_non_exhaustive()
    }
}

/// Produces [`SubmissionKeyMaterial`] from the operator secret.
#[derive(Clone)]
pub struct KeyMaterialGenerator {
    operator_secret: Arc<Zeroizing<String>>,
}

impl KeyMaterialGenerator {
    pub fn new(operator_secret: impl Into<String>) -> CryptoResult<Self> {
        let secret = operator_secret.into();
        if secret.is_empty() {
            return Err(CryptoError::InvalidInput("operator secret is empty".to_string()));
        }
        Ok(Self {
            operator_secret: Arc::new(Zeroizing::new(secret)),
        })
    }

    /// Recompute the passphrase for a stored salt.
    pub fn passphrase_for(&self, salt_hex: &str) -> CryptoResult<Zeroizing<String>> {
        derive_passphrase(&self.operator_secret, salt_hex, PBKDF2_ITERATIONS, PASSPHRASE_LEN)
    }

    /// Generate fresh key material. CPU-bound; callers on the async runtime
    /// should run this on a blocking thread.
    pub fn generate(&self) -> CryptoResult<SubmissionKeyMaterial> {
        let salt_hex = generate_salt()?;
        let passphrase_hex = self.passphrase_for(&salt_hex)?;

        let key_pair = EphemeralKeyPair::generate();
        let public_key = key_pair.public_key_base64()?;
        let public_key_hash = public_key_hash(&public_key);

        let private_der = key_pair.private_key_der()?;
        let encrypted_private_key = encrypt_private_key(&private_der, &passphrase_hex, &public_key_hash)?;

        Ok(SubmissionKeyMaterial {
            salt_hex,
            public_key,
            encrypted_private_key,
            public_key_hash,
            passphrase_hex,
            key_pair,
        })
    }
}

impl std::fmt::Debug for KeyMaterialGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialGenerator")
            .field("operator_secret", &"[REDACTED]")
            .finish()
    }
}
