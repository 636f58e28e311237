// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Versioned envelope for the escrowed per-submission private key.
//!
//! The envelope is a small JSON document:
//!
//! ```text
//! {"version":1,"encoding":"pkcs8-der","alg":"A256GCM","nonce":"<b64>","ciphertext":"<b64>"}
//! ```
//!
//! The wrapping key is `HKDF-SHA512(passphrase)`, and the submission's public
//! key hash is bound as associated data, so an envelope cannot be moved onto
//! another record.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64ct::{Base64, Encoding};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::Zeroizing;

use super::cipher::{KEY_SIZE, NONCE_SIZE};
use super::{CryptoError, CryptoResult};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Encoding tag for a PKCS#8 DER private key.
pub const ENCODING_PKCS8_DER: &str = "pkcs8-der";

/// Algorithm tag for AES-256-GCM.
pub const ALG_A256GCM: &str = "A256GCM";

const WRAP_INFO: &[u8] = b"cloak/private-key/v1";

/// Encrypted private key with explicit version and encoding tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivateKeyEnvelope {
    pub version: u8,
    pub encoding: String,
    pub alg: String,
    /// Base64 AES-GCM nonce.
    pub nonce: String,
    /// Base64 ciphertext including the authentication tag.
    pub ciphertext: String,
}

impl PrivateKeyEnvelope {
    /// Encrypt a PKCS#8 DER private key under `passphrase_hex`.
    pub fn seal(private_key_der: &[u8], passphrase_hex: &str, binding: &[u8]) -> CryptoResult<Self> {
        let cipher = wrapping_cipher(passphrase_hex)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: private_key_der,
                    aad: binding,
                },
            )
            .map_err(|_| CryptoError::Encryption("private key wrap failed".to_string()))?;

        Ok(Self {
            version: ENVELOPE_VERSION,
            encoding: ENCODING_PKCS8_DER.to_string(),
            alg: ALG_A256GCM.to_string(),
            nonce: Base64::encode_string(nonce.as_slice()),
            ciphertext: Base64::encode_string(&ciphertext),
        })
    }

    /// Decrypt the envelope, returning the PKCS#8 DER private key.
    pub fn open(&self, passphrase_hex: &str, binding: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if self.version != ENVELOPE_VERSION {
            return Err(CryptoError::Decryption("unsupported envelope version"));
        }
        if self.encoding != ENCODING_PKCS8_DER || self.alg != ALG_A256GCM {
            return Err(CryptoError::Decryption("unsupported envelope encoding"));
        }

        let nonce = Base64::decode_vec(&self.nonce)
            .map_err(|_| CryptoError::Decryption("envelope nonce is not base64"))?;
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::Decryption("envelope nonce has wrong length"));
        }
        let ciphertext = Base64::decode_vec(&self.ciphertext)
            .map_err(|_| CryptoError::Decryption("envelope ciphertext is not base64"))?;

        let cipher = wrapping_cipher(passphrase_hex)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: binding,
                },
            )
            .map_err(|_| CryptoError::Decryption("private key envelope rejected"))?;

        Ok(Zeroizing::new(plaintext))
    }

    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        serde_json::from_str(json).map_err(|_| CryptoError::Decryption("malformed private key envelope"))
    }
}

fn wrapping_cipher(passphrase_hex: &str) -> CryptoResult<Aes256Gcm> {
    let ikm = Zeroizing::new(
        hex::decode(passphrase_hex)
            .map_err(|_| CryptoError::InvalidInput("passphrase is not hex".to_string()))?,
    );
    if ikm.is_empty() {
        return Err(CryptoError::InvalidInput("passphrase is empty".to_string()));
    }

    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha512>::new(None, &ikm)
        .expand(WRAP_INFO, okm.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Aes256Gcm::new_from_slice(okm.as_ref()).map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSPHRASE: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

    #[test]
    fn seal_and_open() {
        let secret = b"pkcs8 bytes go here";
        let envelope = PrivateKeyEnvelope::seal(secret, PASSPHRASE, b"binding").unwrap();
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        assert_eq!(envelope.encoding, ENCODING_PKCS8_DER);

        let opened = envelope.open(PASSPHRASE, b"binding").unwrap();
        assert_eq!(opened.as_slice(), secret);
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let envelope = PrivateKeyEnvelope::seal(b"secret", PASSPHRASE, b"binding").unwrap();
        let other = "ff".repeat(32);
        assert!(matches!(
            envelope.open(&other, b"binding"),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn binding_mismatch_is_rejected() {
        let envelope = PrivateKeyEnvelope::seal(b"secret", PASSPHRASE, b"record-a").unwrap();
        assert!(matches!(
            envelope.open(PASSPHRASE, b"record-b"),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let mut envelope = PrivateKeyEnvelope::seal(b"secret", PASSPHRASE, b"binding").unwrap();
        let mut raw = Base64::decode_vec(&envelope.ciphertext).unwrap();
        raw[0] ^= 0x01;
        envelope.ciphertext = Base64::encode_string(&raw);

        assert!(envelope.open(PASSPHRASE, b"binding").is_err());
    }

    #[test]
    fn unknown_version_or_encoding_is_rejected() {
        let envelope = PrivateKeyEnvelope::seal(b"secret", PASSPHRASE, b"binding").unwrap();

        let mut future = envelope.clone();
        future.version = 2;
        assert!(matches!(
            future.open(PASSPHRASE, b"binding"),
            Err(CryptoError::Decryption("unsupported envelope version"))
        ));

        let mut sec1 = envelope;
        sec1.encoding = "sec1-der".to_string();
        assert!(matches!(
            sec1.open(PASSPHRASE, b"binding"),
            Err(CryptoError::Decryption("unsupported envelope encoding"))
        ));
    }

    #[test]
    fn json_form_is_stable() {
        let envelope = PrivateKeyEnvelope::seal(b"secret", PASSPHRASE, b"binding").unwrap();
        let json = envelope.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["encoding"], "pkcs8-der");
        assert_eq!(value["alg"], "A256GCM");

        assert_eq!(PrivateKeyEnvelope::from_json(&json).unwrap(), envelope);
        assert!(PrivateKeyEnvelope::from_json("[1,2,3]").is_err());
    }
}
