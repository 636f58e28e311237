// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ECDH content-key agreement between a submission key pair and the
//! operator's recipient key pair.

use hkdf::Hkdf;
use p521::elliptic_curve::rand_core::OsRng;
use p521::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use p521::{PublicKey, SecretKey};
use sha2::Sha512;
use zeroize::Zeroizing;

use super::cipher::{ContentKey, KEY_SIZE};
use super::keys::{decode_public_key, decode_salt, encode_public_key};
use super::{CryptoError, CryptoResult};

/// HKDF info prefix for content keys.
pub const CONTENT_KEY_INFO: &[u8] = b"cloak/content/v1";

const PEM_TAG: &str = "PRIVATE KEY";

/// The operator's long-lived key pair.
pub struct RecipientKeyPair {
    secret: SecretKey,
}

impl RecipientKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Load from a PKCS#8 PEM document.
    pub fn from_pkcs8_pem(pem_str: &str) -> CryptoResult<Self> {
        let parsed = pem::parse(pem_str)
            .map_err(|e| CryptoError::InvalidInput(format!("invalid PEM: {}", e)))?;
        if parsed.tag() != PEM_TAG {
            return Err(CryptoError::InvalidInput(format!(
                "expected a {} block, found {}",
                PEM_TAG,
                parsed.tag()
            )));
        }
        let secret = SecretKey::from_pkcs8_der(parsed.contents())
            .map_err(|e| CryptoError::InvalidInput(format!("invalid P-521 key: {}", e)))?;
        Ok(Self { secret })
    }

    pub fn to_pkcs8_pem(&self) -> CryptoResult<Zeroizing<String>> {
        self.secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
    }

    pub fn public_key(&self) -> RecipientPublicKey {
        RecipientPublicKey(self.secret.public_key())
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for RecipientKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientKeyPair")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Public half of the recipient key pair, handed to the submission path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientPublicKey(PublicKey);

impl RecipientPublicKey {
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        decode_public_key(encoded).map(Self)
    }

    pub fn to_base64(&self) -> CryptoResult<String> {
        encode_public_key(&self.0)
    }

    pub fn as_public_key(&self) -> &PublicKey {
        &self.0
    }
}

/// Derive the content key from one side's secret and the other side's public
/// key. Both sides arrive at the same key.
pub fn derive_content_key(
    own_secret: &SecretKey,
    peer_public: &PublicKey,
    salt_hex: &str,
    public_key_hash: &str,
) -> CryptoResult<ContentKey> {
    let salt = decode_salt(salt_hex)?;
    let shared = p521::ecdh::diffie_hellman(own_secret.to_nonzero_scalar(), peer_public.as_affine());

    let mut info = Vec::with_capacity(CONTENT_KEY_INFO.len() + public_key_hash.len());
    info.extend_from_slice(CONTENT_KEY_INFO);
    info.extend_from_slice(public_key_hash.as_bytes());

    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha512>::new(Some(&salt), shared.raw_secret_bytes().as_slice())
        .expand(&info, okm.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(ContentKey::from_bytes(*okm))
}
