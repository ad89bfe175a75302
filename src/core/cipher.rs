//! Authenticated symmetric encryption for credential fields.
//!
//! Blob layout: `base64(nonce || ciphertext || tag)` using AES-256-GCM. The key is
//! derived once from the master secret with HKDF-SHA256 and never leaves this type.

use crate::constants::{
    FINGERPRINT_DOMAIN, FINGERPRINT_HEX_LEN, KEY_DERIVATION_CONTEXT, KEY_DERIVATION_SALT, KEY_LEN,
    NONCE_LEN, TAG_LEN,
};
use crate::error::CipherError;
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use ring::aead;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

pub struct CredentialCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
    fingerprint: String,
}

impl CredentialCipher {
    /// Derive the vault key from a master secret.
    pub fn new(master: &SecretString) -> Result<Self, CipherError> {
        let secret = master.expose_secret();
        if secret.is_empty() {
            return Err(CipherError::InvalidArgument("master secret is empty"));
        }

        let hk = Hkdf::<Sha256>::new(Some(KEY_DERIVATION_SALT), secret.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        hk.expand(KEY_DERIVATION_CONTEXT, &mut key[..])
            .map_err(|_| CipherError::Key("key derivation failed".into()))?;

        let fingerprint = fingerprint_of(&key[..]);
        Ok(Self { key, fingerprint })
    }

    /// Encrypt a non-empty plaintext. Every call uses a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Err(CipherError::InvalidArgument("plaintext is empty"));
        }

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let key = self.aead_key()?;
        let mut in_out = Zeroizing::new(plaintext.as_bytes().to_vec());
        in_out.reserve(TAG_LEN);
        key.seal_in_place_append_tag(
            aead::Nonce::assume_unique_for_key(nonce),
            aead::Aad::empty(),
            &mut *in_out,
        )
        .map_err(|_| CipherError::Key("seal failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&in_out);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// The tag is verified before any plaintext is released; a tampered blob or a
    /// blob sealed under another key yields `DecryptionFailed`.
    pub fn decrypt(&self, blob: &str) -> Result<String, CipherError> {
        if blob.is_empty() {
            return Err(CipherError::InvalidArgument("ciphertext is empty"));
        }

        let data = STANDARD
            .decode(blob)
            .map_err(|_| CipherError::InvalidFormat("ciphertext is not valid base64"))?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::InvalidFormat("ciphertext too short"));
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let nonce = aead::Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| CipherError::InvalidFormat("invalid nonce length"))?;

        let key = self.aead_key()?;
        let mut buffer = Zeroizing::new(sealed.to_vec());
        let plaintext = key
            .open_in_place(nonce, aead::Aad::empty(), &mut buffer[..])
            .map_err(|_| CipherError::DecryptionFailed)?;

        std::str::from_utf8(plaintext)
            .map(str::to_owned)
            .map_err(|_| CipherError::InvalidFormat("plaintext is not valid UTF-8"))
    }

    /// Short, stable identifier of the active key. Not reversible to key bytes.
    pub fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn aead_key(&self) -> Result<aead::LessSafeKey, CipherError> {
        let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &self.key[..])
            .map_err(|_| CipherError::Key("invalid key length".into()))?;
        Ok(aead::LessSafeKey::new(unbound))
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn fingerprint_of(key: &[u8]) -> String {
    let digest = Sha256::new()
        .chain_update(FINGERPRINT_DOMAIN)
        .chain_update(key)
        .finalize();
    let mut hex = format!("{:064x}", digest);
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}
