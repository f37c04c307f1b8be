// ── Secret sealing ──
//
// ChaCha20-Poly1305 with a random 96-bit nonce per seal. The SSID is bound
// as associated data, so a blob copied onto another entry fails to open.
// Blob layout: nonce (12) || ciphertext || tag (16).

use std::fmt;

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::zeroize::Zeroize;
use secrecy::{ExposeSecret, SecretBox, SecretString};

use crate::error::CoreError;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// The process-wide encryption key. Zeroed on drop, redacted in `Debug`.
pub struct MasterKey(SecretBox<[u8; KEY_LEN]>);

impl MasterKey {
    pub fn generate() -> Self {
        Self(SecretBox::init_with_mut(|bytes: &mut [u8; KEY_LEN]| {
            OsRng.fill_bytes(bytes);
        }))
    }

    /// Build a key from raw material, which must be exactly 32 bytes.
    pub fn from_slice(material: &[u8]) -> Result<Self, CoreError> {
        if material.len() != KEY_LEN {
            return Err(CoreError::EncryptionKeyUnavailable {
                reason: format!(
                    "key material is {} bytes, expected {KEY_LEN}",
                    material.len()
                ),
            });
        }
        Ok(Self(SecretBox::init_with_mut(|bytes: &mut [u8; KEY_LEN]| {
            bytes.copy_from_slice(material);
        })))
    }

    /// Build a key by letting `fill` write directly into protected memory.
    /// On failure the partially written box is zeroized on drop.
    pub fn try_from_fn<E>(
        fill: impl FnOnce(&mut [u8; KEY_LEN]) -> Result<(), E>,
    ) -> Result<Self, E> {
        let mut filled = Ok(());
        let key = SecretBox::init_with_mut(|bytes: &mut [u8; KEY_LEN]| filled = fill(bytes));
        filled.map(|()| Self(key))
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        self.0.expose_secret()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Seals and opens credential blobs under one `MasterKey`.
#[derive(Debug)]
pub struct SecretCipher {
    key: MasterKey,
}

impl SecretCipher {
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.bytes()))
    }

    pub fn seal(&self, ssid: &str, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .aead()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: ssid.as_bytes(),
                },
            )
            .map_err(|_| CoreError::Encryption {
                ssid: ssid.to_owned(),
            })?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    pub fn open(&self, ssid: &str, blob: &[u8]) -> Result<SecretString, CoreError> {
        let corrupt = || CoreError::Decryption {
            ssid: ssid.to_owned(),
        };
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(corrupt());
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        let plain = self
            .aead()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: ssid.as_bytes(),
                },
            )
            .map_err(|_| corrupt())?;

        match String::from_utf8(plain) {
            Ok(text) => Ok(SecretString::from(text)),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(corrupt())
            }
        }
    }
}
