//! Authenticated encryption with ChaCha20-Poly1305.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Nonce + ciphertext pair produced by [`encrypt`].
///
/// The Poly1305 tag is appended to `ciphertext` by the AEAD construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts data previously produced by [`encrypt`].
///
/// Fails closed: any mismatch (wrong key, modified nonce or ciphertext)
/// yields [`CryptoError::Authentication`] with no further detail.
pub fn decrypt(key: &DerivedKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::Authentication)
}
