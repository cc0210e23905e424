//! The passphrase envelope: a self-describing, printable ciphertext blob.
//!
//! [`seal`] bundles a fresh Argon2id salt with the nonce and AEAD
//! ciphertext into one versioned frame and armors it as base64, so the
//! passphrase is the only input needed to [`open`] it again. The format
//! version byte pins the KDF parameters; bumping parameters means bumping
//! the version.
//!
//! `open` treats every failure (bad armor, unknown version, truncation,
//! tampering, wrong passphrase) as the same [`CryptoError::Authentication`].

use crate::cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, SALT_SIZE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Current envelope frame version. Version 1 is Argon2id with
/// [`KdfParams::default`] and ChaCha20-Poly1305.
pub const FORMAT_VERSION: u8 = 1;

/// Byte length of the fixed frame header: version + salt + nonce.
const HEADER_SIZE: usize = 1 + SALT_SIZE + NONCE_SIZE;

/// Decoded envelope frame. Most callers want [`seal`]/[`open`] and never
/// touch the parts.
#[derive(Clone, Debug)]
pub struct SealedBlob {
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl SealedBlob {
    /// Serializes to the binary frame `[version][salt][nonce][ciphertext]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses a binary frame. Any structural problem is an
    /// [`CryptoError::Authentication`]; see module docs.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        // Shortest valid frame: header + empty-plaintext ciphertext (tag only)
        if bytes.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CryptoError::Authentication);
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(CryptoError::Authentication);
        }
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[1..1 + SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1 + SALT_SIZE..HEADER_SIZE]);
        Ok(Self {
            salt,
            nonce,
            ciphertext: bytes[HEADER_SIZE..].to_vec(),
        })
    }

    /// Armors the frame as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Parses an armored frame.
    pub fn from_base64(armored: &str) -> CryptoResult<Self> {
        let bytes = BASE64
            .decode(armored.trim())
            .map_err(|_| CryptoError::Authentication)?;
        Self::from_bytes(&bytes)
    }
}

/// Encrypts `plaintext` under `passphrase`, returning an armored blob.
///
/// Each call draws a fresh salt and nonce, so sealing the same plaintext
/// twice produces unrelated blobs.
pub fn seal(plaintext: &[u8], passphrase: &str) -> CryptoResult<String> {
    let salt = Salt::random();
    let key = derive_key(passphrase, &salt, &KdfParams::default())?;
    let EncryptedData { nonce, ciphertext } = encrypt(&key, plaintext)?;

    let blob = SealedBlob {
        salt: *salt.as_bytes(),
        nonce,
        ciphertext,
    };
    Ok(blob.to_base64())
}

/// Recovers the plaintext from an armored blob produced by [`seal`].
pub fn open(armored: &str, passphrase: &str) -> CryptoResult<Vec<u8>> {
    let blob = SealedBlob::from_base64(armored)?;
    let salt = Salt::from_bytes(blob.salt);
    // A KDF failure here is indistinguishable from tampering to the caller
    let key =
        derive_key(passphrase, &salt, &KdfParams::default()).map_err(|_| CryptoError::Authentication)?;

    decrypt(
        &key,
        &EncryptedData {
            nonce: blob.nonce,
            ciphertext: blob.ciphertext,
        },
    )
}
