//! Encryption layer for Lockbox.
//!
//! Provides passphrase-based encryption using:
//! - Argon2id for key derivation from the user's credential
//! - ChaCha20-Poly1305 for authenticated encryption
//! - Secure key handling with zeroization
//!
//! # Architecture
//!
//! The central export is the envelope: [`seal`] takes a plaintext and a
//! passphrase and produces a single printable blob that embeds everything
//! needed to reverse the operation except the passphrase (format version,
//! salt, nonce, ciphertext + tag). [`open`] reverses it, failing closed:
//! a wrong passphrase and a tampered blob are indistinguishable to callers.
//!
//! Keys derived from a passphrase never leave this crate in persistent
//! form; callers hold the passphrase, the envelope holds the rest.

mod cipher;
mod envelope;
mod error;
mod key;

pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{open, seal, SealedBlob, FORMAT_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
