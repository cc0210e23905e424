//! Key derivation from the user's credential.
//!
//! Argon2id turns a passphrase + random salt into a 256-bit key. The
//! derived key is never stored; it is recomputed on every seal/open and
//! zeroized on drop.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// Derived key length in bytes (ChaCha20-Poly1305 key size).
pub const KEY_SIZE: usize = 32;

/// Random salt for key derivation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh random salt from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Argon2id cost parameters.
///
/// The defaults follow the argon2 crate's recommended interactive profile.
/// Changing them changes what the envelope format version means, so they
/// are fixed per [`crate::FORMAT_VERSION`].
#[derive(Clone, Debug)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

/// A key derived from a passphrase. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derives a [`KEY_SIZE`]-byte key from a passphrase using Argon2id.
pub fn derive_key(
    passphrase: &str,
    salt: &Salt,
    params: &KdfParams,
) -> CryptoResult<DerivedKey> {
    let argon_params = Params::new(
        params.m_cost_kib,
        params.t_cost,
        params.p_cost,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon
        .hash_password_into(passphrase.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey(out))
}
