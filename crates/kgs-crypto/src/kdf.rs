//! Key derivation: PBKDF2-HMAC-SHA256 password → file key
//!
//! The iteration count is the container format's brute-force budget and has
//! a hard floor of 100 000. Derivation is a pure function of
//! `(password, salt, iterations)` so a recipient who knows the password can
//! re-derive the key from the salt stored in the container metadata.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use kgs_core::{KgsError, KgsResult};

use crate::{KEY_SIZE, SALT_SIZE};

/// Iteration counts below this are rejected outright.
pub const MIN_ITERATIONS: u32 = 100_000;

/// A 256-bit symmetric file key. Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Iteration count (default: 310000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 310_000,
        }
    }
}

impl From<&kgs_core::KdfConfig> for KdfParams {
    fn from(cfg: &kgs_core::KdfConfig) -> Self {
        Self {
            iterations: cfg.iterations,
        }
    }
}

/// Derive a 256-bit file key from a password and salt.
///
/// Deterministic: the same `(password, salt, iterations)` always yields the
/// same key. Safe to call concurrently; no side effects.
pub fn derive_file_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> KgsResult<FileKey> {
    if password.expose_secret().is_empty() {
        return Err(KgsError::InvalidInput("password must not be empty".into()));
    }
    if params.iterations < MIN_ITERATIONS {
        return Err(KgsError::InvalidInput(format!(
            "KDF iterations {} below floor {MIN_ITERATIONS}",
            params.iterations
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        params.iterations,
        &mut key,
    );

    Ok(FileKey::from_bytes(key))
}

/// Generate a fresh random 16-byte salt.
///
/// A fresh salt per container also gives every container a distinct key,
/// which is what makes nonce reuse structurally impossible.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Validate an untrusted byte slice as a salt.
pub fn salt_from_slice(bytes: &[u8]) -> KgsResult<[u8; SALT_SIZE]> {
    bytes.try_into().map_err(|_| {
        KgsError::InvalidInput(format!(
            "salt must be exactly {SALT_SIZE} bytes, got {}",
            bytes.len()
        ))
    })
}
