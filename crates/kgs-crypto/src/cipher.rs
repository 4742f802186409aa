//! AES-256-GCM file encryption/decryption
//!
//! One fresh random 96-bit nonce per encryption. The tag is verified before
//! any plaintext is returned: a wrong key, corrupted ciphertext, and
//! tampered bytes are all the same `AuthenticationFailure`, never partial
//! or garbage plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use kgs_core::{KgsError, KgsResult};

use crate::kdf::FileKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt a plaintext buffer under a file key.
///
/// Returns `(ciphertext, nonce)`; ciphertext length is plaintext length plus
/// the 16-byte tag. The whole buffer is held in memory, which is fine at the
/// target file-size ceiling (~100 MB).
pub fn encrypt(key: &FileKey, plaintext: &[u8]) -> KgsResult<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| KgsError::InvalidInput("plaintext too large for AEAD".into()))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypt a ciphertext buffer, verifying the authentication tag first.
pub fn decrypt(key: &FileKey, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> KgsResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(KgsError::AuthenticationFailure);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| KgsError::AuthenticationFailure)
}
