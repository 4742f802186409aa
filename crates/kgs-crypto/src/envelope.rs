//! Per-recipient key envelopes (age X25519)
//!
//! A container's file key is sealed to each recipient's age public key, so
//! the stored grant record never reveals the key to anyone but the holder
//! of the matching identity. Unsealing with the wrong identity fails the
//! same way as tampering.

use std::io::{Read, Write};

use kgs_core::{KgsError, KgsResult};
use zeroize::Zeroize;

use crate::kdf::FileKey;
use crate::KEY_SIZE;

/// Seal a file key to a recipient's age X25519 public key ("age1...").
pub fn seal_file_key(recipient_pubkey: &str, file_key: &FileKey) -> KgsResult<Vec<u8>> {
    let recipient: age::x25519::Recipient = recipient_pubkey
        .parse()
        .map_err(|e| KgsError::InvalidInput(format!("recipient public key: {e}")))?;

    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
            .map_err(|e| KgsError::Other(anyhow::anyhow!("age encryptor: {e}")))?;

    let mut sealed = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut sealed)
        .map_err(|e| KgsError::Other(anyhow::anyhow!("sealing file key: {e}")))?;
    writer.write_all(file_key.as_bytes())?;
    writer
        .finish()
        .map_err(|e| KgsError::Other(anyhow::anyhow!("sealing file key: {e}")))?;

    Ok(sealed)
}

/// Unseal a file key with the recipient's age identity.
///
/// Wrong identity and corrupted blob are indistinguishable.
pub fn unseal_file_key(identity: &age::x25519::Identity, sealed: &[u8]) -> KgsResult<FileKey> {
    let decryptor = age::Decryptor::new(sealed).map_err(|_| KgsError::AuthenticationFailure)?;

    let mut reader = decryptor
        .decrypt(std::iter::once(identity as &dyn age::Identity))
        .map_err(|_| KgsError::AuthenticationFailure)?;

    let mut plaintext = Vec::new();
    reader
        .read_to_end(&mut plaintext)
        .map_err(|_| KgsError::AuthenticationFailure)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(KgsError::AuthenticationFailure);
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(FileKey::from_bytes(key_bytes))
}
