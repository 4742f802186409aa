//! kgs-crypto: the symmetric file cipher and `.kgsr` container codec
//!
//! Pipeline: plaintext → PBKDF2 key from password+salt → AES-256-GCM →
//! length-prefixed metadata framing → `.kgsr` bytes
//!
//! Container format (stable, externally observable):
//! ```text
//! [4 bytes LE u32: N][N bytes UTF-8 JSON metadata][ciphertext + 16-byte tag]
//! ```
//!
//! Key handling:
//! - The file key is derived on demand from `(password, salt)` and never
//!   persisted; the salt travels in the clear inside the metadata.
//! - For recipients without the password, the same key is sealed to their
//!   age X25519 public key (`envelope` module) so only the holder of the
//!   matching identity can recover it from stored data.

pub mod cipher;
pub mod container;
pub mod envelope;
pub mod kdf;

pub use cipher::{decrypt, encrypt};
pub use container::{decode, encode, ContainerMeta, EncryptedContainer, FORMAT_VERSION};
pub use envelope::{seal_file_key, unseal_file_key};
pub use kdf::{derive_file_key, generate_salt, salt_from_slice, FileKey, KdfParams};

/// Size of a file key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the KDF salt
pub const SALT_SIZE: usize = 16;
