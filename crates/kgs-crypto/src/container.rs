//! `.kgsr` container codec
//!
//! A container is one self-describing blob:
//! ```text
//! [4 bytes LE u32: N][N bytes UTF-8 JSON metadata][ciphertext]
//! ```
//! The JSON carries everything needed to re-derive the key (salt) and
//! decrypt (nonce) plus display metadata. This layout is the on-disk file
//! format already-issued containers depend on and must stay stable.

use serde::{Deserialize, Serialize};

use kgs_core::{KgsError, KgsResult};

use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Current metadata version string.
pub const FORMAT_VERSION: &str = "1";

/// Length of the metadata length prefix.
const HEADER_SIZE: usize = 4;

/// Container metadata, serialized as camelCase JSON.
///
/// `iv` and `originalSize` are accepted as legacy aliases for `nonce` and
/// `plaintextSize` so older containers keep decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMeta {
    pub version: String,
    /// KDF salt (not secret; needed to re-derive the key)
    pub salt: [u8; SALT_SIZE],
    /// AES-GCM nonce
    #[serde(alias = "iv")]
    pub nonce: [u8; NONCE_SIZE],
    pub original_name: String,
    pub mime_type: String,
    /// Plaintext length in bytes
    #[serde(alias = "originalSize")]
    pub plaintext_size: u64,
    /// Ciphertext length in bytes (plaintext + tag)
    pub encrypted_size: u64,
}

/// One encrypted file: metadata plus ciphertext. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContainer {
    pub meta: ContainerMeta,
    pub ciphertext: Vec<u8>,
}

impl EncryptedContainer {
    /// Assemble a container, enforcing the size invariant
    /// `ciphertext.len() == plaintext_size + TAG_SIZE`.
    pub fn new(meta: ContainerMeta, ciphertext: Vec<u8>) -> KgsResult<Self> {
        check_sizes(&meta, ciphertext.len())?;
        Ok(Self { meta, ciphertext })
    }
}

fn check_sizes(meta: &ContainerMeta, ciphertext_len: usize) -> KgsResult<()> {
    let expected = meta
        .plaintext_size
        .checked_add(TAG_SIZE as u64)
        .ok_or_else(|| KgsError::MalformedContainer("declared plaintext size overflows".into()))?;
    if ciphertext_len as u64 != expected {
        return Err(KgsError::MalformedContainer(format!(
            "ciphertext is {ciphertext_len} bytes, metadata declares {expected}"
        )));
    }
    if meta.encrypted_size != ciphertext_len as u64 {
        return Err(KgsError::MalformedContainer(format!(
            "encryptedSize {} does not match ciphertext length {ciphertext_len}",
            meta.encrypted_size
        )));
    }
    Ok(())
}

/// Serialize a container to `.kgsr` bytes.
pub fn encode(container: &EncryptedContainer) -> KgsResult<Vec<u8>> {
    check_sizes(&container.meta, container.ciphertext.len())?;

    let meta_json = serde_json::to_vec(&container.meta)
        .map_err(|e| KgsError::MalformedContainer(format!("metadata serialization: {e}")))?;
    let meta_len = u32::try_from(meta_json.len())
        .map_err(|_| KgsError::MalformedContainer("metadata block too large".into()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + meta_json.len() + container.ciphertext.len());
    out.extend_from_slice(&meta_len.to_le_bytes());
    out.extend_from_slice(&meta_json);
    out.extend_from_slice(&container.ciphertext);
    Ok(out)
}

/// Parse `.kgsr` bytes back into a container. Exact inverse of [`encode`].
pub fn decode(bytes: &[u8]) -> KgsResult<EncryptedContainer> {
    if bytes.len() < HEADER_SIZE {
        return Err(KgsError::MalformedContainer(format!(
            "{} bytes is too short for the length prefix",
            bytes.len()
        )));
    }

    let mut len_bytes = [0u8; HEADER_SIZE];
    len_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);
    let meta_len = u32::from_le_bytes(len_bytes) as usize;

    let rest = &bytes[HEADER_SIZE..];
    if meta_len > rest.len() {
        return Err(KgsError::MalformedContainer(format!(
            "declared metadata length {meta_len} exceeds remaining {} bytes",
            rest.len()
        )));
    }

    let (meta_json, ciphertext) = rest.split_at(meta_len);
    let meta: ContainerMeta = serde_json::from_slice(meta_json)
        .map_err(|e| KgsError::MalformedContainer(format!("metadata parse: {e}")))?;

    EncryptedContainer::new(meta, ciphertext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_meta(plaintext_size: u64) -> ContainerMeta {
        ContainerMeta {
            version: FORMAT_VERSION.to_string(),
            salt: [3u8; SALT_SIZE],
            nonce: [9u8; NONCE_SIZE],
            original_name: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            plaintext_size,
            encrypted_size: plaintext_size + TAG_SIZE as u64,
        }
    }

    fn sample_container(plaintext_size: usize) -> EncryptedContainer {
        EncryptedContainer::new(
            sample_meta(plaintext_size as u64),
            vec![0xCD; plaintext_size + TAG_SIZE],
        )
        .unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let container = sample_container(100);
        let bytes = encode(&container).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, container);
    }

    #[test]
    fn test_roundtrip_zero_length_file() {
        let container = sample_container(0);
        let bytes = encode(&container).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, container);
        assert_eq!(decoded.meta.plaintext_size, 0);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let container = sample_container(32);
        assert_eq!(encode(&container).unwrap(), encode(&container).unwrap());
    }

    #[test]
    fn test_size_invariant_enforced_on_construction() {
        let result = EncryptedContainer::new(sample_meta(100), vec![0u8; 50]);
        assert!(matches!(result, Err(KgsError::MalformedContainer(_))));
    }

    #[test]
    fn test_decode_truncated_prefix() {
        assert!(matches!(
            decode(&[0u8; 3]),
            Err(KgsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_decode_overdeclared_length() {
        // Prefix claims 1000 metadata bytes but only 4 follow.
        let mut bytes = 1000u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            decode(&bytes),
            Err(KgsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_decode_bad_json() {
        let garbage = b"not json at all";
        let mut bytes = (garbage.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(garbage);
        assert!(matches!(
            decode(&bytes),
            Err(KgsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_decode_missing_field() {
        let json = br#"{"version":"1","salt":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0]}"#;
        let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(json);
        assert!(matches!(
            decode(&bytes),
            Err(KgsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_decode_wrong_salt_length() {
        // 15-element salt array must fail to parse.
        let json = br#"{"version":"1","salt":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],"nonce":[0,0,0,0,0,0,0,0,0,0,0,0],"originalName":"a","mimeType":"b","plaintextSize":0,"encryptedSize":16}"#;
        let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(json);
        bytes.extend_from_slice(&[0u8; TAG_SIZE]);
        assert!(matches!(
            decode(&bytes),
            Err(KgsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_decode_legacy_aliases() {
        // Older containers wrote `iv` and `originalSize`.
        let json = br#"{"version":"1","salt":[1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1],"iv":[2,2,2,2,2,2,2,2,2,2,2,2],"originalName":"old.bin","mimeType":"application/octet-stream","originalSize":4,"encryptedSize":20}"#;
        let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(json);
        bytes.extend_from_slice(&[0u8; 20]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.meta.nonce, [2u8; NONCE_SIZE]);
        assert_eq!(decoded.meta.plaintext_size, 4);
    }

    #[test]
    fn test_tampered_declared_size_rejected() {
        let container = sample_container(10);
        let mut bytes = encode(&container).unwrap();

        // Rewrite plaintextSize in the JSON block from 10 to 11.
        let meta_len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
        let json = String::from_utf8(bytes[4..4 + meta_len].to_vec()).unwrap();
        let tampered = json.replace("\"plaintextSize\":10", "\"plaintextSize\":11");
        assert_ne!(json, tampered);
        assert_eq!(json.len(), tampered.len());
        bytes[4..4 + meta_len].copy_from_slice(tampered.as_bytes());

        assert!(matches!(
            decode(&bytes),
            Err(KgsError::MalformedContainer(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            name in ".{0,40}",
            mime in "[a-z]{1,10}/[a-z0-9.+-]{1,20}",
            plaintext_size in 0usize..4096,
            salt_byte in any::<u8>(),
            nonce_byte in any::<u8>(),
        ) {
            let container = EncryptedContainer::new(
                ContainerMeta {
                    version: FORMAT_VERSION.to_string(),
                    salt: [salt_byte; SALT_SIZE],
                    nonce: [nonce_byte; NONCE_SIZE],
                    original_name: name,
                    mime_type: mime,
                    plaintext_size: plaintext_size as u64,
                    encrypted_size: (plaintext_size + TAG_SIZE) as u64,
                },
                vec![0xEE; plaintext_size + TAG_SIZE],
            ).unwrap();

            let bytes = encode(&container).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), container);
        }
    }
}
