use serde::{Deserialize, Serialize};

/// A file handed to the encryption pipeline: name and MIME type travel in
/// the container metadata, the bytes become the ciphertext.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A registered passkey credential, owned by one recipient email.
///
/// `signature_counter` must be monotonically non-decreasing across
/// assertions; a regression means a cloned authenticator and the assertion
/// is refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passkey {
    /// Credential identifier assigned by the authenticator (base64url)
    pub credential_id: String,
    /// Ed25519 public key bytes
    pub public_key: [u8; 32],
    /// Last signature counter seen for this credential
    pub signature_counter: u32,
    /// Human-readable device name (e.g., "pixel-9")
    pub device_label: String,
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_recent() {
        // 2024-01-01 as a floor; catches a zeroed clock fallback.
        assert!(unix_now() > 1_704_067_200);
    }
}
