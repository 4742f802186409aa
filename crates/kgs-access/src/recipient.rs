use serde::{Deserialize, Serialize};

/// One recipient's grant on one container.
///
/// The email is normalized to lowercase at construction; identity checks
/// are case-insensitive either way. Once `access_count` reaches
/// `max_downloads` the grant is exhausted — a terminal state, further
/// access is refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    /// Opaque capability token; the sole credential in the access URL
    pub token: String,
    pub container_id: String,
    pub access_count: u32,
    pub max_downloads: Option<u32>,
    /// Unix seconds of the last Delivered transition
    pub last_accessed_at: Option<u64>,
    /// File key sealed to this recipient's age public key, if one was
    /// supplied at grant time
    pub sealed_file_key: Option<Vec<u8>>,
    /// Set once an identity-verification challenge has succeeded
    pub verified: bool,
}

impl Recipient {
    pub fn new(
        email: &str,
        token: String,
        container_id: String,
        max_downloads: Option<u32>,
        sealed_file_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            email: normalize_email(email),
            token,
            container_id,
            access_count: 0,
            max_downloads,
            last_accessed_at: None,
            sealed_file_key,
            verified: false,
        }
    }

    /// Download cap reached; terminal.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_downloads, Some(max) if self.access_count >= max)
    }

    /// Case-insensitive email comparison for the identity gate.
    pub fn email_matches(&self, presented: &str) -> bool {
        self.email == normalize_email(presented)
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
