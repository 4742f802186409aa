//! Capability token minting and resolution
//!
//! Tokens are 256-bit CSPRNG values in URL-safe base64. They are pure
//! capabilities: not derived from recipient identity, not signed — leaking
//! one leaks access to exactly one container for exactly one recipient.
//! Resolution is a store lookup, so deleting the record revokes the token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tracing::debug;

use kgs_core::{KgsError, KgsResult};

use crate::recipient::Recipient;
use crate::store::RecordStore;

/// Token entropy in bytes (256-bit).
pub const TOKEN_BYTES: usize = 32;

/// Generate an unguessable capability token (43 base64url chars).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the access URL a recipient receives. The token is the sole
/// credential; the endpoint never accepts an email instead.
pub fn access_url(base: &str, token: &str) -> String {
    format!("{}/access?token={token}", base.trim_end_matches('/'))
}

/// Mints and resolves per-recipient capability tokens.
pub struct AccessTokenService;

impl AccessTokenService {
    /// Mint a token binding `(container_id, email)` and persist the grant.
    /// One token per pair; the store refuses duplicates either way.
    pub async fn mint(
        store: &dyn RecordStore,
        container_id: &str,
        email: &str,
        max_downloads: Option<u32>,
        sealed_file_key: Option<Vec<u8>>,
    ) -> KgsResult<String> {
        if store.find_recipient(container_id, email).await?.is_some() {
            return Err(KgsError::InvalidInput(format!(
                "recipient already granted on container {container_id}"
            )));
        }

        let token = generate_token();
        let recipient = Recipient::new(
            email,
            token.clone(),
            container_id.to_string(),
            max_downloads,
            sealed_file_key,
        );
        store.create_recipient(recipient).await?;

        debug!(container_id, "minted access grant");
        Ok(token)
    }

    /// Resolve a token to `(container_id, email)`. Unknown or revoked
    /// tokens are `TokenInvalid`.
    pub async fn resolve(store: &dyn RecordStore, token: &str) -> KgsResult<(String, String)> {
        let recipient = store
            .get_recipient(token)
            .await?
            .ok_or(KgsError::TokenInvalid)?;
        Ok((recipient.container_id, recipient.email))
    }
}
