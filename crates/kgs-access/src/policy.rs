use serde::{Deserialize, Serialize};

use kgs_core::{KgsError, KgsResult};

/// Access policy attached to a container, evaluated before any decryption
/// attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Unix seconds after which the container is refused
    pub expires_at: Option<u64>,
    /// Require the presented email to match the grant before issuing any
    /// verification challenge
    pub require_identity_verification: bool,
    /// Optional note from the sender, relayed to the recipient alongside
    /// the access URL
    pub sender_message: Option<String>,
}

impl AccessPolicy {
    /// Expiry check against the supplied wall clock.
    pub fn check(&self, now: u64) -> KgsResult<()> {
        if matches!(self.expires_at, Some(exp) if now >= exp) {
            return Err(KgsError::PolicyViolation("container expired".into()));
        }
        Ok(())
    }
}
