//! The access state machine
//!
//! `TokenResolved → PolicyChecked → Authenticating → Decrypting →
//! Delivered`, failing terminally at any stage. The attempt is never
//! retried here; the caller restarts from the beginning. `accessCount`
//! moves only on the Delivered transition, through the store's conditional
//! update, so a concurrent attempt racing a download cap loses cleanly.
//!
//! Dropping the returned future abandons the attempt: the store mutation
//! is the final step, so nothing partial is ever committed.

use secrecy::SecretString;
use tracing::{debug, info, warn};

use kgs_access::store::RecordStore;
use kgs_crypto::kdf::KdfParams;
use kgs_verify::{Assertion, ChallengeGate};

use kgs_core::{KgsError, KgsResult};

/// Stages of one access attempt, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TokenResolved,
    PolicyChecked,
    Authenticating,
    Decrypting,
    Delivered,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::TokenResolved => "token_resolved",
            Stage::PolicyChecked => "policy_checked",
            Stage::Authenticating => "authenticating",
            Stage::Decrypting => "decrypting",
            Stage::Delivered => "delivered",
        }
    }
}

/// Identity proof presented at completion time.
pub enum AccessProof {
    OneTimeCode(String),
    WebAuthn(Assertion),
}

/// Caller-supplied key material for the Decrypting stage. Never read from
/// ambient state.
pub enum KeySource {
    /// Re-derive the file key from the password and the container salt
    Password(SecretString),
    /// Unseal the per-recipient envelope stored on the grant
    RecipientIdentity(age::x25519::Identity),
}

/// Run one access attempt to completion. Only the taxonomy kind of a
/// failure is logged; plaintext, codes, and keys never appear in events.
pub(crate) async fn run_access(
    store: &dyn RecordStore,
    gate: &ChallengeGate,
    kdf: &KdfParams,
    token: &str,
    proof: AccessProof,
    key_source: KeySource,
    now: u64,
) -> KgsResult<Vec<u8>> {
    match attempt(store, gate, kdf, token, proof, key_source, now).await {
        Ok(plaintext) => {
            info!(stage = Stage::Delivered.as_str(), "access delivered");
            Ok(plaintext)
        }
        Err(err) => {
            warn!(kind = err.kind(), "access attempt failed");
            Err(err)
        }
    }
}

async fn attempt(
    store: &dyn RecordStore,
    gate: &ChallengeGate,
    kdf: &KdfParams,
    token: &str,
    proof: AccessProof,
    key_source: KeySource,
    now: u64,
) -> KgsResult<Vec<u8>> {
    // TokenResolved
    let recipient = store
        .get_recipient(token)
        .await?
        .ok_or(KgsError::TokenInvalid)?;
    let record = store
        .get_container(&recipient.container_id)
        .await?
        .ok_or(KgsError::TokenInvalid)?;
    debug!(stage = Stage::TokenResolved.as_str(), "stage passed");

    // PolicyChecked
    record.policy.check(now)?;
    if recipient.is_exhausted() {
        return Err(KgsError::PolicyViolation("download limit reached".into()));
    }
    debug!(stage = Stage::PolicyChecked.as_str(), "stage passed");

    // Authenticating
    match proof {
        AccessProof::OneTimeCode(code) => gate.verify_code(token, &code, now)?,
        AccessProof::WebAuthn(assertion) => {
            let passkey = store
                .get_passkey(&recipient.email, &assertion.credential_id)
                .await?
                .ok_or(KgsError::InvalidOrExpired)?;
            let counter = gate.verify_assertion(token, &passkey, &assertion, now)?;
            store
                .update_passkey_counter(&recipient.email, &assertion.credential_id, counter)
                .await?;
        }
    }
    store.mark_verified(token).await?;
    debug!(stage = Stage::Authenticating.as_str(), "stage passed");

    // Decrypting
    let container = kgs_crypto::decode(&record.encoded)?;
    let key = match key_source {
        KeySource::Password(password) => {
            kgs_crypto::derive_file_key(&password, &container.meta.salt, kdf)?
        }
        KeySource::RecipientIdentity(identity) => {
            let sealed = recipient.sealed_file_key.as_ref().ok_or_else(|| {
                KgsError::InvalidInput("grant carries no sealed key for identity access".into())
            })?;
            kgs_crypto::unseal_file_key(&identity, sealed)?
        }
    };
    let plaintext = kgs_crypto::decrypt(&key, &container.meta.nonce, &container.ciphertext)?;
    debug!(stage = Stage::Decrypting.as_str(), "stage passed");

    // Delivered — the one point where accessCount moves. The conditional
    // update may lose a race; the plaintext is then discarded, not returned.
    if !store.consume_access(token, now).await? {
        return Err(KgsError::PolicyViolation("download limit reached".into()));
    }

    Ok(plaintext)
}
