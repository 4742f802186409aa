//! Public operations exposed to the surrounding UI layer

use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;

use kgs_access::store::{ContainerRecord, RecordStore};
use kgs_access::{access_url, AccessPolicy, AccessTokenService};
use kgs_core::{unix_now, FilePayload, KgsConfig, KgsError, KgsResult};
use kgs_crypto::kdf::{FileKey, KdfParams};
use kgs_crypto::{ContainerMeta, EncryptedContainer, FORMAT_VERSION, TAG_SIZE};
use kgs_verify::{ChallengeGate, ChallengeMethod, IssuedChallenge, IssuedCode};

pub use crate::orchestrator::{AccessProof, KeySource};
use crate::orchestrator::run_access;

/// Coarse progress milestones for large payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    DerivingKey,
    Encrypting,
    Packaging,
}

/// The result of packaging a file: stored id, the `.kgsr` bytes, and the
/// derived key (kept only long enough to seal recipient envelopes).
pub struct PackagedContainer {
    pub container_id: String,
    pub bytes: Vec<u8>,
    pub key: FileKey,
}

/// One recipient in a grant request.
#[derive(Debug, Clone)]
pub struct GrantRecipient {
    pub email: String,
    /// age X25519 public key; when present the file key is sealed to it
    pub public_key: Option<String>,
    pub max_downloads: Option<u32>,
}

/// Payload for the caller's notification channel. The core builds it but
/// never dispatches email or SMS itself.
#[derive(Debug, Clone)]
pub struct GrantNotification {
    pub email: String,
    pub access_url: String,
    pub sender_message: Option<String>,
}

/// Minted tokens plus ready-to-send notification payloads.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    /// email → capability token
    pub tokens: BTreeMap<String, String>,
    pub notifications: Vec<GrantNotification>,
}

/// What `begin_access` hands back for the chosen method. The OTP code goes
/// to the caller's notifier; it is never logged.
pub struct ChallengeOptions {
    pub method: ChallengeMethod,
    pub code: Option<IssuedCode>,
    pub challenge: Option<IssuedChallenge>,
    pub sender_message: Option<String>,
}

/// The root handle: owns the challenge gate and the record-store seam.
pub struct ShareEngine {
    store: Arc<dyn RecordStore>,
    gate: ChallengeGate,
    config: KgsConfig,
}

impl ShareEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: KgsConfig) -> Self {
        let gate = ChallengeGate::new(config.otp.clone());
        Self {
            store,
            gate,
            config,
        }
    }

    fn kdf_params(&self) -> KdfParams {
        KdfParams::from(&self.config.kdf)
    }

    /// Encrypt a file under a caller-supplied password and store the
    /// resulting container with a default (open) policy.
    ///
    /// A fresh salt gives every container its own key, so nonces are never
    /// reused across containers under one key.
    pub async fn encrypt_and_package(
        &self,
        file: FilePayload,
        password: &SecretString,
        mut progress: Option<&mut dyn FnMut(ProgressStage)>,
    ) -> KgsResult<PackagedContainer> {
        let mut report = |stage| {
            if let Some(cb) = progress.as_mut() {
                cb(stage);
            }
        };

        report(ProgressStage::DerivingKey);
        let salt = kgs_crypto::generate_salt();
        let key = kgs_crypto::derive_file_key(password, &salt, &self.kdf_params())?;

        report(ProgressStage::Encrypting);
        let (ciphertext, nonce) = kgs_crypto::encrypt(&key, &file.bytes)?;

        report(ProgressStage::Packaging);
        let meta = ContainerMeta {
            version: FORMAT_VERSION.to_string(),
            salt,
            nonce,
            original_name: file.name,
            mime_type: file.mime_type,
            plaintext_size: file.bytes.len() as u64,
            encrypted_size: (file.bytes.len() + TAG_SIZE) as u64,
        };
        let container = EncryptedContainer::new(meta, ciphertext)?;
        let bytes = kgs_crypto::encode(&container)?;

        let container_id = uuid::Uuid::new_v4().to_string();
        self.store
            .put_container(ContainerRecord {
                id: container_id.clone(),
                encoded: bytes.clone(),
                policy: AccessPolicy::default(),
            })
            .await?;

        debug!(%container_id, size = container.meta.plaintext_size, "container packaged");
        Ok(PackagedContainer {
            container_id,
            bytes,
            key,
        })
    }

    /// Attach a policy to a container and mint one capability token per
    /// recipient. Recipients with a public key get the file key sealed to
    /// them; that requires the key from packaging time.
    pub async fn mint_access_grant(
        &self,
        container_id: &str,
        recipients: &[GrantRecipient],
        policy: AccessPolicy,
        file_key: Option<&FileKey>,
        base_url: &str,
    ) -> KgsResult<AccessGrant> {
        if self.store.get_container(container_id).await?.is_none() {
            return Err(KgsError::InvalidInput(format!(
                "unknown container {container_id}"
            )));
        }
        self.store.set_policy(container_id, policy.clone()).await?;

        let mut tokens = BTreeMap::new();
        let mut notifications = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let sealed = match (&recipient.public_key, file_key) {
                (Some(pubkey), Some(key)) => Some(kgs_crypto::seal_file_key(pubkey, key)?),
                (Some(_), None) => {
                    return Err(KgsError::InvalidInput(
                        "recipient public key supplied without the file key".into(),
                    ));
                }
                (None, _) => None,
            };

            let token = AccessTokenService::mint(
                self.store.as_ref(),
                container_id,
                &recipient.email,
                recipient.max_downloads,
                sealed,
            )
            .await?;

            notifications.push(GrantNotification {
                email: recipient.email.to_lowercase(),
                access_url: access_url(base_url, &token),
                sender_message: policy.sender_message.clone(),
            });
            tokens.insert(recipient.email.to_lowercase(), token);
        }

        debug!(container_id, recipients = recipients.len(), "access grant minted");
        Ok(AccessGrant {
            tokens,
            notifications,
        })
    }

    /// Start an access attempt: run the identity gate, pick the method from
    /// the explicit capability flag, and issue a challenge.
    pub async fn begin_access(
        &self,
        token: &str,
        presented_email: Option<&str>,
        webauthn_available: bool,
    ) -> KgsResult<ChallengeOptions> {
        let now = unix_now();
        let recipient = self
            .store
            .get_recipient(token)
            .await?
            .ok_or(KgsError::TokenInvalid)?;
        let record = self
            .store
            .get_container(&recipient.container_id)
            .await?
            .ok_or(KgsError::TokenInvalid)?;

        record.policy.check(now)?;
        if recipient.is_exhausted() {
            return Err(KgsError::PolicyViolation("download limit reached".into()));
        }

        // Identity gate: short-circuit before issuing anything, so a
        // mismatched email learns nothing about the challenge.
        if record.policy.require_identity_verification {
            let presented = presented_email.ok_or(KgsError::Unauthorized)?;
            if !recipient.email_matches(presented) {
                return Err(KgsError::Unauthorized);
            }
        }

        let method = ChallengeMethod::select(webauthn_available);
        let (code, challenge) = match method {
            ChallengeMethod::OneTimeCode => (Some(self.gate.issue_code(token, now)), None),
            ChallengeMethod::WebAuthn => (None, Some(self.gate.issue_webauthn(token, now))),
        };

        Ok(ChallengeOptions {
            method,
            code,
            challenge,
            sender_message: record.policy.sender_message,
        })
    }

    /// Finish an access attempt: check the proof, recover the key from the
    /// caller-supplied source, decrypt, and advance the download counter.
    pub async fn complete_access(
        &self,
        token: &str,
        proof: AccessProof,
        key_source: KeySource,
    ) -> KgsResult<Vec<u8>> {
        run_access(
            self.store.as_ref(),
            &self.gate,
            &self.kdf_params(),
            token,
            proof,
            key_source,
            unix_now(),
        )
        .await
    }

    /// Revoke a single grant by deleting its backing record.
    pub async fn revoke_grant(&self, token: &str) -> KgsResult<()> {
        self.store.delete_recipient(token).await
    }

    /// Destroy a container and every grant on it.
    pub async fn destroy_container(&self, container_id: &str) -> KgsResult<()> {
        self.store.delete_container(container_id).await
    }
}
