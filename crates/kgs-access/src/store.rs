//! Record-store seam and the in-memory implementation
//!
//! Persistence technology is a collaborator concern; the core only needs
//! create/read/delete plus one conditional update. `consume_access` is that
//! update: the download-cap check and the counter increment happen under a
//! single lock acquisition, so two concurrent deliveries against
//! `max_downloads = 1` cannot both succeed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use kgs_core::{KgsError, KgsResult, Passkey};

use crate::policy::AccessPolicy;
use crate::recipient::{normalize_email, Recipient};

/// A stored container: the encoded `.kgsr` bytes plus its policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub encoded: Vec<u8>,
    pub policy: AccessPolicy,
}

/// Durable record store keyed by container id and access token.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put_container(&self, record: ContainerRecord) -> KgsResult<()>;
    async fn get_container(&self, id: &str) -> KgsResult<Option<ContainerRecord>>;
    /// Deletes the container and every grant pointing at it (revoking the
    /// tokens).
    async fn delete_container(&self, id: &str) -> KgsResult<()>;
    async fn set_policy(&self, id: &str, policy: AccessPolicy) -> KgsResult<()>;

    /// Fails if the token string is already bound, or if the
    /// `(container, email)` pair already holds a grant.
    async fn create_recipient(&self, recipient: Recipient) -> KgsResult<()>;
    async fn get_recipient(&self, token: &str) -> KgsResult<Option<Recipient>>;
    async fn find_recipient(&self, container_id: &str, email: &str)
        -> KgsResult<Option<Recipient>>;
    async fn delete_recipient(&self, token: &str) -> KgsResult<()>;
    async fn mark_verified(&self, token: &str) -> KgsResult<()>;

    /// Conditional update guarding the download cap: atomically re-checks
    /// `access_count` against `max_downloads`, and when still below the cap
    /// increments it and stamps `last_accessed_at`. Returns `false` when
    /// the cap is already met.
    async fn consume_access(&self, token: &str, now: u64) -> KgsResult<bool>;

    async fn put_passkey(&self, email: &str, passkey: Passkey) -> KgsResult<()>;
    async fn get_passkey(&self, email: &str, credential_id: &str) -> KgsResult<Option<Passkey>>;
    async fn update_passkey_counter(
        &self,
        email: &str,
        credential_id: &str,
        counter: u32,
    ) -> KgsResult<()>;
}

#[derive(Default)]
struct MemoryInner {
    containers: HashMap<String, ContainerRecord>,
    /// token → recipient
    recipients: HashMap<String, Recipient>,
    /// email → passkeys
    passkeys: HashMap<String, Vec<Passkey>>,
}

/// In-memory [`RecordStore`] used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put_container(&self, record: ContainerRecord) -> KgsResult<()> {
        self.inner
            .lock()
            .await
            .containers
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_container(&self, id: &str) -> KgsResult<Option<ContainerRecord>> {
        Ok(self.inner.lock().await.containers.get(id).cloned())
    }

    async fn delete_container(&self, id: &str) -> KgsResult<()> {
        let mut inner = self.inner.lock().await;
        inner.containers.remove(id);
        inner.recipients.retain(|_, r| r.container_id != id);
        Ok(())
    }

    async fn set_policy(&self, id: &str, policy: AccessPolicy) -> KgsResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .containers
            .get_mut(id)
            .ok_or_else(|| KgsError::Storage(format!("unknown container {id}")))?;
        record.policy = policy;
        Ok(())
    }

    async fn create_recipient(&self, recipient: Recipient) -> KgsResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.recipients.contains_key(&recipient.token) {
            return Err(KgsError::Storage("token already bound".into()));
        }
        if inner
            .recipients
            .values()
            .any(|r| r.container_id == recipient.container_id && r.email == recipient.email)
        {
            return Err(KgsError::Storage(format!(
                "recipient already granted on container {}",
                recipient.container_id
            )));
        }
        inner.recipients.insert(recipient.token.clone(), recipient);
        Ok(())
    }

    async fn get_recipient(&self, token: &str) -> KgsResult<Option<Recipient>> {
        Ok(self.inner.lock().await.recipients.get(token).cloned())
    }

    async fn find_recipient(
        &self,
        container_id: &str,
        email: &str,
    ) -> KgsResult<Option<Recipient>> {
        let email = normalize_email(email);
        Ok(self
            .inner
            .lock()
            .await
            .recipients
            .values()
            .find(|r| r.container_id == container_id && r.email == email)
            .cloned())
    }

    async fn delete_recipient(&self, token: &str) -> KgsResult<()> {
        self.inner.lock().await.recipients.remove(token);
        Ok(())
    }

    async fn mark_verified(&self, token: &str) -> KgsResult<()> {
        let mut inner = self.inner.lock().await;
        let recipient = inner
            .recipients
            .get_mut(token)
            .ok_or(KgsError::TokenInvalid)?;
        recipient.verified = true;
        Ok(())
    }

    async fn consume_access(&self, token: &str, now: u64) -> KgsResult<bool> {
        let mut inner = self.inner.lock().await;
        let recipient = inner
            .recipients
            .get_mut(token)
            .ok_or(KgsError::TokenInvalid)?;

        if recipient.is_exhausted() {
            return Ok(false);
        }
        recipient.access_count += 1;
        recipient.last_accessed_at = Some(now);
        Ok(true)
    }

    async fn put_passkey(&self, email: &str, passkey: Passkey) -> KgsResult<()> {
        self.inner
            .lock()
            .await
            .passkeys
            .entry(normalize_email(email))
            .or_default()
            .push(passkey);
        Ok(())
    }

    async fn get_passkey(&self, email: &str, credential_id: &str) -> KgsResult<Option<Passkey>> {
        Ok(self
            .inner
            .lock()
            .await
            .passkeys
            .get(&normalize_email(email))
            .and_then(|keys| keys.iter().find(|k| k.credential_id == credential_id))
            .cloned())
    }

    async fn update_passkey_counter(
        &self,
        email: &str,
        credential_id: &str,
        counter: u32,
    ) -> KgsResult<()> {
        let mut inner = self.inner.lock().await;
        let passkey = inner
            .passkeys
            .get_mut(&normalize_email(email))
            .and_then(|keys| keys.iter_mut().find(|k| k.credential_id == credential_id))
            .ok_or_else(|| KgsError::Storage(format!("unknown credential {credential_id}")))?;
        passkey.signature_counter = counter;
        Ok(())
    }
}
