use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;

/// Usage units added to a key that hit a rate limit. Large enough to push it behind
/// every healthy key for a long time; it never decays.
pub const RATE_LIMIT_PENALTY: u64 = 9999;

/// A provider-scoped API key plus its usage accounting.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub provider: String,
    pub secret: String,
    /// Model this key is meant for, if any.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage_count: u64,
}

// Manual Debug so the secret never lands in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("usage_count", &self.usage_count)
            .finish_non_exhaustive()
    }
}

/// Where credentials live. The pool only needs list-by-provider and an atomic
/// usage update.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All credentials for `provider`, in stored order.
    async fn list_by_provider(&self, provider: &str) -> Result<Vec<Credential>>;

    /// Adds `delta` to the usage count of credential `id` and returns the new count.
    async fn add_usage(&self, id: i64, delta: u64) -> Result<u64>;
}

/// In-process store seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Vec<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn list_by_provider(&self, provider: &str) -> Result<Vec<Credential>> {
        let credentials = self
            .credentials
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        Ok(credentials
            .iter()
            .filter(|c| c.provider == provider)
            .cloned()
            .collect())
    }

    async fn add_usage(&self, id: i64, delta: u64) -> Result<u64> {
        let mut credentials = self
            .credentials
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        let credential = credentials
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("unknown credential {id}"))?;
        credential.usage_count = credential.usage_count.saturating_add(delta);
        Ok(credential.usage_count)
    }
}

/// Least-used key selection over a [`CredentialStore`].
#[derive(Clone)]
pub struct KeyPool {
    store: Arc<dyn CredentialStore>,
}

impl KeyPool {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Picks the credential with the lowest usage count for `provider`.
    ///
    /// Ties go to the first key in stored order. `Ok(None)` means the provider has no
    /// keys at all.
    pub async fn acquire(&self, provider: &str) -> Result<Option<Credential>> {
        let credentials = self.store.list_by_provider(provider).await?;
        // min_by_key keeps the first of equal minima
        let chosen = credentials.into_iter().min_by_key(|c| c.usage_count);
        match &chosen {
            Some(c) => debug!(
                "Selected {} key {} (usage {})",
                provider, c.id, c.usage_count
            ),
            None => warn!("No API keys stored for {}", provider),
        }
        Ok(chosen)
    }

    /// Pushes a rate-limited key to the back of the rotation.
    pub async fn penalize(&self, id: i64) -> Result<u64> {
        let usage = self.store.add_usage(id, RATE_LIMIT_PENALTY).await?;
        warn!("Key {} penalized after rate limit, usage now {}", id, usage);
        Ok(usage)
    }

    /// Counts one successful call against the key.
    pub async fn record_use(&self, id: i64) -> Result<u64> {
        self.store.add_usage(id, 1).await
    }

    /// Snapshot of the keys for `provider`, used by the status API.
    pub async fn list(&self, provider: &str) -> Result<Vec<Credential>> {
        self.store.list_by_provider(provider).await
    }
}
