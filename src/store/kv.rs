use crate::error::{AppError, AppResult};
use crate::host::{HostApi, SharedHost};
use crate::store::models::Secret;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// KV store key prefix for secret records.
pub const SECRET_KEY_PREFIX: &str = "secret_";

/// Keys requested per `kv_list` page.
const LIST_PAGE_SIZE: usize = 1000;

/// Persistence port for secret records.
///
/// The durable key `secret_<id>` is the ground truth for a record's
/// existence; everything else (placeholder posts) is derived.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Write the record. Last writer wins; there is no compare-and-swap.
    async fn save(&self, secret: &Secret) -> AppResult<()>;

    /// Fetch a record, or `None` if the key is absent.
    async fn get(&self, id: &str) -> AppResult<Option<Secret>>;

    /// Idempotent removal.
    async fn delete(&self, id: &str) -> AppResult<()>;

    /// Enumerate every record under the prefix. Malformed entries are logged
    /// and skipped; keys written by other tenants are ignored.
    async fn list(&self) -> AppResult<Vec<Secret>>;

    /// Records whose lifetime elapsed before `now_millis`.
    async fn list_expired(&self, now_millis: i64) -> AppResult<Vec<Secret>>;
}

pub type SharedSecretStore = Arc<dyn SecretStore>;

/// [`SecretStore`] over the host KV primitives.
pub struct KvSecretStore {
    host: SharedHost,
    page_size: usize,
}

impl KvSecretStore {
    pub fn new(host: SharedHost) -> Self {
        Self {
            host,
            page_size: LIST_PAGE_SIZE,
        }
    }

    #[cfg(test)]
    fn with_page_size(host: SharedHost, page_size: usize) -> Self {
        Self { host, page_size }
    }

    fn key(id: &str) -> String {
        format!("{SECRET_KEY_PREFIX}{id}")
    }

    fn require_id(id: &str) -> AppResult<()> {
        if id.is_empty() {
            return Err(AppError::invalid_input("secret id cannot be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for KvSecretStore {
    async fn save(&self, secret: &Secret) -> AppResult<()> {
        Self::require_id(&secret.id)?;

        let data = secret
            .to_bytes()
            .map_err(|e| AppError::internal(format!("failed to serialise secret: {e}")))?;

        self.host
            .kv_set(&Self::key(&secret.id), &data)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))
    }

    async fn get(&self, id: &str) -> AppResult<Option<Secret>> {
        Self::require_id(id)?;

        let data = self
            .host
            .kv_get(&Self::key(id))
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        match data {
            None => Ok(None),
            Some(bytes) => Secret::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| AppError::Corrupt(format!("secret {id}: {e}"))),
        }
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        Self::require_id(id)?;

        self.host
            .kv_delete(&Self::key(id))
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))
    }

    async fn list(&self) -> AppResult<Vec<Secret>> {
        let mut secrets = Vec::new();
        let mut page = 0;

        loop {
            let keys = self
                .host
                .kv_list(page, self.page_size)
                .await
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
            let page_len = keys.len();

            for key in keys {
                // The host KV is shared; ignore keys that are not ours.
                if !key.starts_with(SECRET_KEY_PREFIX) {
                    continue;
                }

                let data = match self.host.kv_get(&key).await {
                    Ok(Some(data)) => data,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(key, error = %e, "failed to read secret during scan");
                        continue;
                    }
                };

                match Secret::from_bytes(&data) {
                    Ok(secret) => secrets.push(secret),
                    Err(e) => {
                        error!(key, error = %e, "skipping malformed secret record");
                    }
                }
            }

            if page_len < self.page_size {
                break;
            }
            page += 1;
        }

        Ok(secrets)
    }

    async fn list_expired(&self, now_millis: i64) -> AppResult<Vec<Secret>> {
        let secrets = self.list().await?;
        Ok(secrets
            .into_iter()
            .filter(|s| s.expires_at > 0 && s.expires_at < now_millis)
            .collect())
    }
}
