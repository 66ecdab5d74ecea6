use crate::error::{AppError, AppResult};
use crate::store::kv::SecretStore;
use crate::store::models::Secret;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory [`SecretStore`] for unit tests that do not need a host.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    records: DashMap<String, Secret>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn save(&self, secret: &Secret) -> AppResult<()> {
        if secret.id.is_empty() {
            return Err(AppError::invalid_input("secret id cannot be empty"));
        }
        self.records.insert(secret.id.clone(), secret.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Secret>> {
        if id.is_empty() {
            return Err(AppError::invalid_input("secret id cannot be empty"));
        }
        Ok(self.records.get(id).map(|s| s.clone()))
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        if id.is_empty() {
            return Err(AppError::invalid_input("secret id cannot be empty"));
        }
        self.records.remove(id);
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<Secret>> {
        let mut secrets: Vec<Secret> = self.records.iter().map(|s| s.clone()).collect();
        secrets.sort_by(|a, b| a.id.cmp(&b.id));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic_lifecycle() {
        let store = MemorySecretStore::new();
        let secret = Secret {
            id: "s1".to_string(),
            message: "hush".to_string(),
            expires_at: 100,
            ..Default::default()
        };

        store.save(&secret).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap().unwrap(), secret);
        assert_eq!(store.list_expired(200).await.unwrap().len(), 1);

        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
