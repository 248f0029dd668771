// # Memory Secret Store
//
// In-memory implementation of SecretStore.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::secret_store::{Secret, SecretStore};

/// In-memory secret store keyed by (namespace, name)
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: Arc<RwLock<HashMap<(String, String), Secret>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a secret
    pub async fn insert(&self, namespace: &str, name: &str, data: Secret) {
        let mut guard = self.secrets.write().await;
        guard.insert((namespace.to_string(), name.to_string()), data);
    }

    /// Store a secret holding a single key
    pub async fn insert_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: impl AsRef<[u8]>,
    ) {
        let mut data = Secret::new();
        data.insert(key.to_string(), value.as_ref().to_vec());
        self.insert(namespace, name, data).await;
    }

    pub async fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        let mut guard = self.secrets.write().await;
        guard.remove(&(namespace.to_string(), name.to_string()))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let guard = self.secrets.read().await;
        Ok(guard.get(&(namespace.to_string(), name.to_string())).cloned())
    }
}
