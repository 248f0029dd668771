// # Secret Store Trait
//
// Byte-blob key-value reads by (name, namespace).

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Key the reconciler reads the provider credential from
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// A secret's data: key -> raw bytes
pub type Secret = BTreeMap<String, Vec<u8>>;

/// Trait for secret store implementations
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read a secret
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Secret))`: The secret's data
    /// - `Ok(None)`: No such secret
    /// - `Err(Error)`: Storage error
    async fn get_secret(&self, name: &str, namespace: &str)
    -> Result<Option<Secret>, crate::Error>;
}
