// # Memory Resource Store
//
// In-memory implementation of ResourceStore.
//
// ## Purpose
//
// Provides a fast store with no persistence. Used by tests, by the embedding
// demo, and by applications that own their resource declarations in code.
//
// ## Watch Behavior
//
// - `apply` of a new resource, or of a changed spec, emits the id
// - `apply` with an identical spec emits nothing
// - `delete` emits the id so the controller can drop its timers
// - `patch_status` never emits

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::Error;
use crate::patch::MergePatch;
use crate::resource::{Hostname, ResourceId};
use crate::traits::resource_store::{ResourceStore, WatchStream};

/// Buffered watch events per subscriber before it starts lagging
const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// In-memory resource store implementation
///
/// # Example
///
/// ```rust,no_run
/// use dnsync_core::store::MemoryResourceStore;
/// use dnsync_core::traits::ResourceStore;
/// # use dnsync_core::resource::Hostname;
///
/// # async fn demo(hostname: Hostname) -> dnsync_core::Result<()> {
/// let store = MemoryResourceStore::new();
/// store.apply(hostname.clone()).await;
///
/// let loaded = store.get(&hostname.id()).await?;
/// assert!(loaded.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryResourceStore {
    inner: Arc<RwLock<HashMap<ResourceId, Hostname>>>,
    events: broadcast::Sender<ResourceId>,
}

impl MemoryResourceStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Create or update a resource's desired state
    ///
    /// A new resource is stored as given, status included. For an existing
    /// resource only the spec is replaced; its status is left alone.
    pub async fn apply(&self, hostname: Hostname) {
        let id = hostname.id();
        let changed = {
            let mut guard = self.inner.write().await;
            match guard.get_mut(&id) {
                Some(existing) if existing.spec == hostname.spec => false,
                Some(existing) => {
                    existing.spec = hostname.spec;
                    true
                }
                None => {
                    guard.insert(id.clone(), hostname);
                    true
                }
            }
        };

        if changed {
            self.notify(id);
        }
    }

    /// Delete a resource
    pub async fn delete(&self, id: &ResourceId) -> Option<Hostname> {
        let removed = self.inner.write().await.remove(id);
        if removed.is_some() {
            self.notify(id.clone());
        }
        removed
    }

    /// Get the number of resources in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    fn notify(&self, id: ResourceId) {
        // No subscribers is fine: nobody is watching yet
        let _ = self.events.send(id);
    }
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<Hostname>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn patch_status(&self, id: &ResourceId, patch: &MergePatch) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let current = guard
            .get(id)
            .ok_or_else(|| Error::not_found(format!("{} no longer exists", id)))?;

        let patched = apply_status_patch(current, patch)?;
        guard.insert(id.clone(), patched);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ResourceId>, Error> {
        let guard = self.inner.read().await;
        let mut ids: Vec<ResourceId> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn watch(&self) -> WatchStream {
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|event| match event {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Watch subscriber lagged, events dropped: {}", e);
                None
            }
        });
        Box::pin(stream)
    }
}

/// Apply a status-only merge patch to a stored resource
///
/// Rejects patches that reach outside `status`, and keeps the stored spec and
/// metadata regardless of what the patched document decodes to.
pub(crate) fn apply_status_patch(
    current: &Hostname,
    patch: &MergePatch,
) -> Result<Hostname, Error> {
    let touches_other_fields = patch
        .as_value()
        .as_object()
        .map(|root| root.keys().any(|k| k != "status"))
        .unwrap_or(true);
    if touches_other_fields {
        return Err(Error::status_patch("patch may only modify status"));
    }

    let mut patched = patch
        .apply_to_hostname(current)
        .map_err(|e| Error::status_patch(format!("patched object is invalid: {}", e)))?;
    patched.spec = current.spec.clone();
    patched.metadata = current.metadata.clone();
    Ok(patched)
}
