// # Resource Store Trait
//
// Defines the object-store boundary the reconciler reads desired state from
// and writes status back to.
//
// ## Semantics
//
// - `get` returns `Ok(None)` for a missing object; that is not an error
// - `patch_status` applies an RFC 7386 merge patch to the stored object and
//   must be all-or-nothing
// - `watch` yields the id of every object whose spec was created or changed;
//   status patches never produce an event
//
// ## Implementations
//
// - In-memory: `MemoryResourceStore`
// - JSON file: `FileResourceStore`

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::patch::MergePatch;
use crate::resource::{Hostname, ResourceId};

/// Stream of ids whose desired state changed
pub type WatchStream = Pin<Box<dyn Stream<Item = ResourceId> + Send + 'static>>;

/// Trait for resource store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
/// - ❌ Decide when to reconcile (owned by `Controller`)
/// - ❌ Mutate status except through `patch_status`
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a resource by id
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Hostname))`: The resource with its current status
    /// - `Ok(None)`: No such resource (deleted concurrently or never created)
    /// - `Err(Error)`: Storage error
    async fn get(&self, id: &ResourceId) -> Result<Option<Hostname>, crate::Error>;

    /// Apply a status merge patch
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Patch applied and persisted
    /// - `Err(Error::NotFound)`: The object no longer exists
    /// - `Err(Error)`: Patch rejected or storage error
    async fn patch_status(&self, id: &ResourceId, patch: &MergePatch)
    -> Result<(), crate::Error>;

    /// List all resource ids
    async fn list(&self) -> Result<Vec<ResourceId>, crate::Error>;

    /// Subscribe to spec changes
    ///
    /// Each call returns an independent subscription.
    fn watch(&self) -> WatchStream;
}
