// # dnsync-core
//
// Core library for the dnsync hostname controller.
//
// ## Architecture Overview
//
// This library keeps externally hosted DNS records in line with declared
// `Hostname` resources:
// - **ResourceStore**: Desired state reads, status merge patches, change watch
// - **SecretStore**: Provider credentials (`authToken`)
// - **PublicIpSource**: Address detection when a resource leaves it empty
// - **DnsProvider**: Three-call update strategy (initialize, check, update)
// - **ProviderSelector**: Maps endpoint identifiers to registered strategies
// - **Reconciler**: One ordered pass per resource
// - **Controller**: Per-key serialized work queue with timers and back-off
//
// ## Design Principles
//
// 1. **Level-Triggered**: Every pass compares desired to actual from scratch
// 2. **Idempotent**: Remote state is only mutated when the provider says it is stale
// 3. **Plugin-Based**: Strategies are registered by their crates, no hard-coded dispatch
// 4. **Library-First**: The daemon is thin wiring over this crate
// 5. **Status by Merge Patch**: The reconciler never overwrites fields it did not touch

pub mod config;
pub mod controller;
pub mod error;
pub mod patch;
pub mod provider;
pub mod reconciler;
pub mod resource;
pub mod secrets;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    ControllerConfig, DnsyncConfig, IpSourceConfig, ProviderConfig, SecretStoreConfig, StoreConfig,
};
pub use controller::{Controller, ControllerHandle};
pub use error::{Error, Result};
pub use patch::MergePatch;
pub use provider::{ConvergeOutcome, ProviderKind, ProviderSelector};
pub use reconciler::{Action, Reconciler};
pub use resource::{Hostname, HostnameSpec, HostnameStatus, LastUpdate, ResourceId};
pub use secrets::{DirSecretStore, MemorySecretStore};
pub use store::{FileResourceStore, MemoryResourceStore};
pub use traits::{DnsProvider, DnsProviderFactory, PublicIpSource, ResourceStore, SecretStore};
