//! Core traits for the dnsync system
//!
//! This module defines the external boundaries the reconciler talks to.
//!
//! - [`ResourceStore`]: Desired state reads and status merge patches
//! - [`SecretStore`]: Credential lookup
//! - [`PublicIpSource`]: Public address detection
//! - [`DnsProvider`]: Three-call DDNS update protocol

pub mod dns_provider;
pub mod ip_source;
pub mod resource_store;
pub mod secret_store;

pub use dns_provider::{DnsProvider, DnsProviderFactory, ProviderSettings};
pub use ip_source::{IpVersion, PublicIpSource};
pub use resource_store::{ResourceStore, WatchStream};
pub use secret_store::{AUTH_TOKEN_KEY, Secret, SecretStore};
