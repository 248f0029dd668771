// # Public IP Source Trait
//
// Defines the single call used when a resource leaves `address` empty.
//
// ## Implementations
//
// - HTTP echo services: `dnsync-ip-http` crate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// IP version filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
    /// Accept either
    #[default]
    Both,
}

impl IpVersion {
    /// Whether `ip` passes this filter
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
            IpVersion::Both => true,
        }
    }
}

/// Trait for detecting the caller's public IP address
///
/// # Trust Level: Semi-Trusted
///
/// - ✅ Perform network I/O against detection services
/// - ❌ Cache results across passes (every pass asks afresh)
/// - ❌ Retry on its own schedule (the controller owns retries)
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    /// Detect the public address
    async fn detect(&self) -> Result<IpAddr, crate::Error>;
}
