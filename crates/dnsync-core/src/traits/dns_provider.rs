// # DNS Provider Trait
//
// Defines the three-call protocol every DDNS strategy implements.
//
// ## Implementations
//
// - Cloudflare: `dnsync-provider-cloudflare` crate
// - Dyn, NoIP, DDNS and custom dyndns2 endpoints: `dnsync-provider-dyndns` crate
//
// ## Usage
//
// ```rust,ignore
// use dnsync_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let mut provider = /* DnsProvider implementation */;
//
//     provider.initialize("token").await?;
//     if !provider.is_up_to_date("home.example.com", "203.0.113.7").await? {
//         provider.update("home.example.com", "203.0.113.7").await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::time::Duration;

/// Settings handed to every provider factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Perform read calls but skip the mutating call
    pub dry_run: bool,
    /// Timeout applied to each HTTP request
    pub http_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Trait for DNS provider strategies
///
/// A provider is bound to one endpoint and driven by the reconciler in a
/// fixed order: [`initialize`](DnsProvider::initialize) once, then
/// [`is_up_to_date`](DnsProvider::is_up_to_date), then
/// [`update`](DnsProvider::update) only if the record is stale.
///
/// # Trust Level: Untrusted
///
/// Providers are isolated, stateless between passes, and single-shot:
/// - ✅ Perform HTTP/HTTPS API calls to their endpoint only
/// - ✅ Parse provider-specific responses
/// - ❌ Retry or back off (the controller owns scheduling)
/// - ❌ Read or write resource status (owned by the reconciler)
/// - ❌ Decide whether an update is needed outside `is_up_to_date`
/// - ❌ Log the auth token
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Bind credentials to this strategy
    ///
    /// Must be called before any other protocol call.
    async fn initialize(&mut self, auth_token: &str) -> Result<(), crate::Error>;

    /// Check whether `fqdn` already resolves to `address` at the provider
    ///
    /// This is the idempotence guard: when it returns `true` the reconciler
    /// never calls [`update`](DnsProvider::update).
    async fn is_up_to_date(&self, fqdn: &str, address: &str) -> Result<bool, crate::Error>;

    /// Point `fqdn` at `address`
    async fn update(&self, fqdn: &str, address: &str) -> Result<(), crate::Error>;

    /// Override the API endpoint this strategy talks to
    ///
    /// Strategies that cannot be redirected keep the default, which rejects
    /// the override.
    fn set_api_endpoint(&mut self, endpoint: &str) -> Result<(), crate::Error> {
        Err(crate::Error::provider(
            self.provider_name(),
            format!("custom API endpoint '{}' is not supported", endpoint),
        ))
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers
pub trait DnsProviderFactory: Send + Sync {
    /// Create an unbound DnsProvider instance
    fn create(&self, settings: &ProviderSettings) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
