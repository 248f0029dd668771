//! Provider adapter selection
//!
//! Maps the `spec.ddnsService.endpoint` string of a resource to a bound
//! [`DnsProvider`] strategy and drives its three-call protocol.
//!
//! ## Dispatch
//!
//! | identifier   | strategy                                   |
//! |--------------|--------------------------------------------|
//! | `Cloudflare` | Cloudflare factory                         |
//! | `Dyn`        | Dyn factory                                |
//! | `NoIP`       | NoIP factory                               |
//! | `DDNS`       | DDNS factory                               |
//! | anything else| fallback (Dyn) factory + endpoint override |
//!
//! Factories are registered by the plugin crates:
//!
//! ```rust,ignore
//! let selector = ProviderSelector::new(ProviderSettings::default());
//! dnsync_provider_cloudflare::register(&selector);
//! dnsync_provider_dyndns::register(&selector);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, ProviderSettings};

/// Known provider identifiers plus a catch-all custom endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Cloudflare,
    Dyn,
    NoIp,
    Ddns,
    /// Literal API endpoint served by the generic strategy
    Custom(String),
}

impl ProviderKind {
    /// The identifier as written in a resource spec
    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::Cloudflare => "Cloudflare",
            ProviderKind::Dyn => "Dyn",
            ProviderKind::NoIp => "NoIP",
            ProviderKind::Ddns => "DDNS",
            ProviderKind::Custom(endpoint) => endpoint,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ProviderKind::Custom(_))
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(Error::invalid_input("provider endpoint cannot be empty")),
            "Cloudflare" => Ok(ProviderKind::Cloudflare),
            "Dyn" => Ok(ProviderKind::Dyn),
            "NoIP" => Ok(ProviderKind::NoIp),
            "DDNS" => Ok(ProviderKind::Ddns),
            other => Ok(ProviderKind::Custom(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a converge call did to remote state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeOutcome {
    /// `is_up_to_date` returned true; no mutation
    AlreadyUpToDate,
    /// `update` was called and succeeded
    Updated,
}

/// Drive the provider protocol: initialize, check, update if stale
pub async fn converge(
    provider: &mut dyn DnsProvider,
    auth_token: &str,
    fqdn: &str,
    address: &str,
) -> Result<ConvergeOutcome> {
    provider.initialize(auth_token).await?;

    if provider.is_up_to_date(fqdn, address).await? {
        debug!(
            "{} already points at {} ({})",
            fqdn,
            address,
            provider.provider_name()
        );
        return Ok(ConvergeOutcome::AlreadyUpToDate);
    }

    provider.update(fqdn, address).await?;
    Ok(ConvergeOutcome::Updated)
}

/// Registry of provider strategies keyed by [`ProviderKind`]
///
/// ## Thread Safety
///
/// The selector uses interior mutability with RwLock, allowing concurrent
/// selection and exclusive registration.
pub struct ProviderSelector {
    factories: RwLock<HashMap<ProviderKind, Box<dyn DnsProviderFactory>>>,

    /// Strategy used for custom endpoints
    fallback: ProviderKind,

    settings: ProviderSettings,
}

impl ProviderSelector {
    /// Create an empty selector whose custom endpoints use the Dyn strategy
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            fallback: ProviderKind::Dyn,
            settings,
        }
    }

    /// Register a factory for a known identifier
    ///
    /// Registering [`ProviderKind::Custom`] is rejected: custom endpoints are
    /// always served by the fallback strategy.
    pub fn register(&self, kind: ProviderKind, factory: Box<dyn DnsProviderFactory>) -> Result<()> {
        if kind.is_custom() {
            return Err(Error::config(format!(
                "cannot register a strategy for custom endpoint '{}'",
                kind
            )));
        }
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        factories.insert(kind, factory);
        Ok(())
    }

    /// Check if a strategy is registered for `kind`
    pub fn has_provider(&self, kind: &ProviderKind) -> bool {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories.contains_key(self.factory_key(kind))
    }

    /// List registered identifiers
    pub fn list_providers(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories.keys().map(|k| k.to_string()).collect()
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn factory_key<'a>(&'a self, kind: &'a ProviderKind) -> &'a ProviderKind {
        if kind.is_custom() { &self.fallback } else { kind }
    }

    /// Build an unbound strategy for an endpoint identifier
    ///
    /// Construction and the custom-endpoint override are separate steps;
    /// a construction error is returned before any override is attempted.
    pub fn select(&self, endpoint: &str) -> Result<Box<dyn DnsProvider>> {
        let kind: ProviderKind = endpoint.parse()?;
        self.select_kind(&kind)
    }

    /// Build an unbound strategy for a parsed kind
    pub fn select_kind(&self, kind: &ProviderKind) -> Result<Box<dyn DnsProvider>> {
        let mut provider = {
            let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
            let key = self.factory_key(kind);
            let factory = factories.get(key).ok_or_else(|| {
                Error::provider(
                    kind.to_string(),
                    format!("no strategy registered for '{}'", key),
                )
            })?;
            factory.create(&self.settings)?
        };

        if let ProviderKind::Custom(endpoint) = kind {
            debug!("Using custom API endpoint {}", endpoint);
            provider.set_api_endpoint(endpoint)?;
        }

        Ok(provider)
    }

    /// Select a strategy for `endpoint` and converge `fqdn` to `address`
    pub async fn converge(
        &self,
        endpoint: &str,
        auth_token: &str,
        fqdn: &str,
        address: &str,
    ) -> Result<ConvergeOutcome> {
        let mut provider = self.select(endpoint)?;
        converge(provider.as_mut(), auth_token, fqdn, address).await
    }
}
