//! Configuration types for the dnsync system
//!
//! This module defines all configuration structures used throughout the crate.
//! Resource declarations themselves are not configuration; they live in the
//! [`ResourceStore`](crate::traits::ResourceStore).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::traits::{IpVersion, ProviderSettings};

/// Echo services queried for the public address, in order
pub const DEFAULT_IP_SOURCE_URLS: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Main dnsync configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsyncConfig {
    /// Where resources are declared and status is written
    #[serde(default)]
    pub store: StoreConfig,

    /// Where auth secrets are read from
    #[serde(default)]
    pub secrets: SecretStoreConfig,

    /// Public address detection
    #[serde(default)]
    pub ip_source: IpSourceConfig,

    /// Work queue settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Settings passed to every provider strategy
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl DnsyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.secrets.validate()?;
        self.ip_source.validate()?;
        self.controller.validate()?;
        self.provider.validate()?;
        Ok(())
    }
}

/// Resource store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON document on disk
    File {
        /// Path to the resource file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Resource store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Secret store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretStoreConfig {
    /// One file per key under `<root>/<namespace>/<name>/`
    Dir {
        /// Root directory of the secret tree
        root: String,
    },

    /// In-memory store (populated by the embedding application)
    #[default]
    Memory,
}

impl SecretStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SecretStoreConfig::Dir { root } if root.trim().is_empty() => {
                Err(crate::Error::config("Secret directory cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Public address detection over HTTP echo services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSourceConfig {
    /// Services to query, tried in order until one answers with a valid address
    #[serde(default = "default_ip_source_urls")]
    pub urls: Vec<String>,

    /// Accepted address family
    #[serde(default)]
    pub version: IpVersion,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_ip_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.urls.is_empty() {
            return Err(crate::Error::config(
                "At least one IP source URL is required",
            ));
        }
        if let Some(bad) = self
            .urls
            .iter()
            .find(|u| !(u.starts_with("http://") || u.starts_with("https://")))
        {
            return Err(crate::Error::config(format!(
                "IP source URL '{}' must start with http:// or https://",
                bad
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("IP source timeout must be > 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        Self {
            urls: default_ip_source_urls(),
            version: IpVersion::default(),
            timeout_secs: default_ip_source_timeout_secs(),
        }
    }
}

/// Controller (work queue) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Maximum number of resources reconciled in parallel
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    /// First retry delay after a failed pass (in seconds)
    #[serde(default = "default_error_backoff_base_secs")]
    pub error_backoff_base_secs: u64,

    /// Upper bound of the retry delay (in seconds)
    #[serde(default = "default_error_backoff_max_secs")]
    pub error_backoff_max_secs: u64,

    /// Re-trigger every resource at this period (in seconds); 0 disables
    ///
    /// Resources with no check interval are normally reconciled only on
    /// change. A resync gives them a periodic pass anyway.
    #[serde(default)]
    pub resync_interval_secs: u64,

    /// Time in-flight passes get to finish on shutdown (in seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_concurrent_reconciles == 0 {
            return Err(crate::Error::config(
                "max_concurrent_reconciles must be > 0",
            ));
        }
        if self.error_backoff_base_secs == 0 {
            return Err(crate::Error::config("error_backoff_base_secs must be > 0"));
        }
        if self.error_backoff_max_secs < self.error_backoff_base_secs {
            return Err(crate::Error::config(format!(
                "error_backoff_max_secs ({}) must be >= error_backoff_base_secs ({})",
                self.error_backoff_max_secs, self.error_backoff_base_secs
            )));
        }
        Ok(())
    }

    pub fn error_backoff_base(&self) -> Duration {
        Duration::from_secs(self.error_backoff_base_secs)
    }

    pub fn error_backoff_max(&self) -> Duration {
        Duration::from_secs(self.error_backoff_max_secs)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            error_backoff_base_secs: default_error_backoff_base_secs(),
            error_backoff_max_secs: default_error_backoff_max_secs(),
            resync_interval_secs: 0,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Provider strategy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Perform read calls only; log the updates that would be made
    #[serde(default)]
    pub dry_run: bool,

    /// Per-request timeout for provider APIs (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.http_timeout_secs == 0 {
            return Err(crate::Error::config("Provider HTTP timeout must be > 0"));
        }
        Ok(())
    }

    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            dry_run: self.dry_run,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_ip_source_urls() -> Vec<String> {
    DEFAULT_IP_SOURCE_URLS.iter().map(|u| u.to_string()).collect()
}

fn default_ip_source_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_reconciles() -> usize {
    4
}

fn default_error_backoff_base_secs() -> u64 {
    5
}

fn default_error_backoff_max_secs() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    30
}
