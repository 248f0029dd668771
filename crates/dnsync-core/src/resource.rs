//! Hostname resource model
//!
//! A [`Hostname`] pairs the user-declared [`HostnameSpec`] with the
//! system-written [`HostnameStatus`]. Serialized field names are camelCase so
//! resource documents read the same as their declared schema:
//!
//! ```json
//! {
//!   "metadata": { "name": "home", "namespace": "default" },
//!   "spec": {
//!     "hostname": "home.example.com",
//!     "address": "",
//!     "checkIntervalMinutes": 5,
//!     "ddnsService": {
//!       "endpoint": "Cloudflare",
//!       "authSecretRef": { "name": "cf-token", "namespace": "default" }
//!     }
//!   },
//!   "status": {}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Identifier of a resource: `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::invalid_input(format!(
                "resource id must be <namespace>/<name>, got '{}'",
                s
            ))),
        }
    }
}

/// Object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
}

/// A hostname resource: desired record plus observed status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hostname {
    pub metadata: ObjectMeta,
    pub spec: HostnameSpec,
    #[serde(default)]
    pub status: HostnameStatus,
}

impl Hostname {
    /// Create a resource with an empty status
    pub fn new(id: &ResourceId, spec: HostnameSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: id.name.clone(),
                namespace: id.namespace.clone(),
            },
            spec,
            status: HostnameStatus::default(),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Namespace and name of the auth secret, defaulting to this resource's namespace
    pub fn auth_secret_key(&self) -> (&str, &str) {
        let secret_ref = &self.spec.ddns_service.auth_secret_ref;
        let namespace = secret_ref
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.metadata.namespace);
        (secret_ref.name.as_str(), namespace)
    }
}

/// Desired state declared by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostnameSpec {
    /// Fully qualified domain name to publish
    pub hostname: String,

    /// IP literal to bind; empty means detect the public address at reconcile time
    #[serde(default)]
    pub address: String,

    /// Minutes between passes; `None` or `0` reconciles once
    #[serde(default)]
    pub check_interval_minutes: Option<i32>,

    /// DDNS service endpoint and credentials
    pub ddns_service: DdnsService,
}

impl HostnameSpec {
    /// Validate required fields
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(Error::config("spec.hostname cannot be empty"));
        }
        if self.ddns_service.endpoint.trim().is_empty() {
            return Err(Error::config("spec.ddnsService.endpoint cannot be empty"));
        }
        if self.ddns_service.auth_secret_ref.name.trim().is_empty() {
            return Err(Error::config(
                "spec.ddnsService.authSecretRef.name cannot be empty",
            ));
        }
        Ok(())
    }

    /// The self-scheduling interval, if any
    ///
    /// Absent, zero and negative intervals all mean "do not reschedule".
    pub fn check_interval(&self) -> Option<Duration> {
        match self.check_interval_minutes {
            Some(minutes) if minutes > 0 => Some(Duration::from_secs(minutes as u64 * 60)),
            _ => None,
        }
    }
}

/// Endpoint and authentication data for a DDNS service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdnsService {
    /// Well-known provider name (`Cloudflare`, `Dyn`, `NoIP`, `DDNS`) or a custom API URL
    pub endpoint: String,

    /// Secret holding the `authToken` key
    pub auth_secret_ref: SecretRef,
}

/// Reference to a secret by name and optional namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Observed status, written only by the reconciler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostnameStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<LastUpdate>,
}

impl HostnameStatus {
    /// The last-update entry, created on first touch
    pub fn last_update_mut(&mut self) -> &mut LastUpdate {
        self.last_update.get_or_insert_with(LastUpdate::default)
    }
}

/// Snapshot of what the most recent pass attempted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdate {
    /// When the update was last attempted
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Whether the provider call of the last attempt failed
    #[serde(default)]
    pub failed: bool,

    /// Last FQDN sent to the provider
    #[serde(default)]
    pub hostname: String,

    /// Last address sent to the provider
    #[serde(default)]
    pub address: String,
}

/// Standard observation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}
