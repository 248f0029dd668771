//! Reconciliation pass
//!
//! The [`Reconciler`] runs one pass for one resource:
//!
//! ```text
//!  get ─► snapshot ─► secret ─► address ─► lastUpdate ─► converge ─► patch ─► requeue
//!   │                   │         │                        │          │
//!   └ gone: done        └ error   └ error                  └ failed   └ error
//! ```
//!
//! ## Failure Surfacing
//!
//! | step              | on failure                                  |
//! |-------------------|---------------------------------------------|
//! | load              | `Ok(await_change)` when gone, else error    |
//! | spec validation   | error, status untouched                     |
//! | credentials       | error, status untouched                     |
//! | address           | error, status untouched                     |
//! | provider          | `lastUpdate.failed = true`, pass succeeds   |
//! | status patch      | error                                       |
//!
//! Provider failures are retried on the resource's own interval; everything
//! surfaced goes to the controller's back-off.

use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::patch::MergePatch;
use crate::provider::{ConvergeOutcome, ProviderSelector};
use crate::resource::{Hostname, ResourceId};
use crate::traits::{AUTH_TOKEN_KEY, PublicIpSource, ResourceStore, SecretStore};

/// What the controller should do after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Run again after `duration`
    pub fn requeue(duration: Duration) -> Self {
        Self {
            requeue_after: Some(duration),
        }
    }

    /// Do not self-schedule; wait for the resource to change
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// Drives a single resource toward its declared record
///
/// Passes for different ids may run concurrently; passes for the same id
/// must not. The [`Controller`](crate::controller::Controller) provides that
/// serialization.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    secrets: Arc<dyn SecretStore>,
    ip_source: Arc<dyn PublicIpSource>,
    selector: Arc<ProviderSelector>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        secrets: Arc<dyn SecretStore>,
        ip_source: Arc<dyn PublicIpSource>,
        selector: Arc<ProviderSelector>,
    ) -> Self {
        Self {
            store,
            secrets,
            ip_source,
            selector,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Run one reconciliation pass
    ///
    /// # Returns
    ///
    /// - `Ok(Action)`: The pass completed; the provider outcome is in status
    /// - `Err(Error)`: Credentials, address, spec or status write failed
    pub async fn reconcile(&self, id: &ResourceId) -> Result<Action> {
        let Some(snapshot) = self.store.get(id).await? else {
            debug!("{} no longer exists, nothing to do", id);
            return Ok(Action::await_change());
        };

        let spec = &snapshot.spec;
        spec.validate()
            .inspect_err(|e| error!("{}: invalid spec: {}", id, e))?;

        let auth_token = self
            .auth_token(&snapshot)
            .await
            .inspect_err(|e| error!("{}: {}", id, e))?;

        let address = self
            .resolve_address(&spec.address)
            .await
            .inspect_err(|e| error!("{}: {}", id, e))?;

        let mut desired = snapshot.clone();
        let last_update = desired.status.last_update_mut();
        last_update.scheduled_at = Some(Utc::now());
        last_update.hostname = spec.hostname.clone();
        last_update.address = address.clone();

        let outcome = self
            .selector
            .converge(
                &spec.ddns_service.endpoint,
                &auth_token,
                &spec.hostname,
                &address,
            )
            .await;

        last_update.failed = match outcome {
            Ok(ConvergeOutcome::Updated) => {
                info!("{}: {} now points at {}", id, spec.hostname, address);
                false
            }
            Ok(ConvergeOutcome::AlreadyUpToDate) => {
                debug!("{}: {} already up to date", id, spec.hostname);
                false
            }
            Err(e) => {
                warn!(
                    "{}: provider {} failed for {}: {}",
                    id, spec.ddns_service.endpoint, spec.hostname, e
                );
                true
            }
        };

        let patch = MergePatch::status_from(&snapshot, &desired)?;
        self.store
            .patch_status(id, &patch)
            .await
            .map_err(|e| match e {
                Error::StatusPatch(_) => e,
                other => Error::status_patch(other.to_string()),
            })
            .inspect_err(|e| error!("{}: {}", id, e))?;

        Ok(match spec.check_interval() {
            Some(interval) => Action::requeue(interval),
            None => Action::await_change(),
        })
    }

    /// Read `authToken` from the resource's secret
    async fn auth_token(&self, hostname: &Hostname) -> Result<String> {
        let (name, namespace) = hostname.auth_secret_key();

        let secret = self
            .secrets
            .get_secret(name, namespace)
            .await
            .map_err(|e| {
                Error::credentials(format!("reading secret {}/{}: {}", namespace, name, e))
            })?
            .ok_or_else(|| Error::credentials(format!("secret {}/{} not found", namespace, name)))?;

        let raw = secret.get(AUTH_TOKEN_KEY).ok_or_else(|| {
            Error::credentials(format!(
                "secret {}/{} has no '{}' key",
                namespace, name, AUTH_TOKEN_KEY
            ))
        })?;

        let token = String::from_utf8(raw.clone()).map_err(|_| {
            Error::credentials(format!(
                "secret {}/{} key '{}' is not valid UTF-8",
                namespace, name, AUTH_TOKEN_KEY
            ))
        })?;

        // Mounted secret files commonly end in a newline
        Ok(token.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Use the declared literal, or ask the public IP source
    async fn resolve_address(&self, declared: &str) -> Result<String> {
        if !declared.is_empty() {
            return Ok(declared.to_string());
        }

        let detected: IpAddr = self
            .ip_source
            .detect()
            .await
            .map_err(|e| match e {
                Error::AddressResolution(_) => e,
                other => Error::address(other.to_string()),
            })?;
        debug!("Detected public address {}", detected);
        Ok(detected.to_string())
    }
}
