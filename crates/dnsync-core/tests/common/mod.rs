//! Test doubles and common utilities for reconciliation contract tests
//!
//! The doubles count every external call so tests can assert not only on
//! results but on which boundaries a pass touched.

#![allow(dead_code)]

use async_trait::async_trait;
use dnsync_core::error::{Error, Result};
use dnsync_core::patch::MergePatch;
use dnsync_core::provider::{ProviderKind, ProviderSelector};
use dnsync_core::resource::{DdnsService, Hostname, HostnameSpec, ResourceId, SecretRef};
use dnsync_core::secrets::MemorySecretStore;
use dnsync_core::store::MemoryResourceStore;
use dnsync_core::traits::{
    AUTH_TOKEN_KEY, DnsProvider, DnsProviderFactory, ProviderSettings, PublicIpSource,
    ResourceStore, Secret, SecretStore, WatchStream,
};
use dnsync_core::Reconciler;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const SECRET_NAME: &str = "ddns-creds";
pub const TOKEN: &str = "user:pass";
pub const DETECTED_IP: [u8; 4] = [203, 0, 113, 7];

/// Shared script and call log for every provider a factory builds
#[derive(Default)]
pub struct ProviderScript {
    pub up_to_date: AtomicBool,
    pub fail_initialize: AtomicBool,
    pub fail_update: AtomicBool,
    pub check_delay: Mutex<Duration>,

    pub initialize_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub tokens: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<(String, String)>>,
    pub endpoints: Mutex<Vec<String>>,

    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ProviderScript {
    pub fn set_up_to_date(&self, value: bool) {
        self.up_to_date.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, value: bool) {
        self.fail_update.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_initialize(&self, value: bool) {
        self.fail_initialize.store(value, Ordering::SeqCst);
    }

    pub fn set_check_delay(&self, delay: Duration) {
        *self.check_delay.lock().unwrap() = delay;
    }

    /// Number of passes that reached the provider
    pub fn passes(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Most checks that were ever running at the same time
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }
}

/// A DnsProvider that follows a shared [`ProviderScript`]
pub struct ScriptedProvider {
    script: Arc<ProviderScript>,
}

#[async_trait]
impl DnsProvider for ScriptedProvider {
    async fn initialize(&mut self, auth_token: &str) -> Result<()> {
        self.script.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .tokens
            .lock()
            .unwrap()
            .push(auth_token.to_string());
        if self.script.fail_initialize.load(Ordering::SeqCst) {
            return Err(Error::provider("scripted", "login rejected"));
        }
        Ok(())
    }

    async fn is_up_to_date(&self, _fqdn: &str, _address: &str) -> Result<bool> {
        self.script.check_calls.fetch_add(1, Ordering::SeqCst);

        let active = self.script.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_active.fetch_max(active, Ordering::SeqCst);
        let delay = *self.script.check_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script.active.fetch_sub(1, Ordering::SeqCst);

        Ok(self.script.up_to_date.load(Ordering::SeqCst))
    }

    async fn update(&self, fqdn: &str, address: &str) -> Result<()> {
        self.script.update_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .updates
            .lock()
            .unwrap()
            .push((fqdn.to_string(), address.to_string()));
        if self.script.fail_update.load(Ordering::SeqCst) {
            return Err(Error::provider("scripted", "911"));
        }
        Ok(())
    }

    fn set_api_endpoint(&mut self, endpoint: &str) -> Result<()> {
        self.script
            .endpoints
            .lock()
            .unwrap()
            .push(endpoint.to_string());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub struct ScriptedFactory {
    script: Arc<ProviderScript>,
}

impl DnsProviderFactory for ScriptedFactory {
    fn create(&self, _settings: &ProviderSettings) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(ScriptedProvider {
            script: Arc::clone(&self.script),
        }))
    }
}

/// Public IP source returning a fixed address, or failing on demand
pub struct StaticIpSource {
    address: IpAddr,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StaticIpSource {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail(&self, value: bool) {
        self.fail.store(value, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicIpSource for StaticIpSource {
    async fn detect(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::address("all detection services failed"));
        }
        Ok(self.address)
    }
}

/// Secret store wrapper counting lookups
#[derive(Default)]
pub struct CountingSecretStore {
    pub inner: MemorySecretStore,
    calls: AtomicUsize,
    lookups: Mutex<Vec<(String, String)>>,
}

impl CountingSecretStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (namespace, name) pairs requested, in order
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for CountingSecretStore {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lookups
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string()));
        self.inner.get_secret(name, namespace).await
    }
}

/// Resource store whose status writes always fail
pub struct RejectingPatchStore {
    pub inner: MemoryResourceStore,
}

#[async_trait]
impl ResourceStore for RejectingPatchStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<Hostname>> {
        self.inner.get(id).await
    }

    async fn patch_status(&self, _id: &ResourceId, _patch: &MergePatch) -> Result<()> {
        Err(Error::store("conflict: object store unavailable"))
    }

    async fn list(&self) -> Result<Vec<ResourceId>> {
        self.inner.list().await
    }

    fn watch(&self) -> WatchStream {
        self.inner.watch()
    }
}

/// Resource store where another writer patches status right after every read
pub struct ConcurrentWriterStore {
    pub inner: MemoryResourceStore,
    pub concurrent_patch: MergePatch,
}

#[async_trait]
impl ResourceStore for ConcurrentWriterStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<Hostname>> {
        let snapshot = self.inner.get(id).await?;
        if snapshot.is_some() {
            self.inner.patch_status(id, &self.concurrent_patch).await?;
        }
        Ok(snapshot)
    }

    async fn patch_status(&self, id: &ResourceId, patch: &MergePatch) -> Result<()> {
        self.inner.patch_status(id, patch).await
    }

    async fn list(&self) -> Result<Vec<ResourceId>> {
        self.inner.list().await
    }

    fn watch(&self) -> WatchStream {
        self.inner.watch()
    }
}

/// Build a resource in the test namespace
pub fn hostname(
    name: &str,
    fqdn: &str,
    address: &str,
    interval: Option<i32>,
    endpoint: &str,
) -> Hostname {
    Hostname::new(
        &ResourceId::new(NAMESPACE, name),
        HostnameSpec {
            hostname: fqdn.to_string(),
            address: address.to_string(),
            check_interval_minutes: interval,
            ddns_service: DdnsService {
                endpoint: endpoint.to_string(),
                auth_secret_ref: SecretRef {
                    name: SECRET_NAME.to_string(),
                    namespace: None,
                },
            },
        },
    )
}

/// The resource used by most scenarios: auto-detected address, 5 minute interval
pub fn home() -> Hostname {
    hostname("home", "home.example.com", "", Some(5), "Dyn")
}

/// A selector whose Cloudflare and Dyn kinds both run the script
pub fn scripted_selector(script: &Arc<ProviderScript>) -> Arc<ProviderSelector> {
    let selector = ProviderSelector::new(ProviderSettings::default());
    for kind in [ProviderKind::Cloudflare, ProviderKind::Dyn] {
        selector
            .register(
                kind,
                Box::new(ScriptedFactory {
                    script: Arc::clone(script),
                }),
            )
            .unwrap();
    }
    Arc::new(selector)
}

/// Everything a reconciler needs, with handles to inspect each double
pub struct Fixture {
    pub store: MemoryResourceStore,
    pub secrets: Arc<CountingSecretStore>,
    pub ip_source: Arc<StaticIpSource>,
    pub script: Arc<ProviderScript>,
    pub selector: Arc<ProviderSelector>,
}

impl Fixture {
    /// Doubles with the default secret in place and no resources
    pub async fn new() -> Self {
        let secrets = Arc::new(CountingSecretStore::default());
        secrets
            .inner
            .insert_key(NAMESPACE, SECRET_NAME, AUTH_TOKEN_KEY, TOKEN)
            .await;
        let script = Arc::new(ProviderScript::default());

        Self {
            store: MemoryResourceStore::new(),
            secrets,
            ip_source: Arc::new(StaticIpSource::new(IpAddr::from(DETECTED_IP))),
            selector: scripted_selector(&script),
            script,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with_store(Arc::new(self.store.clone()))
    }

    pub fn reconciler_with_store(&self, store: Arc<dyn ResourceStore>) -> Reconciler {
        Reconciler::new(
            store,
            Arc::clone(&self.secrets) as Arc<dyn SecretStore>,
            Arc::clone(&self.ip_source) as Arc<dyn PublicIpSource>,
            Arc::clone(&self.selector),
        )
    }

    pub async fn status_of(&self, id: &ResourceId) -> dnsync_core::resource::HostnameStatus {
        self.store.get(id).await.unwrap().unwrap().status
    }
}
