//! Minimal embedding example for dnsync-core
//!
//! The application owns every collaborator: an in-memory resource store, an
//! in-memory secret store, a fixed public address and a provider strategy that
//! keeps its "records" in a map. It runs one reconcile pass by hand, then hands
//! the same reconciler to a controller and changes the resource underneath it.

use async_trait::async_trait;
use dnsync_core::config::ControllerConfig;
use dnsync_core::resource::{DdnsService, SecretRef};
use dnsync_core::traits::{
    DnsProvider, DnsProviderFactory, ProviderSettings, PublicIpSource, ResourceStore,
};
use dnsync_core::{
    Controller, Error, Hostname, HostnameSpec, MemoryResourceStore, MemorySecretStore,
    ProviderKind, ProviderSelector, Reconciler, ResourceId, Result,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

type Records = Arc<Mutex<HashMap<String, String>>>;

/// Provider strategy backed by a shared map of fqdn -> address
struct EmbeddedProvider {
    records: Records,
    token: Option<String>,
}

#[async_trait]
impl DnsProvider for EmbeddedProvider {
    async fn initialize(&mut self, auth_token: &str) -> Result<()> {
        self.token = Some(auth_token.to_string());
        Ok(())
    }

    async fn is_up_to_date(&self, fqdn: &str, address: &str) -> Result<bool> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::provider("embedded", "record map poisoned"))?;
        Ok(records.get(fqdn).map(String::as_str) == Some(address))
    }

    async fn update(&self, fqdn: &str, address: &str) -> Result<()> {
        if self.token.is_none() {
            return Err(Error::provider("embedded", "not initialized"));
        }
        println!("[Embedded] Updating {} -> {}", fqdn, address);
        self.records
            .lock()
            .map_err(|_| Error::provider("embedded", "record map poisoned"))?
            .insert(fqdn.to_string(), address.to_string());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "embedded"
    }
}

struct EmbeddedFactory {
    records: Records,
}

impl DnsProviderFactory for EmbeddedFactory {
    fn create(&self, _settings: &ProviderSettings) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(EmbeddedProvider {
            records: self.records.clone(),
            token: None,
        }))
    }
}

/// Public address that never changes
struct FixedIpSource(IpAddr);

#[async_trait]
impl PublicIpSource for FixedIpSource {
    async fn detect(&self) -> Result<IpAddr> {
        Ok(self.0)
    }
}

fn home(address: &str) -> Hostname {
    Hostname::new(
        &ResourceId::new("default", "home"),
        HostnameSpec {
            hostname: "home.example.com".to_string(),
            address: address.to_string(),
            check_interval_minutes: Some(5),
            ddns_service: DdnsService {
                endpoint: "Cloudflare".to_string(),
                auth_secret_ref: SecretRef {
                    name: "ddns-creds".to_string(),
                    namespace: None,
                },
            },
        },
    )
}

async fn print_status(store: &MemoryResourceStore, id: &ResourceId) -> Result<()> {
    if let Some(hostname) = store.get(id).await?
        && let Some(last) = hostname.status.last_update
    {
        println!(
            "   status: hostname={} address={} failed={}",
            last.hostname, last.address, last.failed
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded dnsync-core Example ===\n");

    let records: Records = Arc::new(Mutex::new(HashMap::new()));

    let store = MemoryResourceStore::new();
    let secrets = MemorySecretStore::new();
    secrets
        .insert_key("default", "ddns-creds", "authToken", "demo-token")
        .await;

    let selector = ProviderSelector::new(ProviderSettings::default());
    selector.register(
        ProviderKind::Cloudflare,
        Box::new(EmbeddedFactory {
            records: records.clone(),
        }),
    )?;

    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(secrets),
        Arc::new(FixedIpSource(IpAddr::from([203, 0, 113, 7]))),
        Arc::new(selector),
    );

    let id = ResourceId::new("default", "home");
    store.apply(home("")).await;

    println!("1. One pass by hand (address detected)...");
    let action = reconciler.reconcile(&id).await?;
    println!("   requeue after: {:?}", action.requeue_after());
    print_status(&store, &id).await?;

    println!("\n2. Second pass is a no-op at the provider...");
    reconciler.reconcile(&id).await?;
    print_status(&store, &id).await?;

    println!("\n3. Handing the reconciler to a controller...");
    let config = ControllerConfig {
        max_concurrent_reconciles: 2,
        shutdown_grace_secs: 1,
        ..ControllerConfig::default()
    };
    let controller = Controller::new(reconciler, config)?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let running = tokio::spawn(controller.run(shutdown_rx));

    println!("\n4. Declaring a fixed address; the watch triggers a pass...");
    store.apply(home("198.51.100.20")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    print_status(&store, &id).await?;

    println!("\n5. Stopping the controller...");
    let _ = shutdown_tx.send(());
    running
        .await
        .map_err(|e| Error::Other(format!("controller task failed: {}", e)))??;

    let published = records
        .lock()
        .map_err(|_| Error::Other("record map poisoned".to_string()))?
        .get("home.example.com")
        .cloned();
    println!("\n=== Published record: {:?} ===", published);

    Ok(())
}
