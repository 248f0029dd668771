// # dnsyncd - Hostname Controller Daemon
//
// Thin integration layer over dnsync-core. All reconciliation, provider and
// retry logic lives in the library; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Wires the resource store, secrets, IP source and provider strategies
// 4. Runs the controller until SIGINT/SIGTERM
//
// ## Configuration
//
// ### Resources
// - `DNSYNC_STORE_PATH`: JSON file holding the `Hostname` resources (required)
// - `DNSYNC_SECRETS_DIR`: Secret tree `<dir>/<namespace>/<name>/<key>`
//
// ### IP Source
// - `DNSYNC_IP_SOURCE_URLS`: Comma-separated echo services, tried in order
// - `DNSYNC_IP_VERSION`: Accepted address family (v4, v6, both)
//
// ### Controller
// - `DNSYNC_MAX_CONCURRENT`: Resources reconciled in parallel
// - `DNSYNC_BACKOFF_BASE_SECS`: First retry delay after a failed pass
// - `DNSYNC_BACKOFF_MAX_SECS`: Retry delay cap
// - `DNSYNC_RESYNC_SECS`: Periodic pass over every resource (0 disables)
// - `DNSYNC_SHUTDOWN_GRACE_SECS`: Time in-flight passes get on shutdown
//
// ### Providers
// - `DNSYNC_HTTP_TIMEOUT_SECS`: Per-request timeout for provider APIs
// - `DNSYNC_MODE`: `dry-run` performs lookups but never writes records
//
// ### Logging
// - `DNSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Signals
//
// SIGINT and SIGTERM stop the controller. SIGHUP re-reads the resource file.
//
// ## Example
//
// ```bash
// export DNSYNC_STORE_PATH=/var/lib/dnsync/hostnames.json
// export DNSYNC_SECRETS_DIR=/etc/dnsync/secrets
// export DNSYNC_IP_VERSION=v4
//
// dnsyncd
// ```

use anyhow::Result;
use dnsync_core::config::{
    ControllerConfig, DnsyncConfig, IpSourceConfig, ProviderConfig, SecretStoreConfig,
    StoreConfig,
};
use dnsync_core::traits::{IpVersion, PublicIpSource, ResourceStore, SecretStore};
use dnsync_core::{
    Controller, DirSecretStore, FileResourceStore, MemorySecretStore, ProviderSelector, Reconciler,
};
use dnsync_ip_http::HttpPublicIpSource;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Extra time granted to the controller's own drain before giving up on it
const SHUTDOWN_SLACK: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DnsyncExitCode> for ExitCode {
    fn from(code: DnsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    dnsync: DnsyncConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` (environment in production)
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(store_path) = var("DNSYNC_STORE_PATH") else {
            anyhow::bail!(
                "DNSYNC_STORE_PATH is required. \
                Set it via: export DNSYNC_STORE_PATH=/var/lib/dnsync/hostnames.json"
            );
        };

        let secrets = match var("DNSYNC_SECRETS_DIR") {
            Some(root) => SecretStoreConfig::Dir { root },
            None => SecretStoreConfig::Memory,
        };

        let mut ip_source = IpSourceConfig::default();
        if let Some(urls) = var("DNSYNC_IP_SOURCE_URLS") {
            ip_source.urls = urls
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(version) = var("DNSYNC_IP_VERSION") {
            ip_source.version = parse_ip_version(&version)?;
        }

        let defaults = ControllerConfig::default();
        let controller = ControllerConfig {
            max_concurrent_reconciles: parse_number(
                &var,
                "DNSYNC_MAX_CONCURRENT",
                defaults.max_concurrent_reconciles,
            )?,
            error_backoff_base_secs: parse_number(
                &var,
                "DNSYNC_BACKOFF_BASE_SECS",
                defaults.error_backoff_base_secs,
            )?,
            error_backoff_max_secs: parse_number(
                &var,
                "DNSYNC_BACKOFF_MAX_SECS",
                defaults.error_backoff_max_secs,
            )?,
            resync_interval_secs: parse_number(
                &var,
                "DNSYNC_RESYNC_SECS",
                defaults.resync_interval_secs,
            )?,
            shutdown_grace_secs: parse_number(
                &var,
                "DNSYNC_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace_secs,
            )?,
        };

        let dry_run = match var("DNSYNC_MODE").as_deref() {
            None | Some("normal") => false,
            Some("dry-run") => true,
            Some(other) => anyhow::bail!(
                "DNSYNC_MODE '{}' is not valid. Valid modes: normal, dry-run",
                other
            ),
        };
        let provider = ProviderConfig {
            dry_run,
            http_timeout_secs: parse_number(
                &var,
                "DNSYNC_HTTP_TIMEOUT_SECS",
                ProviderConfig::default().http_timeout_secs,
            )?,
        };

        Ok(Self {
            dnsync: DnsyncConfig {
                store: StoreConfig::File { path: store_path },
                secrets,
                ip_source,
                controller,
                provider,
            },
            log_level: var("DNSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Structural checks come from `DnsyncConfig::validate`; this adds the
    /// ranges and filesystem checks that only make sense for a daemon.
    fn validate(&self) -> Result<()> {
        self.dnsync.validate()?;

        let controller = &self.dnsync.controller;
        if !(1..=64).contains(&controller.max_concurrent_reconciles) {
            anyhow::bail!(
                "DNSYNC_MAX_CONCURRENT must be between 1 and 64. Got: {}",
                controller.max_concurrent_reconciles
            );
        }

        if !(1..=3600).contains(&controller.error_backoff_base_secs) {
            anyhow::bail!(
                "DNSYNC_BACKOFF_BASE_SECS must be between 1 and 3600 seconds. Got: {}",
                controller.error_backoff_base_secs
            );
        }

        if controller.error_backoff_max_secs > 86_400 {
            anyhow::bail!(
                "DNSYNC_BACKOFF_MAX_SECS must be at most 86400 seconds. Got: {}",
                controller.error_backoff_max_secs
            );
        }

        if controller.resync_interval_secs != 0 && controller.resync_interval_secs < 10 {
            anyhow::bail!(
                "DNSYNC_RESYNC_SECS must be 0 (disabled) or at least 10 seconds. Got: {}",
                controller.resync_interval_secs
            );
        }

        if controller.shutdown_grace_secs > 600 {
            anyhow::bail!(
                "DNSYNC_SHUTDOWN_GRACE_SECS must be at most 600 seconds. Got: {}",
                controller.shutdown_grace_secs
            );
        }

        if self.dnsync.provider.http_timeout_secs > 300 {
            anyhow::bail!(
                "DNSYNC_HTTP_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.dnsync.provider.http_timeout_secs
            );
        }

        if let SecretStoreConfig::Dir { root } = &self.dnsync.secrets
            && !Path::new(root).is_dir()
        {
            anyhow::bail!(
                "DNSYNC_SECRETS_DIR is not a directory: {}. \
                Expected layout: <dir>/<namespace>/<name>/authToken",
                root
            );
        }

        for url in &self.dnsync.ip_source.urls {
            if url.starts_with("http://") {
                eprintln!(
                    "WARNING: IP source {} uses HTTP (not HTTPS). \
                    Detected addresses can be spoofed in transit.",
                    url
                );
            }
        }

        parse_log_level(&self.log_level)?;

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: '{}'", key, raw)),
    }
}

fn parse_ip_version(raw: &str) -> Result<IpVersion> {
    match raw.to_lowercase().as_str() {
        "v4" | "ipv4" | "4" => Ok(IpVersion::V4),
        "v6" | "ipv6" | "6" => Ok(IpVersion::V6),
        "both" | "any" => Ok(IpVersion::Both),
        _ => anyhow::bail!(
            "DNSYNC_IP_VERSION '{}' is not valid. Valid values: v4, v6, both",
            raw
        ),
    }
}

fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "DNSYNC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            raw
        ),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DnsyncExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsyncExitCode::ConfigError.into();
    }

    info!("Starting dnsyncd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let daemon = match Daemon::build(config.dnsync).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return DnsyncExitCode::ConfigError;
            }
        };

        match daemon.run().await {
            Ok(()) => DnsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DnsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Wired components, ready to run
struct Daemon {
    store: Arc<FileResourceStore>,
    controller: Controller,
    shutdown_grace: Duration,
}

impl Daemon {
    async fn build(config: DnsyncConfig) -> Result<Self> {
        let StoreConfig::File { path } = &config.store else {
            anyhow::bail!("dnsyncd requires a file-backed resource store");
        };
        let store = Arc::new(FileResourceStore::new(path).await?);
        info!(
            "Resource file {}: {} resource(s)",
            store.path().display(),
            store.list().await?.len()
        );

        let secrets: Arc<dyn SecretStore> = match &config.secrets {
            SecretStoreConfig::Dir { root } => {
                info!("Reading secrets from {}", root);
                Arc::new(DirSecretStore::new(root))
            }
            SecretStoreConfig::Memory => {
                warn!("DNSYNC_SECRETS_DIR not set; every resource will fail on credentials");
                Arc::new(MemorySecretStore::new())
            }
        };

        let ip_source: Arc<dyn PublicIpSource> =
            Arc::new(HttpPublicIpSource::from_config(&config.ip_source)?);

        let selector = ProviderSelector::new(config.provider.settings());
        dnsync_provider_cloudflare::register(&selector)?;
        dnsync_provider_dyndns::register(&selector)?;
        info!("Registered providers: {}", selector.list_providers().join(", "));
        if config.provider.dry_run {
            warn!("Dry-run mode: records are checked but never written");
        }

        let resources: Arc<dyn ResourceStore> = store.clone();
        let reconciler = Reconciler::new(resources, secrets, ip_source, Arc::new(selector));
        let shutdown_grace = config.controller.shutdown_grace();
        let controller = Controller::new(reconciler, config.controller)?;

        Ok(Self {
            store,
            controller,
            shutdown_grace,
        })
    }

    async fn run(self) -> Result<()> {
        let Daemon {
            store,
            controller,
            shutdown_grace,
        } = self;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mut controller_task = tokio::spawn(controller.run(shutdown_rx));

        tokio::select! {
            signal = wait_for_shutdown(&store) => {
                info!("Received shutdown signal: {}", signal?);
            }
            result = &mut controller_task => {
                result??;
                anyhow::bail!("Controller stopped without a shutdown request");
            }
        }

        let _ = shutdown_tx.send(());
        info!("Shutting down, waiting up to {:?} for in-flight passes", shutdown_grace);

        match tokio::time::timeout(shutdown_grace + SHUTDOWN_SLACK, controller_task).await {
            Ok(result) => {
                result??;
                info!("Shutdown complete");
                Ok(())
            }
            Err(_) => Err(anyhow::anyhow!(
                "Controller did not stop within {:?}",
                shutdown_grace + SHUTDOWN_SLACK
            )),
        }
    }
}

/// Wait for SIGTERM or SIGINT, reloading the resource file on SIGHUP
///
/// # Returns
///
/// The name of the signal that requested shutdown
#[cfg(unix)]
async fn wait_for_shutdown(store: &FileResourceStore) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Ok("SIGTERM"),
            _ = sigint.recv() => return Ok("SIGINT"),
            _ = sighup.recv() => {
                info!("SIGHUP: reloading {}", store.path().display());
                if let Err(e) = store.reload().await {
                    warn!("Reload failed, keeping current resources: {}", e);
                }
            }
        }
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms; no reload signal.
#[cfg(not(unix))]
async fn wait_for_shutdown(_store: &FileResourceStore) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_store_path_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DNSYNC_STORE_PATH"));
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DNSYNC_STORE_PATH", "/tmp/hostnames.json")]).unwrap();

        assert_eq!(
            config.dnsync.store,
            StoreConfig::File {
                path: "/tmp/hostnames.json".to_string()
            }
        );
        assert_eq!(config.dnsync.secrets, SecretStoreConfig::Memory);
        assert_eq!(config.dnsync.ip_source, IpSourceConfig::default());
        assert_eq!(config.dnsync.controller, ControllerConfig::default());
        assert!(!config.dnsync.provider.dry_run);
        assert_eq!(config.log_level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_full_environment() {
        let config = config_from(&[
            ("DNSYNC_STORE_PATH", "/tmp/hostnames.json"),
            ("DNSYNC_IP_SOURCE_URLS", "https://a.example/ip, https://b.example/ip,"),
            ("DNSYNC_IP_VERSION", "V6"),
            ("DNSYNC_MAX_CONCURRENT", "8"),
            ("DNSYNC_BACKOFF_BASE_SECS", "2"),
            ("DNSYNC_BACKOFF_MAX_SECS", "60"),
            ("DNSYNC_RESYNC_SECS", "3600"),
            ("DNSYNC_SHUTDOWN_GRACE_SECS", "10"),
            ("DNSYNC_HTTP_TIMEOUT_SECS", "15"),
            ("DNSYNC_MODE", "dry-run"),
            ("DNSYNC_LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(
            config.dnsync.ip_source.urls,
            vec!["https://a.example/ip", "https://b.example/ip"]
        );
        assert_eq!(config.dnsync.ip_source.version, IpVersion::V6);
        assert_eq!(config.dnsync.controller.max_concurrent_reconciles, 8);
        assert_eq!(config.dnsync.controller.error_backoff_base_secs, 2);
        assert_eq!(config.dnsync.controller.error_backoff_max_secs, 60);
        assert_eq!(
            config.dnsync.controller.resync_interval(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(config.dnsync.controller.shutdown_grace_secs, 10);
        assert_eq!(config.dnsync.provider.http_timeout_secs, 15);
        assert!(config.dnsync.provider.dry_run);
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for (key, value) in [
            ("DNSYNC_MAX_CONCURRENT", "many"),
            ("DNSYNC_BACKOFF_BASE_SECS", "-1"),
            ("DNSYNC_IP_VERSION", "v5"),
            ("DNSYNC_MODE", "yolo"),
        ] {
            let result = config_from(&[("DNSYNC_STORE_PATH", "/tmp/h.json"), (key, value)]);
            let err = result.unwrap_err();
            assert!(err.to_string().contains(key), "{}: {}", key, err);
        }
    }

    #[test]
    fn test_out_of_range_values_fail_validation() {
        for (key, value) in [
            ("DNSYNC_MAX_CONCURRENT", "0"),
            ("DNSYNC_MAX_CONCURRENT", "1000"),
            ("DNSYNC_BACKOFF_BASE_SECS", "0"),
            ("DNSYNC_RESYNC_SECS", "5"),
            ("DNSYNC_HTTP_TIMEOUT_SECS", "0"),
            ("DNSYNC_LOG_LEVEL", "loud"),
            ("DNSYNC_IP_SOURCE_URLS", "ftp://example.com/ip"),
        ] {
            let config =
                config_from(&[("DNSYNC_STORE_PATH", "/tmp/h.json"), (key, value)]).unwrap();
            assert!(config.validate().is_err(), "{}={} accepted", key, value);
        }
    }

    #[test]
    fn test_backoff_max_below_base_fails_validation() {
        let config = config_from(&[
            ("DNSYNC_STORE_PATH", "/tmp/h.json"),
            ("DNSYNC_BACKOFF_BASE_SECS", "60"),
            ("DNSYNC_BACKOFF_MAX_SECS", "30"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_secrets_dir_fails_validation() {
        let config = config_from(&[
            ("DNSYNC_STORE_PATH", "/tmp/h.json"),
            ("DNSYNC_SECRETS_DIR", "/nonexistent/dnsync/secrets"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DNSYNC_SECRETS_DIR"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DnsyncExitCode::CleanShutdown as u8, 0);
        assert_eq!(DnsyncExitCode::ConfigError as u8, 1);
        assert_eq!(DnsyncExitCode::RuntimeError as u8, 2);
    }
}
