// # dyndns2 DNS Providers
//
// Strategies speaking the dyndns2 update protocol, shared by many DDNS
// services:
//
// | identifier    | update URL                                  |
// |---------------|---------------------------------------------|
// | `Dyn`         | https://members.dyndns.org/v3/update        |
// | `NoIP`        | https://dynupdate.no-ip.com/nic/update      |
// | `DDNS`        | https://update.ddns.net/nic/update          |
// | any other URL | the URL itself (via `set_api_endpoint`)     |
//
// ## Protocol
//
// - `initialize`: token is `username:password`, sent as HTTP basic auth
// - `is_up_to_date`: resolves the hostname and checks for the address
// - `update`: `GET <url>?hostname=<fqdn>&myip=<address>`
//
// Response bodies start with a return code. `good` and `nochg` are success;
// everything else (`badauth`, `nohost`, `abuse`, `911`, ...) is an error.
//
// ## Trust Level: Untrusted (DNS Provider)
//
// - ✅ Perform HTTP/HTTPS calls to the configured update URL only
// - ✅ Perform DNS lookups of the managed hostname
// - ❌ Retry on `911` or `dnserr` (the controller owns scheduling)
// - ❌ Log the password

use async_trait::async_trait;
use dnsync_core::provider::{ProviderKind, ProviderSelector};
use dnsync_core::traits::{DnsProvider, DnsProviderFactory, ProviderSettings};
use dnsync_core::{Error, Result};
use std::net::IpAddr;

pub const DYN_UPDATE_URL: &str = "https://members.dyndns.org/v3/update";
pub const NOIP_UPDATE_URL: &str = "https://dynupdate.no-ip.com/nic/update";
pub const DDNS_UPDATE_URL: &str = "https://update.ddns.net/nic/update";

const USER_AGENT: &str = concat!("dnsync/", env!("CARGO_PKG_VERSION"));

/// A dyndns2 service with a well-known update URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Dyn,
    NoIp,
    Ddns,
}

impl Service {
    pub fn update_url(&self) -> &'static str {
        match self {
            Service::Dyn => DYN_UPDATE_URL,
            Service::NoIp => NOIP_UPDATE_URL,
            Service::Ddns => DDNS_UPDATE_URL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Service::Dyn => "dyn",
            Service::NoIp => "noip",
            Service::Ddns => "ddns",
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Service::Dyn => ProviderKind::Dyn,
            Service::NoIp => ProviderKind::NoIp,
            Service::Ddns => ProviderKind::Ddns,
        }
    }
}

struct Credentials {
    username: String,
    /// ⚠️ NEVER log this value
    password: String,
}

/// Outcome of a dyndns2 update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnCode {
    /// The update was applied
    Good,
    /// The hostname already had this address
    NoChange,
    /// Any error code, kept verbatim
    Failure(String),
}

impl ReturnCode {
    /// Parse the first line of a response body
    pub fn parse(body: &str) -> Self {
        let code = body
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("");
        match code {
            "good" => ReturnCode::Good,
            "nochg" => ReturnCode::NoChange,
            other => ReturnCode::Failure(other.to_string()),
        }
    }
}

/// Human description of a dyndns2 error code
fn describe(code: &str) -> &'static str {
    match code {
        "badauth" => "Authentication failed: invalid username or password",
        "!donator" => "Feature not available for this account",
        "notfqdn" => "Hostname is not a fully qualified domain name",
        "nohost" => "Hostname does not exist in this account",
        "numhost" => "Too many hosts in one update",
        "abuse" => "Hostname blocked for update abuse",
        "badagent" => "User agent rejected",
        "dnserr" => "Provider DNS error (transient)",
        "911" => "Provider outage (transient)",
        "" => "Empty response",
        _ => "Unrecognized response",
    }
}

/// dyndns2 DNS provider
pub struct DynDnsProvider {
    name: &'static str,
    update_url: String,
    credentials: Option<Credentials>,
    client: reqwest::Client,
    dry_run: bool,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for DynDnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynDnsProvider")
            .field("name", &self.name)
            .field("update_url", &self.update_url)
            .field(
                "username",
                &self.credentials.as_ref().map(|c| c.username.as_str()),
            )
            .field("password", &self.credentials.as_ref().map(|_| "<REDACTED>"))
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl DynDnsProvider {
    /// Create an unbound provider for a well-known service
    pub fn new(service: Service, settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: service.name(),
            update_url: service.update_url().to_string(),
            credentials: None,
            client,
            dry_run: settings.dry_run,
        })
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::provider(self.name, "provider used before initialize"))
    }
}

#[async_trait]
impl DnsProvider for DynDnsProvider {
    async fn initialize(&mut self, auth_token: &str) -> Result<()> {
        let (username, password) = auth_token
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::provider(self.name, "auth token must be 'username:password'"))?;
        if username.is_empty() {
            return Err(Error::provider(self.name, "auth token has an empty username"));
        }

        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        Ok(())
    }

    /// Resolve `fqdn` and look for `address` among its records
    ///
    /// A name that does not resolve yet is reported as stale, not as an error.
    async fn is_up_to_date(&self, fqdn: &str, address: &str) -> Result<bool> {
        self.credentials()?;
        let wanted: IpAddr = address.parse().map_err(|_| {
            Error::provider(self.name, format!("'{}' is not an IP address", address))
        })?;

        match tokio::net::lookup_host((fqdn, 0)).await {
            Ok(addrs) => {
                let found: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                tracing::debug!("{} resolves to {:?}", fqdn, found);
                Ok(found.contains(&wanted))
            }
            Err(e) => {
                tracing::debug!("{} does not resolve: {}", fqdn, e);
                Ok(false)
            }
        }
    }

    async fn update(&self, fqdn: &str, address: &str) -> Result<()> {
        let credentials = self.credentials()?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send GET {}?hostname={}&myip={}",
                self.update_url,
                fqdn,
                address
            );
            return Ok(());
        }

        let response = self
            .client
            .get(&self.update_url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .query(&[("hostname", fqdn), ("myip", address)])
            .send()
            .await
            .map_err(|e| Error::provider(self.name, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        if !status.is_success() {
            let message = match status.as_u16() {
                401 | 403 => format!("Authentication failed. Status: {}", status),
                429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
                500..=599 => {
                    format!("Provider server error (transient): {} - {}", status, body.trim())
                }
                _ => format!("Update failed: {} - {}", status, body.trim()),
            };
            return Err(Error::provider(self.name, message));
        }

        match ReturnCode::parse(&body) {
            ReturnCode::Good => {
                tracing::info!("{} updated: {} -> {}", self.name, fqdn, address);
                Ok(())
            }
            ReturnCode::NoChange => {
                tracing::info!("{} reports {} already at {}", self.name, fqdn, address);
                Ok(())
            }
            ReturnCode::Failure(code) => Err(Error::provider(
                self.name,
                format!("{} ({})", describe(&code), code),
            )),
        }
    }

    fn set_api_endpoint(&mut self, endpoint: &str) -> Result<()> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::provider(
                self.name,
                format!("custom endpoint '{}' must be an http(s) URL", endpoint),
            ));
        }
        self.update_url = endpoint.to_string();
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// Factory for one dyndns2 service
#[derive(Debug, Clone, Copy)]
pub struct DynDnsFactory {
    service: Service,
}

impl DynDnsFactory {
    pub fn new(service: Service) -> Self {
        Self { service }
    }
}

impl DnsProviderFactory for DynDnsFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(DynDnsProvider::new(self.service, settings)?))
    }
}

/// Register the `Dyn`, `NoIP` and `DDNS` strategies with a selector
///
/// `Dyn` also serves custom endpoints.
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderSelector;
/// use dnsync_core::traits::ProviderSettings;
///
/// let selector = ProviderSelector::new(ProviderSettings::default());
/// dnsync_provider_dyndns::register(&selector).unwrap();
/// ```
pub fn register(selector: &ProviderSelector) -> Result<()> {
    for service in [Service::Dyn, Service::NoIp, Service::Ddns] {
        selector.register(service.kind(), Box::new(DynDnsFactory::new(service)))?;
    }
    Ok(())
}
