// # Cloudflare DNS Provider
//
// Cloudflare API v4 strategy for the `Cloudflare` endpoint identifier.
//
// ## Protocol
//
// - `initialize`: binds the API token (Zone:DNS:Edit permission)
// - `is_up_to_date`: finds the zone and the A/AAAA record, compares content
// - `update`: PUT of the existing record, POST when the record is missing
//
// Each call does its own lookups. Nothing is cached between calls or passes.
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to the Cloudflare API only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (owned by the controller)
// - ❌ Read or write resource status (owned by the reconciler)
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - An empty token is rejected by `initialize`
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`

use async_trait::async_trait;
use dnsync_core::provider::{ProviderKind, ProviderSelector};
use dnsync_core::traits::{DnsProvider, DnsProviderFactory, ProviderSettings};
use dnsync_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::IpAddr;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const PROVIDER: &str = "cloudflare";

/// TTL of created records; 1 means "automatic"
const AUTO_TTL: u32 = 1;

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    ttl: Option<u32>,
}

/// Where a record lives and what it currently holds
struct Lookup {
    zone_id: String,
    record: Option<DnsRecord>,
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended PUT/POST payload
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    api_token: Option<String>,

    api_base: String,

    client: reqwest::Client,

    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &self.api_token.as_ref().map(|_| "<REDACTED>"))
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create an unbound provider
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token: None,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run: settings.dry_run,
        })
    }

    /// Talk to a different API base (e.g. a mock server)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| Error::provider(PROVIDER, "provider used before initialize"))
    }

    /// Send an authenticated request and return the decoded envelope
    async fn call(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Value> {
        let response = request
            .bearer_auth(self.token()?)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER, format!("{}: HTTP request failed: {}", context, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &error_text, context));
        }

        let body: Value = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("{}: Failed to parse response: {}", context, e))
        })?;

        if body["success"] == Value::Bool(false) {
            return Err(Error::provider(
                PROVIDER,
                format!("{} rejected: {}", context, api_errors(&body)),
            ));
        }

        Ok(body)
    }

    /// Find the zone serving `fqdn`
    ///
    /// Walks the name's suffixes from longest to shortest, stopping at two
    /// labels, so `a.b.example.co.uk` tries `a.b.example.co.uk`,
    /// `b.example.co.uk`, `example.co.uk` and `co.uk`.
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn find_zone(&self, fqdn: &str) -> Result<String> {
        for candidate in zone_candidates(fqdn) {
            tracing::debug!("Looking up zone {}", candidate);
            let body = self
                .call(
                    self.client
                        .get(format!("{}/zones", self.api_base))
                        .query(&[("name", candidate)]),
                    "Zone lookup",
                )
                .await?;

            let zones: Vec<Zone> = parse_result(&body, "Zone lookup")?;
            if let Some(zone) = zones.into_iter().next() {
                tracing::debug!("Found zone {} ({})", zone.name, zone.id);
                return Ok(zone.id);
            }
        }

        Err(Error::provider(
            PROVIDER,
            format!("No Cloudflare zone found for {}", fqdn),
        ))
    }

    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecord>> {
        tracing::debug!("Looking up {} record for {}", record_type, fqdn);
        let body = self
            .call(
                self.client
                    .get(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
                    .query(&[("name", fqdn), ("type", record_type)]),
                "Record lookup",
            )
            .await?;

        let records: Vec<DnsRecord> = parse_result(&body, "Record lookup")?;
        Ok(records.into_iter().next())
    }

    async fn lookup(&self, fqdn: &str, record_type: &str) -> Result<Lookup> {
        let zone_id = self.find_zone(fqdn).await?;
        let record = self.find_record(&zone_id, fqdn, record_type).await?;
        Ok(Lookup { zone_id, record })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn initialize(&mut self, auth_token: &str) -> Result<()> {
        let token = auth_token.trim();
        if token.is_empty() {
            return Err(Error::provider(PROVIDER, "Cloudflare API token cannot be empty"));
        }
        self.api_token = Some(token.to_string());
        Ok(())
    }

    async fn is_up_to_date(&self, fqdn: &str, address: &str) -> Result<bool> {
        let (ip, record_type) = parse_address(address)?;
        let lookup = self.lookup(fqdn, record_type).await?;

        Ok(match lookup.record {
            Some(record) => content_matches(&record.content, ip),
            None => {
                tracing::debug!("No {} record for {} yet", record_type, fqdn);
                false
            }
        })
    }

    /// Point the record at `address`
    ///
    /// # API Calls
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// { "type": "A", "name": "home.example.com", "content": "1.2.3.4", ... }
    /// ```
    async fn update(&self, fqdn: &str, address: &str) -> Result<()> {
        let (ip, record_type) = parse_address(address)?;
        let lookup = self.lookup(fqdn, record_type).await?;

        let (request, payload, previous) = match &lookup.record {
            Some(record) => {
                let payload = json!({
                    "type": record_type,
                    "name": fqdn,
                    "content": ip.to_string(),
                    "ttl": record.ttl.unwrap_or(AUTO_TTL),
                    "proxied": record.proxied.unwrap_or(false),
                });
                let url = format!(
                    "{}/zones/{}/dns_records/{}",
                    self.api_base, lookup.zone_id, record.id
                );
                (self.client.put(url), payload, Some(record.content.as_str()))
            }
            None => {
                let payload = json!({
                    "type": record_type,
                    "name": fqdn,
                    "content": ip.to_string(),
                    "ttl": AUTO_TTL,
                    "proxied": false,
                });
                let url = format!("{}/zones/{}/dns_records", self.api_base, lookup.zone_id);
                (self.client.post(url), payload, None)
            }
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would {} {} record {} -> {} (was: {}) with payload: {}",
                if previous.is_some() { "update" } else { "create" },
                record_type,
                fqdn,
                ip,
                previous.unwrap_or("none"),
                payload
            );
            return Ok(());
        }

        self.call(request.json(&payload), "Record update").await?;
        tracing::info!(
            "Cloudflare {} record updated: {} -> {} (was: {})",
            record_type,
            fqdn,
            ip,
            previous.unwrap_or("none")
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Map a non-success status to a provider error
fn status_error(status: StatusCode, error_text: &str, context: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("{}: Not found. Status: {}", context, status),
        409 => format!(
            "Conflict: Record is being updated by another process. Status: {}",
            status
        ),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!(
            "Cloudflare server error (transient): {} - {}",
            status, error_text
        ),
        _ => format!("{} failed: {} - {}", context, status, error_text),
    };
    Error::provider(PROVIDER, message)
}

fn api_errors(body: &Value) -> String {
    let messages: Vec<String> = body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|e| match (e["code"].as_i64(), e["message"].as_str()) {
                    (Some(code), Some(message)) => format!("{} ({})", message, code),
                    (None, Some(message)) => message.to_string(),
                    _ => e.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    if messages.is_empty() {
        "unknown error".to_string()
    } else {
        messages.join("; ")
    }
}

fn parse_result<T: serde::de::DeserializeOwned>(body: &Value, context: &str) -> Result<T> {
    serde_json::from_value(body["result"].clone()).map_err(|e| {
        Error::provider(
            PROVIDER,
            format!("{}: Invalid response format: {}", context, e),
        )
    })
}

fn parse_address(address: &str) -> Result<(IpAddr, &'static str)> {
    let ip: IpAddr = address.parse().map_err(|_| {
        Error::provider(PROVIDER, format!("'{}' is not an IP address", address))
    })?;
    let record_type = match ip {
        IpAddr::V4(_) => "A",
        IpAddr::V6(_) => "AAAA",
    };
    Ok((ip, record_type))
}

fn content_matches(content: &str, ip: IpAddr) -> bool {
    content
        .parse::<IpAddr>()
        .map(|current| current == ip)
        .unwrap_or(false)
}

fn zone_candidates(fqdn: &str) -> Vec<&str> {
    let name = fqdn.trim_end_matches('.');
    let labels = name.split('.').count();
    if labels < 2 {
        return Vec::new();
    }

    let mut candidates = vec![name];
    let mut rest = name;
    for _ in 0..labels - 2 {
        match rest.split_once('.') {
            Some((_, tail)) => {
                candidates.push(tail);
                rest = tail;
            }
            None => break,
        }
    }
    candidates
}

/// Factory for creating Cloudflare providers
#[derive(Debug, Default, Clone)]
pub struct CloudflareFactory {
    api_base: Option<String>,
}

impl CloudflareFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose providers talk to `api_base`
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: Some(api_base.into()),
        }
    }
}

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Box<dyn DnsProvider>> {
        let mut provider = CloudflareProvider::new(settings)?;
        if let Some(base) = &self.api_base {
            provider = provider.with_api_base(base.clone());
        }
        if settings.dry_run {
            tracing::debug!("Cloudflare provider running in DRY-RUN mode");
        }
        Ok(Box::new(provider))
    }
}

/// Register the Cloudflare strategy with a selector
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderSelector;
/// use dnsync_core::traits::ProviderSettings;
///
/// let selector = ProviderSelector::new(ProviderSettings::default());
/// dnsync_provider_cloudflare::register(&selector).unwrap();
/// ```
pub fn register(selector: &ProviderSelector) -> Result<()> {
    selector.register(ProviderKind::Cloudflare, Box::new(CloudflareFactory::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CloudflareProvider {
        CloudflareProvider::new(&ProviderSettings::default()).unwrap()
    }

    #[test]
    fn test_zone_candidates() {
        assert_eq!(
            zone_candidates("a.b.example.co.uk."),
            vec!["a.b.example.co.uk", "b.example.co.uk", "example.co.uk", "co.uk"]
        );
        assert_eq!(zone_candidates("example.com"), vec!["example.com"]);
        assert!(zone_candidates("localhost").is_empty());
    }

    #[test]
    fn test_record_type_from_address() {
        assert_eq!(parse_address("203.0.113.7").unwrap().1, "A");
        assert_eq!(parse_address("2001:db8::1").unwrap().1, "AAAA");
        assert!(parse_address("not-an-ip").unwrap_err().is_provider());
    }

    #[test]
    fn test_content_comparison_normalizes_ipv6() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(content_matches("2001:0db8:0000:0000:0000:0000:0000:0001", ip));
        assert!(!content_matches("2001:db8::2", ip));
        assert!(!content_matches("", ip));
    }

    #[test]
    fn test_status_mapping() {
        let auth = status_error(StatusCode::FORBIDDEN, "", "Zone lookup").to_string();
        assert!(auth.contains("Authentication failed"));

        let conflict = status_error(StatusCode::CONFLICT, "", "Record update").to_string();
        assert!(conflict.contains("Conflict"));

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, "", "Record update").to_string();
        assert!(limited.contains("Rate limit"));

        let transient =
            status_error(StatusCode::BAD_GATEWAY, "upstream", "Zone lookup").to_string();
        assert!(transient.contains("transient"));
    }

    #[test]
    fn test_api_errors_formatting() {
        let body = json!({
            "success": false,
            "errors": [{ "code": 9109, "message": "Invalid access token" }]
        });
        assert_eq!(api_errors(&body), "Invalid access token (9109)");
        assert_eq!(api_errors(&json!({ "success": false })), "unknown error");
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let mut provider = provider();
        assert!(provider.initialize("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let provider = provider();
        let err = provider
            .is_up_to_date("home.example.com", "203.0.113.7")
            .await
            .unwrap_err();
        assert!(err.is_provider());
    }

    #[tokio::test]
    async fn test_api_token_not_exposed_in_debug() {
        let mut provider = provider();
        provider.initialize("secret_token_12345").await.unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("<REDACTED>"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_custom_endpoint_override_unsupported() {
        let mut provider = provider();
        assert!(provider.set_api_endpoint("https://example.net").is_err());
    }

    #[test]
    fn test_register() {
        let selector = ProviderSelector::new(ProviderSettings::default());
        register(&selector).unwrap();
        assert!(selector.has_provider(&ProviderKind::Cloudflare));
    }

    #[test]
    fn test_dry_run_follows_settings() {
        let settings = ProviderSettings {
            dry_run: true,
            ..ProviderSettings::default()
        };
        assert!(CloudflareProvider::new(&settings).unwrap().is_dry_run());
        assert!(!provider().is_dry_run());
    }
}
