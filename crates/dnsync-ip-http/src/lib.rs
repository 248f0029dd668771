// # HTTP Public IP Source
//
// Detects the caller's public address by asking plain-text echo services
// (e.g., api.ipify.org, ifconfig.me, icanhazip.com).
//
// ## Failover
//
// Services are tried in order. The first one that answers with an address of
// the accepted family wins. Request failures, HTTP errors, unparsable bodies
// and addresses of the wrong family move on to the next service. Detection
// fails only when every service has been tried.
//
// ## Not Cached
//
// Every `detect()` call goes to the network. The reconciler asks once per
// pass, and the pass interval is the polling interval.

use async_trait::async_trait;
use dnsync_core::config::IpSourceConfig;
use dnsync_core::traits::{IpVersion, PublicIpSource};
use dnsync_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based public IP source
#[derive(Debug, Clone)]
pub struct HttpPublicIpSource {
    /// Services to query, in order
    urls: Vec<String>,

    /// Accepted address family
    version: IpVersion,

    client: reqwest::Client,
}

impl HttpPublicIpSource {
    /// Create a source querying `urls` in order
    ///
    /// # Parameters
    ///
    /// - `urls`: Echo services returning the address as plain text
    /// - `version`: Accepted address family
    pub fn new(urls: Vec<String>, version: IpVersion) -> Result<Self> {
        Self::with_timeout(urls, version, DEFAULT_TIMEOUT)
    }

    /// Create with a custom per-request timeout
    pub fn with_timeout(urls: Vec<String>, version: IpVersion, timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("At least one IP source URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            urls,
            version,
            client,
        })
    }

    /// Create from the `ip_source` configuration section
    pub fn from_config(config: &IpSourceConfig) -> Result<Self> {
        config.validate()?;
        Self::with_timeout(config.urls.clone(), config.version, config.timeout())
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Fetch and validate the address from one service
    async fn fetch_ip(&self, url: &str) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!("HTTP error: {}", response.status())));
        }

        let ip_text = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;
        let ip_text = ip_text.trim();

        let ip: IpAddr = ip_text
            .parse()
            .map_err(|_| Error::invalid_input(format!("Invalid IP address: {}", ip_text)))?;

        if !self.version.accepts(&ip) {
            return Err(Error::invalid_input(format!(
                "Expected {:?} address, got: {}",
                self.version, ip
            )));
        }

        Ok(ip)
    }
}

#[async_trait]
impl PublicIpSource for HttpPublicIpSource {
    async fn detect(&self) -> Result<IpAddr> {
        let mut failures = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            match self.fetch_ip(url).await {
                Ok(ip) => {
                    tracing::debug!("Public address {} from {}", ip, url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("IP detection via {} failed: {}", url, e);
                    failures.push(format!("{}: {}", url, e));
                }
            }
        }

        Err(Error::address(format!(
            "all {} service(s) failed: {}",
            failures.len(),
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_a_url() {
        assert!(HttpPublicIpSource::new(Vec::new(), IpVersion::Both).is_err());
    }

    #[test]
    fn test_from_default_config() {
        let source = HttpPublicIpSource::from_config(&IpSourceConfig::default()).unwrap();
        assert_eq!(
            source.urls().len(),
            dnsync_core::config::DEFAULT_IP_SOURCE_URLS.len()
        );
    }

    #[test]
    fn test_from_config_validates() {
        let config = IpSourceConfig {
            timeout_secs: 0,
            ..IpSourceConfig::default()
        };
        assert!(HttpPublicIpSource::from_config(&config).is_err());
    }
}
