//! Discovery configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Environment variable holding a direct control-endpoint location URL
pub const LOCATION_URL_ENV: &str = "PORTMAPPER_LOCATION_URL";

/// Default timeout for the SSDP gateway search
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for the local address probe connection
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for fetching device and service descriptions
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings passed to a [`RouterFactory`](crate::RouterFactory) for each discovery
///
/// When `location_url` is set, discovery is skipped and the factory connects
/// directly to that device description, e.g.
/// `http://192.168.179.1:49000/igddesc.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Direct location of a device description, bypassing discovery
    pub location_url: Option<String>,
    /// How long to wait for gateways to answer the search
    pub search_timeout: Duration,
    /// Connect timeout for the local address probe
    pub probe_timeout: Duration,
    /// Timeout for HTTP requests to the device
    pub http_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            location_url: None,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl DiscoveryConfig {
    /// Default configuration with the location override read from the environment
    pub fn from_env() -> Self {
        let location_url = std::env::var(LOCATION_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        match &location_url {
            Some(url) => debug!("{} set to {}", LOCATION_URL_ENV, url),
            None => debug!("{} not set: discover routers automatically", LOCATION_URL_ENV),
        }
        Self {
            location_url,
            ..Self::default()
        }
    }

    /// Connect directly to the given location instead of discovering
    pub fn with_location_url(mut self, location_url: impl Into<String>) -> Self {
        self.location_url = Some(location_url.into());
        self
    }

    /// Set the gateway search timeout
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Set the local address probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}
