//! Router discovery strategy

use super::Router;
use crate::Result;
use crate::config::DiscoveryConfig;
use tracing::{debug, info};

/// Finds routers using one discovery and control technology
pub trait RouterFactory {
    /// Name of the technology, for display
    fn name(&self) -> &str;

    /// Find routers, or connect directly when a location URL is configured
    ///
    /// With `config.location_url` set, discovery is never attempted and the
    /// result holds exactly one router. Otherwise every responding device is
    /// returned; finding none is not an error.
    fn find_routers(&self, config: &DiscoveryConfig) -> Result<Vec<Box<dyn Router>>> {
        match config.location_url.as_deref() {
            Some(location_url) => {
                info!("Trying to connect using location url {}", location_url);
                Ok(vec![self.connect(location_url, config)?])
            }
            None => {
                debug!("No location url configured: discover routers automatically");
                self.find_routers_internal(config)
            }
        }
    }

    /// Search the network for routers
    fn find_routers_internal(&self, config: &DiscoveryConfig) -> Result<Vec<Box<dyn Router>>>;

    /// Connect to the router described at `location_url`
    fn connect(&self, location_url: &str, config: &DiscoveryConfig) -> Result<Box<dyn Router>>;
}
