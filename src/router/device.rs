//! Device control adapter boundary
//!
//! A [`DeviceClient`] speaks the wire protocol to one gateway. Routers only
//! orchestrate calls to it and translate its failures into
//! [`RouterError`](crate::RouterError).

use super::description::DeviceDescription;
use crate::model::Protocol;
use thiserror::Error;

/// One row of a gateway's port mapping table, as reported by the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMappingEntry {
    /// Remote host restriction, empty for any host
    pub remote_host: String,
    /// External port
    pub external_port: u16,
    /// Protocol exactly as the device reported it
    pub protocol: String,
    /// Internal client host
    pub internal_client: String,
    /// Internal port
    pub internal_port: u16,
    /// Whether the mapping is enabled
    pub enabled: bool,
    /// Mapping description
    pub description: String,
    /// Remaining lease in seconds, 0 for permanent
    pub lease_duration: u32,
}

/// Errors reported by a device adapter
#[derive(Debug, Error)]
pub enum DeviceError {
    /// HTTP request to the device failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Description was not well-formed XML
    #[error("XML error: {0}")]
    Xml(#[from] xmltree::ParseError),

    /// Description is missing required elements
    #[error("Invalid device description: {0}")]
    InvalidDescription(String),

    /// A URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Gateway search failed
    #[error("Search failed: {0}")]
    Search(#[from] igd_next::SearchError),

    /// AddPortMapping failed
    #[error("AddPortMapping failed: {0}")]
    AddPort(#[from] igd_next::AddPortError),

    /// DeletePortMapping failed
    #[error("DeletePortMapping failed: {0}")]
    RemovePort(#[from] igd_next::RemovePortError),

    /// GetExternalIPAddress failed
    #[error("GetExternalIPAddress failed: {0}")]
    ExternalIp(#[from] igd_next::GetExternalIpError),

    /// A SOAP control call returned a fault or an unreadable response
    #[error("{action} failed: {message}")]
    Soap {
        /// Name of the control action
        action: &'static str,
        /// What went wrong
        message: String,
    },

    /// Argument rejected before reaching the device
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Wire-level control of a single gateway device
pub trait DeviceClient {
    /// Metadata from the device description
    fn description(&self) -> &DeviceDescription;

    /// Add a permanent port mapping
    fn add_port_mapping(
        &self,
        external_port: u16,
        internal_port: u16,
        internal_client: &str,
        protocol: Protocol,
        description: &str,
    ) -> Result<(), DeviceError>;

    /// Delete the mapping identified by remote host, external port and protocol
    fn delete_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: Protocol,
    ) -> Result<(), DeviceError>;

    /// Fetch the mapping at a positional index
    ///
    /// Fails once `index` is past the end of the device's mapping table. An
    /// `Ok(None)` means the device answered without an entry for this index.
    fn generic_port_mapping_entry(&self, index: u32) -> Result<Option<PortMappingEntry>, DeviceError>;

    /// Query the gateway's external IP address
    fn external_ip_address(&self) -> Result<String, DeviceError>;
}
