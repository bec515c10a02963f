//! Router implementation backed by a device control adapter

use super::device::DeviceClient;
use super::Router;
use crate::config::DEFAULT_PROBE_TIMEOUT;
use crate::model::{PortMapping, Protocol};
use crate::{Result, RouterError};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// A [`Router`] that drives a [`DeviceClient`]
///
/// All device failures are wrapped in [`RouterError`]. The device is dropped
/// on [`Router::disconnect`].
pub struct DeviceRouter<D> {
    name: String,
    device: Option<D>,
    probe_timeout: Duration,
}

impl<D: DeviceClient> DeviceRouter<D> {
    /// Wrap a connected device
    pub fn new(device: D) -> Self {
        Self {
            name: device.description().friendly_name.clone(),
            device: Some(device),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set the connect timeout used by [`Router::local_host_address`]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Whether [`Router::disconnect`] has been called
    pub fn is_disconnected(&self) -> bool {
        self.device.is_none()
    }

    /// The wrapped device, `None` after disconnecting
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    fn connected_device(&self) -> Result<&D> {
        self.device
            .as_ref()
            .ok_or_else(|| RouterError::new(format!("Router '{}' is disconnected", self.name)))
    }
}

impl<D: DeviceClient> Router for DeviceRouter<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn internal_host_name(&self) -> Option<String> {
        let device = self.device.as_ref()?;
        let url = device.description().presentation_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        match Url::parse(url) {
            Ok(parsed) => parsed.host_str().map(str::to_string),
            Err(e) => {
                warn!("Could not get URL for internal host name '{}': {}", url, e);
                Some(url.to_string())
            }
        }
    }

    fn internal_port(&self) -> Result<u16> {
        let description = self.connected_device()?.description();
        let presentation_url = description
            .presentation_url
            .as_deref()
            .filter(|url| !url.trim().is_empty());
        let url = match presentation_url {
            Some(url) => url,
            None => {
                info!("Presentation url is not set: use url base");
                description
                    .url_base
                    .as_deref()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| {
                        RouterError::new(format!(
                            "Presentation URL and URL base of router '{}' are not set",
                            self.name
                        ))
                    })?
            }
        };

        let parsed = Url::parse(url.trim()).map_err(|e| {
            RouterError::with_source(format!("Could not get internal port from URL '{}'", url), e)
        })?;
        // 0 without an explicit port, the local address lookup then uses the default route
        Ok(parsed.port().unwrap_or(0))
    }

    fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    fn disconnect(&mut self) {
        if self.device.take().is_some() {
            debug!("Disconnected from router '{}'", self.name);
        }
    }

    fn external_ip_address(&self) -> Result<String> {
        self.connected_device()?.external_ip_address().map_err(|e| {
            warn!("GetExternalIPAddress on '{}' failed: {}", self.name, e);
            RouterError::with_source(
                format!("Could not get external IP address of router '{}'", self.name),
                e,
            )
        })
    }

    fn add_port_mapping(&self, mapping: &PortMapping) -> Result<()> {
        debug!("Adding port mapping {} on '{}'", mapping, self.name);
        self.connected_device()?
            .add_port_mapping(
                mapping.external_port(),
                mapping.internal_port(),
                mapping.internal_client(),
                mapping.protocol(),
                mapping.description(),
            )
            .map_err(|e| {
                warn!("AddPortMapping on '{}' failed: {}", self.name, e);
                RouterError::with_source(format!("Could not add port mapping {}", mapping), e)
            })
    }

    fn remove_port_mapping(
        &self,
        protocol: Protocol,
        remote_host: Option<&str>,
        external_port: u16,
    ) -> Result<()> {
        debug!(
            "Removing port mapping {} {}:{} on '{}'",
            protocol,
            remote_host.unwrap_or(""),
            external_port,
            self.name
        );
        self.connected_device()?
            .delete_port_mapping(remote_host, external_port, protocol)
            .map_err(|e| {
                warn!("DeletePortMapping on '{}' failed: {}", self.name, e);
                RouterError::with_source(
                    format!(
                        "Could not delete port mapping {} {}:{}",
                        protocol,
                        remote_host.unwrap_or(""),
                        external_port
                    ),
                    e,
                )
            })
    }

    fn port_mappings(&self) -> Result<Vec<PortMapping>> {
        let device = self.connected_device()?;
        Ok(collect_port_mappings(device, 0..=u32::MAX))
    }

    fn log_router_info(&self) {
        let Some(device) = self.device.as_ref() else {
            info!("Router '{}' is disconnected", self.name);
            return;
        };
        let description = device.description();

        let mut router_info = BTreeMap::new();
        router_info.insert("friendlyName", Some(description.friendly_name.as_str()));
        router_info.insert("manufacturer", description.manufacturer.as_deref());
        router_info.insert("modelDescription", description.model_description.as_deref());
        router_info.insert("modelName", description.model_name.as_deref());
        router_info.insert("modelNumber", description.model_number.as_deref());
        router_info.insert("serialNumber", description.serial_number.as_deref());

        for (key, value) in &router_info {
            info!("Router Info: {} \t= {}", key, value.unwrap_or(""));
        }
        info!("Location: {}", description.location);
        info!("Device type: {}", description.device_type);
    }
}

impl<D: DeviceClient> fmt::Display for DeviceRouter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            self.internal_host_name().unwrap_or_default()
        )
    }
}

/// Enumerate mappings over `indices` until the device reports a failure
///
/// Devices have no mapping count and no end marker, so the first failing
/// index ends the list. Indices without an entry are skipped.
pub(crate) fn collect_port_mappings<D: DeviceClient>(
    device: &D,
    indices: RangeInclusive<u32>,
) -> Vec<PortMapping> {
    let mut mappings = Vec::new();
    for index in indices {
        debug!("Getting port mapping {}...", index);
        match device.generic_port_mapping_entry(index) {
            Ok(Some(entry)) => {
                debug!("Got port mapping {}: {:?}", index, entry);
                mappings.push(PortMapping::new(
                    Protocol::from_device_str(&entry.protocol),
                    Some(entry.remote_host),
                    entry.external_port,
                    entry.internal_client,
                    entry.internal_port,
                    entry.description,
                ));
            }
            Ok(None) => debug!("Got no port mapping for index {}", index),
            Err(e) => {
                debug!(
                    "Got error '{}' for index {}, stop getting more mappings",
                    e, index
                );
                break;
            }
        }
    }
    mappings
}
