//! UPnP IGD (Internet Gateway Device) routers
//!
//! Discovery uses SSDP through `igd-next`, which then speaks SOAP to the
//! gateway's WAN connection service. Device metadata (name, manufacturer,
//! presentation URL) is not exposed by `igd-next`, so the device description
//! is fetched and parsed separately.

use super::description::{DeviceDescription, parse_control_schema};
use super::device::{DeviceClient, DeviceError, PortMappingEntry};
use super::device_router::DeviceRouter;
use super::factory::RouterFactory;
use super::soap::SoapEndpoint;
use super::Router;
use crate::config::DiscoveryConfig;
use crate::model::Protocol;
use crate::{Result, RouterError};
use igd_next::{Gateway, PortMappingProtocol, SearchError, SearchOptions};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Lease duration for new mappings, 0 means permanent
const PERMANENT_LEASE: u32 = 0;

/// Service `igd-next` controls when the description names none
const DEFAULT_SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";

fn to_igd_protocol(protocol: Protocol) -> PortMappingProtocol {
    match protocol {
        Protocol::Tcp => PortMappingProtocol::TCP,
        Protocol::Udp => PortMappingProtocol::UDP,
    }
}

// Gateways are on the local network and never reached through a proxy
fn http_client(timeout: Duration) -> std::result::Result<reqwest::blocking::Client, DeviceError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()?)
}

fn fetch_text(
    client: &reqwest::blocking::Client,
    url: &str,
) -> std::result::Result<String, DeviceError> {
    debug!("Fetching {}", url);
    Ok(client.get(url).send()?.error_for_status()?.text()?)
}

/// Path and query of a URL, as `igd-next` expects for gateway endpoints
fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Result of a gateway search, `None` when no gateway answered in time
///
/// `igd-next` reports the search timeout as the socket read error it is.
pub(crate) fn gateway_from_search(
    result: std::result::Result<Gateway, SearchError>,
) -> Result<Option<Gateway>> {
    match result {
        Ok(gateway) => Ok(Some(gateway)),
        Err(SearchError::IoError(e))
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
        {
            Ok(None)
        }
        Err(e) => Err(RouterError::with_source(
            "Could not discover UPnP gateways",
            DeviceError::from(e),
        )),
    }
}

/// A gateway controlled through `igd-next`
///
/// Mapping table reads go through [`SoapEndpoint`] so that the protocol
/// reaches the router exactly as the device reported it.
#[derive(Clone)]
pub struct IgdDevice {
    gateway: Gateway,
    description: DeviceDescription,
    soap: SoapEndpoint,
}

impl IgdDevice {
    /// Combine a discovered gateway with its device description
    ///
    /// SOAP calls go to the WAN service of the description, or to the
    /// gateway's control URL when the description names none.
    pub fn new(
        gateway: Gateway,
        description: DeviceDescription,
        client: reqwest::blocking::Client,
    ) -> Self {
        let soap = match &description.wan_service {
            Some(service) => {
                SoapEndpoint::new(client, &service.control_url, &service.service_type)
            }
            None => SoapEndpoint::new(
                client,
                format!("http://{}{}", gateway.addr, gateway.control_url),
                DEFAULT_SERVICE_TYPE,
            ),
        };
        Self {
            gateway,
            description,
            soap,
        }
    }

    /// Connect to the device described at `location`
    ///
    /// Fetches the device description and the WAN connection service
    /// description and builds the gateway handle from them.
    pub fn connect(location: &Url, http_timeout: Duration) -> std::result::Result<Self, DeviceError> {
        let client = http_client(http_timeout)?;

        let xml = fetch_text(&client, location.as_str())?;
        let description = DeviceDescription::parse(&xml, location.as_str())?;
        let service = description.wan_service.clone().ok_or_else(|| {
            DeviceError::InvalidDescription(
                "no WANIPConnection or WANPPPConnection service".to_string(),
            )
        })?;
        debug!(
            "Found {} with control URL {}",
            service.service_type, service.control_url
        );

        let scpd = fetch_text(&client, &service.scpd_url)?;
        let control_schema = parse_control_schema(&scpd)?;

        let control_url = Url::parse(&service.control_url)?;
        let scpd_url = Url::parse(&service.scpd_url)?;
        let addr = control_url
            .socket_addrs(|| None)
            .ok()
            .and_then(|addrs| addrs.into_iter().next())
            .ok_or_else(|| {
                DeviceError::InvalidDescription(format!(
                    "can not resolve control URL {}",
                    service.control_url
                ))
            })?;

        let gateway = Gateway {
            addr,
            root_url: request_path(location),
            control_url: request_path(&control_url),
            control_schema_url: request_path(&scpd_url),
            control_schema,
        };
        Ok(Self::new(gateway, description, client))
    }

    /// The underlying gateway handle
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Endpoint used for mapping table reads
    pub fn soap(&self) -> &SoapEndpoint {
        &self.soap
    }
}

impl DeviceClient for IgdDevice {
    fn description(&self) -> &DeviceDescription {
        &self.description
    }

    fn add_port_mapping(
        &self,
        external_port: u16,
        internal_port: u16,
        internal_client: &str,
        protocol: Protocol,
        description: &str,
    ) -> std::result::Result<(), DeviceError> {
        let client: IpAddr = internal_client.trim().parse().map_err(|_| {
            DeviceError::InvalidArgument(format!(
                "internal client '{}' is not an IP address",
                internal_client
            ))
        })?;
        self.gateway.add_port(
            to_igd_protocol(protocol),
            external_port,
            SocketAddr::new(client, internal_port),
            PERMANENT_LEASE,
            description,
        )?;
        Ok(())
    }

    fn delete_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: Protocol,
    ) -> std::result::Result<(), DeviceError> {
        // igd-next always sends an empty NewRemoteHost
        if let Some(host) = remote_host {
            debug!("Deleting mapping for remote host {} as wildcard", host);
        }
        self.gateway
            .remove_port(to_igd_protocol(protocol), external_port)?;
        Ok(())
    }

    fn generic_port_mapping_entry(
        &self,
        index: u32,
    ) -> std::result::Result<Option<PortMappingEntry>, DeviceError> {
        self.soap.generic_port_mapping_entry(index)
    }

    fn external_ip_address(&self) -> std::result::Result<String, DeviceError> {
        Ok(self.gateway.get_external_ip()?.to_string())
    }
}

/// Router factory for UPnP Internet Gateway Devices
#[derive(Debug, Clone, Copy, Default)]
pub struct IgdRouterFactory;

impl IgdRouterFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }

    fn wrap(device: IgdDevice, config: &DiscoveryConfig) -> Box<dyn Router> {
        Box::new(DeviceRouter::new(device).with_probe_timeout(config.probe_timeout))
    }
}

impl RouterFactory for IgdRouterFactory {
    fn name(&self) -> &str {
        "UPnP IGD (igd-next)"
    }

    fn find_routers_internal(&self, config: &DiscoveryConfig) -> Result<Vec<Box<dyn Router>>> {
        info!(
            "Searching for UPnP IGD gateways (timeout: {:?})...",
            config.search_timeout
        );
        let search = igd_next::search_gateway(SearchOptions {
            timeout: Some(config.search_timeout),
            ..Default::default()
        });
        let Some(gateway) = gateway_from_search(search)? else {
            info!("No UPnP gateway answered the search");
            return Ok(Vec::new());
        };

        let location = format!("http://{}{}", gateway.addr, gateway.root_url);
        info!("Found UPnP gateway at {}", location);

        let (client, description) = http_client(config.http_timeout)
            .and_then(|client| {
                let xml = fetch_text(&client, &location)?;
                let description = DeviceDescription::parse(&xml, &location)?;
                Ok((client, description))
            })
            .map_err(|e| {
                RouterError::with_source(
                    format!("Could not read device description from {}", location),
                    e,
                )
            })?;

        Ok(vec![Self::wrap(
            IgdDevice::new(gateway, description, client),
            config,
        )])
    }

    fn connect(&self, location_url: &str, config: &DiscoveryConfig) -> Result<Box<dyn Router>> {
        let location = Url::parse(location_url.trim()).map_err(|e| {
            RouterError::with_source(format!("Invalid location URL '{}'", location_url), e)
        })?;
        if !matches!(location.scheme(), "http" | "https") {
            return Err(RouterError::new(format!(
                "Unsupported scheme '{}' in location URL '{}'",
                location.scheme(),
                location_url
            )));
        }

        let device = IgdDevice::connect(&location, config.http_timeout).map_err(|e| {
            RouterError::with_source(format!("Could not connect to router at {}", location_url), e)
        })?;
        info!(
            "Connected to router '{}' at {}",
            device.description().friendly_name,
            location_url
        );
        Ok(Self::wrap(device, config))
    }
}
