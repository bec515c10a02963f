//! Router abstraction for UPnP Internet Gateway Devices
//!
//! A [`Router`] is one discovered gateway. A [`RouterFactory`] finds routers,
//! either by searching the network or by connecting directly to a known
//! device description. [`DeviceRouter`] implements the router contract on top
//! of any [`DeviceClient`], and the `igd` module provides the UPnP client
//! used in production.

// Submodules
pub mod description;
pub mod device;
pub mod device_router;
pub mod factory;
pub mod igd;
pub mod soap;

// Re-export commonly used types
pub use description::{DeviceDescription, WanService};
pub use device::{DeviceClient, DeviceError, PortMappingEntry};
pub use device_router::DeviceRouter;
pub use factory::RouterFactory;
pub use igd::{IgdDevice, IgdRouterFactory};
pub use soap::SoapEndpoint;

use crate::config::DEFAULT_PROBE_TIMEOUT;
use crate::model::{PortMapping, Protocol};
use crate::{Result, RouterError};
use std::fmt;
use std::net::{IpAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// Remote address used to look up the default route (no packet is sent)
const ROUTING_TEST_ADDRESS: &str = "8.8.8.8:80";

/// A gateway device that can manage NAT port mappings
pub trait Router {
    /// Friendly name advertised by the device
    fn name(&self) -> &str;

    /// Host of the device's presentation URL, if it advertises one
    fn internal_host_name(&self) -> Option<String>;

    /// Control port derived from the presentation URL or URL base
    fn internal_port(&self) -> Result<u16>;

    /// Connect timeout used when probing the router for the local address
    fn probe_timeout(&self) -> Duration {
        DEFAULT_PROBE_TIMEOUT
    }

    /// The IP address of this machine as the router sees it
    ///
    /// Connects to the router's internal host and port and reads the local
    /// end of the connection, which picks the right interface on multi-homed
    /// machines. Falls back to the default route address when the router
    /// cannot be reached. Loopback addresses are rejected.
    fn local_host_address(&self) -> Result<String> {
        debug!("Get IP of localhost");

        let from_socket = match self.internal_port() {
            Ok(port) if port > 0 => match self.internal_host_name() {
                Some(host) => address_from_socket(&host, port, self.probe_timeout())?,
                None => {
                    debug!("Router has no internal host name, can not probe it");
                    None
                }
            },
            Ok(port) => {
                debug!("Got invalid internal router port number {}", port);
                None
            }
            Err(e) => {
                debug!("Could not get internal router port: {}", e);
                None
            }
        };

        let address = match from_socket {
            Some(address) => address,
            None => {
                debug!(
                    "Not connected to router or got invalid port number, using default route address"
                );
                default_route_address()?
            }
        };

        let address = address.to_string();
        if address.starts_with("127.") {
            return Err(RouterError::new(format!(
                "Only found an address that begins with '127.' when retrieving IP of localhost: {}",
                address
            )));
        }
        Ok(address)
    }

    /// Release any resources held for the device
    ///
    /// Calling this more than once has no further effect. Control operations
    /// fail after disconnecting.
    fn disconnect(&mut self);

    /// External (WAN) IP address of the gateway
    fn external_ip_address(&self) -> Result<String>;

    /// Add a single port mapping
    fn add_port_mapping(&self, mapping: &PortMapping) -> Result<()>;

    /// Add mappings in order, stopping at the first failure
    fn add_port_mappings(&self, mappings: &[PortMapping]) -> Result<()> {
        for mapping in mappings {
            self.add_port_mapping(mapping)?;
        }
        Ok(())
    }

    /// Remove a mapping, identified by protocol, remote host and external port
    fn remove_mapping(&self, mapping: &PortMapping) -> Result<()> {
        self.remove_port_mapping(
            mapping.protocol(),
            mapping.remote_host(),
            mapping.external_port(),
        )
    }

    /// Remove the mapping with the given key
    fn remove_port_mapping(
        &self,
        protocol: Protocol,
        remote_host: Option<&str>,
        external_port: u16,
    ) -> Result<()>;

    /// All port mappings currently configured on the device
    fn port_mappings(&self) -> Result<Vec<PortMapping>>;

    /// Log device metadata for diagnostics
    fn log_router_info(&self);
}

impl fmt::Display for dyn Router + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name(),
            self.internal_host_name().unwrap_or_default()
        )
    }
}

/// Local address of a transient TCP connection to `host:port`
///
/// Returns `Ok(None)` when the router can not be reached. Failure to resolve
/// the host name is fatal.
fn address_from_socket(host: &str, port: u16, timeout: Duration) -> Result<Option<IpAddr>> {
    debug!("Creating socket to router: {}:{}...", host, port);

    let addrs = (host, port).to_socket_addrs().map_err(|e| {
        RouterError::with_source(format!("Could not create socket to {}:{}", host, port), e)
    })?;

    for addr in addrs {
        // The stream is closed when it goes out of scope
        let stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Could not connect to {}: {}", addr, e);
                continue;
            }
        };
        match stream.local_addr() {
            Ok(local) => {
                debug!("Got address {} from socket.", local.ip());
                return Ok(Some(local.ip()));
            }
            Err(e) => debug!("Could not read local address of socket to {}: {}", addr, e),
        }
    }
    Ok(None)
}

/// Address of the interface the OS would use for the default route
fn default_route_address() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| RouterError::with_source("Could not get IP of localhost.", e))?;
    socket
        .connect(ROUTING_TEST_ADDRESS)
        .map_err(|e| RouterError::with_source("Could not get IP of localhost.", e))?;
    let local = socket
        .local_addr()
        .map_err(|e| RouterError::with_source("Could not get IP of localhost.", e))?;

    debug!("Got address {} from default route.", local.ip());
    Ok(local.ip())
}
