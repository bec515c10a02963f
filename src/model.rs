//! Port mapping value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Transport protocol a NAT rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// TCP protocol
    Tcp,
    /// UDP protocol
    Udp,
}

impl Protocol {
    /// Wire name used in control requests
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }

    /// Normalize a protocol string reported by a device
    ///
    /// Devices are inconsistent about casing, so `"TCP"` is matched ignoring
    /// case. Every other value, including unknown ones, is treated as UDP.
    /// Use [`str::parse`] for strict parsing of user input.
    pub fn from_device_str(value: &str) -> Self {
        if value.eq_ignore_ascii_case("TCP") {
            Protocol::Tcp
        } else {
            Protocol::Udp
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a protocol name is neither TCP nor UDP
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown protocol '{0}', expected TCP or UDP")]
pub struct ParseProtocolError(String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("TCP") {
            Ok(Protocol::Tcp)
        } else if s.eq_ignore_ascii_case("UDP") {
            Ok(Protocol::Udp)
        } else {
            Err(ParseProtocolError(s.to_string()))
        }
    }
}

/// A NAT rule forwarding an external port to an internal host and port
///
/// Mappings are immutable once constructed. An empty remote host means "any
/// remote host" and is stored as absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    protocol: Protocol,
    remote_host: Option<String>,
    external_port: u16,
    internal_client: String,
    internal_port: u16,
    description: String,
}

impl PortMapping {
    /// Create a new port mapping
    pub fn new(
        protocol: Protocol,
        remote_host: Option<String>,
        external_port: u16,
        internal_client: impl Into<String>,
        internal_port: u16,
        description: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            remote_host: remote_host.filter(|host| !host.trim().is_empty()),
            external_port,
            internal_client: internal_client.into(),
            internal_port,
            description: description.into(),
        }
    }

    /// Transport protocol
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Remote host restriction, `None` for any host
    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    /// Remote host for display, empty for any host
    pub fn remote_host_display(&self) -> &str {
        self.remote_host.as_deref().unwrap_or("")
    }

    /// External (router-facing) port
    pub fn external_port(&self) -> u16 {
        self.external_port
    }

    /// Internal (LAN) host receiving the forwarded traffic
    pub fn internal_client(&self) -> &str {
        &self.internal_client
    }

    /// Internal (LAN) port receiving the forwarded traffic
    pub fn internal_port(&self) -> u16 {
        self.internal_port
    }

    /// Free-form description shown by the router
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The part of the mapping that identifies it for removal
    pub fn key(&self) -> (Protocol, Option<&str>, u16) {
        (self.protocol, self.remote_host(), self.external_port)
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{} ({})",
            self.protocol,
            self.remote_host_display(),
            self.external_port,
            self.internal_client,
            self.internal_port,
            self.description
        )
    }
}
