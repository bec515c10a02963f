//! SOAP control calls made without `igd-next`
//!
//! `igd-next` rejects `GetGenericPortMappingEntry` responses whose protocol is
//! not exactly `TCP` or `UDP`, and some devices report it in lower case. The
//! call is issued here instead and the protocol is passed on as reported.

use super::description::{child_elements, child_text};
use super::device::{DeviceError, PortMappingEntry};
use reqwest::blocking::Client;
use std::str::FromStr;
use tracing::debug;
use xmltree::Element;

const GET_GENERIC_PORT_MAPPING_ENTRY: &str = "GetGenericPortMappingEntry";
const GET_GENERIC_PORT_MAPPING_ENTRY_RESPONSE: &str = "GetGenericPortMappingEntryResponse";

/// Control endpoint of a WAN connection service
#[derive(Debug, Clone)]
pub struct SoapEndpoint {
    client: Client,
    control_url: String,
    service_type: String,
}

impl SoapEndpoint {
    /// Endpoint for the service `service_type` controlled at `control_url`
    pub fn new(client: Client, control_url: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            client,
            control_url: control_url.into(),
            service_type: service_type.into(),
        }
    }

    /// Absolute control URL
    pub fn control_url(&self) -> &str {
        &self.control_url
    }

    /// Service type URN sent in the `SOAPAction` header
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Fetch the mapping at `index`
    pub fn generic_port_mapping_entry(
        &self,
        index: u32,
    ) -> Result<Option<PortMappingEntry>, DeviceError> {
        let body = self.call(
            GET_GENERIC_PORT_MAPPING_ENTRY,
            &[("NewPortMappingIndex", index.to_string())],
        )?;
        parse_generic_port_mapping_entry(&body)
    }

    fn call(&self, action: &'static str, arguments: &[(&str, String)]) -> Result<String, DeviceError> {
        debug!("Calling {} at {}", action, self.control_url);
        let response = self
            .client
            .post(&self.control_url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", format!("\"{}#{}\"", self.service_type, action))
            .body(envelope(&self.service_type, action, arguments))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(DeviceError::Soap {
                action,
                message: format!("HTTP {}, {}", status, fault_description(&body)),
            });
        }
        Ok(body)
    }
}

/// Arguments are written unescaped, callers only pass numbers
fn envelope(service_type: &str, action: &str, arguments: &[(&str, String)]) -> String {
    let arguments: String = arguments
        .iter()
        .map(|(name, value)| format!("<{0}>{1}</{0}>", name, value))
        .collect();
    format!(
        "<?xml version=\"1.0\"?>\r\n\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:{action} xmlns:u=\"{service_type}\">{arguments}</u:{action}></s:Body>\
         </s:Envelope>"
    )
}

/// Parse a `GetGenericPortMappingEntry` response envelope
///
/// A body without a response element is an answer without an entry.
pub fn parse_generic_port_mapping_entry(xml: &str) -> Result<Option<PortMappingEntry>, DeviceError> {
    let root = Element::parse(xml.as_bytes())?;
    let Some(response) = root.get_child("Body").and_then(|body| {
        child_elements(body).find(|e| e.name == GET_GENERIC_PORT_MAPPING_ENTRY_RESPONSE)
    }) else {
        return Ok(None);
    };

    let lease_duration = match child_text(response, "NewLeaseDuration") {
        Some(_) => number(response, "NewLeaseDuration")?,
        None => 0,
    };
    Ok(Some(PortMappingEntry {
        remote_host: child_text(response, "NewRemoteHost").unwrap_or_default(),
        external_port: number(response, "NewExternalPort")?,
        protocol: child_text(response, "NewProtocol").unwrap_or_default(),
        internal_client: child_text(response, "NewInternalClient").unwrap_or_default(),
        internal_port: number(response, "NewInternalPort")?,
        enabled: matches!(
            child_text(response, "NewEnabled").as_deref(),
            Some("1" | "true")
        ),
        description: child_text(response, "NewPortMappingDescription").unwrap_or_default(),
        lease_duration,
    }))
}

fn number<T: FromStr>(response: &Element, name: &str) -> Result<T, DeviceError> {
    let text = child_text(response, name).unwrap_or_default();
    text.parse().map_err(|_| DeviceError::Soap {
        action: GET_GENERIC_PORT_MAPPING_ENTRY,
        message: format!("invalid {} '{}'", name, text),
    })
}

/// UPnP error code and description of a SOAP fault
fn fault_description(body: &str) -> String {
    let Ok(root) = Element::parse(body.as_bytes()) else {
        return "no SOAP fault in response".to_string();
    };
    let text = |name: &str| {
        find_descendant(&root, name)
            .and_then(|element| element.get_text())
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    };
    format!("UPnPError {} {}", text("errorCode"), text("errorDescription"))
        .trim_end()
        .to_string()
}

fn find_descendant<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    child_elements(element).find_map(|child| {
        if child.name == name {
            Some(child)
        } else {
            find_descendant(child, name)
        }
    })
}
