//! UPnP device and service description parsing
//!
//! A gateway advertises a device description (XML) at its location URL. It
//! names the device, points at its presentation page, and lists the services
//! the device offers. Port mapping is done through the `WANIPConnection` or
//! `WANPPPConnection` service, whose control actions are described by a
//! separate service control protocol description (SCPD).

use super::device::DeviceError;
use std::collections::HashMap;
use url::Url;
use xmltree::{Element, XMLNode};

const WAN_IP_CONNECTION: &str = "WANIPConnection";
const WAN_PPP_CONNECTION: &str = "WANPPPConnection";

/// Device metadata read from a UPnP device description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    /// Location URL the description was fetched from
    pub location: String,
    /// UPnP device type of the root device
    pub device_type: String,
    /// Human-readable device name
    pub friendly_name: String,
    /// Manufacturer name
    pub manufacturer: Option<String>,
    /// Long model description
    pub model_description: Option<String>,
    /// Model name
    pub model_name: Option<String>,
    /// Model number
    pub model_number: Option<String>,
    /// Serial number
    pub serial_number: Option<String>,
    /// Absolute URL of the device's presentation (admin) page
    pub presentation_url: Option<String>,
    /// URL base advertised by the device
    pub url_base: Option<String>,
    /// The WAN connection service used for port mapping, if any
    pub wan_service: Option<WanService>,
}

/// A `WANIPConnection` or `WANPPPConnection` service entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WanService {
    /// Full service type URN
    pub service_type: String,
    /// Absolute control URL
    pub control_url: String,
    /// Absolute service description URL
    pub scpd_url: String,
}

impl DeviceDescription {
    /// Parse a device description fetched from `location`
    ///
    /// Relative URLs are resolved against the advertised URL base, or against
    /// the location when the device does not advertise one.
    pub fn parse(xml: &str, location: &str) -> Result<Self, DeviceError> {
        let root = Element::parse(xml.as_bytes())?;
        let device = root
            .get_child("device")
            .ok_or_else(|| DeviceError::InvalidDescription("missing root device".to_string()))?;

        let url_base = child_text(&root, "URLBase");
        let base = url_base
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .or_else(|| Url::parse(location).ok());

        let presentation_url = child_text(device, "presentationURL")
            .map(|url| resolve_url(base.as_ref(), &url));

        let mut services = Vec::new();
        collect_services(device, &mut services);
        let wan_service = find_wan_service(&services, WAN_IP_CONNECTION)
            .or_else(|| find_wan_service(&services, WAN_PPP_CONNECTION))
            .and_then(|service| {
                let control_url = child_text(service, "controlURL")?;
                let scpd_url = child_text(service, "SCPDURL")?;
                Some(WanService {
                    service_type: child_text(service, "serviceType")?,
                    control_url: resolve_url(base.as_ref(), &control_url),
                    scpd_url: resolve_url(base.as_ref(), &scpd_url),
                })
            });

        Ok(Self {
            location: location.to_string(),
            device_type: child_text(device, "deviceType").unwrap_or_default(),
            friendly_name: child_text(device, "friendlyName").unwrap_or_default(),
            manufacturer: child_text(device, "manufacturer"),
            model_description: child_text(device, "modelDescription"),
            model_name: child_text(device, "modelName"),
            model_number: child_text(device, "modelNumber"),
            serial_number: child_text(device, "serialNumber"),
            presentation_url,
            url_base,
            wan_service,
        })
    }
}

/// Parse a service description into action name -> input argument names
pub fn parse_control_schema(xml: &str) -> Result<HashMap<String, Vec<String>>, DeviceError> {
    let root = Element::parse(xml.as_bytes())?;
    let actions = root
        .get_child("actionList")
        .ok_or_else(|| DeviceError::InvalidDescription("missing actionList".to_string()))?;

    let mut schema = HashMap::new();
    for action in child_elements(actions).filter(|e| e.name == "action") {
        let Some(name) = child_text(action, "name") else {
            continue;
        };
        let arguments = action
            .get_child("argumentList")
            .map(|list| {
                child_elements(list)
                    .filter(|arg| child_text(arg, "direction").as_deref() == Some("in"))
                    .filter_map(|arg| child_text(arg, "name"))
                    .collect()
            })
            .unwrap_or_default();
        schema.insert(name, arguments);
    }
    Ok(schema)
}

pub(super) fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

/// Trimmed text of a direct child, `None` when missing or blank
pub(super) fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name)
        .and_then(|child| child.get_text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn collect_services<'a>(device: &'a Element, services: &mut Vec<&'a Element>) {
    if let Some(list) = device.get_child("serviceList") {
        services.extend(child_elements(list).filter(|e| e.name == "service"));
    }
    if let Some(list) = device.get_child("deviceList") {
        for embedded in child_elements(list).filter(|e| e.name == "device") {
            collect_services(embedded, services);
        }
    }
}

fn find_wan_service<'a>(services: &[&'a Element], kind: &str) -> Option<&'a Element> {
    services.iter().copied().find(|service| {
        child_text(service, "serviceType")
            .map(|service_type| service_type.contains(kind))
            .unwrap_or(false)
    })
}

fn resolve_url(base: Option<&Url>, url: &str) -> String {
    if Url::parse(url).is_ok() {
        return url.to_string();
    }
    base.and_then(|base| base.join(url).ok())
        .map(|joined| joined.to_string())
        .unwrap_or_else(|| url.to_string())
}
