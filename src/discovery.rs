/// Serial port discovery for SIMCom modems
///
/// A SIMCom module exposes several USB serial interfaces (diagnostics, NMEA, modem,
/// AT). Only the AT interface answers the SMS dialogs, so it is preferred; any other
/// SIMCom port is a fallback.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_serial::SerialPortType;

use crate::error::{SmsError, SmsResult};

/// Vendor name that identifies the modem's ports
pub const CHIPSET_VENDOR: &str = "simcom";

/// Description fragment of the AT command interface
pub const AT_PORT_SIGNATURE: &str = "at port";

/// Qualcomm driver name used by some SIMCom firmware
pub const HS_USB_SIGNATURE: &str = "hs-usb";

/// One serial device as reported by the operating system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Device path or name, e.g. `/dev/ttyUSB2` or `COM10`
    pub device: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
}

impl PortDescriptor {
    fn description_lower(&self) -> String {
        self.description.as_deref().unwrap_or("").to_lowercase()
    }

    fn manufacturer_lower(&self) -> String {
        self.manufacturer.as_deref().unwrap_or("").to_lowercase()
    }

    /// AT interface of a SIMCom module
    pub fn is_at_port(&self) -> bool {
        let description = self.description_lower();
        description.contains(AT_PORT_SIGNATURE)
            && (description.contains(CHIPSET_VENDOR) || description.contains(HS_USB_SIGNATURE))
    }

    /// Any port that names the vendor
    pub fn is_vendor_port(&self) -> bool {
        self.description_lower().contains(CHIPSET_VENDOR)
            || self.manufacturer_lower().contains(CHIPSET_VENDOR)
    }
}

/// Pick the modem's AT port from a device list
///
/// The first AT interface wins; otherwise the first port naming the vendor.
///
/// # Examples
///
/// ```rust
/// use voltage_sms::discovery::{select_port, PortDescriptor};
///
/// let ports = vec![
///     PortDescriptor {
///         device: "COM9".into(),
///         description: Some("SimTech HS-USB Diagnostics 9001".into()),
///         manufacturer: Some("SimTech, Incorporated".into()),
///     },
///     PortDescriptor {
///         device: "COM10".into(),
///         description: Some("SimTech HS-USB AT Port 9001".into()),
///         manufacturer: Some("SimTech, Incorporated".into()),
///     },
/// ];
/// assert_eq!(select_port(&ports).map(|p| p.device.as_str()), Some("COM10"));
/// ```
pub fn select_port(ports: &[PortDescriptor]) -> Option<&PortDescriptor> {
    ports
        .iter()
        .find(|port| port.is_at_port())
        .or_else(|| ports.iter().find(|port| port.is_vendor_port()))
}

/// List the serial devices known to the operating system
pub fn list_ports() -> SmsResult<Vec<PortDescriptor>> {
    let ports = tokio_serial::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|info| {
            let (description, manufacturer) = match info.port_type {
                SerialPortType::UsbPort(usb) => (usb.product, usb.manufacturer),
                _ => (None, None),
            };
            PortDescriptor {
                device: info.port_name,
                description,
                manufacturer,
            }
        })
        .collect())
}

/// Scan the system for the modem's AT port
///
/// # Errors
///
/// `SmsError::DeviceNotFound` when no port matches.
pub fn find_modem_port() -> SmsResult<String> {
    let ports = list_ports()?;
    for port in &ports {
        debug!(
            "Serial port {}: {} / {}",
            port.device,
            port.description.as_deref().unwrap_or("-"),
            port.manufacturer.as_deref().unwrap_or("-")
        );
    }

    let port = select_port(&ports).ok_or(SmsError::DeviceNotFound)?;
    info!("Found modem on {}", port.device);
    Ok(port.device.clone())
}
