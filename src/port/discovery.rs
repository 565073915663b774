//! Serial port discovery, used by `hub-test ports` to find the hub's adapter.

use super::error::PortError;
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

/// One serial port reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSummary {
    pub name: String,
    /// "usb", "bluetooth", "pci" or "unknown".
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortSummary {
    fn from(info: SerialPortInfo) -> Self {
        let mut summary = PortSummary {
            name: info.port_name,
            kind: "unknown",
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        };

        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                summary.kind = "usb";
                summary.vid = Some(usb.vid);
                summary.pid = Some(usb.pid);
                summary.manufacturer = usb.manufacturer;
                summary.product = usb.product;
                summary.serial_number = usb.serial_number;
            }
            SerialPortType::BluetoothPort => summary.kind = "bluetooth",
            SerialPortType::PciPort => summary.kind = "pci",
            SerialPortType::Unknown => {}
        }

        summary
    }
}

impl std::fmt::Display for PortSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " {:04x}:{:04x}", vid, pid)?;
        }
        if let Some(product) = self.product.as_deref().or(self.manufacturer.as_deref()) {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// List every serial port the OS knows about.
pub fn available_ports() -> Result<Vec<PortSummary>, PortError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortSummary::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_usb_port_summary() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x10c4,
                pid: 0xea60,
                serial_number: Some("0001".to_string()),
                manufacturer: Some("Silicon Labs".to_string()),
                product: Some("CP2102 USB to UART Bridge Controller".to_string()),
            }),
        };

        let summary = PortSummary::from(info);
        assert_eq!(summary.kind, "usb");
        assert_eq!(summary.vid, Some(0x10c4));
        assert_eq!(
            summary.to_string(),
            "/dev/ttyUSB0 (usb) 10c4:ea60 CP2102 USB to UART Bridge Controller"
        );
    }

    #[test]
    fn test_non_usb_summary_omits_ids() {
        let summary = PortSummary::from(SerialPortInfo {
            port_name: "COM1".to_string(),
            port_type: SerialPortType::PciPort,
        });
        assert_eq!(summary.to_string(), "COM1 (pci)");
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("vid").is_none());
    }
}
