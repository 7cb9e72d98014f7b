//! Device Profile - How to Reach and Address One PLC
//!
//! The profile is a tagged variant over the two Modbus transports. On the wire
//! (bridge commands, cloud records, config files) it is a flat camelCase
//! object discriminated by `modbusType`:
//!
//! ```json
//! { "modbusType": "tcp", "ipAddress": "192.168.1.100", "port": 502,
//!   "coilAddress": 0, "unitId": 1, "enableLogging": true }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Modbus TCP addressing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpSettings {
    pub ip_address: String,
    pub port: u16,
}

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Parity {
    #[default]
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
}

/// Modbus RTU serial line settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtuSettings {
    pub com_port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for RtuSettings {
    fn default() -> Self {
        Self {
            com_port: "COM1".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

/// Transport-specific part of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modbusType", rename_all = "lowercase")]
pub enum LinkSettings {
    Tcp(TcpSettings),
    Rtu(RtuSettings),
}

impl LinkSettings {
    pub fn label(&self) -> &'static str {
        match self {
            LinkSettings::Tcp(_) => "TCP",
            LinkSettings::Rtu(_) => "RTU",
        }
    }
}

/// Full parameter set for one field device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    #[serde(flatten)]
    pub link: LinkSettings,
    pub coil_address: u16,
    pub unit_id: u8,
    pub enable_logging: bool,
    /// Assigned by the cloud gateway on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Epoch milliseconds, stamped by the cloud gateway on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::tcp("192.168.1.100", 502)
    }
}

impl DeviceProfile {
    /// A TCP profile polling coil 0 on unit 1
    pub fn tcp(ip_address: impl Into<String>, port: u16) -> Self {
        Self::with_link(LinkSettings::Tcp(TcpSettings {
            ip_address: ip_address.into(),
            port,
        }))
    }

    /// An RTU profile with 8N1 framing, polling coil 0 on unit 1
    pub fn rtu(com_port: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_link(LinkSettings::Rtu(RtuSettings {
            com_port: com_port.into(),
            baud_rate,
            ..RtuSettings::default()
        }))
    }

    fn with_link(link: LinkSettings) -> Self {
        Self {
            link,
            coil_address: 0,
            unit_id: 1,
            enable_logging: true,
            id: None,
            created_at: None,
        }
    }

    pub fn with_coil(mut self, coil_address: u16, unit_id: u8) -> Self {
        self.coil_address = coil_address;
        self.unit_id = unit_id;
        self
    }

    /// Same device settings, ignoring the cloud identity (`id`, `created_at`)
    pub fn same_settings(&self, other: &DeviceProfile) -> bool {
        self.link == other.link
            && self.coil_address == other.coil_address
            && self.unit_id == other.unit_id
            && self.enable_logging == other.enable_logging
    }

    /// Whether the profile has been persisted at least once
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Human-readable address (e.g., "192.168.1.100:502" or "COM1 @ 9600")
    pub fn address(&self) -> String {
        match &self.link {
            LinkSettings::Tcp(tcp) => format!("{}:{}", tcp.ip_address, tcp.port),
            LinkSettings::Rtu(rtu) => format!("{} @ {}", rtu.com_port, rtu.baud_rate),
        }
    }

    /// Check the fields the bridge needs to open the link
    pub fn validate(&self) -> Result<()> {
        match &self.link {
            LinkSettings::Tcp(tcp) => {
                if tcp.ip_address.trim().is_empty() || tcp.port == 0 {
                    return Err(invalid("IP Address and Port are required for Modbus TCP"));
                }
            }
            LinkSettings::Rtu(rtu) => {
                if rtu.com_port.trim().is_empty() || rtu.baud_rate == 0 {
                    return Err(invalid("COM Port and Baud Rate are required for Modbus RTU"));
                }
                if !(5..=8).contains(&rtu.data_bits) {
                    return Err(invalid(format!(
                        "Data bits must be between 5 and 8, got {}",
                        rtu.data_bits
                    )));
                }
                if !matches!(rtu.stop_bits, 1 | 2) {
                    return Err(invalid(format!(
                        "Stop bits must be 1 or 2, got {}",
                        rtu.stop_bits
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tcp_wire_format() {
        let profile = DeviceProfile::tcp("10.0.0.5", 502).with_coil(12, 3);
        let value = serde_json::to_value(&profile).expect("serialize");
        assert_eq!(
            value,
            json!({
                "modbusType": "tcp",
                "ipAddress": "10.0.0.5",
                "port": 502,
                "coilAddress": 12,
                "unitId": 3,
                "enableLogging": true
            })
        );
    }

    #[test]
    fn test_rtu_record_with_metadata() {
        let value = json!({
            "modbusType": "rtu",
            "comPort": "/dev/ttyUSB0",
            "baudRate": 19200,
            "dataBits": 8,
            "parity": "E",
            "stopBits": 1,
            "coilAddress": 4,
            "unitId": 2,
            "enableLogging": false,
            "id": "config_1700000000000",
            "createdAt": 1700000000000i64
        });
        let profile: DeviceProfile = serde_json::from_value(value).expect("deserialize");

        let LinkSettings::Rtu(rtu) = &profile.link else {
            panic!("expected rtu link");
        };
        assert_eq!(rtu.parity, Parity::Even);
        assert_eq!(profile.address(), "/dev/ttyUSB0 @ 19200");
        assert_eq!(profile.id.as_deref(), Some("config_1700000000000"));
        assert_eq!(profile.created_at, Some(1_700_000_000_000));
    }

    #[test]
    fn test_validation() {
        assert!(DeviceProfile::default().validate().is_ok());
        assert!(DeviceProfile::tcp("", 502).validate().is_err());
        assert!(DeviceProfile::tcp("10.0.0.1", 0).validate().is_err());
        assert!(DeviceProfile::rtu("COM3", 0).validate().is_err());

        let mut rtu = DeviceProfile::rtu("COM3", 9600);
        assert!(rtu.validate().is_ok());
        if let LinkSettings::Rtu(settings) = &mut rtu.link {
            settings.stop_bits = 3;
        }
        assert!(rtu.validate().is_err());
    }

    #[test]
    fn test_same_settings_ignores_identity() {
        let base = DeviceProfile::default();
        let mut stamped = base.clone();
        stamped.id = Some("config_1".to_string());
        stamped.created_at = Some(1);
        assert!(base.same_settings(&stamped));

        assert!(!base.same_settings(&base.clone().with_coil(9, 1)));
        assert!(!base.same_settings(&base.clone().with_coil(0, 5)));
        let mut quiet = base.clone();
        quiet.enable_logging = false;
        assert!(!base.same_settings(&quiet));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(DeviceProfile::default().address(), "192.168.1.100:502");
        assert_eq!(DeviceProfile::rtu("COM1", 9600).address(), "COM1 @ 9600");
    }
}
