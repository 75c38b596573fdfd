use std::fmt::Display;

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, instrument, trace};

use crate::config::DeviceConfig;

/// One serial port as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortCandidate {
    pub port_name: String,
    /// `USB\VID_xxxx&PID_xxxx\SERIAL` for USB ports, empty otherwise.
    pub hardware_path: String,
    pub friendly_name: String,
    pub serial_number: Option<String>,
}

impl PortCandidate {
    pub fn usb(port_name: &str, vid: u16, pid: u16, serial: Option<&str>, product: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            hardware_path: format!(
                "USB\\VID_{:04X}&PID_{:04X}\\{}",
                vid,
                pid,
                serial.unwrap_or_default()
            ),
            friendly_name: product.to_string(),
            serial_number: serial.map(str::to_string),
        }
    }

    pub fn describe(&self) -> String {
        if self.friendly_name.is_empty() {
            self.port_name.clone()
        } else {
            format!("{} - {}", self.port_name, self.friendly_name)
        }
    }

    fn has_vendor_ids(&self, identity: &DeviceIdentity) -> bool {
        let path = self.hardware_path.to_uppercase();
        path.contains(&format!("VID_{}", identity.vendor_id.to_uppercase()))
            && path.contains(&format!("PID_{}", identity.product_id.to_uppercase()))
    }

    fn has_serial_fragment(&self, fragment: &str) -> bool {
        let fragment = fragment.to_uppercase();
        self.hardware_path.to_uppercase().contains(&fragment)
            || self
                .serial_number
                .as_deref()
                .map(|serial| serial.to_uppercase().contains(&fragment))
                .unwrap_or(false)
    }
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let product = usb
                    .product
                    .or(usb.manufacturer)
                    .unwrap_or_default();
                Self::usb(
                    &info.port_name,
                    usb.vid,
                    usb.pid,
                    usb.serial_number.as_deref(),
                    &product,
                )
            }
            SerialPortType::BluetoothPort => Self {
                port_name: info.port_name,
                friendly_name: "Bluetooth".into(),
                ..Default::default()
            },
            SerialPortType::PciPort | SerialPortType::Unknown => Self {
                port_name: info.port_name,
                ..Default::default()
            },
        }
    }
}

/// What identifies the primary device on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: String,
    pub product_id: String,
    pub friendly_name: String,
    pub serial_fragment: Option<String>,
}

impl From<&DeviceConfig> for DeviceIdentity {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            vendor_id: config.vendor_id.clone(),
            product_id: config.product_id.clone(),
            friendly_name: config.friendly_name.clone(),
            serial_fragment: config.serial_fragment.clone(),
        }
    }
}

/// Find the port that most likely carries the primary device.
///
/// Vendor/product ids win over the friendly name. The serial fragment only
/// narrows the choice when several ports match; if none carries it the
/// first match is kept.
#[instrument(skip_all)]
pub fn find_primary_port<'a>(
    candidates: &'a [PortCandidate],
    identity: &DeviceIdentity,
) -> Option<&'a PortCandidate> {
    let mut matches: Vec<&PortCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.has_vendor_ids(identity))
        .collect();

    if matches.is_empty() {
        trace!("No vendor id match. Trying friendly name.");
        let name = identity.friendly_name.to_lowercase();
        matches = candidates
            .iter()
            .filter(|candidate| {
                !name.is_empty() && candidate.friendly_name.to_lowercase().contains(&name)
            })
            .collect();
    }

    if matches.len() > 1 {
        if let Some(fragment) = identity.serial_fragment.as_deref() {
            if let Some(found) = matches
                .iter()
                .find(|candidate| candidate.has_serial_fragment(fragment))
            {
                debug!("Serial fragment selected '{}'.", found.port_name);
                return Some(*found);
            }
        }
    }

    matches.first().copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectProfile {
    /// Handshake, high baud and signature check only.
    Primary,
    /// Primary first, generic as fallback.
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub port: String,
    pub profile: ConnectProfile,
}

impl Display for ConnectAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.port, self.profile)
    }
}

/// Ordered list of connection attempts for autodetect.
///
/// 1. The remembered port with both profiles.
/// 2. The vendor matched port with the primary profile.
/// 3. Every enumerated port with both profiles, skipping ports already
///    planned with both.
pub fn plan_attempts(
    known_port: Option<&str>,
    ports: &[PortCandidate],
    identity: &DeviceIdentity,
) -> Vec<ConnectAttempt> {
    let mut attempts: Vec<ConnectAttempt> = vec![];

    if let Some(port) = known_port.filter(|port| !port.is_empty()) {
        attempts.push(ConnectAttempt {
            port: port.to_string(),
            profile: ConnectProfile::Auto,
        });
    }

    if let Some(candidate) = find_primary_port(ports, identity) {
        attempts.push(ConnectAttempt {
            port: candidate.port_name.clone(),
            profile: ConnectProfile::Primary,
        });
    }

    for candidate in ports {
        let already_planned = attempts.iter().any(|attempt| {
            attempt.port == candidate.port_name && attempt.profile == ConnectProfile::Auto
        });
        if !already_planned {
            attempts.push(ConnectAttempt {
                port: candidate.port_name.clone(),
                profile: ConnectProfile::Auto,
            });
        }
    }

    attempts
}

/// Try `attempts` in order and return the first success. Failures are
/// logged and skipped.
pub fn first_success<A, T, E>(
    attempts: impl IntoIterator<Item = A>,
    mut attempt: impl FnMut(&A) -> Result<T, E>,
) -> Option<T>
where
    A: Display,
    E: Display,
{
    for candidate in attempts {
        match attempt(&candidate) {
            Ok(value) => {
                debug!("Attempt '{}' succeeded.", candidate);
                return Some(value);
            }
            Err(e) => debug!("Attempt '{}' failed. Error: {}", candidate, e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from(&DeviceConfig::default())
    }

    fn primary(port: &str, serial: &str) -> PortCandidate {
        PortCandidate::usb(port, 0x1A86, 0x55D3, Some(serial), "USB-Enhanced-SERIAL CH343")
    }

    fn other(port: &str) -> PortCandidate {
        PortCandidate::usb(port, 0x0403, 0x6001, Some("A50285BI"), "FT232R USB UART")
    }

    #[test]
    fn test_hardware_path_format() {
        let candidate = primary("COM7", "58A6074578");
        assert_eq!(candidate.hardware_path, "USB\\VID_1A86&PID_55D3\\58A6074578");
        assert_eq!(candidate.describe(), "COM7 - USB-Enhanced-SERIAL CH343");
    }

    #[test]
    fn test_vendor_match() {
        let ports = vec![other("COM3"), primary("COM7", "58A6074578")];
        let found = find_primary_port(&ports, &identity()).expect("Port should match");
        assert_eq!(found.port_name, "COM7");
    }

    #[test]
    fn test_friendly_name_fallback() {
        let ports = vec![
            other("COM3"),
            PortCandidate {
                port_name: "COM9".into(),
                friendly_name: "usb-enhanced-serial ch343 (COM9)".into(),
                ..Default::default()
            },
        ];
        let found = find_primary_port(&ports, &identity()).expect("Port should match");
        assert_eq!(found.port_name, "COM9");
    }

    #[test]
    fn test_serial_fragment_narrows_multiple_matches() {
        let ports = vec![primary("COM4", "11112222"), primary("COM7", "58A6074578")];
        let mut identity = identity();

        assert_eq!(
            find_primary_port(&ports, &identity).map(|c| c.port_name.as_str()),
            Some("COM4")
        );

        identity.serial_fragment = Some("58a6".into());
        assert_eq!(
            find_primary_port(&ports, &identity).map(|c| c.port_name.as_str()),
            Some("COM7")
        );

        identity.serial_fragment = Some("FFFF".into());
        assert_eq!(
            find_primary_port(&ports, &identity).map(|c| c.port_name.as_str()),
            Some("COM4")
        );
    }

    #[test]
    fn test_no_match() {
        assert!(find_primary_port(&[other("COM3")], &identity()).is_none());
        assert!(find_primary_port(&[], &identity()).is_none());
    }

    #[test]
    fn test_plan_order() {
        let ports = vec![other("COM3"), primary("COM7", "58A6074578")];
        let plan = plan_attempts(Some("COM3"), &ports, &identity());
        assert_eq!(
            plan,
            vec![
                ConnectAttempt {
                    port: "COM3".into(),
                    profile: ConnectProfile::Auto
                },
                ConnectAttempt {
                    port: "COM7".into(),
                    profile: ConnectProfile::Primary
                },
                ConnectAttempt {
                    port: "COM7".into(),
                    profile: ConnectProfile::Auto
                },
            ]
        );
    }

    #[test]
    fn test_plan_without_known_port() {
        let plan = plan_attempts(None, &[other("COM3")], &identity());
        assert_eq!(
            plan,
            vec![ConnectAttempt {
                port: "COM3".into(),
                profile: ConnectProfile::Auto
            }]
        );
        assert!(plan_attempts(Some(""), &[], &identity()).is_empty());
    }

    #[test]
    fn test_first_success_stops_early() {
        let mut tried = vec![];
        let result = first_success(["a", "b", "c"], |name| {
            tried.push(name.to_string());
            if *name == "b" {
                Ok(name.to_uppercase())
            } else {
                Err("no")
            }
        });
        assert_eq!(result.as_deref(), Some("B"));
        assert_eq!(tried, vec!["a", "b"]);
    }

    #[test]
    fn test_first_success_exhausted() {
        let result: Option<()> = first_success(["a", "b"], |_| Err::<(), _>("no"));
        assert!(result.is_none());
    }
}
