use std::fmt::Display;

use super::buttons::ButtonState;

/// Which profile the connected device answered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    #[default]
    Unknown,
    /// Vendor device that accepted the handshake and returned the signature.
    Primary,
    /// Any device speaking the textual command set at the default baud.
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Validating,
    Connected(DeviceKind),
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Unknown => write!(f, "unknown"),
            DeviceKind::Primary => write!(f, "primary"),
            DeviceKind::Generic => write!(f, "generic"),
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Validating => write!(f, "validating"),
            ConnectionState::Connected(kind) => write!(f, "connected ({})", kind),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Point in time view of the hardware link for status reporting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceStatus {
    pub state: ConnectionState,
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub version: String,
    pub buttons: ButtonState,
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.port, self.baud) {
            (Some(port), Some(baud)) => write!(
                f,
                "<Device | {} on {} @ {} baud, version='{}', {}>",
                self.state, port, baud, self.version, self.buttons
            ),
            _ => write!(f, "<Device | {}>", self.state),
        }
    }
}
