//! In-memory serial devices for exercising the link without hardware.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::models::command::{Command, HANDSHAKE_HEADER};

use super::{
    discovery::PortCandidate,
    services::{LinkError, LinkTransport, SerialBackend},
};

const DEVICE_DEFAULT_BAUD: u32 = 115_200;

#[derive(Debug, Clone)]
pub enum MockProfile {
    /// Follows the handshake and answers the version query at the new baud.
    Primary { signature: String },
    /// Ignores the handshake and only answers at the default baud.
    Generic { version: Option<String> },
    /// Listed by enumeration but fails to open.
    Unopenable,
}

/// Everything observable about one device's wire.
#[derive(Debug)]
pub struct MockWire {
    pub written: Vec<u8>,
    pub inbound: VecDeque<u8>,
    /// Baud rate the host side is using.
    pub baud: u32,
    /// Baud rate the device is listening on.
    pub device_baud: u32,
    pub open: bool,
    pub opens: usize,
    pub handshakes: usize,
    pub fail_writes: bool,
    /// When set, polling and reading the port fail as if it was unplugged.
    pub fail_reads: bool,
    pending_line: Option<String>,
}

impl Default for MockWire {
    fn default() -> Self {
        Self {
            written: vec![],
            inbound: VecDeque::new(),
            baud: DEVICE_DEFAULT_BAUD,
            device_baud: DEVICE_DEFAULT_BAUD,
            open: false,
            opens: 0,
            handshakes: 0,
            fail_writes: false,
            fail_reads: false,
            pending_line: None,
        }
    }
}

struct MockDevice {
    candidate: PortCandidate,
    profile: MockProfile,
    wire: Arc<Mutex<MockWire>>,
}

#[derive(Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, candidate: PortCandidate, profile: MockProfile) -> Self {
        self.devices.push(MockDevice {
            candidate,
            profile,
            wire: Arc::new(Mutex::new(MockWire::default())),
        });
        self
    }

    pub fn wire(&self, port: &str) -> Arc<Mutex<MockWire>> {
        self.devices
            .iter()
            .find(|device| device.candidate.port_name == port)
            .map(|device| device.wire.clone())
            .expect("Unknown mock port")
    }
}

impl SerialBackend for MockBackend {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn LinkTransport>, LinkError> {
        let device = self
            .devices
            .iter()
            .find(|device| device.candidate.port_name == port);
        let device = match device {
            Some(device) if !matches!(device.profile, MockProfile::Unopenable) => device,
            _ => {
                return Err(LinkError::FailedToOpenPort {
                    port: port.to_string(),
                    source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no device"),
                })
            }
        };

        let mut wire = device.wire.lock().unwrap();
        wire.open = true;
        wire.opens += 1;
        wire.baud = baud;
        wire.device_baud = DEVICE_DEFAULT_BAUD;
        wire.pending_line = None;
        drop(wire);

        Ok(Box::new(MockTransport {
            profile: device.profile.clone(),
            wire: device.wire.clone(),
        }))
    }

    fn enumerate(&self) -> Result<Vec<PortCandidate>, LinkError> {
        Ok(self
            .devices
            .iter()
            .map(|device| device.candidate.clone())
            .collect())
    }
}

fn unplugged() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")
}

pub struct MockTransport {
    profile: MockProfile,
    wire: Arc<Mutex<MockWire>>,
}

impl MockTransport {
    fn reply_to_version(&self, wire: &MockWire) -> Option<String> {
        if wire.baud != wire.device_baud {
            return None;
        }
        match &self.profile {
            MockProfile::Primary { signature } => Some(signature.clone()),
            MockProfile::Generic { version } => version.clone(),
            MockProfile::Unopenable => None,
        }
    }
}

impl LinkTransport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_writes {
            return Err(unplugged().into());
        }
        wire.written.extend_from_slice(bytes);

        if bytes.starts_with(&HANDSHAKE_HEADER) && bytes.len() == 9 {
            wire.handshakes += 1;
            if matches!(self.profile, MockProfile::Primary { .. }) {
                wire.device_baud = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
            }
        } else if bytes == Command::QueryVersion.encode().as_slice() {
            wire.pending_line = self.reply_to_version(&wire);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> Result<u32, LinkError> {
        let wire = self.wire.lock().unwrap();
        if wire.fail_reads {
            return Err(unplugged().into());
        }
        Ok(wire.inbound.len() as u32)
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_reads {
            return Err(unplugged().into());
        }
        wire.inbound.pop_front().ok_or(LinkError::Timeout)
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String, LinkError> {
        self.wire
            .lock()
            .unwrap()
            .pending_line
            .take()
            .ok_or(LinkError::Timeout)
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        let mut wire = self.wire.lock().unwrap();
        wire.inbound.clear();
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        self.wire.lock().unwrap().baud = baud;
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Ok(mut wire) = self.wire.lock() {
            wire.open = false;
        }
    }
}
