use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::models::command::CommandError;

use super::discovery::PortCandidate;

/// Read/write timeout applied to every freshly opened port.
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Byte level access to one open serial link. Kept narrow so the protocol
/// logic can be exercised against an in-memory device.
pub trait LinkTransport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
    fn flush(&mut self) -> Result<(), LinkError>;
    fn bytes_to_read(&mut self) -> Result<u32, LinkError>;
    fn read_byte(&mut self) -> Result<u8, LinkError>;
    /// Read one `\n` terminated line, trimmed, waiting at most `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError>;
    fn clear_input(&mut self) -> Result<(), LinkError>;
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError>;
}

/// Opens transports and lists the ports that could be tried.
pub trait SerialBackend: Send + Sync {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn LinkTransport>, LinkError>;
    fn enumerate(&self) -> Result<Vec<PortCandidate>, LinkError>;
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to open serial port '{port}'. Device might be disconnected. {source}")]
    FailedToOpenPort {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to enumerate serial ports. {0}")]
    FailedToEnumerate(#[source] serialport::Error),

    #[error("Serial port error. {0}")]
    Serial(#[from] serialport::Error),

    #[error("Serial I/O error. {0}")]
    Io(#[from] io::Error),

    #[error("Timed out waiting for the device.")]
    Timeout,

    #[error("Device returned an empty response.")]
    EmptyResponse,

    #[error("Device signature mismatch. Expected '{expected}', got '{response}'.")]
    SignatureMismatch { expected: String, response: String },

    #[error("Device is not connected.")]
    NotConnected,

    #[error("Serial link lock was poisoned.")]
    LockPoisoned,

    #[error("Failed to spawn button listener. {0}")]
    FailedToSpawnListener(#[source] io::Error),

    #[error(transparent)]
    Command(#[from] CommandError),
}

pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
}

impl LinkTransport for SerialPortTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(bytes)?;
        trace!("Wrote {} bytes to port.", bytes.len());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(self.port.flush()?)
    }

    fn bytes_to_read(&mut self) -> Result<u32, LinkError> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
        let previous = self.port.timeout();
        self.port.set_timeout(timeout)?;
        let line = read_line_from(self.port.as_mut(), Instant::now() + timeout);
        self.port.set_timeout(previous)?;
        line
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        Ok(self.port.set_baud_rate(baud)?)
    }
}

/// Accumulate bytes up to a newline or until `deadline` passes.
fn read_line_from<R: Read + ?Sized>(reader: &mut R, deadline: Instant) -> Result<String, LinkError> {
    let mut line: Vec<u8> = vec![];
    let mut byte = [0u8; 1];
    loop {
        if Instant::now() >= deadline {
            break;
        }
        match reader.read(&mut byte) {
            Ok(0) => continue,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e.into()),
        }
    }
    if line.is_empty() {
        return Err(LinkError::Timeout);
    }
    Ok(String::from_utf8_lossy(&line).trim().to_string())
}

/// Backend over the operating system's serial ports.
pub struct SerialPortBackend;

impl SerialBackend for SerialPortBackend {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn LinkTransport>, LinkError> {
        debug!("Opening '{}' at {} baud.", port, baud);
        let opened = serialport::new(port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|source| LinkError::FailedToOpenPort {
                port: port.to_string(),
                source,
            })?;
        Ok(Box::new(SerialPortTransport { port: opened }))
    }

    fn enumerate(&self) -> Result<Vec<PortCandidate>, LinkError> {
        let ports = serialport::available_ports().map_err(LinkError::FailedToEnumerate)?;
        trace!("Found {} ports.", ports.len());
        Ok(ports.into_iter().map(PortCandidate::from).collect())
    }
}
