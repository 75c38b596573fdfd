use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};

use tracing::{debug, info};

use crate::models::{
    buttons::{ButtonState, ButtonTable},
    command::Command,
    device::DeviceKind,
};

use super::{
    listener::{ButtonListener, SharedTransport},
    services::{LinkError, LinkTransport, SerialBackend},
};

/// Time the device needs to apply a baud switch.
const BAUD_SWITCH_DELAY: Duration = Duration::from_millis(50);

/// One open serial link and everything tied to its lifetime. Dropping the
/// session stops the listener and closes the port.
pub struct LinkSession {
    listener: Option<ButtonListener>,
    transport: SharedTransport,
    port: String,
    kind: DeviceKind,
    baud: u32,
    version: String,
    connected: Arc<AtomicBool>,
    buttons: Arc<ButtonTable>,
}

impl LinkSession {
    pub fn open(backend: &dyn SerialBackend, port: &str, baud: u32) -> Result<Self, LinkError> {
        let transport = backend.open(port, baud)?;
        Ok(Self {
            listener: None,
            transport: Arc::new(Mutex::new(transport)),
            port: port.to_string(),
            kind: DeviceKind::Unknown,
            baud,
            version: String::new(),
            connected: Arc::new(AtomicBool::new(false)),
            buttons: Arc::new(ButtonTable::new()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn LinkTransport>>, LinkError> {
        self.transport.lock().map_err(|_| LinkError::LockPoisoned)
    }

    pub fn send(&self, command: &Command) -> Result<(), LinkError> {
        debug!("Sending {}.", command);
        self.send_raw(&command.encode())
    }

    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut transport = self.lock()?;
        transport.write_all(bytes)?;
        transport.flush()
    }

    /// Ask the device to switch to `baud`, then follow it.
    pub fn switch_baud(&mut self, baud: u32) -> Result<(), LinkError> {
        self.send(&Command::BaudSwitch(baud))?;
        thread::sleep(BAUD_SWITCH_DELAY);
        self.lock()?.set_baud_rate(baud)?;
        self.baud = baud;
        Ok(())
    }

    /// Query the firmware version line, discarding anything buffered first.
    pub fn query_version(&self, timeout: Duration) -> Result<String, LinkError> {
        let mut transport = self.lock()?;
        transport.clear_input()?;
        transport.write_all(&Command::QueryVersion.encode())?;
        transport.flush()?;
        let line = transport.read_line(timeout)?;
        if line.is_empty() {
            return Err(LinkError::EmptyResponse);
        }
        Ok(line)
    }

    /// Turn on button streaming, silence echo and mark the link live.
    pub fn activate(&mut self, kind: DeviceKind, version: String) -> Result<(), LinkError> {
        self.send(&Command::SetButtonsStream(true))?;
        self.send(&Command::SetEcho(false))?;
        self.lock()?.clear_input()?;

        self.kind = kind;
        self.version = version;
        self.buttons.reset();
        self.connected.store(true, Ordering::SeqCst);
        self.listener = Some(ButtonListener::start(
            self.transport.clone(),
            self.connected.clone(),
            self.buttons.clone(),
        )?);
        info!(
            "Connected to {} device on '{}' at {} baud.",
            self.kind, self.port, self.baud
        );
        Ok(())
    }

    /// Stop the listener and switch streaming off. Write failures are only
    /// logged since the port is going away regardless.
    pub fn close(mut self) {
        self.stop_listener();
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.send(&Command::SetButtonsStream(false)) {
                debug!("Failed to disable button stream on close. Error: {}", e);
            }
        }
        info!("Closed '{}'.", self.port);
    }

    fn stop_listener(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// All released while the link is down.
    pub fn buttons(&self) -> ButtonState {
        if self.is_connected() {
            self.buttons.snapshot()
        } else {
            ButtonState::default()
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        self.stop_listener();
    }
}
