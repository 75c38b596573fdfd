use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, error, info, trace, warn};

use crate::models::buttons::{ButtonState, ButtonTable};

use super::services::{LinkError, LinkTransport};

pub type SharedTransport = Arc<Mutex<Box<dyn LinkTransport>>>;

const DISCONNECTED_BACKOFF: Duration = Duration::from_millis(250);
const IDLE_SLEEP: Duration = Duration::from_millis(1);
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Background thread that decodes button telemetry bytes into a
/// [`ButtonTable`]. Stopped and joined on drop.
pub struct ButtonListener {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl ButtonListener {
    pub fn start(
        transport: SharedTransport,
        connected: Arc<AtomicBool>,
        buttons: Arc<ButtonTable>,
    ) -> Result<Self, LinkError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("button-listener".into())
            .spawn(move || listen(thread_running, transport, connected, buttons))
            .map_err(LinkError::FailedToSpawnListener)?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Button listener thread panicked.");
            }
        }
    }
}

impl Drop for ButtonListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[tracing::instrument(skip_all)]
fn listen(
    running: Arc<AtomicBool>,
    transport: SharedTransport,
    connected: Arc<AtomicBool>,
    buttons: Arc<ButtonTable>,
) {
    info!("Started.");
    while running.load(Ordering::SeqCst) {
        if !connected.load(Ordering::SeqCst) {
            thread::sleep(DISCONNECTED_BACKOFF);
            if port_answers(&transport) {
                debug!("Port answered again. Resuming.");
                connected.store(true, Ordering::SeqCst);
            }
            continue;
        }

        match poll_once(&transport, &buttons) {
            Ok(true) => {}
            Ok(false) => thread::sleep(IDLE_SLEEP),
            Err(e) => {
                warn!("Failed to read button telemetry. Error: {}", e);
                // Held buttons can no longer be observed as released.
                buttons.reset();
                connected.store(false, Ordering::SeqCst);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!("Stopped.");
}

fn port_answers(transport: &SharedTransport) -> bool {
    match transport.lock() {
        Ok(mut transport) => transport.bytes_to_read().is_ok(),
        Err(_) => false,
    }
}

/// Consume at most one byte. Returns whether a byte was available.
fn poll_once(transport: &SharedTransport, buttons: &ButtonTable) -> Result<bool, LinkError> {
    let mut transport = transport.lock().map_err(|_| LinkError::LockPoisoned)?;
    if transport.bytes_to_read()? == 0 {
        return Ok(false);
    }

    let byte = transport.read_byte()?;
    match ButtonState::decode(byte) {
        Some(state) => {
            buttons.publish(state);
            trace!("Buttons now {}.", state);
            // Only the latest state matters.
            transport.clear_input()?;
        }
        None => trace!("Discarded non-telemetry byte 0x{:02X}.", byte),
    }
    Ok(true)
}
