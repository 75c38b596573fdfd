use std::{
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
    time::Duration,
};

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::DeviceConfig,
    internals::core::ports::ButtonSource,
    models::{
        buttons::{ButtonState, LockAxis, MouseButton},
        command::Command,
        device::{ConnectionState, DeviceKind, DeviceStatus},
    },
};

use super::{
    discovery::{first_success, plan_attempts, ConnectAttempt, ConnectProfile, DeviceIdentity},
    services::{LinkError, SerialBackend},
    session::LinkSession,
};

const RECONNECT_DELAY: Duration = Duration::from_millis(200);
const CLICK_HOLD_MS: std::ops::Range<u64> = 10..100;

/// Accept a version line when it carries the expected token anywhere,
/// ignoring case.
pub fn signature_matches(response: &str, expected: &str) -> bool {
    let response = response.trim().to_lowercase();
    let expected = expected.to_lowercase();
    response.starts_with(&expected) || response.contains(&expected)
}

/// Owns the serial link to the input device: connection profiles,
/// autodetect, the command set and the button feed.
pub struct DeviceController {
    backend: Arc<dyn SerialBackend>,
    settings: DeviceConfig,
    session: RwLock<Option<LinkSession>>,
    state: Mutex<ConnectionState>,
}

impl DeviceController {
    pub fn new(backend: Arc<dyn SerialBackend>, settings: DeviceConfig) -> Self {
        Self {
            backend,
            settings,
            session: RwLock::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub fn settings(&self) -> &DeviceConfig {
        &self.settings
    }

    /// Current connection state. A session whose link dropped reports
    /// `Disconnected` until the listener sees the port answer again.
    pub fn state(&self) -> ConnectionState {
        let guard = self.read_session();
        self.state_for(guard.as_ref())
    }

    fn state_for(&self, session: Option<&LinkSession>) -> ConnectionState {
        let state = *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match session {
            Some(session) if state.is_connected() && !session.is_connected() => {
                ConnectionState::Disconnected
            }
            _ => state,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        debug!("Connection state -> {}.", state);
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<LinkSession>> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<LinkSession>> {
        self.session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.read_session()
            .as_ref()
            .map(|session| session.is_connected())
            .unwrap_or(false)
    }

    /// Connect with the primary profile: handshake to the high baud rate
    /// and require the expected signature.
    #[instrument(skip(self))]
    pub fn connect(&self, port: &str) -> Result<DeviceKind, LinkError> {
        self.connect_with(port, ConnectProfile::Primary)
    }

    /// Connect at the default baud rate without a handshake.
    #[instrument(skip(self))]
    pub fn connect_generic(&self, port: &str) -> Result<DeviceKind, LinkError> {
        self.disconnect();
        match self.open_generic(port) {
            Ok(session) => Ok(self.install(session)),
            Err(e) => Err(self.connect_failed(port, e)),
        }
    }

    /// Primary profile first, generic on failure.
    #[instrument(skip(self))]
    pub fn connect_auto(&self, port: &str) -> Result<DeviceKind, LinkError> {
        self.connect_with(port, ConnectProfile::Auto)
    }

    fn connect_with(&self, port: &str, profile: ConnectProfile) -> Result<DeviceKind, LinkError> {
        self.disconnect();
        match self.open_profile(port, profile) {
            Ok(session) => Ok(self.install(session)),
            Err(e) => Err(self.connect_failed(port, e)),
        }
    }

    fn connect_failed(&self, port: &str, error: LinkError) -> LinkError {
        warn!("Failed to connect to '{}'. Error: {}", port, error);
        self.set_state(ConnectionState::Error);
        error
    }

    /// Try the remembered port, the vendor matched port and finally every
    /// port on the system. Returns whether a device is connected.
    #[instrument(skip(self))]
    pub fn autodetect(&self, known_port: Option<&str>) -> bool {
        if self.is_connected() {
            return true;
        }
        // A stale session still holds its port open.
        if self.read_session().is_some() {
            self.disconnect();
        }

        let ports = match self.backend.enumerate() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Failed to enumerate ports. Error: {}", e);
                vec![]
            }
        };
        let attempts = plan_attempts(known_port, &ports, &DeviceIdentity::from(&self.settings));
        debug!("Planned {} connection attempts.", attempts.len());

        let session = first_success(attempts, |attempt: &ConnectAttempt| {
            self.open_profile(&attempt.port, attempt.profile)
        });
        match session {
            Some(session) => {
                self.install(session);
                true
            }
            None => {
                info!("No device found.");
                self.set_state(ConnectionState::Disconnected);
                false
            }
        }
    }

    fn open_profile(&self, port: &str, profile: ConnectProfile) -> Result<LinkSession, LinkError> {
        match profile {
            ConnectProfile::Primary => self.open_primary(port),
            ConnectProfile::Auto => self.open_primary(port).or_else(|e| {
                debug!("Primary profile failed on '{}'. Trying generic. Error: {}", port, e);
                self.open_generic(port)
            }),
        }
    }

    /// A failed step drops the session, which closes the port.
    fn open_primary(&self, port: &str) -> Result<LinkSession, LinkError> {
        self.set_state(ConnectionState::Connecting);
        let mut session = LinkSession::open(self.backend.as_ref(), port, self.settings.default_baud)?;
        thread::sleep(self.settings.settle_delay());
        session.switch_baud(self.settings.high_baud)?;

        self.set_state(ConnectionState::Validating);
        let version = session.query_version(self.settings.validation_timeout())?;
        if !signature_matches(&version, &self.settings.expected_signature) {
            return Err(LinkError::SignatureMismatch {
                expected: self.settings.expected_signature.clone(),
                response: version,
            });
        }

        session.activate(DeviceKind::Primary, version)?;
        Ok(session)
    }

    fn open_generic(&self, port: &str) -> Result<LinkSession, LinkError> {
        self.set_state(ConnectionState::Connecting);
        let mut session = LinkSession::open(self.backend.as_ref(), port, self.settings.default_baud)?;
        thread::sleep(self.settings.settle_delay());

        let version = match session.query_version(self.settings.validation_timeout()) {
            Ok(version) => version,
            Err(e) => {
                debug!("No version reply from '{}'. Error: {}", port, e);
                String::new()
            }
        };

        session.activate(DeviceKind::Generic, version)?;
        Ok(session)
    }

    fn install(&self, session: LinkSession) -> DeviceKind {
        let kind = session.kind();
        let previous = self.write_session().replace(session);
        if let Some(previous) = previous {
            previous.close();
        }
        self.set_state(ConnectionState::Connected(kind));
        kind
    }

    /// Close the link. Always ends disconnected, even if the device does
    /// not acknowledge.
    #[instrument(skip_all)]
    pub fn disconnect(&self) {
        let session = self.write_session().take();
        if let Some(session) = session {
            session.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    #[instrument(skip(self))]
    pub fn reconnect(&self, port: &str) -> Result<DeviceKind, LinkError> {
        self.disconnect();
        thread::sleep(RECONNECT_DELAY);
        self.connect_auto(port)
    }

    pub fn enumerate_ports(&self) -> Result<Vec<String>, LinkError> {
        Ok(self
            .backend
            .enumerate()?
            .iter()
            .map(|candidate| candidate.describe())
            .collect())
    }

    fn send(&self, command: Command) -> Result<(), LinkError> {
        let guard = self.read_session();
        let session = guard
            .as_ref()
            .filter(|session| session.is_connected())
            .ok_or(LinkError::NotConnected)?;
        session.send(&command)
    }

    pub fn move_relative(&self, dx: i32, dy: i32) -> Result<(), LinkError> {
        self.send(Command::movement(dx, dy)?)
    }

    pub fn move_smoothed(&self, dx: i32, dy: i32, segments: u32) -> Result<(), LinkError> {
        self.send(Command::smoothed(dx, dy, segments)?)
    }

    pub fn move_bezier(
        &self,
        dx: i32,
        dy: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> Result<(), LinkError> {
        self.send(Command::bezier(dx, dy, segments, ctrl_x, ctrl_y)?)
    }

    pub fn wheel(&self, delta: i32) -> Result<(), LinkError> {
        self.send(Command::Wheel(delta))
    }

    pub fn lock_axis(&self, axis: LockAxis, locked: bool) -> Result<(), LinkError> {
        self.send(Command::Lock { axis, locked })
    }

    pub fn lock_button(&self, button: MouseButton, locked: bool) -> Result<(), LinkError> {
        self.lock_axis(button.lock_axis(), locked)
    }

    pub fn unlock_all(&self) -> Result<(), LinkError> {
        for button in MouseButton::ALL {
            self.lock_button(button, false)?;
        }
        Ok(())
    }

    pub fn button_press(&self, button: MouseButton, pressed: bool) -> Result<(), LinkError> {
        self.send(Command::ButtonPress { button, pressed })
    }

    /// Press and release `button` with a short random hold. Blocks the
    /// calling thread for the hold and `post_delay`.
    pub fn click(&self, button: MouseButton, post_delay: Duration) -> Result<(), LinkError> {
        self.button_press(button, true)?;
        let hold = rand::thread_rng().gen_range(CLICK_HOLD_MS);
        thread::sleep(Duration::from_millis(hold));
        self.button_press(button, false)?;
        thread::sleep(post_delay);
        Ok(())
    }

    pub fn set_buttons_stream(&self, enabled: bool) -> Result<(), LinkError> {
        self.send(Command::SetButtonsStream(enabled))
    }

    pub fn set_echo(&self, enabled: bool) -> Result<(), LinkError> {
        self.send(Command::SetEcho(enabled))
    }

    pub fn set_serial(&self, serial: &str) -> Result<(), LinkError> {
        self.send(Command::SetSerial(Some(serial.to_string())))
    }

    pub fn reset_serial(&self) -> Result<(), LinkError> {
        self.send(Command::SetSerial(None))
    }

    pub fn buttons(&self) -> ButtonState {
        self.read_session()
            .as_ref()
            .map(|session| session.buttons())
            .unwrap_or_default()
    }

    pub fn button_pressed(&self, button: MouseButton) -> bool {
        self.buttons().is_pressed(button)
    }

    /// Ask the device for its version line now. `version()` holds the line
    /// read at connect.
    pub fn query_version(&self) -> Result<String, LinkError> {
        let guard = self.read_session();
        let session = guard
            .as_ref()
            .filter(|session| session.is_connected())
            .ok_or(LinkError::NotConnected)?;
        session.query_version(self.settings.validation_timeout())
    }

    pub fn version(&self) -> Option<String> {
        self.read_session()
            .as_ref()
            .map(|session| session.version().to_string())
    }

    pub fn current_port(&self) -> Option<String> {
        self.read_session()
            .as_ref()
            .map(|session| session.port().to_string())
    }

    pub fn kind(&self) -> DeviceKind {
        self.read_session()
            .as_ref()
            .map(|session| session.kind())
            .unwrap_or_default()
    }

    pub fn status(&self) -> DeviceStatus {
        let guard = self.read_session();
        match guard.as_ref() {
            Some(session) => DeviceStatus {
                state: self.state_for(Some(session)),
                port: Some(session.port().to_string()),
                baud: Some(session.baud()),
                version: session.version().to_string(),
                buttons: session.buttons(),
            },
            None => DeviceStatus {
                state: self.state_for(None),
                ..Default::default()
            },
        }
    }
}

impl ButtonSource for DeviceController {
    fn button_pressed(&self, button: MouseButton) -> bool {
        DeviceController::button_pressed(self, button)
    }
}
