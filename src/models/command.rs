use std::fmt::Display;

use thiserror::Error;

use super::buttons::{LockAxis, MouseButton};

/// Fixed prefix of the vendor baud switch frame.
pub const HANDSHAKE_HEADER: [u8; 5] = [0xDE, 0xAD, 0x05, 0x00, 0xA5];

/// An outbound protocol message. Built per call and encoded immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    QueryVersion,
    Move {
        dx: i16,
        dy: i16,
    },
    MoveSmoothed {
        dx: i16,
        dy: i16,
        segments: u32,
    },
    MoveBezier {
        dx: i16,
        dy: i16,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    },
    Wheel(i32),
    Lock {
        axis: LockAxis,
        locked: bool,
    },
    ButtonPress {
        button: MouseButton,
        pressed: bool,
    },
    SetButtonsStream(bool),
    SetEcho(bool),
    SetSerial(Option<String>),
    BaudSwitch(u32),
}

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Move delta ({dx}, {dy}) is outside the signed 16 bit range.")]
    DeltaOutOfRange { dx: i32, dy: i32 },
}

fn delta(dx: i32, dy: i32) -> Result<(i16, i16), CommandError> {
    match (i16::try_from(dx), i16::try_from(dy)) {
        (Ok(dx), Ok(dy)) => Ok((dx, dy)),
        _ => Err(CommandError::DeltaOutOfRange { dx, dy }),
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

impl Command {
    pub fn movement(dx: i32, dy: i32) -> Result<Self, CommandError> {
        let (dx, dy) = delta(dx, dy)?;
        Ok(Command::Move { dx, dy })
    }

    pub fn smoothed(dx: i32, dy: i32, segments: u32) -> Result<Self, CommandError> {
        let (dx, dy) = delta(dx, dy)?;
        Ok(Command::MoveSmoothed { dx, dy, segments })
    }

    pub fn bezier(
        dx: i32,
        dy: i32,
        segments: u32,
        ctrl_x: i32,
        ctrl_y: i32,
    ) -> Result<Self, CommandError> {
        let (dx, dy) = delta(dx, dy)?;
        Ok(Command::MoveBezier {
            dx,
            dy,
            segments,
            ctrl_x,
            ctrl_y,
        })
    }

    /// Bytes to put on the wire. Textual commands are CR terminated, the
    /// stream and echo toggles use CR+LF as the firmware expects.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::BaudSwitch(baud) => handshake_frame(*baud).to_vec(),
            Command::SetButtonsStream(_) | Command::SetEcho(_) => {
                format!("{}\r\n", self).into_bytes()
            }
            _ => format!("{}\r", self).into_bytes(),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::QueryVersion => write!(f, "km.version()"),
            Command::Move { dx, dy } => write!(f, "km.move({},{})", dx, dy),
            Command::MoveSmoothed { dx, dy, segments } => {
                write!(f, "km.move({},{},{})", dx, dy, segments)
            }
            Command::MoveBezier {
                dx,
                dy,
                segments,
                ctrl_x,
                ctrl_y,
            } => write!(
                f,
                "km.move({},{},{},{},{})",
                dx, dy, segments, ctrl_x, ctrl_y
            ),
            Command::Wheel(delta) => write!(f, "km.wheel({})", delta),
            Command::Lock { axis, locked } => {
                write!(f, "km.lock_m{}({})", axis.wire_name(), flag(*locked))
            }
            Command::ButtonPress { button, pressed } => {
                write!(f, "km.{}({})", button.wire_name(), flag(*pressed))
            }
            Command::SetButtonsStream(enabled) => write!(f, "km.buttons({})", flag(*enabled)),
            Command::SetEcho(enabled) => write!(f, "km.echo({})", flag(*enabled)),
            Command::SetSerial(Some(serial)) => write!(f, "km.serial({})", serial),
            Command::SetSerial(None) => write!(f, "km.serial(0)"),
            Command::BaudSwitch(baud) => write!(f, "<baud switch {}>", baud),
        }
    }
}

/// 9 byte frame asking the device to switch to `baud`.
pub fn handshake_frame(baud: u32) -> [u8; 9] {
    let mut frame = [0u8; 9];
    frame[..5].copy_from_slice(&HANDSHAKE_HEADER);
    frame[5..].copy_from_slice(&baud.to_le_bytes());
    frame
}
