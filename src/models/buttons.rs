use std::{
    fmt::Display,
    sync::atomic::{AtomicU8, Ordering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUTTON_COUNT: usize = 5;

/// Status codes the device is known to emit on the button stream.
/// Anything else on the wire is echo or line noise.
const TELEMETRY_WHITELIST: [u8; 20] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14,
    0x15, 0x16, 0x17, 0x19, 0x1F,
];

const MASK_BITS: u8 = 0b0001_1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left = 1,
    Right = 2,
    Middle = 3,
    Side1 = 4,
    Side2 = 5,
}

#[derive(Error, Debug, PartialEq)]
pub enum ButtonError {
    #[error("Button id {0} is outside 1..=5.")]
    InvalidId(u8),
}

impl MouseButton {
    pub const ALL: [MouseButton; BUTTON_COUNT] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Side1,
        MouseButton::Side2,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Name used by the `km.{button}(state)` command.
    pub fn wire_name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
            MouseButton::Side1 => "ms1",
            MouseButton::Side2 => "ms2",
        }
    }

    /// Suffix used by the `km.lock_m{axis}(bit)` command.
    pub fn lock_axis(self) -> LockAxis {
        match self {
            MouseButton::Left => LockAxis::Left,
            MouseButton::Right => LockAxis::Right,
            MouseButton::Middle => LockAxis::Middle,
            MouseButton::Side1 => LockAxis::Side1,
            MouseButton::Side2 => LockAxis::Side2,
        }
    }
}

impl TryFrom<u8> for MouseButton {
    type Error = ButtonError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MouseButton::Left),
            2 => Ok(MouseButton::Right),
            3 => Ok(MouseButton::Middle),
            4 => Ok(MouseButton::Side1),
            5 => Ok(MouseButton::Side2),
            other => Err(ButtonError::InvalidId(other)),
        }
    }
}

impl Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAxis {
    Left,
    Right,
    Middle,
    Side1,
    Side2,
}

impl LockAxis {
    pub fn wire_name(self) -> &'static str {
        match self {
            LockAxis::Left => "l",
            LockAxis::Right => "r",
            LockAxis::Middle => "m",
            LockAxis::Side1 => "s1",
            LockAxis::Side2 => "s2",
        }
    }
}

/// Pressed state of all five buttons at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonState {
    mask: u8,
}

impl ButtonState {
    /// Bit `i` of `mask` is the pressed state of button `i + 1`.
    pub fn from_mask(mask: u8) -> Self {
        Self {
            mask: mask & MASK_BITS,
        }
    }

    /// Decode one telemetry byte, or `None` if it is not a status code.
    pub fn decode(byte: u8) -> Option<Self> {
        if TELEMETRY_WHITELIST.contains(&byte) {
            Some(Self::from_mask(byte))
        } else {
            None
        }
    }

    pub fn mask(self) -> u8 {
        self.mask
    }

    pub fn is_pressed(self, button: MouseButton) -> bool {
        self.mask & (1 << (button.id() - 1)) != 0
    }

    /// `(button id, pressed)` for every button, always five entries.
    pub fn entries(self) -> [(u8, bool); BUTTON_COUNT] {
        MouseButton::ALL.map(|button| (button.id(), self.is_pressed(button)))
    }
}

impl Display for ButtonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pressed = MouseButton::ALL
            .iter()
            .filter(|button| self.is_pressed(**button))
            .map(|button| button.wire_name())
            .collect::<Vec<_>>();
        if pressed.is_empty() {
            write!(f, "(buttons: none)")
        } else {
            write!(f, "(buttons: {})", pressed.join("+"))
        }
    }
}

/// Shared button table. The whole snapshot lives in one atomic byte so a
/// reader can never observe a partially decoded update.
#[derive(Debug, Default)]
pub struct ButtonTable {
    mask: AtomicU8,
}

impl ButtonTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, state: ButtonState) {
        self.mask.store(state.mask(), Ordering::Release);
    }

    pub fn snapshot(&self) -> ButtonState {
        ButtonState::from_mask(self.mask.load(Ordering::Acquire))
    }

    pub fn reset(&self) {
        self.publish(ButtonState::default());
    }
}
