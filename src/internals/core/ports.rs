use thiserror::Error;

use crate::models::{
    buttons::{ButtonTable, MouseButton},
    vector::{Quat, Vec3},
};

/// Access to the monitored process, supplied by the external memory layer.
pub trait MonitoredProcess {
    /// Whether the process currently has an active session (e.g. a match in
    /// progress). Memory writes are only meaningful while this is true.
    fn in_session(&self) -> bool;

    fn is_valid_address(&self, address: u64) -> bool;

    fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<(), MemoryError>;

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<(), MemoryError>;
}

/// The entity whose weapon is being corrected, resolved by the external
/// entity model.
pub trait MonitoredEntity {
    fn muzzle_position(&self) -> Option<Vec3>;

    fn muzzle_rotation(&self) -> Option<Quat>;

    /// Address of the shot direction vector the process fires along.
    fn shot_direction_address(&self) -> Option<u64>;
}

#[derive(Error, Debug, PartialEq)]
pub enum MemoryError {
    #[error("Failed to read {len} bytes at 0x{address:X}.")]
    ReadFailed { address: u64, len: usize },

    #[error("Failed to write {len} bytes at 0x{address:X}.")]
    WriteFailed { address: u64, len: usize },
}

/// Typed helpers over the raw byte interface.
pub trait ProcessMemoryExt {
    fn read_vec3(&self, address: u64) -> Result<Vec3, MemoryError>;

    fn write_vec3(&self, address: u64, value: Vec3) -> Result<(), MemoryError>;
}

impl<P: MonitoredProcess + ?Sized> ProcessMemoryExt for P {
    fn read_vec3(&self, address: u64) -> Result<Vec3, MemoryError> {
        let mut buffer = [0u8; 12];
        self.read_bytes(address, &mut buffer)?;
        Ok(Vec3::from_le_bytes(buffer))
    }

    fn write_vec3(&self, address: u64, value: Vec3) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

/// Live view of the input device's buttons.
pub trait ButtonSource: Send + Sync {
    fn button_pressed(&self, button: MouseButton) -> bool;
}

impl ButtonSource for ButtonTable {
    fn button_pressed(&self, button: MouseButton) -> bool {
        self.snapshot().is_pressed(button)
    }
}
