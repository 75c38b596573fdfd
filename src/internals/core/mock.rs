//! Recording stand-ins for the external memory layer and entity model.
//!
//! Writes are pushed into a `Mutex<Vec<...>>` so assertions can inspect
//! exactly what would have reached process memory.

use std::{ops::Range, sync::Mutex};

use super::ports::{MemoryError, MonitoredEntity, MonitoredProcess};
use crate::models::vector::{Quat, Vec3};

pub const SHOT_DIRECTION_ADDRESS: u64 = 0x1_4000_0100;

pub struct MockProcess {
    pub in_session: bool,
    pub valid_range: Range<u64>,
    /// Records each `(address, bytes)` passed to `write_bytes`.
    pub writes: Mutex<Vec<(u64, Vec<u8>)>>,
    /// When `true`, every write returns `MemoryError::WriteFailed`.
    pub should_fail: bool,
}

impl MockProcess {
    pub fn new() -> Self {
        Self {
            in_session: true,
            valid_range: 0x1_0000..0x7FFF_FFFF_FFFF,
            writes: Mutex::new(vec![]),
            should_fail: false,
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn last_write(&self) -> Option<(u64, Vec<u8>)> {
        self.writes.lock().unwrap().last().cloned()
    }
}

impl MonitoredProcess for MockProcess {
    fn in_session(&self) -> bool {
        self.in_session
    }

    fn is_valid_address(&self, address: u64) -> bool {
        self.valid_range.contains(&address)
    }

    fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<(), MemoryError> {
        Err(MemoryError::ReadFailed {
            address,
            len: buffer.len(),
        })
    }

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        if self.should_fail {
            return Err(MemoryError::WriteFailed {
                address,
                len: bytes.len(),
            });
        }
        self.writes.lock().unwrap().push((address, bytes.to_vec()));
        Ok(())
    }
}

pub struct MockEntity {
    pub muzzle_position: Option<Vec3>,
    pub muzzle_rotation: Option<Quat>,
    pub shot_direction_address: Option<u64>,
}

impl MockEntity {
    pub fn at(position: Vec3) -> Self {
        Self {
            muzzle_position: Some(position),
            muzzle_rotation: Some(Quat::IDENTITY),
            shot_direction_address: Some(SHOT_DIRECTION_ADDRESS),
        }
    }
}

impl MonitoredEntity for MockEntity {
    fn muzzle_position(&self) -> Option<Vec3> {
        self.muzzle_position
    }

    fn muzzle_rotation(&self) -> Option<Quat> {
        self.muzzle_rotation
    }

    fn shot_direction_address(&self) -> Option<u64> {
        self.shot_direction_address
    }
}
