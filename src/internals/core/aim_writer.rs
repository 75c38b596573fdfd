use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    aim_request::AimRequest,
    vector::{Quat, Vec3, VectorError},
};

use super::{
    feature::{CycleContext, Feature, FeatureError},
    ports::{MemoryError, ProcessMemoryExt},
    toggles::WriteToggles,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AimWriterState {
    Disabled,
    IdleEnabled,
    Armed,
}

#[derive(Error, Debug, PartialEq)]
pub enum AimError {
    #[error("Muzzle position is unavailable.")]
    MuzzlePositionUnavailable,

    #[error("Muzzle position is not resolved yet.")]
    MuzzleUnresolved,

    #[error("Muzzle rotation is unavailable.")]
    MuzzleRotationUnavailable,

    #[error("Shot direction is undefined. {0}")]
    Direction(#[from] VectorError),

    #[error("Shot direction address is unavailable.")]
    AddressUnavailable,

    #[error("Invalid shot direction address 0x{0:X}.")]
    InvalidAddress(u64),

    #[error("Failed to write shot direction. {0}")]
    Write(#[from] MemoryError),
}

/// Thread safe arming interface handed to whatever decides when and where to
/// aim (the device button listener or another input source).
#[derive(Debug, Clone, Default)]
pub struct AimHandle {
    request: Arc<Mutex<AimRequest>>,
}

impl AimHandle {
    fn lock(&self) -> MutexGuard<'_, AimRequest> {
        // AimRequest has no invariant a panicking writer could break halfway.
        self.request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_engaged(&self, engaged: bool) {
        self.lock().set_engaged(engaged);
    }

    pub fn set_target(&self, target: Option<Vec3>) {
        self.lock().set_target(target);
    }

    pub fn snapshot(&self) -> AimRequest {
        *self.lock()
    }

    fn take_armed_target(&self) -> Option<Vec3> {
        self.lock().take_armed_target()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimStatus {
    pub state: AimWriterState,
    pub engaged: bool,
    pub has_target: bool,
    pub writes_applied: u64,
    pub writes_skipped: u64,
}

impl Display for AimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Aim | state:{:?}, key:{}, target:{}, applied:{}, skipped:{}>",
            self.state,
            if self.engaged { "engaged" } else { "idle" },
            if self.has_target { "set" } else { "none" },
            self.writes_applied,
            self.writes_skipped
        )
    }
}

/// Writes a corrected shot direction into process memory once per armed cycle.
pub struct AimWriter {
    toggles: Arc<WriteToggles>,
    handle: AimHandle,
    last_enabled: bool,
    writes_applied: u64,
    writes_skipped: u64,
}

impl AimWriter {
    pub fn new(toggles: Arc<WriteToggles>) -> Self {
        Self {
            toggles,
            handle: AimHandle::default(),
            last_enabled: false,
            writes_applied: 0,
            writes_skipped: 0,
        }
    }

    pub fn handle(&self) -> AimHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> AimWriterState {
        if !self.toggles.memory_aim_enabled() {
            AimWriterState::Disabled
        } else if self.handle.snapshot().is_armed() {
            AimWriterState::Armed
        } else {
            AimWriterState::IdleEnabled
        }
    }

    pub fn status(&self) -> AimStatus {
        let request = self.handle.snapshot();
        AimStatus {
            state: self.state(),
            engaged: request.is_engaged(),
            has_target: request.target().is_some(),
            writes_applied: self.writes_applied,
            writes_skipped: self.writes_skipped,
        }
    }

    /// Track the enable flag, logging only on transitions. Disabling drops
    /// any pending request.
    fn sync_enabled(&mut self) -> bool {
        let enabled = self.toggles.memory_aim_enabled();
        if enabled != self.last_enabled {
            self.last_enabled = enabled;
            if enabled {
                info!("Memory aim enabled.");
            } else {
                self.handle.clear();
                info!("Memory aim disabled.");
            }
        }
        enabled
    }
}

/// Direction the process expects in its shot direction field: the unit vector
/// from muzzle to target expressed in the muzzle's local frame.
pub fn compute_shot_direction(muzzle: Vec3, rotation: Quat, target: Vec3) -> Result<Vec3, AimError> {
    let world = muzzle.direction_to(target)?;
    let local = rotation.inverse_transform_direction(world);
    if !local.is_finite() {
        return Err(AimError::Direction(VectorError::NonFinite));
    }
    Ok(local)
}

fn write_shot_direction(context: &CycleContext<'_>, target: Vec3) -> Result<Vec3, AimError> {
    let muzzle = context
        .entity
        .muzzle_position()
        .ok_or(AimError::MuzzlePositionUnavailable)?;
    if muzzle.is_zero() {
        return Err(AimError::MuzzleUnresolved);
    }
    let rotation = context
        .entity
        .muzzle_rotation()
        .ok_or(AimError::MuzzleRotationUnavailable)?;

    let direction = compute_shot_direction(muzzle, rotation, target)?;

    let address = context
        .entity
        .shot_direction_address()
        .ok_or(AimError::AddressUnavailable)?;
    if !context.process.is_valid_address(address) {
        return Err(AimError::InvalidAddress(address));
    }

    context.process.write_vec3(address, direction)?;
    Ok(direction)
}

impl Feature for AimWriter {
    fn name(&self) -> &'static str {
        "memory_aim"
    }

    fn try_apply(&mut self, context: &CycleContext<'_>) -> Result<(), FeatureError> {
        if !self.sync_enabled() {
            return Ok(());
        }

        // Taking the target disarms the writer whatever the outcome below.
        let target = match self.handle.take_armed_target() {
            None => return Ok(()),
            Some(target) => target,
        };

        debug!("Applying aim towards {}.", target);
        match write_shot_direction(context, target) {
            Ok(direction) => {
                self.writes_applied += 1;
                debug!("Aim applied. Direction: {}", direction);
                Ok(())
            }
            Err(e) => {
                self.writes_skipped += 1;
                Err(e.into())
            }
        }
    }

    fn on_session_start(&mut self) {
        debug!("Resetting memory aim for new session.");
        self.last_enabled = false;
        self.handle.clear();
    }
}
