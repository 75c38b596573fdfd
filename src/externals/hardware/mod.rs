use std::sync::Arc;

use crate::config::DeviceConfig;

use self::{controller::DeviceController, services::SerialPortBackend};

pub mod controller;
pub mod discovery;
pub mod listener;
pub mod services;
pub mod session;

#[cfg(test)]
pub mod mock;

pub struct HardwareModule {
    pub controller: Arc<DeviceController>,
}

impl HardwareModule {
    pub fn initialize(settings: DeviceConfig) -> Self {
        let controller = Arc::new(DeviceController::new(Arc::new(SerialPortBackend), settings));
        Self { controller }
    }
}
