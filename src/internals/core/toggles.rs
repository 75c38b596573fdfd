use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::WritesConfig;

/// Runtime switches for the memory write features. Shared between the UI or
/// config layer that flips them and the cycle that reads them.
#[derive(Debug, Default)]
pub struct WriteToggles {
    writes_enabled: AtomicBool,
    memory_aim_enabled: AtomicBool,
}

impl WriteToggles {
    pub fn new(writes_enabled: bool, memory_aim_enabled: bool) -> Self {
        Self {
            writes_enabled: AtomicBool::new(writes_enabled),
            memory_aim_enabled: AtomicBool::new(memory_aim_enabled),
        }
    }

    pub fn writes_enabled(&self) -> bool {
        self.writes_enabled.load(Ordering::Relaxed)
    }

    pub fn set_writes_enabled(&self, enabled: bool) {
        self.writes_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn memory_aim_enabled(&self) -> bool {
        self.memory_aim_enabled.load(Ordering::Relaxed)
    }

    pub fn set_memory_aim_enabled(&self, enabled: bool) {
        self.memory_aim_enabled.store(enabled, Ordering::Relaxed);
    }
}

impl From<&WritesConfig> for WriteToggles {
    fn from(config: &WritesConfig) -> Self {
        Self::new(config.enabled, config.memory_aim_enabled)
    }
}
