use thiserror::Error;

use super::{
    aim_writer::AimError,
    ports::{MonitoredEntity, MonitoredProcess},
};

/// Everything a feature may touch during one control cycle.
pub struct CycleContext<'a> {
    pub process: &'a dyn MonitoredProcess,
    pub entity: &'a dyn MonitoredEntity,
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Aim write skipped. {0}")]
    Aim(#[from] AimError),

    #[error("Feature failed. {0}")]
    Failed(String),
}

/// An effector run once per control cycle by the dispatcher.
pub trait Feature: Send {
    fn name(&self) -> &'static str;

    /// Apply the feature if it is enabled and has work to do. Returning an
    /// error only skips this cycle; the feature is invoked again next cycle.
    fn try_apply(&mut self, context: &CycleContext<'_>) -> Result<(), FeatureError>;

    /// Drop all per-session state.
    fn on_session_start(&mut self);
}
