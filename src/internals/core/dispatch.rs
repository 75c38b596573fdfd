use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::{
    feature::{CycleContext, Feature, FeatureError},
    ports::{MonitoredEntity, MonitoredProcess},
    toggles::WriteToggles,
};

/// What a single dispatch cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    WritesDisabled,
    NoEntity,
    NotInSession,
    Ran { succeeded: usize, failed: usize },
}

/// Runs every registered feature once per control cycle, in registration
/// order. A failing feature is logged and the rest still run.
pub struct FeatureDispatcher {
    toggles: Arc<WriteToggles>,
    features: Vec<Box<dyn Feature>>,
}

impl FeatureDispatcher {
    pub fn new(toggles: Arc<WriteToggles>) -> Self {
        Self {
            toggles,
            features: vec![],
        }
    }

    pub fn register(&mut self, feature: Box<dyn Feature>) {
        info!("Registered feature '{}'.", feature.name());
        self.features.push(feature);
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|feature| feature.name()).collect()
    }

    pub fn apply(
        &mut self,
        process: &dyn MonitoredProcess,
        entity: Option<&dyn MonitoredEntity>,
    ) -> DispatchOutcome {
        if !self.toggles.writes_enabled() {
            return DispatchOutcome::WritesDisabled;
        }
        let entity = match entity {
            None => {
                debug!("No monitored entity this cycle.");
                return DispatchOutcome::NoEntity;
            }
            Some(entity) => entity,
        };
        if !process.in_session() {
            return DispatchOutcome::NotInSession;
        }

        let context = CycleContext { process, entity };
        let mut succeeded = 0;
        let mut failed = 0;
        for feature in self.features.iter_mut() {
            match feature.try_apply(&context) {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    log_feature_error(feature.name(), &e);
                }
            }
        }
        trace!("Dispatched {} features, {} failed.", succeeded + failed, failed);

        DispatchOutcome::Ran { succeeded, failed }
    }

    #[tracing::instrument(skip_all)]
    pub fn on_session_start(&mut self) {
        info!("Session started. Resetting {} features.", self.features.len());
        for feature in self.features.iter_mut() {
            feature.on_session_start();
        }
    }
}

fn log_feature_error(name: &str, error: &FeatureError) {
    match error {
        FeatureError::Aim(e) => debug!("Feature '{}' skipped this cycle. Error: {}", name, e),
        FeatureError::Failed(_) => warn!("Feature '{}' failed. Error: {}", name, error),
    }
}
