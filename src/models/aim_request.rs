use super::vector::Vec3;

/// What the arming source wants the aim writer to do next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AimRequest {
    target: Option<Vec3>,
    engaged: bool,
}

impl AimRequest {
    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn is_armed(&self) -> bool {
        self.engaged && self.target.is_some()
    }

    /// Releasing the engagement always drops the target with it.
    pub fn set_engaged(&mut self, engaged: bool) {
        self.engaged = engaged;
        if !engaged {
            self.target = None;
        }
    }

    pub fn set_target(&mut self, target: Option<Vec3>) {
        self.target = target;
    }

    /// Remove the target if the request is armed, leaving `engaged` as is.
    pub fn take_armed_target(&mut self) -> Option<Vec3> {
        if self.engaged {
            self.target.take()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
