use std::fmt::Display;

use derive_more::{Add, Mul, Neg, Sub};
use thiserror::Error;

/// Squared length below which a direction is treated as undefined.
const DEGENERATE_LENGTH_SQUARED: f32 = 1e-12;

/// A point or direction in the monitored process's world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Add, Sub, Neg, Mul)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Rotation stored as a quaternion with the scalar part last, matching the
/// in-memory layout of the monitored process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[derive(Error, Debug, PartialEq)]
pub enum VectorError {
    #[error("Direction is undefined between coincident points.")]
    Degenerate,
    #[error("Vector contains a non-finite component.")]
    NonFinite,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0f32,
        y: 0f32,
        z: 0f32,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn is_zero(self) -> bool {
        self == Vec3::ZERO
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Unit vector in the same direction. Fails instead of producing NaN
    /// components for a zero-length input.
    pub fn try_normalize(self) -> Result<Vec3, VectorError> {
        if !self.is_finite() {
            return Err(VectorError::NonFinite);
        }
        let length_squared = self.dot(self);
        if length_squared <= DEGENERATE_LENGTH_SQUARED {
            return Err(VectorError::Degenerate);
        }
        let normalized = self * (1f32 / length_squared.sqrt());
        if !normalized.is_finite() {
            return Err(VectorError::NonFinite);
        }
        Ok(normalized)
    }

    /// Unit direction pointing from `self` towards `destination`.
    pub fn direction_to(self, destination: Vec3) -> Result<Vec3, VectorError> {
        (destination - self).try_normalize()
    }

    /// Little endian `x, y, z` as written into process memory.
    pub fn to_le_bytes(self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&self.x.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.y.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.z.to_le_bytes());
        bytes
    }

    pub fn from_le_bytes(bytes: [u8; 12]) -> Self {
        let component = |offset: usize| {
            f32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        Self {
            x: component(0),
            y: component(4),
            z: component(8),
        }
    }
}

impl Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:.3}, {:.3}, {:.3}>", self.x, self.y, self.z)
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0f32,
        y: 0f32,
        z: 0f32,
        w: 1f32,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle_radians` about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_radians: f32) -> Self {
        let (sin, cos) = (angle_radians * 0.5f32).sin_cos();
        Self {
            x: axis.x * sin,
            y: axis.y * sin,
            z: axis.z * sin,
            w: cos,
        }
    }

    pub fn conjugate(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    /// Rotate `point` by this quaternion (expanded rotation matrix form).
    pub fn rotate(self, point: Vec3) -> Vec3 {
        let x2 = self.x * 2f32;
        let y2 = self.y * 2f32;
        let z2 = self.z * 2f32;
        let xx = self.x * x2;
        let yy = self.y * y2;
        let zz = self.z * z2;
        let xy = self.x * y2;
        let xz = self.x * z2;
        let yz = self.y * z2;
        let wx = self.w * x2;
        let wy = self.w * y2;
        let wz = self.w * z2;

        Vec3 {
            x: (1f32 - (yy + zz)) * point.x + (xy - wz) * point.y + (xz + wy) * point.z,
            y: (xy + wz) * point.x + (1f32 - (xx + zz)) * point.y + (yz - wx) * point.z,
            z: (xz - wy) * point.x + (yz + wx) * point.y + (1f32 - (xx + yy)) * point.z,
        }
    }

    /// Transform a world space direction into this rotation's local space.
    pub fn inverse_transform_direction(self, direction: Vec3) -> Vec3 {
        self.conjugate().rotate(direction)
    }
}

impl Display for Quat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{:.3}, {:.3}, {:.3}, {:.3}>",
            self.x, self.y, self.z, self.w
        )
    }
}
