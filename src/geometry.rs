//! Geometry primitives shared by the correction passes.

use crate::error::{CorrectionError, Result};
use crate::model::Pose;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const ORIGIN: Point3D = Point3D { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3D { x, y, z }
    }

    /// Exact comparison with the origin sentinel.
    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Componentwise linear blend: `self + t * (other - self)`.
    pub fn lerp(self, other: Point3D, t: f64) -> Point3D {
        self + (other - self) * t
    }
}

impl Add for Point3D {
    type Output = Point3D;
    fn add(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3D {
    type Output = Point3D;
    fn sub(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3D {
    type Output = Point3D;
    fn mul(self, rhs: f64) -> Point3D {
        Point3D::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Point3D, b: Point3D) -> f64 {
    let d = b - a;
    (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
}

/// Time from `pose_a` to `pose_b` in seconds.
///
/// Signed: passing the poses in reverse order yields a negative delay. Callers
/// are responsible for the argument order.
pub fn delay(pose_a: &Pose, pose_b: &Pose) -> f64 {
    pose_b.relative_timestamp() - pose_a.relative_timestamp()
}

/// Speed of `joint_label` between two poses, in metres per second.
///
/// Fails with [`CorrectionError::ZeroDelay`] when both poses share a timestamp.
pub fn velocity(pose_a: &Pose, pose_b: &Pose, joint_label: &str) -> Result<f64> {
    let a = pose_a
        .joint(joint_label)
        .ok_or_else(|| CorrectionError::UnknownJoint(joint_label.to_string()))?;
    let b = pose_b
        .joint(joint_label)
        .ok_or_else(|| CorrectionError::UnknownJoint(joint_label.to_string()))?;

    let dt = delay(pose_a, pose_b);
    if dt == 0.0 {
        return Err(CorrectionError::ZeroDelay(pose_a.timestamp()));
    }
    Ok(distance(a.position, b.position) / dt)
}
