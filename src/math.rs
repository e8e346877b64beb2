//! Vector Math
//!
//! Minimal 3D vector type and the angle/distance helpers the perception and
//! behavior systems need. All helpers are NaN-safe: zero-length directions
//! resolve to angle 0 rather than propagating NaN.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// A point or direction in world space (y is up).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const UP: Self = Self { x: 0.0, y: 1.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Unit vector in the same direction, or `Vec3::ZERO` for degenerate input.
    pub fn normalized_or_zero(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Component-wise min/max clamp.
    pub fn clamped(self, min: Self, max: Self) -> Self {
        Self::new(
            self.x.clamp(min.x, max.x),
            self.y.clamp(min.y, max.y),
            self.z.clamp(min.z, max.z),
        )
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Angle in degrees between two directions, ignoring magnitude.
///
/// Either vector being zero-length yields 0.0 (an agent standing exactly on
/// the target counts as looking straight at it).
pub fn angle_between_deg(a: Vec3, b: Vec3) -> f32 {
    let an = a.normalized_or_zero();
    let bn = b.normalized_or_zero();
    if an == Vec3::ZERO || bn == Vec3::ZERO {
        return 0.0;
    }
    an.dot(bn).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Horizontal facing direction for a yaw angle in degrees (0 == +z).
pub fn yaw_to_dir(yaw_deg: f32) -> Vec3 {
    let rad = yaw_deg.to_radians();
    Vec3::new(rad.sin(), 0.0, rad.cos())
}

/// Yaw angle in degrees for a horizontal direction (0 == +z).
///
/// Zero-length input yields 0.0.
pub fn dir_to_yaw(dir: Vec3) -> f32 {
    if dir.x == 0.0 && dir.z == 0.0 {
        0.0
    } else {
        dir.x.atan2(dir.z).to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_between_basics() {
        let fwd = Vec3::new(0.0, 0.0, 1.0);
        assert!((angle_between_deg(fwd, fwd)).abs() < 1e-3);
        assert!((angle_between_deg(fwd, Vec3::new(1.0, 0.0, 0.0)) - 90.0).abs() < 1e-3);
        assert!((angle_between_deg(fwd, Vec3::new(0.0, 0.0, -1.0)) - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_length_direction_is_angle_zero() {
        // Agent exactly at the target position must not produce NaN.
        let angle = angle_between_deg(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        assert_eq!(angle, 0.0);
        assert!(!angle.is_nan());
    }

    #[test]
    fn test_yaw_round_trip() {
        for yaw in [0.0f32, 45.0, 90.0, -120.0] {
            let dir = yaw_to_dir(yaw);
            let back = dir_to_yaw(dir);
            let diff = ((back - yaw + 540.0) % 360.0) - 180.0;
            assert!(diff.abs() < 1e-3, "yaw {yaw} -> {back}");
        }
    }

    #[test]
    fn test_normalized_or_zero() {
        assert_eq!(Vec3::ZERO.normalized_or_zero(), Vec3::ZERO);
        let n = Vec3::new(3.0, 0.0, 4.0).normalized_or_zero();
        assert!((n.length() - 1.0).abs() < 1e-5);
    }
}
