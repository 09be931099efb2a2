//! 3D vector arithmetic and point-to-segment distance
//!
//! Units are whatever the caller uses consistently; the matcher works in mm.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Segment length used when a crossing has no usable path length (10 m)
pub const DEGENERATE_RAY_LENGTH_MM: f64 = 10_000.0;

/// A point or direction in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn norm_squared(self) -> f64 {
        self.dot(self)
    }

    /// Length without overflow in the intermediate squares
    #[inline]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y).hypot(self.z)
    }

    /// Euclidean distance between two points
    #[inline]
    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).norm()
    }

    /// Distance from the z axis
    #[inline]
    pub fn transverse(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction, or None for a zero/non-finite vector
    pub fn unit(self) -> Option<Vec3> {
        let n = self.norm();
        if n > 0.0 && n.is_finite() {
            Some(self * (1.0 / n))
        } else {
            None
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// Distance from `point` to the closed segment `[start, end]`
///
/// Projects onto the unit direction of the segment and clamps the
/// projection to `[0, length]`. A zero-length segment reduces to the
/// distance between `start` and `point`. NaN inputs propagate.
pub fn point_segment_distance(start: Vec3, end: Vec3, point: Vec3) -> f64 {
    let seg = end - start;
    let length = seg.norm();
    if length == 0.0 {
        return point.distance(start);
    }

    let dir = seg * (1.0 / length);
    let along = (point - start).dot(dir);
    if along.is_nan() || length.is_nan() {
        return f64::NAN;
    }
    point.distance(start + dir * along.clamp(0.0, length))
}

/// Finite segment traced by a particle from a scoring-plane crossing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub start: Vec3,
    pub end: Vec3,
}

impl Ray {
    /// Build the ray for a crossing at `origin` moving along `momentum`
    ///
    /// Non-positive or non-finite path lengths use `DEGENERATE_RAY_LENGTH_MM`.
    /// A zero momentum collapses the ray onto its origin.
    pub fn from_crossing(origin: Vec3, momentum: Vec3, path_length: f64) -> Self {
        let length = if path_length.is_finite() && path_length > 0.0 {
            path_length
        } else {
            DEGENERATE_RAY_LENGTH_MM
        };

        let end = match momentum.unit() {
            Some(dir) => origin + dir * length,
            None => origin,
        };

        Self { start: origin, end }
    }

    #[inline]
    pub fn distance_to(&self, point: Vec3) -> f64 {
        point_segment_distance(self.start, self.end, point)
    }
}
