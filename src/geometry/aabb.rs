use nalgebra::Vector3;
use serde::{Deserialize, Deserializer, Serialize};

/// Per-axis tolerance below which a pushed child center is considered to not have moved.
pub const CENTER_EPSILON: f32 = 1e-6;

/// Cube-like axis aligned box stored as a center and a half size, with cached extents.
///
/// The four triples are packed together and aligned to 16 bytes so a node's bounds can be fed to
/// vector units without repacking.
#[repr(C, align(16))]
#[derive(Serialize, PartialEq, Debug, Clone, Copy)]
pub struct Aabb {
    center: Vector3<f32>,
    half_size: Vector3<f32>,
    #[serde(skip)]
    min: Vector3<f32>,
    #[serde(skip)]
    max: Vector3<f32>,
}

impl<'de> Deserialize<'de> for Aabb {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            center: Vector3<f32>,
            half_size: Vector3<f32>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(Aabb::new(raw.center, raw.half_size))
    }
}

impl Aabb {
    pub fn new(center: Vector3<f32>, half_size: Vector3<f32>) -> Self {
        let mut aabb = Self {
            center,
            half_size,
            min: center,
            max: center,
        };
        aabb.update_min_max();
        aabb
    }

    /// A cube of the given half size on every axis.
    pub fn cube(center: Vector3<f32>, half_size: f32) -> Self {
        Self::new(center, Vector3::repeat(half_size))
    }

    pub fn from_extents(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        let half_size = (max - min) / 2.;
        Self::new(min + half_size, half_size)
    }

    pub fn center(&self) -> Vector3<f32> {
        self.center
    }

    pub fn half_size(&self) -> Vector3<f32> {
        self.half_size
    }

    pub fn get_min(&self) -> Vector3<f32> {
        self.min
    }

    pub fn get_max(&self) -> Vector3<f32> {
        self.max
    }

    pub fn set_center(&mut self, center: Vector3<f32>) {
        self.center = center;
        self.update_min_max();
    }

    pub fn set_half_size(&mut self, half_size: Vector3<f32>) {
        self.half_size = half_size;
        self.update_min_max();
    }

    fn update_min_max(&mut self) {
        self.max = self.center + self.half_size;
        self.min = self.center - self.half_size;
    }

    /// Half open containment: `min < point <= max` on every axis, so a point sitting on a shared
    /// face belongs to exactly one of two neighbouring cells.
    pub fn contains_point(&self, point: Vector3<f32>) -> bool {
        point.x > self.min.x
            && point.x <= self.max.x
            && point.y > self.min.y
            && point.y <= self.max.y
            && point.z > self.min.z
            && point.z <= self.max.z
    }

    /// Closed containment, `min <= point <= max` on every axis.
    pub fn encloses_point(&self, point: Vector3<f32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Containment of a point carrying a radius that must also fit the box.
    pub fn is_inside(&self, point: Vector3<f32>, radius: f32) -> bool {
        radius <= self.half_size.x * 2. && self.contains_point(point)
    }

    pub fn intersects_bounds(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Squared distance from `point` to the closest point of the box.
    pub fn distance_squared(&self, point: Vector3<f32>) -> f32 {
        let clamped = Vector3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        (point - clamped).norm_squared()
    }

    /// Octant of `point` relative to the center, one bit per axis (x = 1, y = 2, z = 4).
    pub fn octant_of(&self, point: Vector3<f32>) -> u8 {
        octant_between(self.center, point)
    }
}

pub fn octant_between(center: Vector3<f32>, point: Vector3<f32>) -> u8 {
    u8::from(point.x > center.x)
        | (u8::from(point.y > center.y) << 1)
        | (u8::from(point.z > center.z) << 2)
}

/// Moves `center` by `size` towards `point` on each axis.
pub fn push_center(center: Vector3<f32>, size: Vector3<f32>, point: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(
        push_axis(center.x, size.x, point.x),
        push_axis(center.y, size.y, point.y),
        push_axis(center.z, size.z, point.z),
    )
}

fn push_axis(center: f32, size: f32, point: f32) -> f32 {
    if point > center {
        center + size
    } else {
        center - size
    }
}

/// True when `a` and `b` cannot be told apart on any axis.
pub fn indistinguishable(a: Vector3<f32>, b: Vector3<f32>) -> bool {
    let delta = (a - b).abs();
    delta.x < CENTER_EPSILON && delta.y < CENTER_EPSILON && delta.z < CENTER_EPSILON
}
