//! Points and axis-aligned boxes in the map frame.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Point3`] | A 3-D coordinate (room centres, landmark positions). |
//! | [`Bounds`] | An axis-aligned box; the fixed extent of a room. |
//!
//! ```rust
//! use wayfinder_perception::geometry::{Bounds, Point3};
//!
//! let room = Bounds::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 3.0, 2.5));
//! assert!(room.contains_xy(1.0, 1.0));
//! assert_eq!(room.centre(), Point3::new(2.0, 1.5, 1.25));
//! ```

use serde::{Deserialize, Serialize};
use wayfinder_types::Landmark;

// ────────────────────────────────────────────────────────────────────────────
// Point3
// ────────────────────────────────────────────────────────────────────────────

/// A point in 3-D space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Arithmetic mean of `points`, or `None` for an empty set.
    pub fn mean<I>(points: I) -> Option<Point3>
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut n = 0usize;
        let (mut sx, mut sy, mut sz) = (0.0f64, 0.0f64, 0.0f64);
        for p in points {
            sx += f64::from(p.x);
            sy += f64::from(p.y);
            sz += f64::from(p.z);
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let n = n as f64;
        Some(Point3::new((sx / n) as f32, (sy / n) as f32, (sz / n) as f32))
    }
}

impl From<&Landmark> for Point3 {
    fn from(l: &Landmark) -> Self {
        Point3::new(l.x, l.y, l.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bounds
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point3,
    pub max: Point3,
}

impl Bounds {
    /// Create a box from two opposite corners, normalised so `min ≤ max`.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Tightest box around `points`, or `None` for an empty set.
    pub fn from_points<I>(points: I) -> Option<Bounds>
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.min.z = bounds.min.z.min(p.z);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
            bounds.max.z = bounds.max.z.max(p.z);
        }
        Some(bounds)
    }

    /// Centre point of the box.
    pub fn centre(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Point3) -> bool {
        self.contains_xy(p.x, p.y) && p.z >= self.min.z && p.z <= self.max.z
    }

    /// Planar containment test; the vertical extent is ignored.
    pub fn contains_xy(&self, x: f32, y: f32) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }

    /// Footprint area on the floor plane.
    pub fn area_xy(&self) -> f32 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }
}
