//! Geometry helpers shared by every component.
//!
//! Instrument space is right-handed with **y up**.  The neck runs along x
//! (fret 12 sits at the origin, the nut at positive x), strings are separated
//! in depth along z.

use serde::Deserialize;
use std::ops::{Add, Sub};

// ════════════════════════════════════════════════════════════════════════════
// Vec3
// ════════════════════════════════════════════════════════════════════════════

/// A point or offset in instrument space, metres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// The same point projected onto the floor plane (y = 0).
    pub fn flat(self) -> Vec3 {
        Vec3 { y: 0.0, ..self }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 { Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z) }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 { Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z) }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{X: {:.3} Y: {:.3} Z: {:.3}}}", self.x, self.y, self.z)
    }
}

/// Euclidean distance between `a` and `b` ignoring height off the ground.
pub fn flat_distance(a: Vec3, b: Vec3) -> f32 {
    (a.flat() - b.flat()).length()
}

// ════════════════════════════════════════════════════════════════════════════
// Band — closed interval on one axis
// ════════════════════════════════════════════════════════════════════════════

/// Closed interval `[min, max]` along a single axis.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub const fn new(min: f32, max: f32) -> Self {
        Band { min, max }
    }

    /// Band of total width `2 * half_width` around `centre`.
    pub fn centred(centre: f32, half_width: f32) -> Self {
        Band { min: centre - half_width, max: centre + half_width }
    }

    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    pub fn centre(&self) -> f32 {
        (self.min + self.max) * 0.5
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_distance_ignores_height() {
        let a = Vec3::new(3.0, 100.0, 4.0);
        assert!((flat_distance(a, Vec3::ZERO) - 5.0).abs() < 1e-6);
        let b = Vec3::new(3.0, -7.0, 4.0);
        assert_eq!(flat_distance(a, b), 0.0);
    }

    #[test]
    fn band_is_closed_on_both_ends() {
        let b = Band::new(-0.5, 0.5);
        assert!(b.contains(-0.5));
        assert!(b.contains(0.5));
        assert!(!b.contains(0.5001));
    }

    #[test]
    fn centred_band() {
        let b = Band::centred(1.0, 0.25);
        assert_eq!(b.min, 0.75);
        assert_eq!(b.max, 1.25);
        assert_eq!(b.centre(), 1.0);
        assert_eq!(b.width(), 0.5);
    }

    #[test]
    fn inverted_band_is_invalid() {
        assert!(!Band::new(1.0, 0.0).is_valid());
        assert!(!Band::new(f32::NAN, 0.0).is_valid());
        assert!(Band::new(0.0, 0.0).is_valid());
    }
}
