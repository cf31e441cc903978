//! Geographic to Cartesian projection
//!
//! Every layer of the globe (graticule, markers, arcs, particles) goes through
//! `project`, so they all agree on one sphere orientation: +Y is the north
//! pole, the prime meridian faces +X and 90°E faces -Z.

use std::ops::{Add, Mul, Sub};

/// A point (or vector) in globe space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const ZERO: Point3 = Point3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UNIT_X: Point3 = Point3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const UNIT_Y: Point3 = Point3 { x: 0.0, y: 1.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Point3) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector
    pub fn normalized(self) -> Option<Point3> {
        let len = self.length();
        if len < 1e-6 || !len.is_finite() {
            return None;
        }
        Some(self * (1.0 / len))
    }

    pub fn cross(self, other: Point3) -> Point3 {
        Point3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn lerp(self, other: Point3, t: f32) -> Point3 {
        self + (other - self) * t
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Point3;
    fn mul(self, rhs: f32) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Latitude/longitude pair in degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: f32,
    pub longitude: f32,
}

impl GeoPoint {
    pub const fn new(latitude: f32, longitude: f32) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn project(&self, radius: f32) -> Point3 {
        project(self.latitude, self.longitude, radius)
    }
}

/// Project latitude/longitude (degrees) onto a sphere of `radius`.
///
/// Uses polar angle phi = 90 - lat and azimuth theta = lng + 180:
/// `x = -r sin(phi) cos(theta)`, `y = r cos(phi)`, `z = r sin(phi) sin(theta)`.
/// Out-of-range input yields `Point3::ZERO`; validate upstream with
/// [`GeoPoint::is_valid`].
pub fn project(lat: f32, lng: f32, radius: f32) -> Point3 {
    if !GeoPoint::new(lat, lng).is_valid() || !radius.is_finite() {
        return Point3::ZERO;
    }

    let phi = (90.0 - lat).to_radians();
    let theta = (lng + 180.0).to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let (sin_theta, cos_theta) = theta.sin_cos();

    Point3::new(
        -(radius * sin_phi * cos_theta),
        radius * cos_phi,
        radius * sin_phi * sin_theta,
    )
}
