//! Curved routes between two points on the globe
//!
//! Each route is a quadratic Bézier lifted off the surface: both endpoints sit
//! on the sphere and the single control point floats above their midpoint at a
//! height that grows with the chord length, so long-haul arcs clear the globe
//! and short hops stay low.

use super::projection::{GeoPoint, Point3};
use crate::config::ApexParams;

/// A directed origin -> destination pair, by region name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteEdge {
    pub origin: String,
    pub destination: String,
}

impl RouteEdge {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

/// A built route: control points plus the sampled path particles walk along
#[derive(Clone, Debug)]
pub struct RouteArc {
    pub edge: RouteEdge,
    pub control_points: [Point3; 3],
    path: Box<[Point3]>,
}

impl RouteArc {
    pub fn path(&self) -> &[Point3] {
        &self.path
    }

    pub fn start(&self) -> Point3 {
        self.control_points[0]
    }

    pub fn end(&self) -> Point3 {
        self.control_points[2]
    }
}

/// Build the arc for `edge` between two geographic points on a sphere of
/// `radius`, sampled into exactly `samples` points (at least 2).
pub fn build_arc(
    edge: RouteEdge,
    origin: GeoPoint,
    destination: GeoPoint,
    radius: f32,
    apex: &ApexParams,
    samples: usize,
) -> RouteArc {
    let start = origin.project(radius);
    let end = destination.project(radius);
    let mid = control_point(start, end, radius, apex);
    let control_points = [start, mid, end];

    RouteArc {
        edge,
        control_points,
        path: sample_quadratic(&control_points, samples),
    }
}

/// Control point above the chord midpoint at `radius + apex.height(chord)`
fn control_point(start: Point3, end: Point3, radius: f32, apex: &ApexParams) -> Point3 {
    let altitude = radius + apex.height(start.distance(end));

    let direction = start
        .lerp(end, 0.5)
        .normalized()
        .or_else(|| antipodal_direction(start))
        .unwrap_or(Point3::UNIT_Y);

    direction * altitude
}

/// Endpoints on opposite sides of the sphere average out to the center, so
/// lift the arc over a direction perpendicular to them instead.
fn antipodal_direction(start: Point3) -> Option<Point3> {
    start
        .cross(Point3::UNIT_Y)
        .normalized()
        .or_else(|| start.cross(Point3::UNIT_X).normalized())
}

/// Sample a quadratic Bézier at `samples` uniform parameter steps.
/// Uniform in t, not arc length.
fn sample_quadratic(points: &[Point3; 3], samples: usize) -> Box<[Point3]> {
    let samples = samples.max(2);
    let [p0, p1, p2] = *points;
    let last = (samples - 1) as f32;

    (0..samples)
        .map(|i| {
            // pin the ends exactly instead of trusting t = 1.0 arithmetic
            if i == 0 {
                return p0;
            }
            if i == samples - 1 {
                return p2;
            }
            let t = i as f32 / last;
            let u = 1.0 - t;
            p0 * (u * u) + p1 * (2.0 * u * t) + p2 * (t * t)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe::projection::project;

    const EPS: f32 = 1e-4;

    fn arc(a: (f32, f32), b: (f32, f32), samples: usize) -> RouteArc {
        build_arc(
            RouteEdge::new("a", "b"),
            GeoPoint::new(a.0, a.1),
            GeoPoint::new(b.0, b.1),
            5.0,
            &ApexParams::default(),
            samples,
        )
    }

    #[test]
    fn endpoints_match_projection() {
        let pairs = [
            ((0.0, 0.0), (0.0, 90.0)),
            ((41.0, 29.0), (40.7, -74.0)),
            ((-33.9, 151.2), (51.5, -0.1)),
            ((10.0, 10.0), (10.1, 10.1)),
        ];
        for (a, b) in pairs {
            let arc = arc(a, b, 200);
            let path = arc.path();
            assert!(path[0].distance(project(a.0, a.1, 5.0)) < EPS);
            assert!(path[path.len() - 1].distance(project(b.0, b.1, 5.0)) < EPS);
        }
    }

    #[test]
    fn sample_count_is_fixed_regardless_of_distance() {
        for n in [2, 5, 10, 200] {
            assert_eq!(arc((0.0, 0.0), (0.0, 1.0), n).path().len(), n);
            assert_eq!(arc((0.0, 0.0), (0.0, 179.0), n).path().len(), n);
        }
        // anything below two points is raised to two
        assert_eq!(arc((0.0, 0.0), (0.0, 90.0), 0).path().len(), 2);
    }

    #[test]
    fn longer_routes_arc_higher() {
        let short = arc((0.0, 0.0), (0.0, 20.0), 101);
        let long = arc((0.0, 0.0), (0.0, 120.0), 101);
        let apex = |a: &RouteArc| a.path().iter().map(|p| p.length()).fold(0.0, f32::max);
        assert!(apex(&long) > apex(&short));
        assert!(apex(&short) > 5.0);
    }

    #[test]
    fn control_point_sits_above_midpoint() {
        let a = arc((0.0, 0.0), (0.0, 90.0), 10);
        let [start, mid, end] = a.control_points;
        let expected = 5.0 + (start.distance(end) * 0.5).min(5.0);
        assert!((mid.length() - expected).abs() < EPS);
        let dir = start.lerp(end, 0.5).normalized().unwrap();
        assert!(mid.normalized().unwrap().distance(dir) < EPS);
    }

    #[test]
    fn antipodal_route_does_not_collapse() {
        let a = arc((0.0, 0.0), (0.0, 180.0), 51);
        let mid = a.path()[25];
        assert!(mid.length() > 5.0 * 0.5, "arc passed through the core: {mid:?}");
        assert!(mid.x.is_finite() && mid.y.is_finite() && mid.z.is_finite());

        let poles = arc((90.0, 0.0), (-90.0, 0.0), 51);
        assert!(poles.path()[25].length() > 2.5);
    }
}
