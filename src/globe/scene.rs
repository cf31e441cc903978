//! Scene ownership and generation swaps
//!
//! A [`SceneState`] is one immutable generation of regions, arcs and the
//! renderable layers built from them. [`SceneComposer::rebuild`] constructs
//! the next generation completely and then replaces the current one in a
//! single assignment; particles still holding bindings into the old one are
//! released on their next tick by the generation check.

use super::arc::{build_arc, RouteEdge};
use super::particles::{ParticlePool, TickStats};
use super::projection::{project, GeoPoint, Point3};
use super::routes::RouteGraph;
use crate::config::{GlobeConfig, PartialGlobeConfig};
use rand::rngs::StdRng;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Input dataset
// ============================================================================

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRecord {
    pub name: String,
    pub latitude: f32,
    pub longitude: f32,
    #[serde(default)]
    pub active_users: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub origin_name: String,
    pub destination_name: String,
}

/// Normalized telemetry snapshot, the only input a rebuild takes
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Dataset {
    pub regions: Vec<RegionRecord>,
    #[serde(default)]
    pub routes: Vec<RouteRecord>,
}

impl Dataset {
    pub fn total_users(&self) -> u64 {
        self.regions.iter().map(|r| r.active_users).sum()
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Version tag of the scene; bumped by every rebuild
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const INITIAL: Generation = Generation(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

// ============================================================================
// Renderable layers
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub name: String,
    pub geo: GeoPoint,
    pub active_users: u64,
}

#[derive(Clone, Debug)]
pub struct Marker {
    pub name: String,
    pub position: Point3,
    pub active_users: u64,
    /// 0..=1, square-root scaled against the busiest region
    pub weight: f32,
}

#[derive(Clone, Debug, Default)]
pub struct MarkerLayer {
    pub markers: Vec<Marker>,
}

impl MarkerLayer {
    fn build(regions: &[Region], radius: f32) -> Self {
        let peak = regions.iter().map(|r| r.active_users).max().unwrap_or(0);
        let peak = (peak as f32).sqrt().max(1.0);

        let markers = regions
            .iter()
            .map(|r| Marker {
                name: r.name.clone(),
                position: r.geo.project(radius),
                active_users: r.active_users,
                weight: (r.active_users as f32).sqrt() / peak,
            })
            .collect();
        Self { markers }
    }
}

/// Latitude/longitude graticule dots of the base sphere
#[derive(Clone, Debug, Default)]
pub struct BaseSphere {
    pub radius: f32,
    pub graticule: Vec<Point3>,
}

impl BaseSphere {
    const LINE_SPACING: i32 = 30;
    const DOT_SPACING: f32 = 2.0;

    fn build(radius: f32) -> Self {
        let mut graticule = Vec::new();
        let steps = (360.0 / Self::DOT_SPACING) as i32;

        for lat in (-60..=60).step_by(Self::LINE_SPACING as usize) {
            for i in 0..steps {
                let lng = -180.0 + i as f32 * Self::DOT_SPACING;
                graticule.push(project(lat as f32, lng, radius));
            }
        }
        for lng in (-180..180).step_by(Self::LINE_SPACING as usize) {
            for i in 0..=steps / 2 {
                let lat = -90.0 + i as f32 * Self::DOT_SPACING;
                graticule.push(project(lat, lng as f32, radius));
            }
        }

        Self { radius, graticule }
    }
}

/// Glow shell drawn as a rim around the globe
#[derive(Clone, Copy, Debug, Default)]
pub struct Atmosphere {
    pub radius: f32,
}

impl Atmosphere {
    const SCALE: f32 = 1.1;
}

// ============================================================================
// Scene state
// ============================================================================

/// Counts from one rebuild
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub generation: Generation,
    pub regions: usize,
    pub skipped_regions: usize,
    pub arcs: usize,
    pub dropped_routes: usize,
}

/// One complete, immutable generation of the scene
#[derive(Clone, Debug, Default)]
pub struct SceneState {
    generation: Generation,
    regions: Vec<Region>,
    routes: RouteGraph,
    markers: MarkerLayer,
    base: BaseSphere,
    atmosphere: Atmosphere,
}

impl SceneState {
    /// Build a whole generation from `dataset`; invalid regions and routes
    /// are skipped with a warning.
    pub fn build(generation: Generation, dataset: &Dataset, config: &GlobeConfig) -> (Self, RebuildReport) {
        let mut report = RebuildReport {
            generation,
            ..Default::default()
        };

        let mut regions: Vec<Region> = Vec::with_capacity(dataset.regions.len());
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(dataset.regions.len());

        for record in &dataset.regions {
            let geo = GeoPoint::new(record.latitude, record.longitude);
            if !geo.is_valid() {
                tracing::warn!(
                    region = %record.name,
                    lat = record.latitude,
                    lng = record.longitude,
                    "skipping region with out-of-range coordinates"
                );
                report.skipped_regions += 1;
                continue;
            }
            if index.contains_key(record.name.as_str()) {
                tracing::warn!(region = %record.name, "skipping duplicate region");
                report.skipped_regions += 1;
                continue;
            }
            index.insert(&record.name, regions.len());
            regions.push(Region {
                name: record.name.clone(),
                geo,
                active_users: record.active_users,
            });
        }

        let mut routes = RouteGraph::new();
        for route in &dataset.routes {
            let (origin, destination) = (&route.origin_name, &route.destination_name);
            if origin == destination {
                tracing::warn!(%origin, "dropping route that starts and ends at the same region");
                report.dropped_routes += 1;
                continue;
            }
            let (Some(&from), Some(&to)) = (index.get(origin.as_str()), index.get(destination.as_str())) else {
                tracing::warn!(%origin, %destination, "dropping route with unknown endpoint");
                report.dropped_routes += 1;
                continue;
            };
            routes.insert(build_arc(
                RouteEdge::new(origin.as_str(), destination.as_str()),
                regions[from].geo,
                regions[to].geo,
                config.radius,
                &config.apex,
                config.sample_count,
            ));
        }

        report.regions = regions.len();
        report.arcs = routes.arc_count();

        let marker_radius = config.radius * (1.0 + config.marker_lift);
        let state = Self {
            generation,
            markers: MarkerLayer::build(&regions, marker_radius),
            base: BaseSphere::build(config.radius),
            atmosphere: Atmosphere {
                radius: config.radius * Atmosphere::SCALE,
            },
            regions,
            routes,
        };
        (state, report)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn routes(&self) -> &RouteGraph {
        &self.routes
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn base(&self) -> &BaseSphere {
        &self.base
    }

    pub fn atmosphere(&self) -> Atmosphere {
        self.atmosphere
    }
}

// ============================================================================
// Composer
// ============================================================================

/// Owns the current generation, the particle pool and the animation clock
pub struct SceneComposer {
    config: GlobeConfig,
    state: SceneState,
    pool: ParticlePool,
    dataset: Dataset,
    rotation: f32,
    rng: StdRng,
}

impl SceneComposer {
    pub fn new(config: GlobeConfig, rng: StdRng) -> Self {
        let (state, _) = SceneState::build(Generation::INITIAL, &Dataset::default(), &config);
        Self {
            pool: ParticlePool::new(config.particle_count),
            config,
            state,
            dataset: Dataset::default(),
            rotation: 0.0,
            rng,
        }
    }

    /// Replace the current generation with one built from `dataset`.
    pub fn rebuild(&mut self, dataset: Dataset) -> RebuildReport {
        let generation = self.state.generation.next();
        let (state, report) = SceneState::build(generation, &dataset, &self.config);

        self.state = state;
        self.dataset = dataset;

        tracing::info!(
            generation = %report.generation,
            regions = report.regions,
            arcs = report.arcs,
            origins = self.state.routes.origin_count(),
            skipped_regions = report.skipped_regions,
            dropped_routes = report.dropped_routes,
            "scene rebuilt"
        );
        report
    }

    /// One animation frame: rotate by `dt` seconds and step every particle
    pub fn tick(&mut self, dt: f32) -> TickStats {
        if self.config.auto_rotate && dt.is_finite() && dt > 0.0 {
            self.rotation = (self.rotation + self.config.rotation_speed * dt)
                .rem_euclid(std::f32::consts::TAU);
        }

        self.pool.tick(
            self.state.generation,
            &self.state.routes,
            self.config.activation_probability,
            &mut self.rng,
        )
    }

    /// Merge a partial config. Geometry changes (radius, apex, sample count)
    /// rebuild from the last dataset; returns true when that happened.
    pub fn set_config(&mut self, partial: &PartialGlobeConfig) -> bool {
        let change = self.config.apply(partial);

        if change.particle_count {
            self.pool.resize(self.config.particle_count);
        }
        if change.geometry {
            self.rebuild(self.dataset.clone());
        }
        change.geometry
    }

    pub fn config(&self) -> &GlobeConfig {
        &self.config
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn generation(&self) -> Generation {
        self.state.generation()
    }

    /// Current spin around the polar axis, radians
    pub fn rotation(&self) -> f32 {
        self.rotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe::particles::ParticleState;
    use crate::globe::projection::project;
    use crate::globe::routes::ArcId;
    use rand::SeedableRng;

    fn region(name: &str, lat: f32, lng: f32, users: u64) -> RegionRecord {
        RegionRecord {
            name: name.into(),
            latitude: lat,
            longitude: lng,
            active_users: users,
        }
    }

    fn route(from: &str, to: &str) -> RouteRecord {
        RouteRecord {
            origin_name: from.into(),
            destination_name: to.into(),
        }
    }

    fn composer(samples: usize, particles: usize, probability: f64) -> SceneComposer {
        let config = GlobeConfig {
            sample_count: samples,
            particle_count: particles,
            activation_probability: probability,
            ..GlobeConfig::default()
        };
        SceneComposer::new(config, StdRng::seed_from_u64(42))
    }

    fn world() -> Dataset {
        Dataset {
            regions: vec![
                region("Turkey", 39.0, 35.0, 450),
                region("Germany", 51.0, 10.0, 200),
                region("United States", 38.0, -97.0, 150),
                region("Japan", 36.0, 138.0, 0),
            ],
            routes: vec![
                route("Germany", "Turkey"),
                route("United States", "Turkey"),
                route("Japan", "Turkey"),
                route("Germany", "Japan"),
            ],
        }
    }

    #[test]
    fn two_region_scenario() {
        let mut scene = composer(10, 1, 0.0);
        let report = scene.rebuild(Dataset {
            regions: vec![region("A", 0.0, 0.0, 5), region("B", 0.0, 90.0, 3)],
            routes: vec![route("A", "B")],
        });
        assert_eq!(report.arcs, 1);

        let graph = scene.state().routes();
        assert_eq!(graph.origin_count(), 1);
        assert_eq!(graph.groups()[0].origin, "A");
        assert_eq!(graph.group("A").unwrap().arcs.len(), 1);

        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..20 {
            assert_eq!(graph.random_arc(&mut rng), Some(ArcId(0)));
        }
        let path = graph.path(ArcId(0)).unwrap();
        assert_eq!(path.len(), 10);
        assert!(path[0].distance(project(0.0, 0.0, 5.0)) < 1e-4);
        assert!(path[9].distance(project(0.0, 90.0, 5.0)) < 1e-4);
    }

    #[test]
    fn unknown_endpoint_is_dropped() {
        let mut scene = composer(10, 1, 0.0);
        let report = scene.rebuild(Dataset {
            regions: vec![region("A", 0.0, 0.0, 5), region("B", 0.0, 90.0, 3)],
            routes: vec![route("A", "Z")],
        });
        assert_eq!(report.arcs, 0);
        assert_eq!(report.dropped_routes, 1);

        let graph = scene.state().routes();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(graph.random_arc(&mut rng), None);
        }
    }

    #[test]
    fn invalid_regions_and_self_routes_are_skipped() {
        let mut scene = composer(10, 1, 0.0);
        let report = scene.rebuild(Dataset {
            regions: vec![
                region("A", 0.0, 0.0, 1),
                region("Nowhere", 120.0, 0.0, 9),
                region("A", 10.0, 10.0, 2),
                region("B", 5.0, 5.0, 1),
            ],
            routes: vec![route("A", "A"), route("Nowhere", "B"), route("B", "A")],
        });
        assert_eq!(report.regions, 2);
        assert_eq!(report.skipped_regions, 2);
        assert_eq!(report.arcs, 1);
        assert_eq!(report.dropped_routes, 2);
        // first occurrence of a duplicate name wins
        assert_eq!(scene.state().regions()[0].active_users, 1);
        assert_eq!(scene.state().markers().markers.len(), 2);
    }

    #[test]
    fn every_arc_has_the_configured_length() {
        let mut scene = composer(37, 1, 0.0);
        scene.rebuild(world());
        let graph = scene.state().routes();
        assert_eq!(graph.arc_count(), 4);
        assert_eq!(graph.origin_count(), 3);
        assert!(graph.arcs().iter().all(|a| a.path().len() == 37));
    }

    #[test]
    fn rebuild_bumps_generation_and_releases_particles_within_one_tick() {
        let mut scene = composer(200, 40, 1.0);
        scene.rebuild(world());
        let first = scene.generation();
        for _ in 0..5 {
            scene.tick(0.016);
        }
        assert_eq!(scene.pool().active_count(), 40);

        scene.rebuild(world());
        assert_eq!(scene.generation(), first.next());

        scene.tick(0.016);
        for p in scene.pool().particles() {
            if let ParticleState::Bound { binding, index } = p.state() {
                assert_eq!(binding.generation, scene.generation());
                assert!(index < 200);
            }
        }
    }

    #[test]
    fn ticks_across_rebuilds_only_show_current_paths() {
        let mut scene = composer(30, 25, 0.2);
        let mut data = world();
        for round in 0..20 {
            if round % 3 == 0 {
                // alternate between two different route sets
                data.routes.reverse();
                data.regions[0].latitude = if round % 2 == 0 { 39.0 } else { 41.0 };
                scene.rebuild(data.clone());
            }
            scene.tick(0.016);

            let state = scene.state();
            for p in scene.pool().particles() {
                match p.state() {
                    ParticleState::Idle => assert!(!p.is_visible()),
                    ParticleState::Bound { binding, index } => {
                        assert_eq!(binding.generation, state.generation());
                        let path = state.routes().path(binding.arc).unwrap();
                        assert!(index < path.len());
                        if p.is_visible() {
                            assert_eq!(p.position(), path[index - 1]);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn empty_rebuild_keeps_particles_idle() {
        let mut scene = composer(10, 10, 1.0);
        scene.rebuild(Dataset::default());
        for _ in 0..10 {
            scene.tick(0.016);
        }
        assert_eq!(scene.pool().active_count(), 0);
    }

    #[test]
    fn geometry_config_rebuilds_from_last_dataset() {
        let mut scene = composer(20, 5, 0.0);
        scene.rebuild(world());
        let generation = scene.generation();

        let rebuilt = scene.set_config(&PartialGlobeConfig {
            sample_count: Some(12),
            ..Default::default()
        });
        assert!(rebuilt);
        assert_eq!(scene.generation(), generation.next());
        assert!(scene.state().routes().arcs().iter().all(|a| a.path().len() == 12));
        assert_eq!(scene.state().routes().arc_count(), 4);
    }

    #[test]
    fn cosmetic_config_keeps_generation() {
        let mut scene = composer(20, 5, 0.0);
        scene.rebuild(world());
        let generation = scene.generation();

        let rebuilt = scene.set_config(&PartialGlobeConfig {
            particle_count: Some(9),
            rotation_speed: Some(0.5),
            ..Default::default()
        });
        assert!(!rebuilt);
        assert_eq!(scene.generation(), generation);
        assert_eq!(scene.pool().len(), 9);
    }

    #[test]
    fn rotation_advances_with_time() {
        let mut scene = composer(10, 0, 0.0);
        scene.set_config(&PartialGlobeConfig {
            rotation_speed: Some(1.0),
            ..Default::default()
        });
        scene.tick(0.5);
        assert!((scene.rotation() - 0.5).abs() < 1e-6);
        scene.set_config(&PartialGlobeConfig {
            auto_rotate: Some(false),
            ..Default::default()
        });
        scene.tick(0.5);
        assert!((scene.rotation() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn markers_float_above_the_surface() {
        let mut scene = composer(10, 0, 0.0);
        scene.rebuild(world());
        let radius = scene.config().radius;
        let markers = &scene.state().markers().markers;
        assert!(markers.iter().all(|m| m.position.length() > radius));
        let busiest = markers.iter().find(|m| m.name == "Turkey").unwrap();
        assert!((busiest.weight - 1.0).abs() < 1e-6);
        let idle = markers.iter().find(|m| m.name == "Japan").unwrap();
        assert_eq!(idle.weight, 0.0);
    }

    #[test]
    fn marker_lift_change_moves_markers() {
        let mut scene = composer(10, 0, 0.0);
        scene.rebuild(world());
        let lifted = |scene: &SceneComposer| scene.state().markers().markers[0].position.length();
        assert!((lifted(&scene) - 5.1).abs() < 1e-3);

        let rebuilt = scene.set_config(&PartialGlobeConfig {
            marker_lift: Some(0.5),
            ..Default::default()
        });
        assert!(rebuilt);
        assert!((lifted(&scene) - 7.5).abs() < 1e-3);
    }

    #[test]
    fn dataset_from_json() {
        let data: Dataset = serde_json::from_str(
            r#"{
                "regions": [{"name": "A", "latitude": 1.5, "longitude": -2, "activeUsers": 4}],
                "routes": [{"originName": "A", "destinationName": "B"}]
            }"#,
        )
        .unwrap();
        assert_eq!(data.regions[0].active_users, 4);
        assert_eq!(data.routes[0].destination_name, "B");
        assert_eq!(data.total_users(), 4);
    }
}
