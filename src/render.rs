//! Braille rasterizer for the globe scene
//!
//! Each terminal cell holds a 2x4 braille block, which makes the dots roughly
//! square, so the orthographic projection uses one scale for both axes.

use crate::colors::{dim, LayerColors};
use crate::globe::{Point3, SceneComposer};
use crate::terminal::Terminal;
use crossterm::style::Color;

/// Draw order; higher layers win a shared dot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Atmosphere,
    Globe,
    Arc,
    MarkerIdle,
    Marker,
    Particle,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Dot {
    layer: Layer,
    brightness: f32,
}

/// View transform: spin about the polar axis, then tilt toward the viewer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Added to the scene's own rotation, radians
    pub yaw: f32,
    /// Radians; positive brings the north pole toward the viewer
    pub tilt: f32,
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            tilt: 0.35,
            zoom: 1.0,
        }
    }
}

impl Camera {
    pub const MIN_ZOOM: f32 = 0.3;
    pub const MAX_ZOOM: f32 = 3.0;

    /// Camera that faces the given latitude/longitude (degrees) head-on
    pub fn facing(lat: f32, lng: f32) -> Self {
        Self {
            yaw: (lng + 90.0).to_radians(),
            tilt: lat.to_radians(),
            zoom: 1.0,
        }
    }

    /// Globe space to view space; the viewer looks down -Z from +Z
    pub fn view(&self, p: Point3, spin: f32) -> Point3 {
        let (s, c) = (self.yaw + spin).sin_cos();
        let x1 = p.x * c - p.z * s;
        let z1 = p.x * s + p.z * c;

        let (st, ct) = self.tilt.sin_cos();
        let y2 = p.y * ct - z1 * st;
        let z2 = p.y * st + z1 * ct;

        Point3::new(x1, y2, z2)
    }

    pub fn zoom_by(&mut self, factor: f32) {
        self.zoom = (self.zoom * factor).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
    }

    pub fn tilt_by(&mut self, delta: f32) {
        self.tilt = (self.tilt + delta).clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);
    }
}

/// Hidden when behind the globe body as seen from the viewer
fn occluded(v: Point3, radius: f32) -> bool {
    v.z < 0.0 && v.x * v.x + v.y * v.y < radius * radius
}

pub struct BrailleCanvas {
    width: usize,
    height: usize,
    dots: Vec<Option<Dot>>,
}

impl BrailleCanvas {
    /// Canvas covering `cols` x `rows` terminal cells
    pub fn new(cols: u16, rows: u16) -> Self {
        let width = cols as usize * 2;
        let height = rows as usize * 4;
        Self {
            width,
            height,
            dots: vec![None; width * height],
        }
    }

    pub fn plot(&mut self, x: i32, y: i32, layer: Layer, brightness: f32) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let slot = &mut self.dots[y as usize * self.width + x as usize];
        match slot {
            Some(dot) if dot.layer > layer => {}
            Some(dot) if dot.layer == layer => dot.brightness = dot.brightness.max(brightness),
            _ => *slot = Some(Dot { layer, brightness }),
        }
    }

    /// Filled disc of dots
    pub fn blob(&mut self, x: i32, y: i32, radius: i32, layer: Layer, brightness: f32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.plot(x + dx, y + dy, layer, brightness);
                }
            }
        }
    }

    #[cfg(test)]
    fn layer_at(&self, x: usize, y: usize) -> Option<Layer> {
        self.dots[y * self.width + x].map(|d| d.layer)
    }

    /// Write braille characters into the terminal starting at row 0
    pub fn blit(&self, term: &mut Terminal, colors: &LayerColors) {
        const BITS: [(usize, usize, u32); 8] = [
            (0, 0, 0x01), (0, 1, 0x02), (0, 2, 0x04), (1, 0, 0x08),
            (1, 1, 0x10), (1, 2, 0x20), (0, 3, 0x40), (1, 3, 0x80),
        ];

        for cy in 0..self.height / 4 {
            for cx in 0..self.width / 2 {
                let mut bits = 0u32;
                let mut top: Option<Dot> = None;

                for &(dx, dy, bit) in &BITS {
                    let Some(dot) = self.dots[(cy * 4 + dy) * self.width + cx * 2 + dx] else {
                        continue;
                    };
                    bits |= bit;
                    top = match top {
                        Some(t) if t.layer > dot.layer => Some(t),
                        Some(t) if t.layer == dot.layer && t.brightness >= dot.brightness => Some(t),
                        _ => Some(dot),
                    };
                }

                let Some(top) = top else { continue };
                let ch = char::from_u32(0x2800 + bits).unwrap_or(' ');
                let color = dim(layer_color(colors, top.layer), top.brightness);
                term.set(cx as i32, cy as i32, ch, Some(color), top.layer >= Layer::Marker);
            }
        }
    }
}

fn layer_color(colors: &LayerColors, layer: Layer) -> Color {
    match layer {
        Layer::Atmosphere => colors.atmosphere,
        Layer::Globe => colors.globe,
        Layer::Arc => colors.arc,
        Layer::MarkerIdle => colors.marker_idle,
        Layer::Marker => colors.marker,
        Layer::Particle => colors.particle,
    }
}

/// Maps view-space points to canvas dots
struct Projector {
    camera: Camera,
    spin: f32,
    radius: f32,
    scale: f32,
    cx: f32,
    cy: f32,
}

impl Projector {
    fn to_canvas(&self, p: Point3) -> Option<(i32, i32, Point3)> {
        let v = self.camera.view(p, self.spin);
        if occluded(v, self.radius) {
            return None;
        }
        let x = self.cx + v.x * self.scale;
        let y = self.cy - v.y * self.scale;
        Some((x.round() as i32, y.round() as i32, v))
    }

    /// Brighter toward the viewer, dimmer at the limb
    fn depth_shade(&self, v: Point3) -> f32 {
        (0.35 + 0.65 * (v.z / self.radius).clamp(0.0, 1.0)).min(1.0)
    }
}

/// Rasterize the current generation and particles into the top `rows` rows
/// of the terminal. Returns the canvas so callers (tests) can inspect it.
pub fn render_scene(
    term: &mut Terminal,
    scene: &SceneComposer,
    camera: &Camera,
    colors: &LayerColors,
    rows: u16,
    labels: usize,
) -> BrailleCanvas {
    let (cols, _) = term.size();
    let mut canvas = BrailleCanvas::new(cols, rows);
    let state = scene.state();
    let radius = state.base().radius;

    let atmosphere = state.atmosphere().radius;
    let fit = (canvas.width.min(canvas.height) as f32 / 2.0) * 0.9;
    let proj = Projector {
        camera: *camera,
        spin: scene.rotation(),
        radius,
        scale: camera.zoom * fit / atmosphere.max(f32::EPSILON),
        cx: canvas.width as f32 / 2.0,
        cy: canvas.height as f32 / 2.0,
    };

    // atmosphere rim: a circle in screen space under orthographic projection
    let rim = atmosphere * proj.scale;
    let rim_steps = (rim * 8.0).clamp(64.0, 2048.0) as usize;
    for i in 0..rim_steps {
        let a = i as f32 / rim_steps as f32 * std::f32::consts::TAU;
        let x = proj.cx + a.cos() * rim;
        let y = proj.cy + a.sin() * rim;
        canvas.plot(x.round() as i32, y.round() as i32, Layer::Atmosphere, 0.8);
    }

    for &p in &state.base().graticule {
        if let Some((x, y, v)) = proj.to_canvas(p) {
            canvas.plot(x, y, Layer::Globe, proj.depth_shade(v));
        }
    }

    for arc in state.routes().arcs() {
        for &p in arc.path() {
            if let Some((x, y, _)) = proj.to_canvas(p) {
                canvas.plot(x, y, Layer::Arc, 0.85);
            }
        }
    }

    let mut visible_markers = Vec::new();
    for marker in &state.markers().markers {
        let Some((x, y, v)) = proj.to_canvas(marker.position) else {
            continue;
        };
        let (layer, size) = if marker.active_users > 0 {
            (Layer::Marker, 1 + (marker.weight * 2.0).round() as i32)
        } else {
            (Layer::MarkerIdle, 0)
        };
        canvas.blob(x, y, size, layer, proj.depth_shade(v).max(0.6));
        if marker.active_users > 0 {
            visible_markers.push((marker, x, y));
        }
    }

    for particle in scene.pool().particles() {
        if !particle.is_visible() {
            continue;
        }
        if let Some((x, y, _)) = proj.to_canvas(particle.position()) {
            canvas.blob(x, y, 1, Layer::Particle, 1.0);
        }
    }

    canvas.blit(term, colors);

    visible_markers.sort_by(|a, b| b.0.active_users.cmp(&a.0.active_users));
    for (marker, x, y) in visible_markers.into_iter().take(labels) {
        let col = x / 2 + 2;
        let row = y / 4;
        if row >= 0 && row < rows as i32 {
            let text = format!("{} {}", marker.name, marker.active_users);
            term.set_str(col, row, &text, Some(colors.marker), false);
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobeConfig;
    use crate::globe::projection::project;
    use crate::globe::{Dataset, RegionRecord, RouteRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn facing_camera_centers_the_point() {
        for (lat, lng) in [(0.0, 0.0), (39.0, 35.0), (-33.9, 151.2), (60.0, -120.0)] {
            let cam = Camera::facing(lat, lng);
            let v = cam.view(project(lat, lng, 1.0), 0.0);
            assert!(v.x.abs() < 1e-4 && v.y.abs() < 1e-4, "{lat},{lng} -> {v:?}");
            assert!((v.z - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn view_preserves_length() {
        let cam = Camera { yaw: 1.2, tilt: -0.4, zoom: 1.0 };
        let p = project(12.0, 77.0, 5.0);
        assert!((cam.view(p, 0.3).length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn far_side_is_occluded() {
        assert!(occluded(Point3::new(0.0, 0.0, -1.0), 1.0));
        assert!(!occluded(Point3::new(0.0, 0.0, 1.0), 1.0));
        // arc point behind the globe but outside its silhouette stays visible
        assert!(!occluded(Point3::new(1.5, 0.0, -0.5), 1.0));
    }

    #[test]
    fn higher_layers_win() {
        let mut canvas = BrailleCanvas::new(2, 1);
        canvas.plot(0, 0, Layer::Particle, 1.0);
        canvas.plot(0, 0, Layer::Globe, 1.0);
        assert_eq!(canvas.layer_at(0, 0), Some(Layer::Particle));
        canvas.plot(1, 1, Layer::Globe, 0.2);
        canvas.plot(1, 1, Layer::Arc, 0.5);
        assert_eq!(canvas.layer_at(1, 1), Some(Layer::Arc));
        // out of bounds is ignored
        canvas.plot(-1, 0, Layer::Arc, 1.0);
        canvas.plot(4, 0, Layer::Arc, 1.0);
    }

    #[test]
    fn blit_writes_braille() {
        let mut term = Terminal::headless(2, 1);
        let mut canvas = BrailleCanvas::new(2, 1);
        canvas.plot(0, 0, Layer::Globe, 1.0);
        canvas.plot(1, 3, Layer::Globe, 1.0);
        canvas.blit(&mut term, &LayerColors::resolve(&Default::default()));
        assert_eq!(term.cell(0, 0).ch, '\u{2881}');
        assert_eq!(term.cell(1, 0).ch, ' ');
    }

    #[test]
    fn renders_a_populated_scene() {
        let config = GlobeConfig {
            sample_count: 40,
            particle_count: 10,
            activation_probability: 1.0,
            ..GlobeConfig::default()
        };
        let mut scene = SceneComposer::new(config, StdRng::seed_from_u64(1));
        scene.rebuild(Dataset {
            regions: vec![
                RegionRecord { name: "Turkey".into(), latitude: 39.0, longitude: 35.0, active_users: 9 },
                RegionRecord { name: "Germany".into(), latitude: 51.0, longitude: 10.0, active_users: 4 },
            ],
            routes: vec![RouteRecord {
                origin_name: "Germany".into(),
                destination_name: "Turkey".into(),
            }],
        });
        for _ in 0..3 {
            scene.tick(0.0);
        }

        let mut term = Terminal::headless(60, 30);
        let colors = LayerColors::resolve(&scene.config().palette);
        let camera = Camera::facing(45.0, 20.0);
        let canvas = render_scene(&mut term, &scene, &camera, &colors, 29, 2);

        let layers: Vec<Layer> = canvas.dots.iter().flatten().map(|d| d.layer).collect();
        for layer in [Layer::Atmosphere, Layer::Globe, Layer::Arc, Layer::Marker, Layer::Particle] {
            assert!(layers.contains(&layer), "missing {layer:?}");
        }
        let text: String = (0..29).map(|y| term.row_text(y)).collect();
        assert!(text.contains("Turkey 9"));
        assert!(term.row_text(29).trim().is_empty());
    }
}
