use serde::Deserialize;

/// Arc apex height parameters.
///
/// The control point of an arc sits at `radius + clamp(distance * scale, min, max)`
/// where `distance` is the straight-line distance between the two endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApexParams {
    pub scale: f32,
    pub min: f32,
    pub max: f32,
}

impl ApexParams {
    /// Apex altitude above the surface for a chord of length `distance`
    pub fn height(&self, distance: f32) -> f32 {
        (distance * self.scale).clamp(self.min, self.max)
    }
}

impl Default for ApexParams {
    fn default() -> Self {
        Self {
            scale: 0.5,
            min: 0.0,
            max: 5.0,
        }
    }
}

/// Layer colors as `#rrggbb` strings
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    pub globe: String,
    pub atmosphere: String,
    pub marker: String,
    pub marker_idle: String,
    pub arc: String,
    pub particle: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            globe: "#4facfe".into(),
            atmosphere: "#1c2e4a".into(),
            marker: "#22d3ee".into(),
            marker_idle: "#3a4a5c".into(),
            arc: "#ff00cc".into(),
            particle: "#ffffff".into(),
        }
    }
}

/// Built-in palettes cycled with the `c` key
pub const PALETTE_PRESETS: &[(&str, [&str; 6])] = &[
    ("neon", ["#4facfe", "#1c2e4a", "#22d3ee", "#3a4a5c", "#ff00cc", "#ffffff"]),
    ("ember", ["#8a3b12", "#3d1a0a", "#ffb347", "#5a3a2a", "#ff4500", "#fff3b0"]),
    ("matrix", ["#1f6f3f", "#0b2a16", "#7dff9a", "#2f4f3a", "#00ff66", "#e8ffe8"]),
    ("mono", ["#707070", "#303030", "#f0f0f0", "#505050", "#b0b0b0", "#ffffff"]),
];

impl Palette {
    pub fn preset(index: usize) -> (&'static str, Palette) {
        let (name, c) = PALETTE_PRESETS[index % PALETTE_PRESETS.len()];
        let palette = Palette {
            globe: c[0].into(),
            atmosphere: c[1].into(),
            marker: c[2].into(),
            marker_idle: c[3].into(),
            arc: c[4].into(),
            particle: c[5].into(),
        };
        (name, palette)
    }
}

/// Engine configuration
#[derive(Clone, Debug, PartialEq)]
pub struct GlobeConfig {
    /// Base sphere radius in globe units
    pub radius: f32,
    pub apex: ApexParams,
    /// Points per sampled arc path (N)
    pub sample_count: usize,
    pub particle_count: usize,
    /// Per-tick chance that an idle particle tries to bind to an arc
    pub activation_probability: f64,
    pub poll_interval_secs: f32,
    /// Radians per second
    pub rotation_speed: f32,
    pub auto_rotate: bool,
    /// Markers float `radius * marker_lift` above the surface
    pub marker_lift: f32,
    pub palette: Palette,
}

impl Default for GlobeConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            apex: ApexParams::default(),
            sample_count: 200,
            particle_count: 120,
            activation_probability: 0.01,
            poll_interval_secs: 10.0,
            rotation_speed: 0.15,
            auto_rotate: true,
            marker_lift: 0.02,
            palette: Palette::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartialApex {
    pub scale: Option<f32>,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartialPalette {
    pub globe: Option<String>,
    pub atmosphere: Option<String>,
    pub marker: Option<String>,
    pub marker_idle: Option<String>,
    pub arc: Option<String>,
    pub particle: Option<String>,
}

/// Any subset of [`GlobeConfig`], as read from the settings file or built by
/// key handlers
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartialGlobeConfig {
    pub radius: Option<f32>,
    pub apex: Option<PartialApex>,
    pub sample_count: Option<usize>,
    pub particle_count: Option<usize>,
    pub activation_probability: Option<f64>,
    pub poll_interval_secs: Option<f32>,
    pub rotation_speed: Option<f32>,
    pub auto_rotate: Option<bool>,
    pub marker_lift: Option<f32>,
    pub palette: Option<PartialPalette>,
}

impl From<Palette> for PartialPalette {
    fn from(p: Palette) -> Self {
        Self {
            globe: Some(p.globe),
            atmosphere: Some(p.atmosphere),
            marker: Some(p.marker),
            marker_idle: Some(p.marker_idle),
            arc: Some(p.arc),
            particle: Some(p.particle),
        }
    }
}

/// Longest accepted poll interval, one day
pub const MAX_POLL_INTERVAL_SECS: f32 = 86_400.0;

/// Which parts of the scene a config change touches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub geometry: bool,
    pub particle_count: bool,
}

impl GlobeConfig {
    /// Merge `partial` into this config, clamping values into their valid
    /// ranges.
    pub fn apply(&mut self, partial: &PartialGlobeConfig) -> ConfigChange {
        let before = self.clone();

        if let Some(r) = partial.radius {
            self.radius = r;
        }
        if let Some(apex) = &partial.apex {
            if let Some(v) = apex.scale {
                self.apex.scale = v;
            }
            if let Some(v) = apex.min {
                self.apex.min = v;
            }
            if let Some(v) = apex.max {
                self.apex.max = v;
            }
        }
        if let Some(n) = partial.sample_count {
            self.sample_count = n;
        }
        if let Some(n) = partial.particle_count {
            self.particle_count = n;
        }
        if let Some(p) = partial.activation_probability {
            self.activation_probability = p;
        }
        if let Some(s) = partial.poll_interval_secs {
            self.poll_interval_secs = s;
        }
        if let Some(s) = partial.rotation_speed {
            self.rotation_speed = s;
        }
        if let Some(b) = partial.auto_rotate {
            self.auto_rotate = b;
        }
        if let Some(l) = partial.marker_lift {
            self.marker_lift = l;
        }
        if let Some(p) = &partial.palette {
            let fields = [
                (&p.globe, &mut self.palette.globe),
                (&p.atmosphere, &mut self.palette.atmosphere),
                (&p.marker, &mut self.palette.marker),
                (&p.marker_idle, &mut self.palette.marker_idle),
                (&p.arc, &mut self.palette.arc),
                (&p.particle, &mut self.palette.particle),
            ];
            for (src, dst) in fields {
                if let Some(color) = src {
                    dst.clone_from(color);
                }
            }
        }

        self.sanitize(&before);

        ConfigChange {
            geometry: self.radius != before.radius
                || self.apex != before.apex
                || self.sample_count != before.sample_count
                || self.marker_lift != before.marker_lift,
            particle_count: self.particle_count != before.particle_count,
        }
    }

    /// Clamp into valid ranges; non-finite values fall back to `fallback`
    fn sanitize(&mut self, fallback: &GlobeConfig) {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            self.radius = fallback.radius;
        }
        if !self.apex.scale.is_finite() || self.apex.scale < 0.0 {
            self.apex.scale = fallback.apex.scale;
        }
        if !self.apex.min.is_finite() || self.apex.min < 0.0 {
            self.apex.min = fallback.apex.min;
        }
        if self.apex.max.is_nan() || self.apex.max < self.apex.min {
            self.apex.max = self.apex.min.max(fallback.apex.max);
        }
        self.sample_count = self.sample_count.clamp(2, 4096);
        self.particle_count = self.particle_count.min(10_000);
        if self.activation_probability.is_nan() {
            self.activation_probability = fallback.activation_probability;
        }
        self.activation_probability = self.activation_probability.clamp(0.0, 1.0);
        if !self.poll_interval_secs.is_finite() || self.poll_interval_secs < 0.5 {
            self.poll_interval_secs = fallback.poll_interval_secs.max(0.5);
        }
        self.poll_interval_secs = self.poll_interval_secs.min(MAX_POLL_INTERVAL_SECS);
        if !self.rotation_speed.is_finite() {
            self.rotation_speed = fallback.rotation_speed;
        }
        if !self.marker_lift.is_finite() || self.marker_lift < 0.0 {
            self.marker_lift = fallback.marker_lift;
        }
    }
}
