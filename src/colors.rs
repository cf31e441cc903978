use crate::config::Palette;
use crossterm::style::Color;

/// Parse `#rrggbb` (or `rrggbb`) into an RGB terminal color
pub fn parse_hex(hex: &str) -> Option<Color> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

/// Scale an RGB color toward black; other colors pass through
pub fn dim(color: Color, factor: f32) -> Color {
    match color {
        Color::Rgb { r, g, b } => {
            let f = factor.clamp(0.0, 1.0);
            let scale = |c: u8| (c as f32 * f).round() as u8;
            Color::Rgb { r: scale(r), g: scale(g), b: scale(b) }
        }
        other => other,
    }
}

/// Palette resolved into terminal colors, one per scene layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerColors {
    pub globe: Color,
    pub atmosphere: Color,
    pub marker: Color,
    pub marker_idle: Color,
    pub arc: Color,
    pub particle: Color,
}

impl LayerColors {
    /// Unparseable entries fall back to a fixed terminal color for that layer
    pub fn resolve(palette: &Palette) -> Self {
        let pick = |hex: &str, fallback: Color| {
            parse_hex(hex).unwrap_or_else(|| {
                tracing::warn!(color = hex, "invalid palette color, using fallback");
                fallback
            })
        };
        Self {
            globe: pick(&palette.globe, Color::DarkCyan),
            atmosphere: pick(&palette.atmosphere, Color::DarkBlue),
            marker: pick(&palette.marker, Color::Cyan),
            marker_idle: pick(&palette.marker_idle, Color::DarkGrey),
            arc: pick(&palette.arc, Color::Magenta),
            particle: pick(&palette.particle, Color::White),
        }
    }
}

/// Semantic colors for the status line
#[derive(Clone, Copy)]
pub enum StatusColor {
    Good,
    Warning,
    Critical,
    Muted,
}

impl StatusColor {
    pub fn color(self) -> Color {
        match self {
            StatusColor::Good => Color::Green,
            StatusColor::Warning => Color::Yellow,
            StatusColor::Critical => Color::Red,
            StatusColor::Muted => Color::DarkGrey,
        }
    }
}
