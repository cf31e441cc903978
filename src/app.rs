//! Interactive frame loop and `--print` rendering

use crate::colors::{LayerColors, StatusColor};
use crate::config::{Palette, PartialGlobeConfig, PartialPalette, PALETTE_PRESETS};
use crate::globe::SceneComposer;
use crate::help::{render_help_overlay, HELP};
use crate::render::{render_scene, Camera};
use crate::telemetry::{PollStatus, TelemetryPoller};
use crate::terminal::Terminal;
use crossterm::event::{KeyCode, KeyModifiers};
use std::io;
use std::time::{Duration, Instant};

/// Labels drawn next to the busiest visible markers
const LABELS: usize = 5;
/// Frames simulated before a `--print` snapshot so particles are in flight
const PRINT_WARMUP_FRAMES: usize = 90;
const DEFAULT_FPS: f32 = 30.0;

pub struct RunOptions {
    pub fps: f32,
    pub print: bool,
    /// Degrees; overrides the default camera tilt
    pub tilt: Option<f32>,
    /// Region the camera turns to once it appears
    pub hub: Option<String>,
    /// How long `--print` waits for the first fetch
    pub fetch_timeout: Duration,
}

/// What a key press asks the loop to do
#[derive(Debug, PartialEq)]
pub enum KeyOutcome {
    Quit,
    Config(PartialGlobeConfig),
    Handled,
    Ignored,
}

pub struct AppState {
    pub camera: Camera,
    pub paused: bool,
    pub show_help: bool,
    /// Particles that reached their destination
    pub trips: u64,
    palette_index: usize,
    default_zoom: f32,
    /// Set once the camera has turned to the hub
    faced_hub: bool,
}

impl AppState {
    pub fn new(camera: Camera) -> Self {
        Self {
            default_zoom: camera.zoom,
            camera,
            paused: false,
            show_help: false,
            trips: 0,
            palette_index: 0,
            faced_hub: false,
        }
    }

    /// Map a key press onto view changes or a config update
    pub fn handle_key(&mut self, code: KeyCode, _modifiers: KeyModifiers, scene: &SceneComposer) -> KeyOutcome {
        let config = scene.config();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return KeyOutcome::Quit,
            KeyCode::Char(' ') => self.paused = !self.paused,
            KeyCode::Char('?') => self.show_help = !self.show_help,
            KeyCode::Up | KeyCode::Char('k') => self.camera.tilt_by(0.05),
            KeyCode::Down | KeyCode::Char('j') => self.camera.tilt_by(-0.05),
            KeyCode::Char('+') | KeyCode::Char('=') => self.camera.zoom_by(1.1),
            KeyCode::Char('-') | KeyCode::Char('_') => self.camera.zoom_by(1.0 / 1.1),
            KeyCode::Char('0') => self.camera.zoom = self.default_zoom,
            KeyCode::Char('r') => {
                return KeyOutcome::Config(PartialGlobeConfig {
                    auto_rotate: Some(!config.auto_rotate),
                    ..Default::default()
                })
            }
            KeyCode::Char('[') => {
                return KeyOutcome::Config(PartialGlobeConfig {
                    rotation_speed: Some(config.rotation_speed - 0.05),
                    ..Default::default()
                })
            }
            KeyCode::Char(']') => {
                return KeyOutcome::Config(PartialGlobeConfig {
                    rotation_speed: Some(config.rotation_speed + 0.05),
                    ..Default::default()
                })
            }
            KeyCode::Char(',') | KeyCode::Char('<') => {
                let step = (config.particle_count / 5).max(1);
                return KeyOutcome::Config(PartialGlobeConfig {
                    particle_count: Some(config.particle_count.saturating_sub(step)),
                    ..Default::default()
                });
            }
            KeyCode::Char('.') | KeyCode::Char('>') => {
                let step = (config.particle_count / 5).max(10);
                return KeyOutcome::Config(PartialGlobeConfig {
                    particle_count: Some(config.particle_count + step),
                    ..Default::default()
                });
            }
            KeyCode::Char('c') => {
                self.palette_index = (self.palette_index + 1) % PALETTE_PRESETS.len();
                let (_, palette) = Palette::preset(self.palette_index);
                return KeyOutcome::Config(PartialGlobeConfig {
                    palette: Some(PartialPalette::from(palette)),
                    ..Default::default()
                });
            }
            _ => return KeyOutcome::Ignored,
        }
        KeyOutcome::Handled
    }

    pub fn palette_name(&self) -> &'static str {
        PALETTE_PRESETS[self.palette_index % PALETTE_PRESETS.len()].0
    }

    /// Turn the camera to the hub the first time it shows up in the scene
    fn face_hub(&mut self, scene: &SceneComposer, hub: Option<&str>) {
        if self.faced_hub {
            return;
        }
        let Some(hub) = hub else { return };
        let Some(region) = scene.state().regions().iter().find(|r| r.name == hub) else {
            return;
        };
        let facing = Camera::facing(region.geo.latitude, region.geo.longitude);
        self.camera.yaw = facing.yaw - scene.rotation();
        self.faced_hub = true;
    }
}

fn initial_camera(opts: &RunOptions) -> Camera {
    let mut camera = Camera::default();
    if let Some(tilt) = opts.tilt {
        camera.tilt = 0.0;
        camera.tilt_by(tilt.to_radians());
    }
    camera
}

pub fn run(term: &mut Terminal, mut scene: SceneComposer, mut poller: TelemetryPoller, opts: &RunOptions) -> io::Result<()> {
    if opts.print {
        return print_frame(term, &mut scene, &mut poller, opts);
    }

    let mut app = AppState::new(initial_camera(opts));
    let mut colors = LayerColors::resolve(&scene.config().palette);
    let frame = Duration::from_secs_f32(frame_secs(opts.fps));
    let mut last = Instant::now();

    tracing::info!(source = %poller.describe(), "starting globe");

    loop {
        let frame_start = Instant::now();
        term.sync_size()?;

        if let Some((code, mods)) = term.check_key()? {
            match app.handle_key(code, mods, &scene) {
                KeyOutcome::Quit => break,
                KeyOutcome::Config(partial) => {
                    scene.set_config(&partial);
                    colors = LayerColors::resolve(&scene.config().palette);
                    poller.set_interval(Duration::from_secs_f32(scene.config().poll_interval_secs));
                }
                KeyOutcome::Handled | KeyOutcome::Ignored => {}
            }
        }

        poller.maybe_request(frame_start);
        if let Some(dataset) = poller.drain() {
            scene.rebuild(dataset);
            app.face_hub(&scene, opts.hub.as_deref());
        }

        // clamp so a stalled terminal does not fling the globe around
        let dt = frame_start.duration_since(last).as_secs_f32().min(0.25);
        last = frame_start;
        if !app.paused {
            app.trips += scene.tick(dt).completed as u64;
        }

        draw_frame(term, &scene, &poller, &app, &colors);
        term.present()?;

        term.sleep(frame.saturating_sub(frame_start.elapsed()).as_secs_f32());
    }

    Ok(())
}

/// Fetch once, simulate a short warmup and print a single frame
fn print_frame(term: &mut Terminal, scene: &mut SceneComposer, poller: &mut TelemetryPoller, opts: &RunOptions) -> io::Result<()> {
    poller.request(Instant::now());
    match poller.wait_first(opts.fetch_timeout) {
        Some(dataset) => {
            scene.rebuild(dataset);
        }
        None => {
            let reason = match poller.status() {
                PollStatus::Failed { error, .. } => error.clone(),
                _ => "timed out waiting for telemetry".to_string(),
            };
            return Err(io::Error::other(reason));
        }
    }

    let mut app = AppState::new(initial_camera(opts));
    app.face_hub(scene, opts.hub.as_deref());
    let colors = LayerColors::resolve(&scene.config().palette);

    let dt = frame_secs(opts.fps);
    for _ in 0..PRINT_WARMUP_FRAMES {
        app.trips += scene.tick(dt).completed as u64;
    }

    draw_frame(term, scene, poller, &app, &colors);
    term.print_to_stdout()
}

/// Seconds per frame, with fps held to 1..=240
fn frame_secs(fps: f32) -> f32 {
    let fps = if fps.is_finite() { fps } else { DEFAULT_FPS };
    1.0 / fps.clamp(1.0, 240.0)
}

fn draw_frame(term: &mut Terminal, scene: &SceneComposer, poller: &TelemetryPoller, app: &AppState, colors: &LayerColors) {
    term.clear();
    let (_, height) = term.size();
    let rows = height.saturating_sub(1);
    render_scene(term, scene, &app.camera, colors, rows, LABELS);
    if height > 0 {
        draw_status(term, scene, poller, app, height - 1);
    }
    if app.show_help {
        render_help_overlay(term, HELP);
    }
}

fn draw_status(term: &mut Terminal, scene: &SceneComposer, poller: &TelemetryPoller, app: &AppState, row: u16) {
    let state = scene.state();
    let summary = format!(
        " {} │ {} regions │ {} arcs/{} origins │ {}/{} particles │ {} trips │ {} users │ {} ",
        scene.generation(),
        state.regions().len(),
        state.routes().arc_count(),
        state.routes().origin_count(),
        scene.pool().active_count(),
        scene.pool().len(),
        app.trips,
        scene.dataset().total_users(),
        app.palette_name(),
    );
    let y = row as i32;
    term.set_str(0, y, &summary, Some(StatusColor::Muted.color()), false);

    let mut x = summary.chars().count() as i32;
    let interval = Duration::from_secs_f32(scene.config().poll_interval_secs);
    let (text, color) = poll_status_text(poller.status(), interval);
    term.set_str(x, y, &text, Some(color.color()), true);
    x += text.chars().count() as i32;

    if app.paused {
        term.set_str(x + 1, y, "PAUSED", Some(StatusColor::Warning.color()), true);
    }
}

fn poll_status_text(status: &PollStatus, interval: Duration) -> (String, StatusColor) {
    match status {
        PollStatus::Waiting => ("waiting for telemetry".to_string(), StatusColor::Muted),
        PollStatus::Ok { at } => {
            let age = at.elapsed();
            let color = if age > interval.saturating_mul(3) { StatusColor::Warning } else { StatusColor::Good };
            (format!("updated {}s ago", age.as_secs()), color)
        }
        PollStatus::Failed { error, at } => (
            format!("fetch failed {}s ago: {error}", at.elapsed().as_secs()),
            StatusColor::Critical,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobeConfig;
    use crate::globe::{Dataset, RegionRecord, RouteRecord};
    use crate::telemetry::{PollError, TelemetrySource};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn scene() -> SceneComposer {
        SceneComposer::new(GlobeConfig::default(), StdRng::seed_from_u64(1))
    }

    fn dataset() -> Dataset {
        Dataset {
            regions: vec![
                RegionRecord { name: "Germany".into(), latitude: 51.0, longitude: 10.0, active_users: 4 },
                RegionRecord { name: "Turkey".into(), latitude: 39.0, longitude: 35.0, active_users: 9 },
            ],
            routes: vec![RouteRecord { origin_name: "Germany".into(), destination_name: "Turkey".into() }],
        }
    }

    struct Fixed(Result<Dataset, u16>);

    impl TelemetrySource for Fixed {
        fn fetch(&self) -> Result<Dataset, PollError> {
            self.0.clone().map_err(PollError::Status)
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            fps: 30.0,
            print: true,
            tilt: None,
            hub: Some("Turkey".into()),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn quit_and_view_keys() {
        let scene = scene();
        let mut app = AppState::new(Camera::default());
        assert_eq!(app.handle_key(KeyCode::Char('q'), KeyModifiers::NONE, &scene), KeyOutcome::Quit);
        assert_eq!(app.handle_key(KeyCode::Esc, KeyModifiers::NONE, &scene), KeyOutcome::Quit);

        assert_eq!(app.handle_key(KeyCode::Char(' '), KeyModifiers::NONE, &scene), KeyOutcome::Handled);
        assert!(app.paused);

        app.handle_key(KeyCode::Char('+'), KeyModifiers::NONE, &scene);
        assert!(app.camera.zoom > 1.0);
        app.handle_key(KeyCode::Char('0'), KeyModifiers::NONE, &scene);
        assert_eq!(app.camera.zoom, 1.0);

        assert_eq!(app.handle_key(KeyCode::Char('x'), KeyModifiers::NONE, &scene), KeyOutcome::Ignored);
    }

    #[test]
    fn config_keys_produce_partials() {
        let mut scene = scene();
        let mut app = AppState::new(Camera::default());

        let KeyOutcome::Config(partial) = app.handle_key(KeyCode::Char('.'), KeyModifiers::NONE, &scene) else {
            panic!("expected a config change");
        };
        scene.set_config(&partial);
        assert!(scene.config().particle_count > GlobeConfig::default().particle_count);
        assert_eq!(scene.pool().len(), scene.config().particle_count);

        let KeyOutcome::Config(partial) = app.handle_key(KeyCode::Char('r'), KeyModifiers::NONE, &scene) else {
            panic!("expected a config change");
        };
        assert_eq!(partial.auto_rotate, Some(false));

        let before = scene.generation();
        let KeyOutcome::Config(partial) = app.handle_key(KeyCode::Char('c'), KeyModifiers::NONE, &scene) else {
            panic!("expected a config change");
        };
        // palette swaps never rebuild geometry
        assert!(!scene.set_config(&partial));
        assert_eq!(scene.generation(), before);
        assert_eq!(scene.config().palette, Palette::preset(1).1);
        assert_eq!(app.palette_name(), "ember");
    }

    #[test]
    fn camera_turns_to_hub_once() {
        let mut scene = scene();
        scene.rebuild(dataset());
        let mut app = AppState::new(Camera::default());
        app.face_hub(&scene, Some("Turkey"));
        let yaw = app.camera.yaw;
        assert!((yaw - Camera::facing(39.0, 35.0).yaw).abs() < 1e-5);

        app.camera.yaw += 1.0;
        app.face_hub(&scene, Some("Turkey"));
        assert!((app.camera.yaw - (yaw + 1.0)).abs() < 1e-5);
    }

    #[test]
    fn print_frame_draws_scene_and_status() {
        let mut term = Terminal::headless(120, 30);
        let mut scene = scene();
        let mut poller = TelemetryPoller::new(Arc::new(Fixed(Ok(dataset()))), Duration::from_secs(10));
        let opts = options();

        poller.request(Instant::now());
        let data = poller.wait_first(opts.fetch_timeout).unwrap();
        scene.rebuild(data);
        let app = AppState::new(initial_camera(&opts));
        draw_frame(&mut term, &scene, &poller, &app, &LayerColors::resolve(&scene.config().palette));

        let status = term.row_text(29);
        assert!(status.contains("gen#1"), "{status}");
        assert!(status.contains("2 regions"));
        assert!(status.contains("1 arcs/1 origins"));
        assert!(status.contains("13 users"));
        assert!(status.contains("updated"));
        assert!((0..29).any(|y| term.row_text(y).chars().any(|c| ('\u{2801}'..='\u{28FF}').contains(&c))));
    }

    #[test]
    fn print_reports_fetch_failure() {
        let mut term = Terminal::headless(80, 30);
        let mut scene = scene();
        let mut poller = TelemetryPoller::new(Arc::new(Fixed(Err(500))), Duration::from_secs(10));
        let err = print_frame(&mut term, &mut scene, &mut poller, &options()).unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(scene.generation().value(), 0);
    }

    #[test]
    fn poll_status_colors() {
        let (_, color) = poll_status_text(&PollStatus::Waiting, Duration::from_secs(10));
        assert!(matches!(color, StatusColor::Muted));
        let (text, color) = poll_status_text(
            &PollStatus::Failed { error: "boom".into(), at: Instant::now() },
            Duration::from_secs(10),
        );
        assert!(text.starts_with("fetch failed 0s ago"), "{text}");
        assert!(text.ends_with("boom"));
        assert!(matches!(color, StatusColor::Critical));

        let (_, color) = poll_status_text(&PollStatus::Ok { at: Instant::now() }, Duration::MAX);
        assert!(matches!(color, StatusColor::Good));
    }

    #[test]
    fn frame_time_survives_odd_fps() {
        assert!((frame_secs(30.0) - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(frame_secs(0.0), 1.0);
        assert!((frame_secs(1e9) - 1.0 / 240.0).abs() < 1e-6);
        for fps in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let secs = frame_secs(fps);
            assert!((secs - 1.0 / DEFAULT_FPS).abs() < 1e-6);
            let _ = Duration::from_secs_f32(secs);
        }
    }
}
