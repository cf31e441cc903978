mod app;
mod colors;
mod config;
mod globe;
mod help;
mod logging;
mod render;
mod settings;
mod telemetry;
mod terminal;

use app::RunOptions;
use clap::{Args, Parser, Subcommand};
use config::{GlobeConfig, PartialGlobeConfig};
use globe::SceneComposer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use settings::Settings;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{DemoSource, FileSource, HttpSource, Normalizer, TelemetryPoller, TelemetrySource};
use terminal::Terminal;

#[derive(Parser)]
#[command(name = "termglobe")]
#[command(author = "termglobe contributors")]
#[command(version)]
#[command(about = "Live telemetry globe for the terminal: regions, routes and traffic particles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll an HTTP telemetry endpoint
    Live {
        /// Endpoint URL (falls back to [poll] url in the config file)
        url: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Re-read a JSON telemetry file every interval
    File {
        path: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Simulated traffic between world cities
    Demo {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Seconds between telemetry fetches
    #[arg(short, long)]
    interval: Option<f32>,

    /// Derive routes from every active region to this one when the data has none
    #[arg(long)]
    hub: Option<String>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Frames per second
    #[arg(long, default_value = "30", value_parser = parse_fps)]
    fps: f32,

    /// Particle pool size
    #[arg(short, long)]
    particles: Option<usize>,

    /// Points sampled along each arc
    #[arg(long)]
    samples: Option<usize>,

    /// Camera tilt in degrees
    #[arg(long, allow_hyphen_values = true)]
    tilt: Option<f32>,

    /// Settings file (default: ~/.config/termglobe/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log file (default: ~/.cache/termglobe/termglobe.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print a single frame to stdout and exit
    #[arg(long)]
    print: bool,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let (run, source_kind) = match cli.command {
        Commands::Live { url, run } => (run, SourceKind::Http(url)),
        Commands::File { path, run } => (run, SourceKind::File(path)),
        Commands::Demo { run } => (run, SourceKind::Demo),
    };

    let log_path = logging::init(run.log_file.as_deref())?;
    let settings = Settings::load(run.config.as_deref());
    tracing::debug!(log = %log_path.display(), "logging initialized");

    let mut config = GlobeConfig::default();
    config.apply(&settings.globe);
    config.apply(&PartialGlobeConfig {
        poll_interval_secs: run.interval.or(settings.poll.interval_secs),
        particle_count: run.particles,
        sample_count: run.samples,
        ..Default::default()
    });

    let normalizer = Normalizer::new(run.hub.clone().or(settings.poll.hub.clone()), settings.poll.aliases.clone());
    let hub = normalizer.hub.clone();
    let timeout = Duration::from_secs(settings.poll.timeout_secs.unwrap_or(10));

    let source: Arc<dyn TelemetrySource> = match source_kind {
        SourceKind::Http(url) => {
            let Some(url) = url.or(settings.poll.url.clone()) else {
                eprintln!("No telemetry URL given. Pass one to `live` or set [poll] url in the config file.");
                std::process::exit(2);
            };
            Arc::new(HttpSource::new(url, normalizer, timeout))
        }
        SourceKind::File(path) => Arc::new(FileSource::new(path, normalizer)),
        SourceKind::Demo => Arc::new(DemoSource::new(run.seed, hub.clone())),
    };

    let rng = match run.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let interval = Duration::from_secs_f32(config.poll_interval_secs);
    let poller = TelemetryPoller::new(source, interval);
    let scene = SceneComposer::new(config, rng);

    let opts = RunOptions {
        fps: run.fps,
        print: run.print,
        tilt: run.tilt,
        hub,
        fetch_timeout: timeout + Duration::from_secs(1),
    };

    let mut term = Terminal::new(!run.print)?;
    let result = app::run(&mut term, scene, poller, &opts);
    drop(term);

    if let Err(err) = &result {
        tracing::error!(error = %err, "exiting with error");
    }
    result
}

fn parse_fps(s: &str) -> Result<f32, String> {
    let fps: f32 = s.parse().map_err(|err| format!("{err}"))?;
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(format!("expected a positive frame rate, got {s}"))
    }
}

enum SourceKind {
    Http(Option<String>),
    File(PathBuf),
    Demo,
}
