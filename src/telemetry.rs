//! Telemetry polling and normalization
//!
//! Fetches run on short-lived background threads and report back over a
//! channel, so a slow endpoint never stalls the frame loop. Every fetch is
//! numbered; a result is only handed to the scene if it is newer than the
//! last one applied, whatever order the threads finish in.

use crate::globe::{Dataset, RegionRecord, RouteRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PollError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed telemetry: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ureq::Error> for PollError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => PollError::Status(code),
            ureq::Error::Transport(t) => PollError::Http(t.to_string()),
        }
    }
}

// ============================================================================
// Wire formats
// ============================================================================

/// One row of the analytics backend's visitor list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorRecord {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    active_users: u64,
    lat: f32,
    lng: f32,
}

/// Route given by raw coordinates rather than region names
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoordinateRoute {
    start_lat: f32,
    start_lng: f32,
    end_lat: f32,
    end_lng: f32,
}

#[derive(Debug, Deserialize)]
struct DashboardPayload {
    countries: Vec<RegionRecord>,
    #[serde(default)]
    routes: Vec<CoordinateRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Normalized(Dataset),
    Dashboard(DashboardPayload),
    Visitors(Vec<VisitorRecord>),
}

/// Coordinate routes snap to an existing region within this many degrees
const SNAP_DEGREES: f32 = 1.0;

/// Turns raw payloads into datasets: format detection, region name aliases
/// and hub route derivation
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    /// When a payload carries no routes, every active region routes here
    pub hub: Option<String>,
    /// Upstream name -> canonical region name, e.g. `"Türkiye" = "Turkey"`
    pub aliases: HashMap<String, String>,
}

impl Normalizer {
    pub fn new(hub: Option<String>, aliases: HashMap<String, String>) -> Self {
        let mut normalizer = Self { hub: None, aliases };
        normalizer.hub = hub.map(|h| normalizer.canonical(&h).to_string());
        normalizer
    }

    fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    /// Parse any supported payload into a [`Dataset`]
    pub fn normalize(&self, body: &str) -> Result<Dataset, PollError> {
        let mut dataset = match serde_json::from_str::<WirePayload>(body)? {
            WirePayload::Normalized(dataset) => dataset,
            WirePayload::Dashboard(payload) => from_dashboard(payload),
            WirePayload::Visitors(visitors) => self.from_visitors(visitors),
        };

        if !self.aliases.is_empty() {
            for region in &mut dataset.regions {
                region.name = self.canonical(&region.name).to_string();
            }
            for route in &mut dataset.routes {
                route.origin_name = self.canonical(&route.origin_name).to_string();
                route.destination_name = self.canonical(&route.destination_name).to_string();
            }
        }

        if dataset.routes.is_empty() {
            if let Some(hub) = &self.hub {
                dataset.routes = hub_routes(&dataset.regions, hub);
            }
        }
        Ok(dataset)
    }

    /// Aggregate visitor rows per country: users summed, coordinates averaged.
    /// Longitudes are averaged as unit vectors so a country straddling the
    /// antimeridian stays there. Aliased spellings land in the same region.
    fn from_visitors(&self, visitors: Vec<VisitorRecord>) -> Dataset {
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, VisitorTotals> = HashMap::new();

        for v in visitors {
            let Some(country) = v.country.filter(|c| !c.is_empty() && c != "(not set)") else {
                continue;
            };
            let country = self.canonical(&country).to_string();
            let entry = totals.entry(country.clone()).or_insert_with(|| {
                order.push(country);
                VisitorTotals::default()
            });
            let (sin, cos) = v.lng.to_radians().sin_cos();
            entry.users += v.active_users;
            entry.lat += v.lat;
            entry.lng_sin += sin;
            entry.lng_cos += cos;
            entry.count += 1;
        }

        let regions = order
            .into_iter()
            .filter_map(|name| {
                let t = totals.remove(&name)?;
                Some(RegionRecord {
                    name,
                    latitude: t.lat / t.count as f32,
                    longitude: t.lng_sin.atan2(t.lng_cos).to_degrees(),
                    active_users: t.users,
                })
            })
            .collect();

        Dataset {
            regions,
            routes: Vec::new(),
        }
    }
}

#[derive(Default)]
struct VisitorTotals {
    users: u64,
    lat: f32,
    lng_sin: f32,
    lng_cos: f32,
    count: u32,
}

fn from_dashboard(payload: DashboardPayload) -> Dataset {
    let mut regions = payload.countries;
    let mut routes = Vec::with_capacity(payload.routes.len());

    for route in payload.routes {
        let origin = snap_region(&mut regions, route.start_lat, route.start_lng);
        let destination = snap_region(&mut regions, route.end_lat, route.end_lng);
        routes.push(RouteRecord {
            origin_name: origin,
            destination_name: destination,
        });
    }

    Dataset { regions, routes }
}

/// Name of the region nearest to (lat, lng) within [`SNAP_DEGREES`], adding
/// a synthetic coordinate-named region when none is close enough
fn snap_region(regions: &mut Vec<RegionRecord>, lat: f32, lng: f32) -> String {
    let nearest = regions
        .iter()
        .map(|r| (r, (r.latitude - lat).abs().max((r.longitude - lng).abs())))
        .filter(|(_, d)| *d <= SNAP_DEGREES)
        .min_by(|a, b| a.1.total_cmp(&b.1));

    if let Some((region, _)) = nearest {
        return region.name.clone();
    }

    let name = format!("{lat:.2},{lng:.2}");
    if !regions.iter().any(|r| r.name == name) {
        regions.push(RegionRecord {
            name: name.clone(),
            latitude: lat,
            longitude: lng,
            active_users: 0,
        });
    }
    name
}

fn hub_routes(regions: &[RegionRecord], hub: &str) -> Vec<RouteRecord> {
    if !regions.iter().any(|r| r.name == hub) {
        tracing::warn!(hub, "hub region not present in telemetry, no routes derived");
        return Vec::new();
    }
    regions
        .iter()
        .filter(|r| r.active_users > 0 && r.name != hub)
        .map(|r| RouteRecord {
            origin_name: r.name.clone(),
            destination_name: hub.to_string(),
        })
        .collect()
}

// ============================================================================
// Sources
// ============================================================================

/// Something that can produce a telemetry snapshot. Called off the main
/// thread.
pub trait TelemetrySource: Send + Sync {
    fn fetch(&self) -> Result<Dataset, PollError>;

    /// Short description for the status line
    fn describe(&self) -> String;
}

pub struct HttpSource {
    url: String,
    normalizer: Normalizer,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, normalizer: Normalizer, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            normalizer,
            timeout,
        }
    }
}

impl TelemetrySource for HttpSource {
    fn fetch(&self) -> Result<Dataset, PollError> {
        let response = ureq::get(&self.url).timeout(self.timeout).call()?;
        let body = response
            .into_string()
            .map_err(|e| PollError::Http(e.to_string()))?;
        self.normalizer.normalize(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Re-reads a JSON file on every poll
pub struct FileSource {
    path: PathBuf,
    normalizer: Normalizer,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, normalizer: Normalizer) -> Self {
        Self {
            path: path.into(),
            normalizer,
        }
    }
}

impl TelemetrySource for FileSource {
    fn fetch(&self) -> Result<Dataset, PollError> {
        let body = fs::read_to_string(&self.path).map_err(|source| PollError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.normalizer.normalize(&body)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Name, latitude, longitude
const DEMO_CITIES: &[(&str, f32, f32)] = &[
    ("Istanbul", 41.01, 28.98),
    ("Ankara", 39.93, 32.85),
    ("Berlin", 52.52, 13.40),
    ("London", 51.51, -0.13),
    ("Amsterdam", 52.37, 4.90),
    ("Paris", 48.86, 2.35),
    ("Madrid", 40.42, -3.70),
    ("Stockholm", 59.33, 18.07),
    ("New York", 40.71, -74.01),
    ("Toronto", 43.65, -79.38),
    ("San Francisco", 37.77, -122.42),
    ("Mexico City", 19.43, -99.13),
    ("Sao Paulo", -23.55, -46.63),
    ("Buenos Aires", -34.60, -58.38),
    ("Lagos", 6.52, 3.38),
    ("Cairo", 30.04, 31.24),
    ("Nairobi", -1.29, 36.82),
    ("Johannesburg", -26.20, 28.05),
    ("Dubai", 25.20, 55.27),
    ("Mumbai", 19.08, 72.88),
    ("Singapore", 1.35, 103.82),
    ("Seoul", 37.57, 126.98),
    ("Tokyo", 35.68, 139.69),
    ("Sydney", -33.87, 151.21),
];

/// Simulated traffic over a fixed city table
pub struct DemoSource {
    rng: Mutex<StdRng>,
    hub: Option<String>,
}

impl DemoSource {
    pub fn new(seed: Option<u64>, hub: Option<String>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            hub,
        }
    }
}

impl TelemetrySource for DemoSource {
    fn fetch(&self) -> Result<Dataset, PollError> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let regions: Vec<RegionRecord> = DEMO_CITIES
            .iter()
            .map(|&(name, latitude, longitude)| RegionRecord {
                name: name.to_string(),
                latitude,
                longitude,
                active_users: if rng.gen_bool(0.7) { rng.gen_range(1..500) } else { 0 },
            })
            .collect();

        let routes = match self.hub.as_deref() {
            Some(hub) => hub_routes(&regions, hub),
            None => {
                let active: Vec<&RegionRecord> = regions.iter().filter(|r| r.active_users > 0).collect();
                let mut routes = Vec::new();
                if active.len() >= 2 {
                    for _ in 0..active.len() {
                        let a = active[rng.gen_range(0..active.len())];
                        let b = active[rng.gen_range(0..active.len())];
                        if a.name != b.name {
                            routes.push(RouteRecord {
                                origin_name: a.name.clone(),
                                destination_name: b.name.clone(),
                            });
                        }
                    }
                }
                routes
            }
        };

        Ok(Dataset { regions, routes })
    }

    fn describe(&self) -> String {
        "demo".to_string()
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Outcome of the most recent completed fetch
#[derive(Clone, Debug, PartialEq)]
pub enum PollStatus {
    Waiting,
    Ok { at: Instant },
    Failed { error: String, at: Instant },
}

type FetchResult = (u64, Result<Dataset, PollError>);

pub struct TelemetryPoller {
    source: Arc<dyn TelemetrySource>,
    interval: Duration,
    last_request: Option<Instant>,
    next_seq: u64,
    last_applied: u64,
    last_failed: u64,
    in_flight: usize,
    status: PollStatus,
    sender: Sender<FetchResult>,
    receiver: Receiver<FetchResult>,
}

impl TelemetryPoller {
    pub fn new(source: Arc<dyn TelemetrySource>, interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            source,
            interval,
            last_request: None,
            next_seq: 1,
            last_applied: 0,
            last_failed: 0,
            in_flight: 0,
            status: PollStatus::Waiting,
            sender,
            receiver,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn status(&self) -> &PollStatus {
        &self.status
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Start a fetch if the interval has elapsed (or none was made yet).
    /// Returns true when a fetch was started.
    pub fn maybe_request(&mut self, now: Instant) -> bool {
        let due = self
            .last_request
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if !due {
            return false;
        }
        self.request(now);
        true
    }

    /// Start a fetch now
    pub fn request(&mut self, now: Instant) {
        self.last_request = Some(now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight += 1;

        let source = Arc::clone(&self.source);
        let tx = self.sender.clone();
        thread::spawn(move || {
            let result = source.fetch();
            let _ = tx.send((seq, result));
        });
        tracing::debug!(seq, "telemetry fetch started");
    }

    /// Drain completed fetches. Returns the newest successful dataset that is
    /// newer than anything applied before; failures and stale results only
    /// update the status.
    pub fn drain(&mut self) -> Option<Dataset> {
        let mut newest: Option<(u64, Dataset)> = None;

        loop {
            let (seq, result) = match self.receiver.try_recv() {
                Ok(msg) => msg,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            self.in_flight = self.in_flight.saturating_sub(1);

            match result {
                Ok(dataset) => {
                    let floor = newest.as_ref().map_or(self.last_applied, |(s, _)| *s);
                    if seq <= floor {
                        tracing::debug!(seq, floor, "ignoring telemetry older than what is applied");
                        continue;
                    }
                    newest = Some((seq, dataset));
                }
                Err(err) => {
                    tracing::warn!(seq, error = %err, "telemetry fetch failed, keeping current scene");
                    self.last_failed = self.last_failed.max(seq);
                    if seq > self.last_applied {
                        self.status = PollStatus::Failed {
                            error: err.to_string(),
                            at: Instant::now(),
                        };
                    }
                }
            }
        }

        let (seq, dataset) = newest?;
        self.last_applied = seq;
        // a newer failure keeps reporting
        if seq > self.last_failed {
            self.status = PollStatus::Ok { at: Instant::now() };
        }
        Some(dataset)
    }

    /// Block until the first result arrives or `timeout` passes
    pub fn wait_first(&mut self, timeout: Duration) -> Option<Dataset> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(dataset) = self.drain() {
                return Some(dataset);
            }
            if self.in_flight == 0 {
                return None;
            }
            thread::sleep(Duration::from_millis(20));
        }
        None
    }
}
