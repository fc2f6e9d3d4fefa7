//! route-tracker — follow a scheduled trip from the route API.
//!
//! `watch` keeps the tracker moving: one update straight away, one at the
//! start time, then one every few seconds. Lines typed on stdin are
//! looked up through Nominatim and reported with their distance from the
//! tracker. `search` and `render` do the same once and exit.

use std::{
    io::{self, BufRead},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration as StdDuration,
};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, error, info, warn};

use route_tracker::{
    api::{ApiClient, Snapshot},
    geocode::{Geocoder, SearchHit},
    schedule::{parse_timestamp, Countdown, Scheduler, Tick, DEFAULT_UPDATE_SECS},
    svg::{render_svg, write_svg, Scene},
    Fix, LatLon, Orientation, Tracker,
};

#[derive(Debug, Parser)]
#[command(version, about = "Follow a scheduled trip along its route")]
struct Cli {
    /// Base URL of the route API.
    #[arg(long, env = "ROUTE_API", default_value = "http://127.0.0.1:8000", global = true)]
    api: String,

    /// Pretend the trip starts at this time (ISO-8601 or epoch milliseconds).
    #[arg(long, env = "ROUTE_BEGIN", value_parser = parse_begin, global = true)]
    begin: Option<DateTime<Utc>>,

    /// Traversal order of the loaded route.
    #[arg(long, value_enum, default_value_t = OrientationArg::EastToWest, global = true)]
    orientation: OrientationArg,

    /// Draw maps without country outlines.
    #[arg(long, global = true)]
    no_basemap: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow the tracker; type a place name on stdin to search for it.
    Watch {
        /// Seconds between marker updates once the trip has started.
        #[arg(long, env = "ROUTE_INTERVAL", default_value_t = DEFAULT_UPDATE_SECS,
              value_parser = clap::value_parser!(i64).range(1..=3600))]
        interval: i64,

        /// Keep this SVG map up to date.
        #[arg(long, env = "ROUTE_SVG")]
        svg: Option<PathBuf>,

        /// Reload the route whenever the server's schedule changes.
        #[arg(long)]
        follow_config: bool,
    },
    /// Look a place up and print its distance from the tracker.
    Search {
        #[arg(required = true)]
        query: Vec<String>,

        /// Also draw the result on this SVG map.
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Draw the current map once.
    Render {
        #[arg(default_value = "map.svg")]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OrientationArg {
    /// Start at the easternmost point and head west.
    EastToWest,
    /// Keep the order the points were recorded in.
    AsRecorded,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::EastToWest => Orientation::EastToWest,
            OrientationArg::AsRecorded => Orientation::AsRecorded,
        }
    }
}

fn parse_begin(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    route_tracker::init_logging();
    let cli = Cli::parse();

    let client = ApiClient::new(&cli.api);
    info!("fetching meta and route from {}", client.base());
    let snapshot = client
        .load()
        .with_context(|| format!("error fetching meta/route from {}", client.base()))?;
    let session = Session::new(snapshot, &cli)?;

    match &cli.command {
        Command::Watch { interval, svg, follow_config } => {
            watch(session, &client, Duration::seconds(*interval), svg.as_deref(), *follow_config)
        }
        Command::Search { query, svg } => {
            let mut session = session;
            session.update_marker(Utc::now());
            session.search(&Geocoder::default(), &query.join(" "));
            if let Some(path) = svg {
                session.redraw(path)?;
            }
            Ok(())
        }
        Command::Render { out } => {
            let mut session = session;
            session.update_marker(Utc::now());
            session.redraw(out)?;
            info!("map written to {}", out.display());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything the map shows, rebuilt whenever the route is (re)loaded.
struct Session {
    snapshot: Snapshot,
    tracker: Tracker,
    orientation: Orientation,
    begin: Option<DateTime<Utc>>,
    basemap: bool,
    marker: LatLon,
    progress: f64,
    search: Option<SearchHit>,
}

impl Session {
    fn new(snapshot: Snapshot, cli: &Cli) -> anyhow::Result<Self> {
        let orientation = Orientation::from(cli.orientation);
        let tracker = snapshot
            .tracker(orientation, cli.begin)
            .context("route could not be loaded")?;
        let marker = tracker.route().start();
        info!(
            length_km = tracker.route().total_length() / 1000.0,
            start = %tracker.schedule().start(),
            end = %tracker.schedule().end(),
            "tracker anchored at ({:.5}, {:.5})",
            marker.lat,
            marker.lon
        );
        Ok(Self {
            snapshot,
            tracker,
            orientation,
            begin: cli.begin,
            basemap: !cli.no_basemap,
            marker,
            progress: 0.0,
            search: None,
        })
    }

    fn reload(&mut self, snapshot: Snapshot) -> route_tracker::Result<()> {
        self.tracker = snapshot.tracker(self.orientation, self.begin)?;
        self.snapshot = snapshot;
        self.marker = self.tracker.route().start();
        self.progress = 0.0;
        Ok(())
    }

    fn update_marker(&mut self, now: DateTime<Utc>) {
        let fix = self.tracker.fix(now);
        self.apply_fix(&fix);
    }

    fn apply_fix(&mut self, fix: &Fix) {
        debug!(progress = fix.progress, distance_m = fix.distance_m, "computed fix");
        self.progress = fix.progress;
        match fix.position {
            Some(p) => {
                self.marker = p;
                println!(
                    "{}\t{:.6}\t{:.6}\t{:.1}%",
                    fix.at.to_rfc3339(),
                    p.lat,
                    p.lon,
                    fix.progress * 100.0
                );
            }
            None => warn!("no position for distance {:.1} m, marker left in place", fix.distance_m),
        }
    }

    fn tick_countdown(&self, now: DateTime<Utc>) -> Countdown {
        let countdown = self.tracker.schedule().countdown(now);
        info!("{countdown}");
        countdown
    }

    fn search(&mut self, geocoder: &Geocoder, query: &str) {
        info!(query, "searching");
        match geocoder.search(query) {
            Ok(Some(place)) => {
                let hit = SearchHit::new(place, self.marker);
                println!("{}", hit.popup());
                self.search = Some(hit);
            }
            Ok(None) => {}
            Err(e) => error!("search for {query:?} failed: {e}"),
        }
    }

    fn caption(&self, now: DateTime<Utc>) -> String {
        self.tracker.schedule().countdown(now).caption(self.progress)
    }

    fn redraw(&self, path: &Path) -> route_tracker::Result<()> {
        let caption = self.caption(Utc::now());
        let scene = Scene {
            tracker: Some(self.marker),
            search: self.search.as_ref(),
            caption: Some(caption.as_str()),
            basemap: self.basemap,
            ..Scene::new(&self.snapshot.route)
        };
        write_svg(path, &render_svg(&scene))
    }
}

// ---------------------------------------------------------------------------
// Watch loop
// ---------------------------------------------------------------------------

fn watch(
    mut session: Session,
    client: &ApiClient,
    interval: Duration,
    svg: Option<&Path>,
    follow_config: bool,
) -> anyhow::Result<()> {
    let geocoder = Geocoder::default();
    let mut queries = Some(spawn_query_reader());
    let mut scheduler = Scheduler::new(session.tracker.schedule().start(), Utc::now(), interval);

    while let Some((due, tick)) = scheduler.next() {
        wait_until(due, &mut queries, |query| {
            session.search(&geocoder, &query);
            if let Some(path) = svg {
                redraw_logged(&session, path);
            }
        });

        match tick {
            Tick::Countdown => {
                session.tick_countdown(Utc::now());
            }
            Tick::Marker => {
                if follow_config && reload_if_changed(&mut session, client) {
                    scheduler = Scheduler::new(session.tracker.schedule().start(), Utc::now(), interval);
                    continue;
                }
                session.update_marker(Utc::now());
            }
        }

        if let Some(path) = svg {
            redraw_logged(&session, path);
        }
    }
    Ok(())
}

fn redraw_logged(session: &Session, path: &Path) {
    if let Err(e) = session.redraw(path) {
        error!("failed to write {}: {e}", path.display());
    }
}

/// Sleep until `due`, handing every query that arrives meanwhile to
/// `on_query`. Once stdin closes the channel is dropped and this is a
/// plain sleep.
fn wait_until(due: DateTime<Utc>, queries: &mut Option<Receiver<String>>, mut on_query: impl FnMut(String)) {
    loop {
        let wait = (due - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
        if wait.is_zero() {
            return;
        }
        let Some(rx) = queries.as_ref() else {
            thread::sleep(wait);
            return;
        };
        match rx.recv_timeout(wait) {
            Ok(query) => on_query(query),
            Err(RecvTimeoutError::Timeout) => return,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("stdin closed, searches disabled");
                *queries = None;
            }
        }
    }
}

/// Stand-in for the browser's config-updated event: when the server's
/// schedule differs from ours, fetch everything again.
fn reload_if_changed(session: &mut Session, client: &ApiClient) -> bool {
    let snapshot = match client.fetch_if_changed(&session.snapshot.meta) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return false,
        Err(e) => {
            warn!("could not check for configuration changes: {e}");
            return false;
        }
    };

    info!("route configuration updated, reloading");
    match session.reload(snapshot) {
        Ok(()) => true,
        Err(e) => {
            error!("error reloading meta/route: {e}");
            false
        }
    }
}

fn spawn_query_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if tx.send(query.to_string()).is_err() {
                break;
            }
        }
    });
    rx
}
