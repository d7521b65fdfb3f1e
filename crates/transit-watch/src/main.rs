mod http;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use transit_proto::config::Config;
use transit_proto::FeedKey;
use transit_sync::{HttpBackend, Snapshot, StaticSession, SyncContext, SyncOptions};

#[derive(Parser, Debug)]
#[command(
    name = "transit-watch",
    version,
    about = "Keep a live transit dashboard state in sync and log what changes",
    long_about = "Polls the station feed for one line group, keeps the signed-in \
                  user's favorite stations in sync with the backend, and serves \
                  a local HTTP control API for dashboards."
)]
struct Args {
    /// Feed to poll at startup (1, ace, bdfm, g, jz, nqrw, l, 7, si)
    #[arg(short, long)]
    feed: Option<FeedKey>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not start the local HTTP control API
    #[arg(long)]
    no_http: bool,

    /// Station id to focus once the first collection containing it arrives
    #[arg(long)]
    focus: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };
    config.apply_env();
    if let Some(feed) = args.feed {
        config.polling.default_feed = feed;
    }
    if args.no_http {
        config.http.enabled = false;
    }

    // ── Logging ──────────────────────────────────────────────────────────────
    let log_path = config.paths.log_file.clone();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; by default keep HTTP client internals quiet.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("transit-watch log: {}", log_path.display());
    info!("transit-watch starting, backend {}", config.backend.base_url);

    // ── Sync core ────────────────────────────────────────────────────────────
    let api = Arc::new(HttpBackend::from_config(&config.backend)?);
    let auth = Arc::new(StaticSession::from_config(&config.auth));
    let ctx = Arc::new(SyncContext::new(api, auth, SyncOptions::from(&config)));

    // ── HTTP server ──────────────────────────────────────────────────────────
    if config.http.enabled {
        http::start_server(config.http.bind_address.clone(), config.http.port, ctx.clone());
    }

    // ── Follow snapshots until interrupted ───────────────────────────────────
    let mut stream = ctx.subscribe();
    let mut last = stream.current();
    let mut pending_focus = args.focus;

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            next = stream.next() => {
                let Some(snap) = next else {
                    warn!("sync context closed");
                    break;
                };
                if let Some(id) = pending_focus.take() {
                    if snap.station(&id).is_some() {
                        ctx.focus_stop(&id)?;
                    } else {
                        pending_focus = Some(id);
                    }
                }
                log_changes(&last, &snap);
                last = snap;
            }
            _ = &mut interrupted => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    ctx.shutdown();
    Ok(())
}

fn log_changes(prev: &Snapshot, next: &Snapshot) {
    if prev.feed != next.feed {
        if let Some(feed) = next.feed {
            info!("feed {} ({})", feed, route_list(feed));
        }
    }
    if prev.fetched_at != next.fetched_at {
        info!(
            "{} stations on feed {}",
            next.stations.len(),
            next.feed.map_or("-", |f| f.as_str())
        );
    }
    if prev.stations_error != next.stations_error {
        match &next.stations_error {
            Some(e) => warn!("station poll failing: {}", e),
            None => info!("station poll recovered"),
        }
    }
    if prev.identity != next.identity {
        match &next.identity {
            Some(id) => info!("signed in as {}", id.user_id),
            None => info!("signed out"),
        }
    }
    if prev.favorites != next.favorites || prev.favorites_pending != next.favorites_pending {
        let names: Vec<&str> = next
            .favorite_stations()
            .iter()
            .map(|s| s.stop_name.as_str())
            .collect();
        info!(
            "favorites: {:?} ({} on this feed: {}, {} pending)",
            next.favorites,
            names.len(),
            names.join(", "),
            next.favorites_pending.len()
        );
    }
    if prev.favorites_error != next.favorites_error {
        if let Some(e) = &next.favorites_error {
            warn!("favorites: {}", e);
        }
    }
    if prev.directory.fetched_at != next.directory.fetched_at {
        info!("station directory: {} stations", next.directory.data.len());
    }
    if prev.directory.error != next.directory.error {
        if let Some(e) = &next.directory.error {
            warn!("station directory: {}", e);
        }
    }
    if prev.outages.fetched_at != next.outages.fetched_at {
        if next.outages.data.is_empty() {
            info!("no elevator or escalator outages reported");
        }
        for outage in &next.outages.data {
            info!(
                "outage: {} at {} ({}), reason: {}, back: {}",
                outage.equipment_kind(),
                outage.station.as_deref().unwrap_or("unknown station"),
                outage.serving.as_deref().unwrap_or("N/A"),
                outage.reason.as_deref().unwrap_or("N/A"),
                outage.estimatedreturntoservice.as_deref().unwrap_or("N/A")
            );
        }
    }
    if prev.outages.error != next.outages.error {
        if let Some(e) = &next.outages.error {
            warn!("accessibility status unavailable: {}", e);
        }
    }
    if prev.focus != next.focus {
        match &next.focus {
            Some(focus) => {
                let eta = focus
                    .station
                    .soonest_eta(Utc::now())
                    .map_or_else(|| "no arrivals".to_string(), |eta| eta.to_string());
                info!(
                    "focus: {} {}{} next: {}",
                    focus.station.stop_id,
                    focus.station.stop_name,
                    if focus.stale { " (stale)" } else { "" },
                    eta
                );
            }
            None => info!("focus cleared"),
        }
    }
}

fn route_list(feed: FeedKey) -> String {
    feed.routes()
        .iter()
        .map(|r| r.code())
        .collect::<Vec<_>>()
        .join(" ")
}
