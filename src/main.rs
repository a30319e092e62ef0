use clap::Parser;
use halal_compass::config::Config;
use halal_compass::geo::{self, Coordinates};
use halal_compass::geolocate::{GeoAcquirer, NoGps, Phase};
use halal_compass::notify::{ProgressSink, StderrSink};
use halal_compass::places::{self, ProviderQueryEngine};
use halal_compass::proxy::{ResilienceProxy, UreqTransport};
use halal_compass::retry::RetryOrchestrator;
use halal_compass::server;
use std::sync::Arc;

/// Halal Compass — find halal restaurants, butchers, and shops nearby.
///
/// Queries OpenStreetMap and a commercial place index in parallel,
/// merges duplicates, and widens the radius until enough places turn up.
///
/// Examples:
///   hcompass --lat 59.3293 --lon 18.0686
///   hcompass --lat 59.3293 --lon 18.0686 --radius 10000
///   hcompass --auto
///   hcompass --serve --port 8080 --admin-token s3cret
#[derive(Parser)]
#[command(name = "hcompass", version, about, long_about = None)]
struct Cli {
    /// Latitude (-90 to 90).
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude (-180 to 180).
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Auto-detect location via IP geolocation.
    #[arg(long, short = 'a')]
    auto: bool,

    /// Initial search radius in meters.
    #[arg(long, default_value_t = 5000)]
    radius: u32,

    /// Cap the number of places printed.
    #[arg(long)]
    limit: Option<usize>,

    /// Run the HTTP API server instead of a one-shot search.
    #[arg(long)]
    serve: bool,

    /// Server bind host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server bind port.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Bearer token for the admin endpoints. Unset disables them.
    #[arg(long)]
    admin_token: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    if cli.serve {
        let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("Error: Cannot start async runtime: {}", e);
            std::process::exit(1);
        });
        runtime.block_on(server::start(&cli.host, cli.port, cli.admin_token));
        return;
    }

    let config = Config::load();
    let proxy = ResilienceProxy::new(Box::new(UreqTransport));
    proxy.set_credential(config.place_index_key());
    let sink: Arc<dyn ProgressSink> = Arc::new(StderrSink);
    let retry = RetryOrchestrator::new(sink.clone());

    let origin = resolve_origin(&cli, &proxy);

    // ── Print search banner ─────────────────────────────────────

    eprintln!("  \u{1F50D} Searching for halal places near {}", origin);
    if !proxy.credential_set() {
        eprintln!("  Note: no place-index key configured; using OpenStreetMap only.");
    }

    // ── Search ──────────────────────────────────────────────────

    let engine = ProviderQueryEngine {
        proxy: &proxy,
        retry: &retry,
    };
    let results = places::search(&engine, &sink, origin, cli.radius);
    let mut results = places::sort_by_distance(results);
    if let Some(limit) = cli.limit {
        results.truncate(limit);
    }

    eprintln!("  Found {} places.", results.len());
    if retry.safe_mode() {
        eprintln!("  \u{26A0}\u{FE0F}  Some services were unreachable; results may be incomplete.");
    }

    // JSON to stdout
    match serde_json::to_string_pretty(&results) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: Cannot serialize results: {}", e);
            std::process::exit(1);
        }
    }
}

fn resolve_origin(cli: &Cli, proxy: &ResilienceProxy) -> Coordinates {
    // Priority: --lat/--lon > --auto > error

    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        if let Err(e) = geo::validate(lat, lon) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return Coordinates { lat, lon };
    }

    if cli.auto {
        let mut acquirer = GeoAcquirer::new(NoGps);
        let state = acquirer.acquire(proxy);
        if state.phase != Phase::Success {
            let reason = state.error.as_deref().unwrap_or("location detection failed");
            eprintln!("Error: {}", reason);
            std::process::exit(1);
        }
        if let (Some(coords), Some(city)) = (state.coords, state.city.as_deref()) {
            eprintln!("  \u{1F4CD} Detected location: {} ({})", city, coords);
        }
        return state.coords.unwrap_or_else(|| {
            eprintln!("Error: detection succeeded without coordinates");
            std::process::exit(1);
        });
    }

    eprintln!("Error: No location specified.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  hcompass --lat 59.3293 --lon 18.0686");
    eprintln!("  hcompass --lat 59.3293 --lon 18.0686 --radius 10000");
    eprintln!("  hcompass --auto");
    eprintln!("  hcompass --serve --port 8080");
    std::process::exit(1);
}
