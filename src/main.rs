//! Facewatch daemon: continuous face recognition across the camera fleet.
//!
//! Loads the enrolled identities (served from the embedding cache when the
//! registry is unchanged), then monitors every configured camera on a
//! recurring interval, logging detections and raising alerts.
//!
//! ## Usage
//!
//! ```bash
//! facewatch-daemon               # Run until terminated
//! facewatch-daemon --once        # Run a single monitoring cycle and exit
//! facewatch-daemon --rebuild     # Force-rebuild the embedding cache first
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

use facewatch::camera::{DbCameraSource, HttpSnapshotClient};
use facewatch::config::Config;
use facewatch::embed::{EmbeddingProvider, HttpEmbeddingProvider};
use facewatch::identity::IdentityIndex;
use facewatch::monitor::{Monitor, MonitorSettings};
use facewatch::notify::{Notifier, PushNotifier};
use facewatch::{logging, Database};

#[derive(Default)]
struct DaemonArgs {
    /// Run a single monitoring cycle and exit.
    once: bool,
    /// Force-rebuild the embedding cache before monitoring.
    rebuild: bool,
    /// Cycle interval override (seconds).
    interval: Option<u64>,
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = parse_args();

    logging::init(None)?;
    info!("Facewatch daemon starting...");

    let config = load_config(&args)?;

    let db = Arc::new(Database::open(&config.database.path).context("Failed to open database")?);
    db.initialize().context("Failed to initialize database")?;
    info!("Database opened at {:?}", config.database.path);

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbeddingProvider::new(
        config.embedding.endpoint.clone(),
        Duration::from_secs(config.embedding.timeout_secs),
    ));
    let index = Arc::new(IdentityIndex::new(
        config.identities.registry_path.clone(),
        config.identities.cache_path.clone(),
        provider.clone(),
    ));

    let report = index.load(args.rebuild);
    info!(
        identities = report.loaded,
        skipped = report.skipped,
        from_cache = report.from_cache,
        "Identity index ready"
    );

    let notifier: Option<Arc<dyn Notifier>> = if config.notify.enabled {
        Some(Arc::new(PushNotifier::new(config.notify.clone())))
    } else {
        None
    };

    let monitor = Monitor::new(
        MonitorSettings::from_config(&config),
        Arc::new(DbCameraSource::new(db.clone())),
        Arc::new(HttpSnapshotClient::new()),
        provider,
        index,
        db,
        notifier,
    );

    if let Some(interval) = args.interval {
        let applied = monitor.set_interval(interval);
        info!(interval = applied, "Interval override applied");
    }

    if args.once {
        info!("Running a single monitoring cycle");
        monitor.run_once();
    } else {
        monitor.start();
        loop {
            thread::sleep(Duration::from_secs(60));
            let status = monitor.status();
            info!(
                cameras = status.active_camera_count,
                interval = status.interval_seconds,
                "Monitoring heartbeat"
            );
        }
    }

    info!("Facewatch daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonArgs {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = DaemonArgs::default();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--once" | "-1" => {
                args.once = true;
            }
            "--rebuild" | "-r" => {
                args.rebuild = true;
            }
            "--interval" | "-i" => {
                if i + 1 < argv.len() {
                    if let Ok(interval) = argv[i + 1].parse() {
                        args.interval = Some(interval);
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < argv.len() {
                    args.config_path = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                }
            }
            "--version" | "-V" => {
                println!("facewatch {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", argv[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    args
}

fn print_help() {
    println!(
        r#"facewatch-daemon - Continuous face recognition monitor

USAGE:
    facewatch-daemon [OPTIONS]

OPTIONS:
    --once, -1          Run a single monitoring cycle and exit
    --rebuild, -r       Force-rebuild the embedding cache before starting
    --interval, -i N    Monitoring interval in seconds (clamped to the
                        configured range)
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FACEWATCH_CONFIG    Path to config file (overrides default location)
    FACEWATCH_LOG       Log level (trace, debug, info, warn, error)
"#
    );
}

fn load_config(args: &DaemonArgs) -> Result<Config> {
    if let Some(path) = &args.config_path {
        return Config::load_from(path);
    }
    if let Ok(path) = std::env::var("FACEWATCH_CONFIG") {
        return Config::load_from(&PathBuf::from(path));
    }
    Config::load()
}
