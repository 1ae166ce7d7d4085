//! ttydash - Configuration-driven TTY metrics dashboard.
//!
//! Reads a YAML dashboard definition, polls a Prometheus-compatible
//! backend on a slow cadence, and renders a header line plus entity
//! tables to a terminal device, repainting the header on a fast cadence.
//!
//! Usage:
//!   ttydash                                  # ./dashboard.yml to /dev/tty
//!   ttydash -c pve.yml -t /dev/tty1          # render to a console device
//!   ttydash -c pve.yml -v                    # with debug logging

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use ttydash::app::App;
use ttydash::config::Config;
use ttydash::engine::Engine;
use ttydash::source::PromClient;
use ttydash::term::Screen;

/// Configuration-driven TTY metrics dashboard.
#[derive(Parser)]
#[command(name = "ttydash", about = "Configuration-driven TTY metrics dashboard", version)]
struct Args {
    /// Path to the dashboard configuration file.
    #[arg(short, long, default_value = "dashboard.yml")]
    config: PathBuf,

    /// Terminal device to render to.
    #[arg(short, long, default_value = "/dev/tty")]
    tty: String,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    /// Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber. Logs go to stderr, away from the
/// rendered device.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("ttydash={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config '{}': {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    let base_url = config.datasources.prometheus.base_url.clone();
    let timeout = Duration::from_secs_f64(config.datasources.prometheus.timeout_s);
    let client = match PromClient::new(&base_url, timeout) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error creating backend client: {}", e);
            std::process::exit(1);
        }
    };

    let device = match OpenOptions::new().write(true).open(&args.tty) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error opening device '{}': {}", args.tty, e);
            std::process::exit(1);
        }
    };

    info!("ttydash {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Backend: {}, refresh: fast={}s bulk={}s",
        base_url, config.globals.refresh.fast_s, config.globals.refresh.bulk_s
    );
    info!("Rendering to {}", args.tty);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        eprintln!("Error installing signal handler: {}", e);
        std::process::exit(1);
    }

    let app = App::new(Engine::new(config), client, Screen::new(device));
    if let Err(e) = app.run(running) {
        eprintln!("Error running dashboard: {}", e);
        std::process::exit(1);
    }

    info!("ttydash stopped");
}
