//! Captures telemetry frames on an interface and prints a report whenever a switch is congested.
//!
//! ```bash
//! mri-monitor 0.5 30 --interface h99-eth0 --rules-dir rules
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use mri::monitor::{
    capture, CongestionMonitor, MonitorOptions, DEFAULT_ALPHA, DEFAULT_INTERFACE,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mri-monitor")]
#[command(version)]
#[command(about = "Detects congested switches from in-band telemetry", long_about = None)]
struct Cli {
    /// Per-hop delay above which a switch is congested, in milliseconds
    delay_ms: f64,

    /// Queue depth above which a switch is congested, in packets
    queue: u32,

    /// Interface to capture telemetry frames on
    #[arg(long, short, env = "MRI_INTERFACE", default_value = DEFAULT_INTERFACE)]
    interface: String,

    /// Directory holding the per-switch rule logs
    #[arg(long, default_value = "rules")]
    rules_dir: PathBuf,

    /// Seconds without packets after which a flow is inactive
    #[arg(long, default_value = "2", value_parser = parse_secs)]
    activity_timeout: Duration,

    /// Seconds between two checks for inactive flows
    #[arg(long, default_value = "1", value_parser = parse_period)]
    verify_interval: Duration,

    /// Minimum seconds between two reports for the same switch
    #[arg(long, default_value = "1", value_parser = parse_secs)]
    cooldown: Duration,

    /// Smoothing factor of the delay and queue estimates
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    alpha: f64,

    /// Frames buffered between the capture thread and the monitor
    #[arg(long, default_value_t = capture::DEFAULT_BUFFER)]
    buffer: usize,
}

/// Parses a non-negative number of seconds.
fn parse_secs(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

/// Parses a strictly positive number of seconds.
fn parse_period(arg: &str) -> Result<Duration, String> {
    let period = parse_secs(arg)?;
    if period.is_zero() {
        return Err("must be greater than zero".to_owned());
    }
    Ok(period)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = MonitorOptions::default()
        .delay_threshold_us((cli.delay_ms * 1000.0) as u32)
        .queue_threshold(cli.queue)
        .activity_timeout(cli.activity_timeout)
        .verify_interval(cli.verify_interval)
        .cooldown(cli.cooldown)
        .alpha(cli.alpha)
        .rules_dir(&cli.rules_dir);

    let monitor = CongestionMonitor::load(options)?;
    let frames = capture::open(&cli.interface, cli.buffer)?;

    info!(
        interface = %cli.interface,
        delay_ms = cli.delay_ms,
        queue = cli.queue,
        "Monitoring telemetry"
    );

    let (tx, mut reports) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            println!("{report}");
        }
    });

    tokio::select! {
        _ = monitor.run(frames, tx) => warn!("Capture stopped"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    printer.await?;

    let stats = monitor.stats();
    info!(
        frames = stats.frames(),
        samples = stats.samples(),
        reports = stats.reports(),
        integrity_faults = stats.integrity_faults(),
        "Monitor stopped"
    );

    Ok(())
}
