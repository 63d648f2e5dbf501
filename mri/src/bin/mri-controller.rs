//! Compiles a topology description into forwarding tables and installs them on every switch.
//!
//! ```bash
//! mri-controller --topology topology.json --p4info build/mri.p4info --bmv2-json build/mri.json
//! ```

use std::{net::IpAddr, path::PathBuf, process, sync::Arc};

use clap::{CommandFactory, Parser};
use mri::{
    control::{
        deploy, DeployOptions, ProgramDescriptor, RecordingControlPlane, SessionRegistry,
        DEFAULT_ADDRESS, DEFAULT_BASE_PORT,
    },
    topology::TopologyDescription,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mri-controller")]
#[command(version)]
#[command(about = "Installs forwarding and telemetry state on the switches of a topology", long_about = None)]
struct Cli {
    /// Topology description (JSON)
    #[arg(long, env = "MRI_TOPOLOGY", default_value = "topology.json")]
    topology: PathBuf,

    /// p4info file of the forwarding program
    #[arg(long, default_value = "./build/mri.p4info")]
    p4info: PathBuf,

    /// Device configuration (BMv2 JSON) of the forwarding program
    #[arg(long, default_value = "./build/mri.json")]
    bmv2_json: PathBuf,

    /// Directory the per-switch rule logs are written to
    #[arg(long, default_value = "rules")]
    rules_dir: PathBuf,

    /// Directory the per-switch request dumps are written to
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Address of the switches' control endpoints
    #[arg(long, default_value_t = DEFAULT_ADDRESS)]
    address: IpAddr,

    /// Control port of the first switch, in name order
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// Keep the sessions open until interrupted
    #[arg(long)]
    hold: bool,
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

    let program = ProgramDescriptor::new(&cli.p4info, &cli.bmv2_json);
    if let Err(e) = program.check() {
        Cli::command().print_help()?;
        eprintln!("\n{e}\nHave you compiled the forwarding program?");
        process::exit(1);
    }

    let (graph, completion) = TopologyDescription::load(&cli.topology)?.compile()?;
    info!(
        topology = %cli.topology.display(),
        switches = graph.switches().count(),
        hosts = graph.hosts().count(),
        synthesized = completion.synthesized.len(),
        unreachable = completion.unreachable.len(),
        "Compiled forwarding tables"
    );

    let plane = Arc::new(RecordingControlPlane::new().with_dump_dir(&cli.log_dir));
    let registry = SessionRegistry::new();

    let options = DeployOptions::default()
        .address(cli.address)
        .base_port(cli.base_port)
        .program(program)
        .rules_dir(&cli.rules_dir);

    let report = tokio::select! {
        report = deploy(plane, &graph, options, registry.clone()) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };

    match &report {
        Some(report) => {
            for (switch, e) in &report.failed {
                error!(%switch, err = %e, "Switch not deployed");
            }
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                rules_dir = %cli.rules_dir.display(),
                "Deployment done"
            );

            if cli.hold {
                info!("Holding sessions, press Ctrl-C to shut down");
                tokio::signal::ctrl_c().await?;
            }
        }
        None => warn!("Interrupted, shutting down"),
    }

    let closed = registry.shutdown_all().await;
    info!(sessions = closed, "Closed sessions");

    if !report.is_some_and(|report| report.is_success()) {
        process::exit(1);
    }

    Ok(())
}
