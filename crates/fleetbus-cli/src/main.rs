//! fleetbus operator CLI
//!
//! Attaches the master runtime to a SocketCAN interface, or to a simulated
//! fleet with `--simulate N`, and runs one operator command.

mod cli;
mod error;
mod report;
mod session;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod can;

use std::process::ExitCode;

use clap::Parser;
use fleetbus_core::MasterConfig;
use fleetbus_harness::{SimFleet, sim_bus};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{cli::Cli, error::CliError};

fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
async fn run_on_iface(iface: &str, config: MasterConfig, cli: &Cli) -> Result<(), CliError> {
    let bus = can::SocketCanBus::open(iface)
        .map_err(|source| CliError::Open { iface: iface.to_string(), source })?;
    info!(iface, "attached to CAN interface");
    session::run(bus, config, cli.settle(), &cli.command).await
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
async fn run_on_iface(_iface: &str, _config: MasterConfig, _cli: &Cli) -> Result<(), CliError> {
    Err(CliError::SocketCanUnavailable)
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    let config = cli.master_config()?;

    if let Some(iface) = &cli.iface {
        return run_on_iface(iface, config, cli).await;
    }

    let count = cli.simulate.unwrap_or(4);
    let fleet = SimFleet::generated(config.ids.clone(), count);
    let (bus, peer) = sim_bus(cli.seed, cli.loss);
    fleet.spawn(peer);
    info!(nodes = count, seed = cli.seed, loss = cli.loss, "running against simulated fleet");

    session::run(bus, config, cli.settle(), &cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        },
    }
}
