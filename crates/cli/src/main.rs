//! netforge CLI - main entry point
//!
//! One-shot commands against a single switch: `netforge <device>
//! <resource> <verb> [args]`. Dry-run is the default; `-x` executes and
//! `-s` persists the running config afterwards.

use clap::{Parser, Subcommand};
use netforge_common::{Error, Result};
use netforge_switch::Fabric;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

use commands::{baseline, cleanup, health, lag, provision, service, snapshot, svi, vlan, vpn, Ctx};

/// Declarative switch configuration and provisioning
#[derive(Parser)]
#[command(name = "netforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Spec directory holding network.json and friends
    #[arg(short = 'S', long = "spec-dir", env = "NETFORGE_SPEC_DIR", default_value = ".", global = true)]
    spec_dir: PathBuf,

    /// Execute the change (default is dry-run preview)
    #[arg(short = 'x', long = "execute", global = true)]
    execute: bool,

    /// Persist the running config after a successful apply (requires -x)
    #[arg(short = 's', long = "save", global = true)]
    save: bool,

    /// Structured JSON output
    #[arg(long = "json", global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Target device name from the topology
    device: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage VLANs
    #[command(subcommand)]
    Vlan(vlan::VlanCommands),

    /// Manage port-channels
    #[command(subcommand)]
    Lag(lag::LagCommands),

    /// Attach, detach, and refresh services
    #[command(subcommand)]
    Service(service::ServiceCommands),

    /// Configure switched virtual interfaces
    #[command(subcommand)]
    Svi(svi::SviCommands),

    /// Bind and unbind IP-VPNs
    #[command(subcommand)]
    Vpn(vpn::VpnCommands),

    /// Apply baseline configlets
    #[command(subcommand)]
    Baseline(baseline::BaselineCommands),

    /// Provision the device from the topology
    Provision(provision::ProvisionArgs),

    /// Verify configuration and operational health
    Health,

    /// Collect orphaned configuration
    Cleanup(cleanup::CleanupArgs),

    /// Dump the live ConfigDB snapshot
    Snapshot(snapshot::SnapshotArgs),
}

async fn run(cli: Cli) -> Result<()> {
    if cli.save && !cli.execute {
        return Err(Error::validation("-s requires -x"));
    }

    let network = netforge_spec::load_dir(&cli.spec_dir)?;
    let ctx = Ctx {
        fabric: Fabric::new(network),
        device: cli.device,
        execute: cli.execute,
        save: cli.save,
        json: cli.json,
    };

    match cli.command {
        Commands::Vlan(cmd) => vlan::execute(cmd, &ctx).await,
        Commands::Lag(cmd) => lag::execute(cmd, &ctx).await,
        Commands::Service(cmd) => service::execute(cmd, &ctx).await,
        Commands::Svi(cmd) => svi::execute(cmd, &ctx).await,
        Commands::Vpn(cmd) => vpn::execute(cmd, &ctx).await,
        Commands::Baseline(cmd) => baseline::execute(cmd, &ctx).await,
        Commands::Provision(args) => provision::execute(args, &ctx).await,
        Commands::Health => health::execute(&ctx).await,
        Commands::Cleanup(args) => cleanup::execute(args, &ctx).await,
        Commands::Snapshot(args) => snapshot::execute(args, &ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e.to_string());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
