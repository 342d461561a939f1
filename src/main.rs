//! Binary entry point for the genlaunch CLI.

mod cli;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use genlaunch::config::ConfigError;
use genlaunch::{
    ApiError, GenesisConfig, InstanceId, InstanceManager, Orchestrator, ResourceId, ResourceKind,
    ResourceResolver, RunError, RunReport,
};

use cli::{Cli, DestroyCommand, ResourceArg, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = GenesisConfig::load_without_cli_args()?;
    match cli {
        Cli::Run(command) => run_command(apply_overrides(config, command)).await,
        Cli::Resolve(command) => resolve_command(&config, command.kind).await,
        Cli::Destroy(command) => destroy_command(&config, command).await,
    }
}

fn apply_overrides(mut config: GenesisConfig, args: RunCommand) -> GenesisConfig {
    if let Some(instance_type) = args.instance_type {
        config.instance_type = instance_type;
    }
    if let Some(image) = args.image {
        config.image = image;
    }
    // Either flag replaces both configured sources so they never conflict.
    if args.startup_script.is_some() || args.startup_script_file.is_some() {
        config.startup_script = args.startup_script;
        config.startup_script_file = args.startup_script_file;
    }
    if let Some(snapshot) = args.snapshot {
        config.snapshot_name = Some(snapshot);
    }
    if let Some(hold) = args.hold {
        config.hold_secs = hold;
    }
    config.keep_on_failure |= args.keep_on_failure;
    config
}

async fn run_command(config: GenesisConfig) -> Result<(), CliError> {
    let spec = config.instance_spec()?;
    let orchestrator = Orchestrator::new(config.transport()?, config.run_settings());
    let report = orchestrator.execute_until(spec, shutdown_signal()).await?;
    write_report(io::stdout(), &report)?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C; run will not be interruptible");
        std::future::pending::<()>().await;
    }
}

async fn resolve_command(config: &GenesisConfig, kind: ResourceArg) -> Result<(), CliError> {
    let resolver = ResourceResolver::new(config.transport()?).with_per_page(config.per_page);
    let mapping = resolver.resolve(resource_kind(kind)).await?;
    write_mapping(io::stdout(), mapping)?;
    Ok(())
}

async fn destroy_command(config: &GenesisConfig, args: DestroyCommand) -> Result<(), CliError> {
    let id = InstanceId::new(args.instance_id);
    InstanceManager::new(config.transport()?)
        .delete(id.clone())
        .await?;
    writeln!(io::stdout(), "deleted instance {id}")?;
    Ok(())
}

const fn resource_kind(arg: ResourceArg) -> ResourceKind {
    match arg {
        ResourceArg::Images => ResourceKind::Image,
        ResourceArg::SshKeys => ResourceKind::SshKey,
        ResourceArg::SecurityGroups => ResourceKind::SecurityGroup,
    }
}

fn write_report(mut target: impl Write, report: &RunReport) -> io::Result<()> {
    writeln!(target, "instance_id: {}", report.instance_id)?;
    writeln!(target, "public_ip: {}", report.public_ip)?;
    writeln!(target, "status_polls: {}", report.status_polls)?;
    if let Some(snapshot) = &report.snapshot {
        writeln!(target, "snapshot_id: {}", snapshot.id)?;
    }
    Ok(())
}

fn write_mapping(
    mut target: impl Write,
    mapping: impl IntoIterator<Item = (String, ResourceId)>,
) -> io::Result<()> {
    let sorted: BTreeMap<String, ResourceId> = mapping.into_iter().collect();
    for (name, id) in sorted {
        writeln!(target, "{name}\t{id}")?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
