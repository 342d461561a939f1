//! Command-line interface definitions for the `genlaunch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `genlaunch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "genlaunch",
    about = "Provision, snapshot, and tear down Genesis Cloud instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create an instance, wait for it to become active, and delete it.
    #[command(
        name = "run",
        about = "Create an instance, wait until it is active, then delete it"
    )]
    Run(RunCommand),
    /// Print the name to ID mapping for a resource collection.
    #[command(name = "resolve", about = "List resource names and their IDs")]
    Resolve(ResolveCommand),
    /// Delete an instance by ID.
    #[command(name = "destroy", about = "Delete an instance by ID")]
    Destroy(DestroyCommand),
}

/// Arguments for the `genlaunch run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Override the machine type for this run.
    ///
    /// The provider rejects unknown types when the instance is created.
    #[arg(long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Override the image name for this run.
    ///
    /// The name is resolved to an image ID before the instance is created.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Provide the startup script inline for this run.
    #[arg(long, value_name = "SCRIPT", conflicts_with = "startup_script_file")]
    pub(crate) startup_script: Option<String>,
    /// Provide the startup script from a local file for this run.
    #[arg(long, value_name = "PATH", conflicts_with = "startup_script")]
    pub(crate) startup_script_file: Option<String>,
    /// Take a snapshot with this name before deleting the instance.
    #[arg(long, value_name = "NAME")]
    pub(crate) snapshot: Option<String>,
    /// Keep the instance running for this many seconds once it is active.
    #[arg(long, value_name = "SECS")]
    pub(crate) hold: Option<u64>,
    /// Leave the instance running when the run fails after creation.
    #[arg(long)]
    pub(crate) keep_on_failure: bool,
}

/// Arguments for the `genlaunch resolve` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ResolveCommand {
    /// Collection to list.
    #[arg(value_enum)]
    pub(crate) kind: ResourceArg,
}

/// Resource collections accepted by `genlaunch resolve`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ResourceArg {
    /// Machine images.
    Images,
    /// Registered SSH keys.
    SshKeys,
    /// Security groups.
    SecurityGroups,
}

/// Arguments for the `genlaunch destroy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DestroyCommand {
    /// Identifier of the instance to delete.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
}
