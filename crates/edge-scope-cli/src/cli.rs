use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "edge-scope")]
#[command(about = "Inspect and maintain an edge gateway's device-scope identity store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Identity store file (overrides EDGE_SCOPE_STORE and the default data dir)
    #[arg(short, long, global = true, env = "EDGE_SCOPE_STORE")]
    pub store: Option<PathBuf>,

    /// Cache configuration file (TOML)
    #[arg(short, long, global = true, env = "EDGE_SCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List stored identity records
    List(ListArgs),
    /// Show one stored record (e.g. device-1 or device-1/module-a)
    Show(IdArgs),
    /// Decide whether an identity may connect, using stored records only
    Verify(IdArgs),
    /// Record counts
    Stats,
    /// Write identities from a JSON file into the store as in scope
    Apply(ApplyArgs),
    /// Mark an identity out of scope
    Remove(IdArgs),
    /// Manage cache configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct ListArgs {
    /// Only records marking an id out of scope
    #[arg(long, conflicts_with = "present")]
    pub absent: bool,
    /// Only records holding an identity
    #[arg(long)]
    pub present: bool,
}

#[derive(clap::Args)]
pub struct IdArgs {
    /// Identity id: `<device>` or `<device>/<module>`
    pub id: String,
}

#[derive(clap::Args)]
pub struct ApplyArgs {
    /// Path to a JSON array of identities
    pub file: PathBuf,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration and print the effective values
    Check,
}
