mod cli;
mod commands;
mod config;
mod directory;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use edge_identity_local::FileStore;
use edge_scope_cache::DeviceScopeCache;

use cli::{Cli, Commands, ConfigCommands};
use directory::OfflineDirectory;
use output::print_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level);

    if let Err(e) = run(&cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::List(args) => {
            let cache = open_cache(cli).await?;
            commands::records::list(&cache, args, format).await?;
        }
        Commands::Show(args) => {
            let cache = open_cache(cli).await?;
            commands::records::show(&cache, &args.id, format).await?;
        }
        Commands::Verify(args) => {
            let cache = open_cache(cli).await?;
            commands::records::verify(&cache, &args.id).await?;
        }
        Commands::Stats => {
            let cache = open_cache(cli).await?;
            commands::records::stats(&cache, format).await?;
        }
        Commands::Apply(args) => {
            let cache = open_cache(cli).await?;
            commands::records::apply(&cache, &args.file).await?;
        }
        Commands::Remove(args) => {
            let cache = open_cache(cli).await?;
            commands::records::remove(&cache, &args.id).await?;
        }
        Commands::Config(args) => match &args.command {
            ConfigCommands::Check => {
                commands::config::check(cli.config.as_deref(), format)?;
            }
        },
    }

    Ok(())
}

async fn open_cache(cli: &Cli) -> Result<DeviceScopeCache> {
    let settings = config::load_cache_config(cli.config.as_deref())?;
    let path = config::resolve_store_path(cli.store.as_deref())?;
    tracing::debug!(path = %path.display(), "Opening identity store");

    let store = FileStore::open(&path)
        .await
        .with_context(|| format!("Failed to open identity store {}", path.display()))?;

    let cache =
        DeviceScopeCache::create(Arc::new(OfflineDirectory), Arc::new(store), &settings).await?;
    Ok(cache)
}
