use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use edge_scope_cache::ScopeCacheConfig;

const STORE_FILE: &str = "scope.json";

fn data_dir() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("Cannot determine data directory")?
        .join("edge-scope");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn resolve_store_path(cli_store: Option<&Path>) -> Result<PathBuf> {
    // 1. --store flag / EDGE_SCOPE_STORE env
    if let Some(path) = cli_store {
        return Ok(path.to_path_buf());
    }
    // 2. Per-user data directory
    Ok(data_dir()?.join(STORE_FILE))
}

pub fn load_cache_config(path: Option<&Path>) -> Result<ScopeCacheConfig> {
    match path {
        Some(path) => ScopeCacheConfig::load(path)
            .with_context(|| format!("Invalid cache configuration in {}", path.display())),
        None => Ok(ScopeCacheConfig::default()),
    }
}
