use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::config::load_cache_config;
use crate::output::{print_success, print_value};

pub fn check(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_cache_config(path)?;

    match format {
        OutputFormat::Json => print_value(&serde_json::to_value(&config)?),
        OutputFormat::Table => {
            let source = path.map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string());
            println!("{}: {}", "Source".cyan(), source);
            print!("{}", toml::to_string_pretty(&config)?);
            print_success("Configuration is valid");
        }
    }
    Ok(())
}
