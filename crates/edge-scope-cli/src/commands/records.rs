use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use edge_identity::Identity;
use edge_scope_cache::DeviceScopeCache;
use serde_json::json;

use crate::cli::{ListArgs, OutputFormat};
use crate::output::{print_records, print_success, print_value};

pub async fn list(cache: &DeviceScopeCache, args: &ListArgs, format: OutputFormat) -> Result<()> {
    let records: Vec<_> = cache
        .records()
        .await
        .into_iter()
        .filter(|r| !args.absent || !r.entry.is_present())
        .filter(|r| !args.present || r.entry.is_present())
        .collect();

    print_records(&records, format);
    Ok(())
}

pub async fn show(cache: &DeviceScopeCache, id: &str, format: OutputFormat) -> Result<()> {
    let record = cache
        .stored(id)
        .await
        .with_context(|| format!("No record for {id}"))?;

    match format {
        OutputFormat::Json => print_value(&serde_json::to_value(&record)?),
        OutputFormat::Table => print_records(std::slice::from_ref(&record), format),
    }
    Ok(())
}

pub async fn verify(cache: &DeviceScopeCache, id: &str) -> Result<()> {
    let identity = cache.verify(id, false).await?;
    println!(
        "{} {} is {} ({})",
        "✓".green(),
        id.cyan(),
        "in scope".green(),
        identity.authentication.auth_type
    );
    Ok(())
}

pub async fn stats(cache: &DeviceScopeCache, format: OutputFormat) -> Result<()> {
    let stats = cache.stats().await;

    match format {
        OutputFormat::Json => print_value(&json!({
            "records": stats.records,
            "present": stats.present,
            "enabled": stats.enabled,
            "absent": stats.absent,
            "bootstrapSkipped": stats.bootstrap_skipped,
        })),
        OutputFormat::Table => {
            println!("{}: {}", "Records".cyan(), stats.records);
            println!("{}: {}", "Present".cyan(), stats.present);
            println!("{}: {}", "Enabled".cyan(), stats.enabled);
            println!("{}: {}", "Absent".cyan(), stats.absent);
            if stats.bootstrap_skipped > 0 {
                println!(
                    "{}: {}",
                    "Unreadable".yellow(),
                    stats.bootstrap_skipped.to_string().yellow()
                );
            }
        }
    }
    Ok(())
}

fn read_identities(path: &Path) -> Result<Vec<Identity>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content).context("Expected a JSON array of identities")
}

pub async fn apply(cache: &DeviceScopeCache, file: &Path) -> Result<()> {
    let identities = read_identities(file)?;
    let count = identities.len();

    for identity in identities {
        let id = identity.id();
        cache
            .apply_update(identity)
            .await
            .with_context(|| format!("Failed to store {id}"))?;
    }

    print_success(&format!("Applied {count} identities"));
    Ok(())
}

pub async fn remove(cache: &DeviceScopeCache, id: &str) -> Result<()> {
    cache.apply_removal(id).await?;
    print_success(&format!("Marked {id} out of scope"));
    Ok(())
}
