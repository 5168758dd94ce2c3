use colored::Colorize;
use edge_scope_cache::{ScopeEntry, StoredIdentity};
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;
use time::format_description::well_known::Rfc3339;

use crate::cli::OutputFormat;

pub fn print_value(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => print_error(&format!("Cannot render output: {e}")),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_records(records: &[StoredIdentity], format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_value(records) {
            Ok(value) => print_value(&value),
            Err(e) => print_error(&format!("Cannot render records: {e}")),
        },
        OutputFormat::Table => print_records_table(records),
    }
}

fn print_records_table(records: &[StoredIdentity]) {
    if records.is_empty() {
        println!("No records found.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["ID", "State", "Status", "Auth", "Updated"]);
    for record in records {
        let (state, status, auth) = match &record.entry {
            ScopeEntry::Present(identity) => (
                "present",
                if identity.is_enabled() {
                    "enabled"
                } else {
                    "disabled"
                },
                identity.authentication.auth_type.as_str(),
            ),
            ScopeEntry::Absent => ("absent", "-", "-"),
        };
        let updated = record
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| "-".to_string());
        builder.push_record([record.id.as_str(), state, status, auth, updated.as_str()]);
    }

    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
    println!("Total: {}", records.len());
}
