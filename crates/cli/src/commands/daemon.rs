//! Commands that talk to a running crashdumpd

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_outcome, format_bytes, print_info, print_success, print_table, print_warning,
    OutputFormat,
};

/// Row for the stored-log table
#[derive(Tabled, serde::Serialize)]
struct LogRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Size")]
    size: String,
}

/// Ask the daemon to start a collection
pub async fn trigger(client: &ApiClient, trigger_type: &str) -> Result<()> {
    let response = client.trigger(trigger_type).await?;
    print_success(&format!(
        "{} collection {}",
        response.trigger_type.cyan(),
        response.status
    ));
    Ok(())
}

/// Show whether a collection is running and how the last one went
pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Table => {
            println!("{}", "Collection Status".bold());
            println!("{}", "=".repeat(40));
            let state = if status.busy {
                "running".yellow()
            } else {
                "idle".green()
            };
            println!("State:      {}", state);
            match status.last {
                Some(last) => {
                    println!("Last run:   {} ({})", last.timestamp, last.trigger);
                    println!(
                        "Outcome:    {}",
                        color_outcome(last.collection_failed, last.section_failures)
                    );
                    if let Some(name) = last.log_name {
                        println!("Log:        {}", name.cyan());
                    }
                }
                None => println!("Last run:   none"),
            }
        }
    }
    Ok(())
}

pub async fn list_logs(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let logs = client.list_logs().await?;
    let rows: Vec<LogRow> = logs
        .into_iter()
        .map(|log| LogRow {
            name: log.name,
            kind: serde_json::to_value(log.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            timestamp: log.timestamp,
            size: format_bytes(log.size_bytes),
        })
        .collect();
    print_table(&rows, format);
    Ok(())
}

/// Print one stored log, or save it to a file
pub async fn show_log(client: &ApiClient, name: &str, output: Option<PathBuf>) -> Result<()> {
    let contents = client.read_log(name).await?;
    match output {
        Some(path) => {
            std::fs::write(&path, &contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("Saved {} to {}", name, path.display()));
        }
        None => println!("{}", contents),
    }
    Ok(())
}

pub async fn delete_all(client: &ApiClient) -> Result<()> {
    let response = client.delete_logs().await?;
    if response.deleted == 0 {
        print_warning("No stored logs to delete");
    } else {
        print_info(&format!("Deleted {} stored log(s)", response.deleted));
    }
    Ok(())
}
