//! Local one-shot collection

use anyhow::{Context, Result};
use chrono::Utc;
use crashdump_lib::{
    format_timestamp, CollectionSummary, CollectorBuilder, FailureLedger, InputSearchPaths,
    ResetContext, ScriptedBus, TopologyCache, TriggerType,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::output::{color_outcome, print_info, print_success, print_warning};

/// Options for a local collection
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub socket: Option<usize>,
    pub trigger: TriggerType,
    pub fixture: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Discover processors and collect one crash dump on this machine
pub fn run(options: CollectOptions) -> Result<CollectionSummary> {
    let fixture = options
        .fixture
        .context("No bus available: pass --fixture with a scripted bus description")?;
    let bus = ScriptedBus::from_fixture(&fixture)
        .with_context(|| format!("Failed to load bus fixture {}", fixture.display()))?;

    let input_paths = options
        .input_dir
        .map(InputSearchPaths::single)
        .unwrap_or_default();
    let collector = CollectorBuilder::new()
        .bus(Arc::new(bus))
        .input_paths(input_paths)
        .crashdump_version(env!("CARGO_PKG_VERSION"))
        .socket(options.socket)
        .build()?;

    let mut topology = TopologyCache::new();
    let found = collector.discover(&mut topology);
    debug!(processors = found, "Discovery finished");
    if found == 0 {
        anyhow::bail!("No processors found on the bus");
    }
    if let Some(socket) = options.socket {
        let valid = topology
            .records()
            .iter()
            .any(|r| r.socket() == socket && r.is_valid());
        if !valid {
            anyhow::bail!("Socket {} not found ({} processors discovered)", socket, found);
        }
    }

    let mut ledger = FailureLedger::new();
    let reset = ResetContext::new();
    let timestamp = format_timestamp(Utc::now());
    let report = collector.run_collection(
        &mut topology,
        &mut ledger,
        &reset,
        &options.trigger,
        &timestamp,
    );

    let json = report
        .document
        .to_json_pretty()
        .context("Failed to serialize crash dump")?;
    match &options.output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("Crash dump written to {}", path.display()));
        }
        None => println!("{}", json),
    }

    let summary = report.summary;
    print_info(&format!(
        "{} collection of {} processor(s): {}",
        summary.trigger,
        summary.cpus_collected,
        color_outcome(summary.collection_failed, summary.section_failures)
    ));
    if summary.global_timeout {
        print_warning("Collection stopped early: time budget exceeded");
    }
    Ok(summary)
}
