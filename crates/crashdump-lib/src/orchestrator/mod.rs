//! Collection orchestration
//!
//! A [`Collector`] runs one crash-dump collection end to end: it refreshes the
//! cached topology, wakes the processors, loads each model's input document,
//! walks the section catalogue over every processor (and die), and assembles
//! the resulting document. All per-section problems are folded into the
//! document and the run summary; nothing here returns an error to the caller.

mod traversal;

#[cfg(test)]
mod tests;

use crate::bus::BusTransport;
use crate::catalogue::{record_type, REVISION};
use crate::document::{format_elapsed, keys, version_stamp, CrashdumpDocument};
use crate::input::{InputConfigCache, InputFileKind, InputSearchPaths, INPUT_FILE_ERROR};
use crate::ledger::{is_collection_failure, FailureLedger, ResetContext, RunTimeBudget};
use crate::models::{CollectionSummary, TriggerType};
use crate::observability::{CrashdumpMetrics, StructuredLogger};
use crate::sections::HandlerSet;
use crate::topology::{
    check_wake_state, save_wake_state, set_wake_state, CpuRecord, DiscoveryPhase, TopologyCache,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use traversal::RunState;

/// Settings for a collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Where input documents are looked up
    pub input_paths: InputSearchPaths,
    /// Reported as `platform_name` in the metadata
    pub platform_name: String,
    /// Reported as `crashdump_ver` in the metadata
    pub crashdump_version: String,
    /// Collect only the processor with this index
    pub socket: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            input_paths: InputSearchPaths::default(),
            platform_name: "unknown".to_string(),
            crashdump_version: env!("CARGO_PKG_VERSION").to_string(),
            socket: None,
        }
    }
}

/// A finished run
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub document: CrashdumpDocument,
    pub summary: CollectionSummary,
}

/// Timestamp format used in the metadata and in stored-log names
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Runs collections against one bus
pub struct Collector {
    bus: Arc<dyn BusTransport>,
    handlers: HandlerSet,
    config: CollectorConfig,
    metrics: CrashdumpMetrics,
    logger: StructuredLogger,
}

impl Collector {
    pub fn new(bus: Arc<dyn BusTransport>, handlers: HandlerSet, config: CollectorConfig) -> Self {
        let logger = StructuredLogger::new(config.platform_name.clone());
        Self {
            bus,
            handlers,
            config,
            metrics: CrashdumpMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn bus(&self) -> &dyn BusTransport {
        self.bus.as_ref()
    }

    /// Startup-time discovery; unresolved processors are retried at event time
    pub fn discover(&self, topology: &mut TopologyCache) -> usize {
        topology.initialize(self.bus.as_ref());
        topology.refresh(self.bus.as_ref(), DiscoveryPhase::Startup);
        let valid = topology.valid_count();
        self.metrics.set_cpus_discovered(valid as i64);
        valid
    }

    /// Run one collection for `trigger`
    pub fn run_collection(
        &self,
        topology: &mut TopologyCache,
        ledger: &mut FailureLedger,
        reset: &ResetContext,
        trigger: &TriggerType,
        timestamp: &str,
    ) -> CollectionReport {
        let started = Instant::now();
        let bus = self.bus.as_ref();

        reset.clear();
        ledger.begin_run();

        topology.initialize(bus);
        topology.refresh(bus, DiscoveryPhase::Event);
        self.metrics.set_cpus_discovered(topology.valid_count() as i64);

        save_wake_state(bus, topology.records_mut());
        set_wake_state(bus, topology.records(), true);

        let kind = match trigger {
            TriggerType::Telemetry => InputFileKind::Telemetry,
            _ => InputFileKind::Crashdump,
        };
        let mut inputs = InputConfigCache::new(self.config.input_paths.clone(), kind);
        for record in topology.records_mut().iter_mut() {
            inputs.load_config(record);
        }
        let global_limit = inputs.first().and_then(|input| input.document.max_time());

        let selected: Vec<(usize, &CpuRecord)> = topology
            .records()
            .iter()
            .filter(|r| r.is_valid())
            .filter(|r| self.config.socket.map(|s| s == r.socket()).unwrap_or(true))
            .map(|r| (r.socket(), r))
            .collect();

        self.metrics.inc_collections(trigger.as_str());
        self.logger
            .log_collection_started(trigger.as_str(), selected.len());

        let mut state = RunState {
            bus,
            handlers: &self.handlers,
            inputs: &inputs,
            unique: inputs.is_unique(),
            trigger,
            reset,
            ledger: &mut *ledger,
            budget: RunTimeBudget::new(global_limit),
            document: CrashdumpDocument::new(),
            metrics: &self.metrics,
            logger: &self.logger,
            global_timeout: false,
        };

        let product_type = selected
            .first()
            .and_then(|(_, r)| r.model())
            .map(|m| m.product_type())
            .unwrap_or(0);
        let metadata = state.document.metadata();
        metadata.insert("timestamp", timestamp);
        metadata.insert("trigger_type", trigger.as_str());
        metadata.insert("platform_name", self.config.platform_name.as_str());
        metadata.insert("crashdump_ver", self.config.crashdump_version.as_str());
        metadata.insert(
            keys::VERSION,
            version_stamp(record_type::METADATA, product_type, REVISION),
        );
        state.document.processors().insert(
            keys::VERSION,
            version_stamp(record_type::BMC_AUTONOMOUS, product_type, REVISION),
        );
        let setup_time = started.elapsed();
        state.budget.reset_section();

        state.traverse(&selected);

        if state.document.root().get(keys::OEM_ROOT).is_some() {
            state.document.oem_processors().insert_if_absent(
                keys::VERSION,
                version_stamp(record_type::BMC_AUTONOMOUS, product_type, REVISION),
            );
        }

        let global_timeout = state.global_timeout;
        let mut document = state.document;

        let metadata = document.metadata();
        if inputs.is_unique() {
            if let Some(input) = inputs.first() {
                metadata.insert("_input_file", input.path.display().to_string());
                if let Some(version) = &input.document.version {
                    metadata.insert("_input_file_ver", version.as_str());
                }
            }
        }
        if !inputs.load_errors().is_empty() {
            metadata.insert("_input_file_error", INPUT_FILE_ERROR);
        }
        metadata.insert(keys::TIME, format_elapsed(setup_time));
        metadata.insert(keys::RESET_DETECTED, reset.take().marker());

        let cpus_collected = selected.len();

        topology.clear_crashed_cores();
        let not_awake = check_wake_state(bus, topology.records());
        if !not_awake.is_empty() {
            warn!(addrs = ?not_awake, "Processors lost wake during collection");
        }
        set_wake_state(bus, topology.records(), false);

        let section_failures = ledger.run_failures();
        ledger.complete_run(trigger);
        let collection_failed = is_collection_failure(section_failures, trigger);

        let elapsed = started.elapsed();
        document
            .metadata()
            .insert(keys::TOTAL_TIME, format_elapsed(elapsed));

        self.metrics
            .observe_collection_duration(elapsed.as_secs_f64());
        self.logger.log_collection_complete(
            trigger.as_str(),
            section_failures,
            global_timeout,
            elapsed.as_secs_f64(),
        );
        if collection_failed {
            info!(
                trigger = %trigger,
                failures = section_failures,
                "Collection reported failures"
            );
        }

        CollectionReport {
            document,
            summary: CollectionSummary {
                trigger: trigger.clone(),
                timestamp: timestamp.to_string(),
                cpus_collected,
                section_failures,
                global_timeout,
                collection_failed,
                log_name: None,
            },
        }
    }
}

/// Builder for a [`Collector`]
pub struct CollectorBuilder {
    bus: Option<Arc<dyn BusTransport>>,
    handlers: HandlerSet,
    config: CollectorConfig,
}

impl CollectorBuilder {
    pub fn new() -> Self {
        Self {
            bus: None,
            handlers: HandlerSet::standard(),
            config: CollectorConfig::default(),
        }
    }

    pub fn bus(mut self, bus: Arc<dyn BusTransport>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replace the section handlers
    pub fn handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn input_paths(mut self, paths: InputSearchPaths) -> Self {
        self.config.input_paths = paths;
        self
    }

    pub fn platform_name(mut self, name: impl Into<String>) -> Self {
        self.config.platform_name = name.into();
        self
    }

    pub fn crashdump_version(mut self, version: impl Into<String>) -> Self {
        self.config.crashdump_version = version.into();
        self
    }

    pub fn socket(mut self, socket: Option<usize>) -> Self {
        self.config.socket = socket;
        self
    }

    pub fn build(self) -> Result<Collector> {
        let bus = self
            .bus
            .ok_or_else(|| anyhow::anyhow!("Bus is required"))?;
        Ok(Collector::new(bus, self.handlers, self.config))
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
