//! Crash-log agent collection
//!
//! A processor (or die) that supports telemetry exposes a number of
//! crash-log agents. Each agent describes itself with a 64-bit word:
//!
//! | bits    | field                               |
//! |---------|-------------------------------------|
//! | 0..8    | entry type                          |
//! | 8..16   | crash type                          |
//! | 16..48  | unique id                           |
//! | 48..64  | crash space size in 32-bit words    |
//!
//! The agent's buffer is streamed in 64-bit samples, stored base64-encoded
//! under the agent's label, and the crash-log trigger is re-armed at the end.

use crate::bus::{read_register, BusTransport, Reading, Selector, Target};
use crate::document::Node;
use crate::ledger::{BudgetCheck, RunTimeBudget};
use crate::models::SectionStatus;
use crate::sections::{SectionContext, SectionHandler};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const DISCOVERY_SUBOPCODE_SUPPORT: u8 = 0;
const DISCOVERY_SUBOPCODE_CRASHLOG: u8 = 1;
const DISCOVERY_PARAM_SUPPORT: u8 = 0;
const DISCOVERY_PARAM_AGENT_COUNT: u8 = 2;
const DISCOVERY_PARAM_AGENT_DETAILS: u8 = 3;

const SAMPLE_LEN: usize = 8;
const WORDS_PER_SAMPLE: usize = 2;
const WORD_LEN: usize = 4;

const REARM_WATCHER: u16 = 0;
const REARM_OFFSET: u16 = 0x8;
const REARM_BIT: u32 = 28;

/// Built-in agent labels used when the input document has none
pub const DEFAULT_AGENT_LABELS: &[(u32, &str)] = &[
    (0x84ba0b36, "PCODE_CRASH_INDEX"),
    (0x9956f43f, "PUNIT_CRASH_INDEX"),
    (0xd5323b09, "OOBMSM_CRASH_INDEX"),
    (0x284b9c1f, "PMC_TRACE_INDEX"),
    (0x8899069f, "PMC_RESET_INDEX"),
    (0x258e3c90, "PMC_CRASH_INDEX"),
];

/// Decoded agent descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentDetails {
    pub entry_type: u8,
    pub crash_type: u8,
    pub unique_id: u32,
    /// Buffer size in 32-bit words
    pub crash_space: u16,
}

impl AgentDetails {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            entry_type: (raw & 0xFF) as u8,
            crash_type: ((raw >> 8) & 0xFF) as u8,
            unique_id: ((raw >> 16) & 0xFFFF_FFFF) as u32,
            crash_space: (raw >> 48) as u16,
        }
    }

    pub fn buffer_len(&self) -> usize {
        usize::from(self.crash_space) * WORD_LEN
    }

    pub fn sample_count(&self) -> usize {
        usize::from(self.crash_space).div_ceil(WORDS_PER_SAMPLE)
    }
}

/// Agent unique id to human-readable label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentTable {
    labels: HashMap<u32, String>,
}

impl AgentTable {
    pub fn new(labels: HashMap<u32, String>) -> Self {
        Self { labels }
    }

    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_AGENT_LABELS
                .iter()
                .map(|(id, label)| (*id, label.to_string()))
                .collect(),
        )
    }

    pub fn label(&self, unique_id: u32) -> Option<&str> {
        self.labels.get(&unique_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// How collection of a single agent ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCollect {
    Complete,
    /// A sample read failed; the buffer holds what was read before it
    Failed(Reading),
    SectionTimeout,
    GlobalTimeout,
}

/// Result of a full crash-log pass over one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashlogOutcome {
    /// Telemetry is not supported; nothing was collected
    Unsupported,
    Success,
    /// Some agents failed to describe themselves or failed part way
    Partial,
    /// The support or agent-count query failed
    Failed(Reading),
    SectionTimeout,
    GlobalTimeout,
}

/// Counters and outcome of a crash-log pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashlogReport {
    pub outcome: CrashlogOutcome,
    pub agents: u16,
    pub collected: u16,
    /// Agents with an empty or unavailable descriptor
    pub skipped: u16,
    /// Agents whose descriptor or samples could not be read
    pub failed: u16,
    /// `None` when no re-arm was attempted
    pub rearmed: Option<bool>,
}

impl CrashlogReport {
    pub fn status(&self) -> SectionStatus {
        match self.outcome {
            CrashlogOutcome::SectionTimeout => SectionStatus::SectionTimeout,
            CrashlogOutcome::GlobalTimeout => SectionStatus::GlobalTimeout,
            CrashlogOutcome::Failed(_) | CrashlogOutcome::Partial => SectionStatus::Failure,
            _ if self.rearmed == Some(false) => SectionStatus::Failure,
            _ => SectionStatus::Success,
        }
    }
}

fn discovery(
    bus: &dyn BusTransport,
    target: Target,
    subopcode: u8,
    param: u8,
    index: u16,
    len: usize,
) -> Reading {
    read_register(
        bus,
        target,
        Selector::TelemetryDiscovery {
            subopcode,
            param,
            index,
        },
        len,
    )
}

/// Whether the unit supports telemetry discovery.
///
/// An unavailable completion means not supported. Hard errors and transport
/// failures are returned.
pub fn is_supported(bus: &dyn BusTransport, target: Target) -> Result<bool, Reading> {
    match discovery(
        bus,
        target,
        DISCOVERY_SUBOPCODE_SUPPORT,
        DISCOVERY_PARAM_SUPPORT,
        0,
        1,
    ) {
        Reading::Value { value, .. } => Ok(value & 1 == 1),
        Reading::Unavailable { .. } => Ok(false),
        failed => Err(failed),
    }
}

/// Number of crash-log agents; zero when the count is unavailable
pub fn agent_count(bus: &dyn BusTransport, target: Target) -> Result<u16, Reading> {
    match discovery(
        bus,
        target,
        DISCOVERY_SUBOPCODE_CRASHLOG,
        DISCOVERY_PARAM_AGENT_COUNT,
        0,
        2,
    ) {
        Reading::Value { value, .. } => Ok(value as u16),
        Reading::Unavailable { .. } => Ok(0),
        failed => Err(failed),
    }
}

/// Descriptor of one agent.
///
/// `Ok(None)` marks an agent with an empty buffer or an unavailable
/// descriptor; a failed read is returned.
pub fn agent_details(
    bus: &dyn BusTransport,
    target: Target,
    agent: u16,
) -> Result<Option<AgentDetails>, Reading> {
    let raw = match discovery(
        bus,
        target,
        DISCOVERY_SUBOPCODE_CRASHLOG,
        DISCOVERY_PARAM_AGENT_DETAILS,
        agent,
        SAMPLE_LEN,
    ) {
        Reading::Value { value, .. } => value,
        Reading::Unavailable { cc } => {
            debug!(agent, cc, "Crash-log agent descriptor unavailable");
            return Ok(None);
        }
        failed => return Err(failed),
    };
    let details = AgentDetails::from_raw(raw);
    if details.crash_space == 0 {
        debug!(agent, "Crash-log agent reports empty buffer");
        return Ok(None);
    }
    Ok(Some(details))
}

/// Stream an agent's buffer.
///
/// The budget is consulted before every sample. On any abort the buffer keeps
/// the samples read so far, zero-filled beyond them.
pub fn collect_agent(
    bus: &dyn BusTransport,
    target: Target,
    agent: u16,
    details: &AgentDetails,
    budget: &RunTimeBudget,
) -> (Vec<u8>, AgentCollect) {
    let mut buffer = vec![0u8; details.buffer_len()];

    for sample in 0..details.sample_count() {
        match budget.check() {
            BudgetCheck::Within => {}
            BudgetCheck::SectionExceeded => return (buffer, AgentCollect::SectionTimeout),
            BudgetCheck::GlobalExceeded => return (buffer, AgentCollect::GlobalTimeout),
        }

        let reading = read_register(
            bus,
            target,
            Selector::CrashlogSample {
                agent,
                sample: sample as u16,
            },
            SAMPLE_LEN,
        );
        let Some(value) = reading.value() else {
            warn!(agent, sample, reading = %reading.display(), "Crash-log sample read failed");
            return (buffer, AgentCollect::Failed(reading));
        };

        let start = sample * SAMPLE_LEN;
        let end = (start + SAMPLE_LEN).min(buffer.len());
        buffer[start..end].copy_from_slice(&value.to_le_bytes()[..end - start]);
    }
    (buffer, AgentCollect::Complete)
}

/// Label for an agent, if the table knows it
pub fn agent_name<'t>(details: &AgentDetails, table: &'t AgentTable) -> Option<&'t str> {
    table.label(details.unique_id)
}

/// Whether an agent's unique id is in the table
pub fn is_valid_agent(details: &AgentDetails, table: &AgentTable) -> bool {
    agent_name(details, table).is_some()
}

/// Store an agent's buffer as `agent_id_0x<id>.#data_<label>`.
///
/// Unknown agents are stored under `#data_0x<id>`.
pub fn store_agent(out: &mut Node, details: &AgentDetails, table: &AgentTable, buffer: &[u8]) {
    let id_key = format!("agent_id_0x{:x}", details.unique_id);
    let data_key = match agent_name(details, table) {
        Some(label) => format!("#data_{}", label),
        None => format!("#data_0x{:x}", details.unique_id),
    };
    let node = out.child(&id_key);
    let data_key = if node.get(&data_key).is_some() {
        format!("{}_{}", data_key, node.len())
    } else {
        data_key
    };
    node.insert(&data_key, STANDARD.encode(buffer));
}

/// Re-arm the crash-log trigger by toggling its watcher bit
pub fn rearm(bus: &dyn BusTransport, target: Target) -> bool {
    let selector = Selector::ConfigWatcher {
        watcher: REARM_WATCHER,
        offset: REARM_OFFSET,
    };
    let Some(current) = read_register(bus, target, selector, SAMPLE_LEN).value() else {
        warn!(addr = target.addr, domain = ?target.domain, "Failed to read crash-log trigger");
        return false;
    };
    let toggled = current ^ (1u64 << REARM_BIT);
    let written = Reading::from_result(bus.write(target, selector, &toggled.to_le_bytes()));
    if written.value().is_none() {
        warn!(
            addr = target.addr,
            domain = ?target.domain,
            reading = %written.display(),
            "Failed to re-arm crash-log trigger"
        );
        return false;
    }
    true
}

/// Collect every agent of one unit into `out`
pub fn run(
    bus: &dyn BusTransport,
    target: Target,
    table: &AgentTable,
    budget: &RunTimeBudget,
    out: &mut Node,
) -> CrashlogReport {
    let mut report = CrashlogReport {
        outcome: CrashlogOutcome::Success,
        agents: 0,
        collected: 0,
        skipped: 0,
        failed: 0,
        rearmed: None,
    };

    let discovered = is_supported(bus, target).and_then(|supported| {
        if supported {
            agent_count(bus, target).map(Some)
        } else {
            Ok(None)
        }
    });
    match discovered {
        Ok(Some(agents)) => report.agents = agents,
        Ok(None) => {
            debug!(addr = target.addr, domain = ?target.domain, "Telemetry not supported");
            report.outcome = CrashlogOutcome::Unsupported;
            return report;
        }
        Err(reading) => {
            warn!(
                addr = target.addr,
                domain = ?target.domain,
                reading = %reading.display(),
                "Crash-log discovery failed"
            );
            report.outcome = CrashlogOutcome::Failed(reading);
            return report;
        }
    }

    for agent in 0..report.agents {
        match budget.check() {
            BudgetCheck::Within => {}
            BudgetCheck::SectionExceeded => {
                report.outcome = CrashlogOutcome::SectionTimeout;
                break;
            }
            BudgetCheck::GlobalExceeded => {
                report.outcome = CrashlogOutcome::GlobalTimeout;
                return report;
            }
        }

        let details = match agent_details(bus, target, agent) {
            Ok(Some(details)) => details,
            Ok(None) => {
                report.skipped += 1;
                continue;
            }
            Err(reading) => {
                warn!(agent, reading = %reading.display(), "Crash-log agent descriptor read failed");
                report.failed += 1;
                continue;
            }
        };

        let (buffer, result) = collect_agent(bus, target, agent, &details, budget);
        store_agent(out, &details, table, &buffer);
        match result {
            AgentCollect::Complete => report.collected += 1,
            AgentCollect::Failed(_) => report.failed += 1,
            AgentCollect::SectionTimeout => {
                report.outcome = CrashlogOutcome::SectionTimeout;
                break;
            }
            AgentCollect::GlobalTimeout => {
                report.outcome = CrashlogOutcome::GlobalTimeout;
                return report;
            }
        }
    }

    if report.outcome == CrashlogOutcome::Success && report.failed > 0 {
        report.outcome = CrashlogOutcome::Partial;
    }
    if report.agents > 0 {
        report.rearmed = Some(rearm(bus, target));
    }
    info!(
        addr = target.addr,
        domain = ?target.domain,
        agents = report.agents,
        collected = report.collected,
        skipped = report.skipped,
        failed = report.failed,
        "Crash-log collection finished"
    );
    report
}

/// `crashlog` section handler
#[derive(Debug, Clone, Copy, Default)]
pub struct CrashlogSection;

impl SectionHandler for CrashlogSection {
    fn collect(&self, ctx: &SectionContext<'_>, out: &mut Node) -> SectionStatus {
        let labels = ctx.config.agent_labels();
        let table = if labels.is_empty() {
            AgentTable::builtin()
        } else {
            AgentTable::new(labels)
        };
        run(ctx.bus, ctx.target(), &table, ctx.budget, out).status()
    }
}
