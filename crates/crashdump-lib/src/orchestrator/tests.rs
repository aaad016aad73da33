//! Scenario tests for full collection runs
//!
//! These drive the collector against a scripted bus and input documents in a
//! temporary directory, and check the assembled document.

use super::*;
use crate::bus::{cc, ScriptedBus, Selector, Target};
use crate::catalogue::HandlerId;
use crate::document::Node;
use crate::models::SectionStatus;
use crate::sections::{SectionContext, SectionHandler};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

const TIMESTAMP: &str = "2026-10-15T08:30:00Z";

/// Handler that records every invocation
struct RecordingHandler {
    status: SectionStatus,
    write: bool,
    reset: Option<Arc<ResetContext>>,
    calls: Mutex<Vec<(String, usize, Option<u8>)>>,
}

impl RecordingHandler {
    fn new(status: SectionStatus, write: bool) -> Arc<Self> {
        Arc::new(Self {
            status,
            write,
            reset: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn marking_reset(reset: Arc<ResetContext>) -> Arc<Self> {
        Arc::new(Self {
            status: SectionStatus::Success,
            write: true,
            reset: Some(reset),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, usize, Option<u8>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Section/processor pairs in call order, composite repeats folded
    fn order(&self) -> Vec<(String, usize)> {
        let mut order: Vec<(String, usize)> = self
            .calls()
            .into_iter()
            .map(|(name, cpu, _)| (name, cpu))
            .collect();
        order.dedup();
        order
    }
}

impl SectionHandler for RecordingHandler {
    fn collect(&self, ctx: &SectionContext<'_>, out: &mut Node) -> SectionStatus {
        self.calls.lock().unwrap().push((
            ctx.descriptor.name.to_string(),
            ctx.cpu_index,
            ctx.die.map(|d| d.domain),
        ));
        if let Some(reset) = &self.reset {
            reset.mark_reset();
        }
        if self.write {
            out.insert("value", "0x1");
        }
        self.status
    }
}

fn recording_set(handler: &Arc<RecordingHandler>) -> HandlerSet {
    [
        HandlerId::Registers,
        HandlerId::SubRegisters,
        HandlerId::UncoreStatus,
        HandlerId::PowerManagement,
        HandlerId::Crashlog,
    ]
    .into_iter()
    .fold(HandlerSet::standard(), |set, id| {
        set.with(id, handler.clone())
    })
}

fn endpoint(bus: u8, device: u8, function: u8, reg: u16) -> Selector {
    Selector::EndpointPci {
        seg: 0,
        bus,
        device,
        function,
        reg,
    }
}

fn wake_sel() -> Selector {
    Selector::PkgConfig { index: 5, param: 1 }
}

/// Sapphire Rapids processors with two cores and one slice each
fn spr_bus(addrs: &[u8]) -> ScriptedBus {
    let bus = ScriptedBus::new();
    for &addr in addrs {
        bus.add_cpu(addr);
        let t = Target::socket(addr);
        bus.respond_ok(t, Selector::Cpuid, 0x806F8u32.to_le_bytes());
        bus.respond_ok(t, endpoint(31, 30, 6, 0x80), vec![0x03, 0, 0, 0]);
        bus.respond_ok(t, endpoint(31, 30, 6, 0x84), vec![0, 0, 0, 0]);
        bus.respond_ok(t, endpoint(31, 30, 3, 0x9C), vec![0x01, 0, 0, 0]);
        bus.respond_ok(t, endpoint(31, 30, 3, 0xA0), vec![0, 0, 0, 0]);
        bus.respond_ok(t, wake_sel(), vec![1, 0, 0, 0]);
    }
    bus
}

/// Granite Rapids processors with one io die and two compute dies
fn gnr_bus(addrs: &[u8]) -> ScriptedBus {
    let bus = ScriptedBus::new();
    for &addr in addrs {
        bus.add_cpu(addr);
        let t = Target::socket(addr);
        bus.respond_ok(t, Selector::Cpuid, 0xA06D1u32.to_le_bytes());
        bus.respond_ok(t, Selector::PkgConfig { index: 0, param: 7 }, 0x601u32.to_le_bytes());
        bus.respond_ok(t, wake_sel(), vec![1, 0, 0, 0]);
        for (domain, pcu) in [(9u8, 6u8), (10, 7)] {
            let die = Target::die(addr, domain);
            bus.respond_ok(die, endpoint(30, pcu, 0, 0x488), vec![0x0F, 0, 0, 0]);
            bus.respond_ok(die, endpoint(30, pcu, 0, 0x489), vec![0, 0, 0, 0]);
        }
    }
    bus
}

fn write_input(dir: &Path, file: &str, body: &str) {
    std::fs::write(dir.join(file), body).unwrap();
}

fn collector(bus: Arc<ScriptedBus>, dir: &TempDir, handlers: HandlerSet) -> Collector {
    CollectorBuilder::new()
        .bus(bus)
        .handlers(handlers)
        .input_paths(InputSearchPaths::single(dir.path()))
        .platform_name("test-platform")
        .crashdump_version("1.0")
        .build()
        .unwrap()
}

fn run(collector: &Collector, trigger: TriggerType) -> CollectionReport {
    let mut topology = TopologyCache::new();
    let mut ledger = FailureLedger::new();
    let reset = ResetContext::new();
    collector.run_collection(&mut topology, &mut ledger, &reset, &trigger, TIMESTAMP)
}

fn crash_data(report: &CollectionReport) -> &Node {
    report.document.root().get(keys::ROOT).unwrap()
}

#[test]
fn test_builder_requires_bus() {
    assert!(CollectorBuilder::new().build().is_err());
}

#[test]
fn test_format_timestamp() {
    let now = DateTime::parse_from_rfc3339("2026-10-15T08:30:00+00:00")
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(format_timestamp(now), TIMESTAMP);
}

#[test]
fn test_single_cpu_document_shape() {
    let dir = TempDir::new().unwrap();
    let bus = Arc::new(spr_bus(&[0x30]));
    let collector = collector(bus, &dir, HandlerSet::standard());

    let report = run(&collector, TriggerType::OnDemand);
    let data = crash_data(&report);

    let metadata = data.get(keys::METADATA).unwrap();
    assert_eq!(metadata.get("timestamp").and_then(Node::as_str), Some(TIMESTAMP));
    assert_eq!(metadata.get("trigger_type").and_then(Node::as_str), Some("On-Demand"));
    assert_eq!(metadata.get("platform_name").and_then(Node::as_str), Some("test-platform"));
    assert_eq!(metadata.get(keys::RESET_DETECTED).and_then(Node::as_str), Some("NONE"));
    assert!(metadata.get(keys::TOTAL_TIME).is_some());
    assert_eq!(
        metadata.path(&["cpu0", "cpuid"]).and_then(Node::as_str),
        Some("0x806f8")
    );

    let processors = data.get(keys::PROCESSORS).unwrap();
    assert_eq!(processors.get(keys::VERSION).and_then(Node::as_str), Some("0x2301c001"));

    let pm = processors.path(&["cpu0", "PM_info"]).unwrap();
    assert_eq!(pm.path(&["core1", "c_state_reg"]).and_then(Node::as_str), Some("UA:0x90"));
    assert_eq!(pm.get(keys::VERSION).and_then(Node::as_str), Some("0xc01c001"));
    assert!(pm.get(keys::TIME).is_some());

    // no registers configured and no telemetry support: nothing to report
    assert!(processors.path(&["cpu0", "TOR"]).is_none());
    assert!(processors.path(&["cpu0", "crashlog"]).is_none());
    assert!(report.document.root().get(keys::OEM_ROOT).is_none());

    assert_eq!(report.summary.cpus_collected, 1);
    assert_eq!(report.summary.section_failures, 0);
    assert!(!report.summary.collection_failed);
}

#[test]
fn test_disabled_section_is_marked_and_never_run() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "crashdump_input_spr.json",
        r#"{"Version": "1.2", "DefaultState": "Enable",
            "crash_data": {"TOR": {"_record_enable": false}}}"#,
    );
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::Ierr);
    let tor = crash_data(&report).path(&[keys::PROCESSORS, "cpu0", "TOR"]).unwrap();
    assert_eq!(tor.get(keys::RECORD_ENABLE).and_then(Node::as_bool), Some(false));
    assert_eq!(tor.len(), 1);
    assert!(handler.calls().iter().all(|(name, _, _)| name != "TOR"));
    assert!(handler.calls().iter().any(|(name, _, _)| name == "address_map"));

    let metadata = crash_data(&report).get(keys::METADATA).unwrap();
    assert_eq!(metadata.get("_input_file_ver").and_then(Node::as_str), Some("1.2"));
    assert!(metadata.get("_input_file_error").is_none());
    assert!(metadata.path(&["cpu0", "_input_file"]).is_none());
}

#[test]
fn test_unparsable_input_is_reported_in_metadata() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "crashdump_input_spr.json", "{ \"crash_data\": ");
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::OnDemand);
    let metadata = crash_data(&report).get(keys::METADATA).unwrap();
    assert_eq!(
        metadata.get("_input_file_error").and_then(Node::as_str),
        Some("Error while reading input file")
    );
    assert!(metadata.get("_input_file_ver").is_none());
    // sections still run with everything enabled
    assert!(handler.calls().iter().any(|(name, _, _)| name == "TOR"));
}

#[test]
fn test_failed_empty_section_gets_status_marker() {
    let dir = TempDir::new().unwrap();
    let handler = RecordingHandler::new(SectionStatus::Failure, false);
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let mut topology = TopologyCache::new();
    let mut ledger = FailureLedger::new();
    let reset = ResetContext::new();
    let trigger = TriggerType::Ierr;
    let report = collector.run_collection(&mut topology, &mut ledger, &reset, &trigger, TIMESTAMP);

    let tor = crash_data(&report).path(&[keys::PROCESSORS, "cpu0", "TOR"]).unwrap();
    assert_eq!(tor.get(keys::STATUS).and_then(Node::as_str), Some(keys::FAILED));
    assert!(tor.get(keys::VERSION).is_none());

    assert!(report.summary.section_failures > 0);
    assert!(report.summary.collection_failed);
    assert_eq!(ledger.failures_for(&trigger), report.summary.section_failures);

    // a clean run for the same trigger clears the count
    let clean = self::collector(
        Arc::new(spr_bus(&[0x30])),
        &dir,
        recording_set(&RecordingHandler::new(SectionStatus::Success, false)),
    );
    let report = clean.run_collection(&mut topology, &mut ledger, &reset, &trigger, TIMESTAMP);
    assert_eq!(report.summary.section_failures, 0);
    assert_eq!(ledger.failures_for(&trigger), 0);
}

#[test]
fn test_post_reset_collects_flagged_sections_only() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "crashdump_input_spr.json",
        r#"{"DefaultState": "Enable",
            "crash_data": {"TOR": {"PostResetData": true}}}"#,
    );
    let handler = RecordingHandler::new(SectionStatus::Failure, true);
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::PostReset);
    assert_eq!(handler.order(), vec![("TOR".to_string(), 0)]);
    assert!(report.summary.section_failures > 0);
    assert!(!report.summary.collection_failed);
}

#[test]
fn test_section_timeout_is_marked() {
    let dir = TempDir::new().unwrap();
    let handler = RecordingHandler::new(SectionStatus::SectionTimeout, true);
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::OnDemand);
    let tor = crash_data(&report).path(&[keys::PROCESSORS, "cpu0", "TOR"]).unwrap();
    assert_eq!(tor.get(keys::TIMEOUT).and_then(Node::as_str), Some("section"));
    assert_eq!(tor.get("value").and_then(Node::as_str), Some("0x1"));
    assert!(!report.summary.global_timeout);
}

#[test]
fn test_global_timeout_stops_the_run() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "crashdump_input_spr.json",
        r#"{"DefaultState": "Enable", "MaxTimeInSec": 0, "crash_data": {}}"#,
    );
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let collector = collector(Arc::new(spr_bus(&[0x30, 0x31])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::OnDemand);
    assert!(report.summary.global_timeout);
    assert!(handler.calls().is_empty());
    let processors = crash_data(&report).get(keys::PROCESSORS).unwrap();
    assert_eq!(processors.keys(), vec![keys::VERSION]);
}

#[test]
fn test_by_section_order_for_single_die_models() {
    let dir = TempDir::new().unwrap();
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let collector = collector(Arc::new(spr_bus(&[0x30, 0x31])), &dir, recording_set(&handler));

    run(&collector, TriggerType::OnDemand);
    let order = handler.order();
    assert_eq!(order[0], ("uncore".to_string(), 0));
    assert_eq!(order[1], ("TOR".to_string(), 0));
    let first_cpu1 = order.iter().position(|(_, cpu)| *cpu == 1).unwrap();
    assert!(order[..first_cpu1].iter().any(|(name, _)| name == "OEM"));
}

#[test]
fn test_by_domain_order_and_die_placement() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "crashdump_input_gnr.json",
        r#"{"DefaultState": "Enable",
            "crash_data": {"crashlog": {"LoopOnCompute": true}}}"#,
    );
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let collector = collector(Arc::new(gnr_bus(&[0x30, 0x31])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::OnDemand);
    let order = handler.order();
    assert_eq!(order[0], ("uncore".to_string(), 0));
    assert_eq!(order[1], ("uncore".to_string(), 1));
    assert_eq!(order[2], ("TOR".to_string(), 0));

    let crashlog_dies: Vec<(usize, Option<u8>)> = handler
        .calls()
        .into_iter()
        .filter(|(name, _, _)| name == "crashlog")
        .map(|(_, cpu, die)| (cpu, die))
        .collect();
    assert_eq!(
        crashlog_dies,
        vec![(0, Some(9)), (0, Some(10)), (1, Some(9)), (1, Some(10))]
    );

    let cpu0 = crash_data(&report).path(&[keys::PROCESSORS, "cpu0"]).unwrap();
    assert!(cpu0.path(&["compute0", "crashlog", "value"]).is_some());
    assert!(cpu0.path(&["compute1", "crashlog"]).is_some());
    assert!(cpu0.get("io0").is_none());
    assert!(cpu0.path(&["TOR", "value"]).is_some());

    let metadata = crash_data(&report).path(&[keys::METADATA, "cpu0"]).unwrap();
    assert_eq!(metadata.get("die_mask").and_then(Node::as_str), Some("0x601"));
    assert_eq!(
        metadata.path(&["compute1", "core_mask"]).and_then(Node::as_str),
        Some("0xf")
    );
}

#[test]
fn test_reset_during_collection_is_reported() {
    let dir = TempDir::new().unwrap();
    let reset = Arc::new(ResetContext::new());
    let handler = RecordingHandler::marking_reset(Arc::clone(&reset));
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let mut topology = TopologyCache::new();
    let mut ledger = FailureLedger::new();
    let report = collector.run_collection(
        &mut topology,
        &mut ledger,
        &reset,
        &TriggerType::OnDemand,
        TIMESTAMP,
    );
    assert_eq!(
        crash_data(&report)
            .path(&[keys::METADATA, keys::RESET_DETECTED])
            .and_then(Node::as_str),
        Some("cpu0.uncore")
    );
    assert!(!reset.snapshot().detected);
}

#[test]
fn test_socket_filter_limits_collection() {
    let dir = TempDir::new().unwrap();
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let bus = Arc::new(spr_bus(&[0x30, 0x31]));
    let collector = CollectorBuilder::new()
        .bus(bus)
        .handlers(recording_set(&handler))
        .input_paths(InputSearchPaths::single(dir.path()))
        .socket(Some(1))
        .build()
        .unwrap();

    let report = run(&collector, TriggerType::OnDemand);
    assert_eq!(report.summary.cpus_collected, 1);
    let processors = crash_data(&report).get(keys::PROCESSORS).unwrap();
    assert!(processors.get("cpu0").is_none());
    assert!(processors.get("cpu1").is_some());
    assert!(handler.calls().iter().all(|(_, cpu, _)| *cpu == 1));
}

#[test]
fn test_processors_are_keyed_by_socket_slot() {
    let dir = TempDir::new().unwrap();
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let bus: Arc<dyn crate::bus::BusTransport> = Arc::new(spr_bus(&[0x30, 0x32]));
    let collector = CollectorBuilder::new()
        .bus(Arc::clone(&bus))
        .handlers(recording_set(&handler))
        .input_paths(InputSearchPaths::single(dir.path()))
        .build()
        .unwrap();

    let report = run(&collector, TriggerType::Ierr);
    let data = crash_data(&report);
    let processors = data.get(keys::PROCESSORS).unwrap();
    assert!(processors.get("cpu0").is_some());
    assert!(processors.get("cpu1").is_none());
    assert!(processors.get("cpu2").is_some());
    assert!(data.path(&[keys::METADATA, "cpu2", "cpuid"]).is_some());

    let single = CollectorBuilder::new()
        .bus(bus)
        .handlers(recording_set(&handler))
        .input_paths(InputSearchPaths::single(dir.path()))
        .socket(Some(2))
        .build()
        .unwrap();
    let report = run(&single, TriggerType::OnDemand);
    assert_eq!(report.summary.cpus_collected, 1);
    let processors = crash_data(&report).get(keys::PROCESSORS).unwrap();
    assert_eq!(processors.keys(), vec![keys::VERSION, "cpu2"]);
}

#[test]
fn test_reset_marker_uses_socket_slot() {
    let dir = TempDir::new().unwrap();
    let reset = Arc::new(ResetContext::new());
    let handler = RecordingHandler::marking_reset(Arc::clone(&reset));
    let collector = CollectorBuilder::new()
        .bus(Arc::new(spr_bus(&[0x33])))
        .handlers(recording_set(&handler))
        .input_paths(InputSearchPaths::single(dir.path()))
        .build()
        .unwrap();

    let mut topology = TopologyCache::new();
    let mut ledger = FailureLedger::new();
    let report = collector.run_collection(
        &mut topology,
        &mut ledger,
        &reset,
        &TriggerType::OnDemand,
        TIMESTAMP,
    );
    assert_eq!(
        crash_data(&report)
            .path(&[keys::METADATA, keys::RESET_DETECTED])
            .and_then(Node::as_str),
        Some("cpu3.uncore")
    );
}

#[test]
fn test_crashlog_discovery_error_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    let bus = spr_bus(&[0x30]);
    bus.respond(
        Target::socket(0x30),
        Selector::TelemetryDiscovery {
            subopcode: 0,
            param: 0,
            index: 0,
        },
        cc::CATASTROPHIC_MCA_ERROR,
        vec![],
    );
    let collector = collector(Arc::new(bus), &dir, HandlerSet::standard());

    let report = run(&collector, TriggerType::Ierr);
    let crashlog = crash_data(&report)
        .path(&[keys::PROCESSORS, "cpu0", "crashlog"])
        .unwrap();
    assert_eq!(crashlog.get(keys::STATUS).and_then(Node::as_str), Some(keys::FAILED));
    assert_eq!(report.summary.section_failures, 1);
    assert!(report.summary.collection_failed);
}

#[test]
fn test_telemetry_trigger_reads_telemetry_inputs() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "telemetry_input_spr.json",
        r#"{"DefaultState": "Disable", "crash_data": {}}"#,
    );
    let handler = RecordingHandler::new(SectionStatus::Success, true);
    let collector = collector(Arc::new(spr_bus(&[0x30])), &dir, recording_set(&handler));

    let report = run(&collector, TriggerType::Telemetry);
    assert!(handler.calls().is_empty());
    let tor = crash_data(&report).path(&[keys::PROCESSORS, "cpu0", "TOR"]).unwrap();
    assert_eq!(tor.get(keys::RECORD_ENABLE).and_then(Node::as_bool), Some(false));
}

#[test]
fn test_wake_is_restored_after_run() {
    let dir = TempDir::new().unwrap();
    let bus = ScriptedBus::new().with_cpu(0x30);
    let t = Target::socket(0x30);
    bus.respond_ok(t, Selector::Cpuid, 0x806F8u32.to_le_bytes());
    bus.respond_ok(t, wake_sel(), vec![0, 0, 0, 0]);
    bus.respond_ok(t, Selector::PkgConfig { index: 5, param: 0 }, vec![0, 0, 0, 0]);
    let bus = Arc::new(bus);
    let collector = collector(Arc::clone(&bus), &dir, HandlerSet::standard());

    run(&collector, TriggerType::OnDemand);
    let wake_writes: Vec<Vec<u8>> = bus
        .writes()
        .into_iter()
        .filter(|(_, s, _)| matches!(s, Selector::PkgConfig { index: 5, .. }))
        .map(|(_, _, data)| data)
        .collect();
    assert_eq!(wake_writes, vec![vec![1, 0, 0, 0], vec![0, 0, 0, 0]]);
}

#[test]
fn test_no_processors_yields_empty_run() {
    let dir = TempDir::new().unwrap();
    let collector = collector(Arc::new(ScriptedBus::new()), &dir, HandlerSet::standard());
    let report = run(&collector, TriggerType::OnDemand);
    assert_eq!(report.summary.cpus_collected, 0);
    assert!(crash_data(&report).get(keys::METADATA).is_some());
}
