//! Processor discovery and topology resolution
//!
//! Probes the bus address range, resolves each responder's identity, and
//! derives its core, slice and die masks. Every resolved value carries its
//! provenance so a value that was copied from a sibling is read again on
//! the next refresh.

use super::dies;
use super::model::{Model, RegisterLayout};
use super::record::{CpuRecord, DiscoveryPhase, Provenance, ReadStatus};
use crate::bus::{
    read_register, BusTransport, Reading, Selector, Target, MAX_CLIENT_ADDR, MIN_CLIENT_ADDR,
};
use tracing::{debug, info, warn};

const CPUID_LEN: usize = 4;
const MASK_REG_LEN: usize = 4;

/// Package config location of the die mask
const DIE_MASK_INDEX: u8 = 0;
const DIE_MASK_PARAM: u16 = 7;

/// Which topology mask is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskKind {
    Core,
    Slice,
}

/// Addresses of clients that answer a ping, ascending
pub fn discover_addresses(bus: &dyn BusTransport) -> Vec<u8> {
    let found: Vec<u8> = (MIN_CLIENT_ADDR..=MAX_CLIENT_ADDR)
        .filter(|addr| bus.ping(*addr).is_ok())
        .collect();
    info!(count = found.len(), addresses = ?found, "Discovered processors on the bus");
    found
}

/// Read and classify a processor's identity.
///
/// A valid identity that was read directly is kept; one copied from a
/// sibling or never resolved is read again.
pub fn resolve_identity(bus: &dyn BusTransport, record: &mut CpuRecord, phase: DiscoveryPhase) {
    if !record.identity.status.needs_refresh() {
        return;
    }

    let reading = read_register(bus, Target::socket(record.addr), Selector::Cpuid, CPUID_LEN);
    record.identity.status.note(&reading);

    let Some(word) = reading.value() else {
        warn!(
            addr = record.addr,
            reading = %reading.display(),
            "Failed to read processor identity"
        );
        record.identity.status.invalidate();
        return;
    };

    let word = word as u32;
    let raw_id = word & !0xF;
    let stepping = (word & 0xF) as u8;
    record.identity.raw_id = raw_id;
    record.identity.stepping = stepping;

    match Model::classify(raw_id, stepping) {
        Some(model) => {
            record.identity.model = Some(model);
            record.identity.status.mark_valid(phase.into());
            debug!(addr = record.addr, model = %model, stepping, "Resolved processor model");
        }
        None => {
            record.identity.model = None;
            record.identity.status.invalidate();
            warn!(
                addr = record.addr,
                raw_id = %format!("0x{:x}", raw_id),
                "Unknown processor identifier"
            );
        }
    }
}

/// Fill unresolved identities from the first resolved sibling.
///
/// Records that stay unresolved are marked invalid and excluded from the
/// rest of the run.
pub fn backfill(records: &mut [CpuRecord]) {
    let donor = records
        .iter()
        .find(|r| r.identity.status.valid && r.identity.status.source != Provenance::Copied)
        .or_else(|| records.iter().find(|r| r.identity.status.valid))
        .map(|r| r.identity);

    for record in records.iter_mut() {
        if record.identity.status.valid {
            continue;
        }
        match donor {
            Some(donor) => {
                record.identity.raw_id = donor.raw_id;
                record.identity.stepping = donor.stepping;
                record.identity.model = donor.model;
                record.identity.status.cc = Some(crate::bus::cc::SUCCESS);
                record.identity.status.error = None;
                record.identity.status.mark_valid(Provenance::Copied);
                warn!(addr = record.addr, "Processor identity copied from sibling");
            }
            None => {
                record.identity.status.invalidate();
                warn!(addr = record.addr, "Processor identity unresolved, skipping");
            }
        }
    }
}

/// Read the die mask of a multi-die package.
///
/// At startup an unavailable mask is left unset. At event time the model's
/// maximum mask is assumed instead so collection can still proceed.
pub fn resolve_die_mask(bus: &dyn BusTransport, record: &mut CpuRecord, phase: DiscoveryPhase) {
    let Some(model) = record.model() else {
        return;
    };
    if !model.has_die_mask() {
        return;
    }
    if record.die_mask.map(|m| !m.status.needs_refresh()).unwrap_or(false) {
        return;
    }

    let reading = read_register(
        bus,
        Target::socket(record.addr),
        Selector::PkgConfig {
            index: DIE_MASK_INDEX,
            param: DIE_MASK_PARAM,
        },
        MASK_REG_LEN,
    );
    let mut status = ReadStatus::default();
    status.note(&reading);

    let mask = match (reading.value(), phase) {
        (Some(mask), _) if mask != 0 => {
            status.mark_valid(phase.into());
            mask as u32
        }
        (_, DiscoveryPhase::Startup) => {
            warn!(
                addr = record.addr,
                reading = %reading.display(),
                "Die mask unavailable at startup"
            );
            return;
        }
        (_, DiscoveryPhase::Event) => {
            let Some(fallback) = model.max_die_mask() else {
                return;
            };
            warn!(
                addr = record.addr,
                fallback = %format!("0x{:x}", fallback),
                "Die mask unavailable, assuming all dies present"
            );
            status.mark_valid(Provenance::Copied);
            fallback
        }
    };

    let info = dies::split(mask, status);
    if record.die_mask.map(|m| m.mask) != Some(mask) {
        record.dies = dies::descriptors(&info);
    }
    record.die_mask = Some(info);
}

fn mask_selectors(layout: RegisterLayout, kind: MaskKind, pcu_device: u8) -> Vec<Selector> {
    let pci = |bus, device, function, reg| Selector::PciLocal {
        bus,
        device,
        function,
        reg,
    };
    let endpoint = |bus, device, function, reg| Selector::EndpointPci {
        seg: 0,
        bus,
        device,
        function,
        reg,
    };
    match (layout, kind) {
        (RegisterLayout::Legacy, MaskKind::Core) => vec![pci(1, 30, 3, 0xB4)],
        (RegisterLayout::Legacy, MaskKind::Slice) => vec![pci(1, 30, 3, 0x9C)],
        (RegisterLayout::Split, MaskKind::Core) => vec![pci(14, 30, 3, 0xD0), pci(14, 30, 3, 0xD4)],
        (RegisterLayout::Split, MaskKind::Slice) => {
            vec![pci(14, 30, 3, 0x9C), pci(14, 30, 3, 0xA0)]
        }
        (RegisterLayout::Endpoint, MaskKind::Core) => {
            vec![endpoint(31, 30, 6, 0x80), endpoint(31, 30, 6, 0x84)]
        }
        (RegisterLayout::Endpoint, MaskKind::Slice) => {
            vec![endpoint(31, 30, 3, 0x9C), endpoint(31, 30, 3, 0xA0)]
        }
        (RegisterLayout::PerDie, MaskKind::Core) => vec![
            endpoint(30, pcu_device, 0, 0x488),
            endpoint(30, pcu_device, 0, 0x489),
        ],
        (RegisterLayout::PerDie, MaskKind::Slice) => vec![
            endpoint(30, pcu_device, 0, 0x29C),
            endpoint(30, pcu_device, 0, 0x2A0),
        ],
    }
}

/// Read one or two 32-bit registers and compose them low word first
fn read_mask(
    bus: &dyn BusTransport,
    target: Target,
    selectors: &[Selector],
    status: &mut ReadStatus,
) -> Option<u64> {
    let mut mask = 0u64;
    for (word, selector) in selectors.iter().enumerate() {
        let reading = read_register(bus, target, *selector, MASK_REG_LEN);
        status.note(&reading);
        match reading {
            Reading::Value { value, .. } => mask |= (value & 0xFFFF_FFFF) << (32 * word),
            other => {
                debug!(
                    addr = target.addr,
                    domain = ?target.domain,
                    reading = %other.display(),
                    "Mask register read failed"
                );
                return None;
            }
        }
    }
    Some(mask)
}

/// Resolve the enabled-core mask, per die on multi-die packages
pub fn resolve_core_mask(
    bus: &dyn BusTransport,
    record: &mut CpuRecord,
    phase: DiscoveryPhase,
) -> bool {
    resolve_mask(bus, record, phase, MaskKind::Core)
}

/// Resolve the slice (CHA) mask and count, per die on multi-die packages
pub fn resolve_slice_count(
    bus: &dyn BusTransport,
    record: &mut CpuRecord,
    phase: DiscoveryPhase,
) -> bool {
    resolve_mask(bus, record, phase, MaskKind::Slice)
}

fn resolve_mask(
    bus: &dyn BusTransport,
    record: &mut CpuRecord,
    phase: DiscoveryPhase,
    kind: MaskKind,
) -> bool {
    let Some(model) = record.model() else {
        return false;
    };
    let layout = model.layout();

    if layout != RegisterLayout::PerDie {
        let status = match kind {
            MaskKind::Core => &mut record.core_mask_read,
            MaskKind::Slice => &mut record.slice_read,
        };
        if status.valid {
            return true;
        }
        let selectors = mask_selectors(layout, kind, 0);
        let Some(mask) = read_mask(bus, Target::socket(record.addr), &selectors, status) else {
            return false;
        };
        status.mark_valid(phase.into());
        match kind {
            MaskKind::Core => record.core_mask = mask,
            MaskKind::Slice => {
                record.slice_mask = mask;
                record.slice_count = mask.count_ones();
            }
        }
        return true;
    }

    let Some(info) = record.die_mask else {
        return false;
    };
    let addr = record.addr;
    let mut all_ok = true;
    for die in record.dies.iter_mut().filter(|d| d.is_compute()) {
        let Some(device) = dies::pcu_device(&info, die.domain) else {
            warn!(addr, domain = die.domain, "No PCU device for compute die, skipping");
            all_ok = false;
            continue;
        };
        let status = match kind {
            MaskKind::Core => &mut die.core_mask_read,
            MaskKind::Slice => &mut die.slice_read,
        };
        if status.valid {
            continue;
        }
        let selectors = mask_selectors(layout, kind, device);
        match read_mask(bus, Target::die(addr, die.domain), &selectors, status) {
            Some(mask) => {
                status.mark_valid(phase.into());
                match kind {
                    MaskKind::Core => die.core_mask = mask,
                    MaskKind::Slice => {
                        die.slice_mask = mask;
                        die.slice_count = mask.count_ones();
                    }
                }
            }
            None => all_ok = false,
        }
    }
    all_ok
}

/// Cached topology of every processor on the bus
#[derive(Debug, Default)]
pub struct TopologyCache {
    records: Vec<CpuRecord>,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from existing records
    pub fn from_records(records: Vec<CpuRecord>) -> Self {
        Self { records }
    }

    /// Probe the bus once; later calls keep the existing records
    pub fn initialize(&mut self, bus: &dyn BusTransport) {
        if self.records.is_empty() {
            self.records = discover_addresses(bus)
                .into_iter()
                .map(CpuRecord::new)
                .collect();
        }
    }

    /// Resolve identity and masks for every record.
    ///
    /// Values already resolved by a direct read are kept. At event time
    /// unresolved identities are backfilled from a sibling.
    pub fn refresh(&mut self, bus: &dyn BusTransport, phase: DiscoveryPhase) {
        for record in self.records.iter_mut() {
            resolve_identity(bus, record, phase);
        }
        if phase == DiscoveryPhase::Event {
            backfill(&mut self.records);
        }
        for record in self.records.iter_mut().filter(|r| r.is_valid()) {
            resolve_die_mask(bus, record, phase);
            if !resolve_core_mask(bus, record, phase) {
                warn!(addr = record.addr, "Core mask unresolved");
            }
            if !resolve_slice_count(bus, record, phase) {
                warn!(addr = record.addr, "Slice count unresolved");
            }
        }
    }

    pub fn records(&self) -> &[CpuRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [CpuRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records with a resolved identity
    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_valid()).count()
    }

    /// Forget per-run crash bookkeeping
    pub fn clear_crashed_cores(&mut self) {
        for record in self.records.iter_mut() {
            record.crashed_core_mask = 0;
            for die in record.dies.iter_mut() {
                die.crashed_core_mask = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{cc, ScriptedBus};
    use crate::error::BusError;

    fn cpuid_bytes(word: u32) -> Vec<u8> {
        word.to_le_bytes().to_vec()
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

    fn spr_bus(addr: u8) -> ScriptedBus {
        let bus = ScriptedBus::new().with_cpu(addr);
        let t = Target::socket(addr);
        bus.respond_ok(t, Selector::Cpuid, cpuid_bytes(0x806F8));
        bus
    }

    #[test]
    fn test_discover_addresses() {
        let bus = ScriptedBus::new().with_cpu(0x30).with_cpu(0x32);
        assert_eq!(discover_addresses(&bus), vec![0x30, 0x32]);
    }

    #[test]
    fn test_resolve_identity_and_cache() {
        let bus = spr_bus(0x30);
        let mut record = CpuRecord::new(0x30);

        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        assert_eq!(record.model(), Some(Model::Spr));
        assert_eq!(record.identity.stepping, 8);
        assert_eq!(record.identity.status.source, Provenance::Startup);

        resolve_identity(&bus, &mut record, DiscoveryPhase::Event);
        assert_eq!(bus.calls(Target::socket(0x30), Selector::Cpuid), 1);
        assert_eq!(record.identity.status.source, Provenance::Startup);
    }

    #[test]
    fn test_unknown_identifier_is_invalid() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        bus.respond_ok(Target::socket(0x30), Selector::Cpuid, cpuid_bytes(0x12340));
        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        assert!(!record.is_valid());
        assert_eq!(record.identity.status.source, Provenance::Invalid);
    }

    #[test]
    fn test_backfill_copies_from_sibling() {
        let bus = spr_bus(0x30).with_cpu(0x31);
        bus.fail(Target::socket(0x31), Selector::Cpuid, BusError::Timeout);

        let mut cache = TopologyCache::new();
        cache.initialize(&bus);
        cache.refresh(&bus, DiscoveryPhase::Event);

        let copied = &cache.records()[1];
        assert_eq!(copied.model(), Some(Model::Spr));
        assert_eq!(copied.identity.status.source, Provenance::Copied);
        assert_eq!(copied.identity.status.cc, Some(cc::SUCCESS));

        // a copied identity is read again on the next refresh
        cache.refresh(&bus, DiscoveryPhase::Event);
        assert_eq!(bus.calls(Target::socket(0x31), Selector::Cpuid), 2);
    }

    #[test]
    fn test_backfill_without_donor_invalidates() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        bus.fail(Target::socket(0x30), Selector::Cpuid, BusError::Timeout);
        let mut cache = TopologyCache::new();
        cache.initialize(&bus);
        cache.refresh(&bus, DiscoveryPhase::Event);
        assert_eq!(cache.valid_count(), 0);
        assert_eq!(cache.records()[0].identity.status.source, Provenance::Invalid);
    }

    #[test]
    fn test_startup_does_not_backfill() {
        let bus = spr_bus(0x30).with_cpu(0x31);
        bus.fail(Target::socket(0x31), Selector::Cpuid, BusError::Timeout);
        let mut cache = TopologyCache::new();
        cache.initialize(&bus);
        cache.refresh(&bus, DiscoveryPhase::Startup);
        assert_eq!(cache.valid_count(), 1);
    }

    #[test]
    fn test_endpoint_core_mask_composes_two_words() {
        let bus = spr_bus(0x30);
        let t = Target::socket(0x30);
        let low = Selector::EndpointPci {
            seg: 0,
            bus: 31,
            device: 30,
            function: 6,
            reg: 0x80,
        };
        let high = Selector::EndpointPci {
            seg: 0,
            bus: 31,
            device: 30,
            function: 6,
            reg: 0x84,
        };
        bus.respond_ok(t, low, vec![0xFF, 0x00, 0x00, 0x00]);
        bus.respond_ok(t, high, vec![0x01, 0x00, 0x00, 0x00]);

        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        assert!(resolve_core_mask(&bus, &mut record, DiscoveryPhase::Startup));
        assert_eq!(record.core_mask, 0x1_0000_00FF);
        assert_eq!(record.core_count(), 9);

        // second resolution is served from cache
        assert!(resolve_core_mask(&bus, &mut record, DiscoveryPhase::Event));
        assert_eq!(bus.calls(t, low), 1);
    }

    #[test]
    fn test_read_mask_places_low_word_first() {
        let bus = spr_bus(0x30);
        let t = Target::socket(0x30);
        let selectors = [endpoint(31, 30, 6, 0x80), endpoint(31, 30, 6, 0x84)];
        bus.respond_ok(t, selectors[0], 0x0102_0304u32.to_le_bytes().to_vec());
        bus.respond_ok(t, selectors[1], 0x0506_0708u32.to_le_bytes().to_vec());

        let mut status = ReadStatus::default();
        let mask = read_mask(&bus, t, &selectors, &mut status).unwrap();
        assert_eq!(mask, 0x0506_0708_0102_0304);
        assert_eq!(mask.count_ones(), 13);
        assert_eq!(status.cc, Some(cc::SUCCESS));
    }

    #[test]
    fn test_repeated_discovery_is_stable() {
        let bus = ScriptedBus::new();
        for addr in [0x30, 0x32] {
            bus.add_cpu(addr);
            let t = Target::socket(addr);
            bus.respond_ok(t, Selector::Cpuid, cpuid_bytes(0x806F8));
            bus.respond_ok(t, endpoint(31, 30, 6, 0x80), vec![0x0F, 0, 0, 0]);
            bus.respond_ok(t, endpoint(31, 30, 6, 0x84), vec![0, 0, 0, 0]);
            bus.respond_ok(t, endpoint(31, 30, 3, 0x9C), vec![0x03, 0, 0, 0]);
            bus.respond_ok(t, endpoint(31, 30, 3, 0xA0), vec![0, 0, 0, 0]);
        }

        let mut cache = TopologyCache::new();
        cache.initialize(&bus);
        cache.refresh(&bus, DiscoveryPhase::Startup);
        let first = cache.records().to_vec();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|r| r.identity.status.source == Provenance::Startup));

        cache.initialize(&bus);
        cache.refresh(&bus, DiscoveryPhase::Startup);
        assert_eq!(cache.records(), first.as_slice());

        let mut fresh = TopologyCache::new();
        fresh.initialize(&bus);
        fresh.refresh(&bus, DiscoveryPhase::Startup);
        assert_eq!(fresh.records(), first.as_slice());
    }

    #[test]
    fn test_compute_die_without_pcu_device_is_skipped() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        let socket = Target::socket(0x30);
        bus.respond_ok(socket, Selector::Cpuid, cpuid_bytes(0xA06D1));
        bus.respond_ok(
            socket,
            Selector::PkgConfig { index: 0, param: 7 },
            0x1E01u32.to_le_bytes().to_vec(),
        );
        for (domain, device) in [(9u8, 6u8), (10, 7), (11, 8)] {
            bus.respond_ok(Target::die(0x30, domain), endpoint(30, device, 0, 0x488), vec![0x1, 0, 0, 0]);
            bus.respond_ok(Target::die(0x30, domain), endpoint(30, device, 0, 0x489), vec![0, 0, 0, 0]);
        }

        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        resolve_die_mask(&bus, &mut record, DiscoveryPhase::Startup);
        assert_eq!(record.compute_dies().count(), 4);
        assert!(!resolve_core_mask(&bus, &mut record, DiscoveryPhase::Startup));

        let resolved: Vec<bool> = record.compute_dies().map(|d| d.core_mask_read.valid).collect();
        assert_eq!(resolved, vec![true, true, true, false]);
        assert_eq!(record.core_count(), 3);
    }

    #[test]
    fn test_core_mask_failure_leaves_invalid() {
        let bus = spr_bus(0x30);
        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        // unscripted registers answer unavailable
        assert!(!resolve_core_mask(&bus, &mut record, DiscoveryPhase::Startup));
        assert!(!record.core_mask_read.valid);
        assert_eq!(record.core_mask_read.cc, Some(cc::INVALID_REQ));
    }

    #[test]
    fn test_legacy_slice_count() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        let t = Target::socket(0x30);
        bus.respond_ok(t, Selector::Cpuid, cpuid_bytes(0x50657));
        bus.respond_ok(
            t,
            Selector::PciLocal {
                bus: 1,
                device: 30,
                function: 3,
                reg: 0x9C,
            },
            vec![0x0F, 0x0F, 0x00, 0x00],
        );
        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        assert_eq!(record.model(), Some(Model::Clx));
        assert!(resolve_slice_count(&bus, &mut record, DiscoveryPhase::Startup));
        assert_eq!(record.slice_count, 8);
    }

    #[test]
    fn test_die_mask_unavailable_at_startup_stays_unset() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        bus.respond_ok(Target::socket(0x30), Selector::Cpuid, cpuid_bytes(0xA06D1));
        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        resolve_die_mask(&bus, &mut record, DiscoveryPhase::Startup);
        assert!(record.die_mask.is_none());
        assert!(record.dies.is_empty());
    }

    #[test]
    fn test_die_mask_falls_back_at_event() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        bus.respond_ok(Target::socket(0x30), Selector::Cpuid, cpuid_bytes(0xA06D1));
        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        resolve_die_mask(&bus, &mut record, DiscoveryPhase::Event);

        let info = record.die_mask.unwrap();
        assert_eq!(info.mask, 0xE11);
        assert_eq!(info.status.source, Provenance::Copied);
        assert_eq!(record.compute_dies().count(), 3);
        assert_eq!(record.io_dies().count(), 2);
    }

    #[test]
    fn test_per_die_core_masks() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        let socket = Target::socket(0x30);
        bus.respond_ok(socket, Selector::Cpuid, cpuid_bytes(0xA06D1));
        bus.respond_ok(
            socket,
            Selector::PkgConfig { index: 0, param: 7 },
            0x601u32.to_le_bytes().to_vec(),
        );
        for (domain, device, low) in [(9u8, 6u8, 0x3u8), (10, 7, 0x7)] {
            let reg = |reg| Selector::EndpointPci {
                seg: 0,
                bus: 30,
                device,
                function: 0,
                reg,
            };
            bus.respond_ok(Target::die(0x30, domain), reg(0x488), vec![low, 0, 0, 0]);
            bus.respond_ok(Target::die(0x30, domain), reg(0x489), vec![0, 0, 0, 0]);
        }

        let mut record = CpuRecord::new(0x30);
        resolve_identity(&bus, &mut record, DiscoveryPhase::Startup);
        resolve_die_mask(&bus, &mut record, DiscoveryPhase::Startup);
        assert!(resolve_core_mask(&bus, &mut record, DiscoveryPhase::Startup));

        let masks: Vec<u64> = record.compute_dies().map(|d| d.core_mask).collect();
        assert_eq!(masks, vec![0x3, 0x7]);
        assert_eq!(record.core_count(), 5);
    }
}
