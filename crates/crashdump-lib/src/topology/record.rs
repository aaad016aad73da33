//! Per-processor topology records

use super::model::Model;
use crate::bus::{Reading, MIN_CLIENT_ADDR};
use crate::error::BusError;
use serde::Serialize;

/// Where a cached value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Read during service startup
    Startup,
    /// Read at the time of a collection trigger
    Event,
    /// Copied from a sibling processor because the live read failed
    Copied,
    /// Not resolved
    #[default]
    Invalid,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Startup => "startup",
            Provenance::Event => "event",
            Provenance::Copied => "overwritten",
            Provenance::Invalid => "invalid",
        }
    }
}

/// What initiated a topology refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    Startup,
    Event,
}

impl From<DiscoveryPhase> for Provenance {
    fn from(phase: DiscoveryPhase) -> Self {
        match phase {
            DiscoveryPhase::Startup => Provenance::Startup,
            DiscoveryPhase::Event => Provenance::Event,
        }
    }
}

/// Bookkeeping for the read that produced a cached value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStatus {
    pub cc: Option<u8>,
    pub error: Option<BusError>,
    pub valid: bool,
    pub source: Provenance,
}

impl ReadStatus {
    /// Record the outcome of `reading` without marking the value valid
    pub fn note(&mut self, reading: &Reading) {
        self.cc = reading.cc();
        self.error = reading.transport_error();
    }

    pub fn mark_valid(&mut self, source: Provenance) {
        self.valid = true;
        self.source = source;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
        self.source = Provenance::Invalid;
    }

    /// Whether the value must be read again before it can be trusted
    pub fn needs_refresh(&self) -> bool {
        !self.valid || self.source == Provenance::Copied
    }
}

/// Processor identity as resolved from the CPUID read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuIdentity {
    pub raw_id: u32,
    pub stepping: u8,
    pub model: Option<Model>,
    pub status: ReadStatus,
}

impl CpuIdentity {
    /// The full identification word as it reads on the bus
    pub fn cpuid(&self) -> u32 {
        self.raw_id | u32::from(self.stepping)
    }
}

/// State of the bus wake feature before collection started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeState {
    On,
    Off,
    #[default]
    Unknown,
}

/// One half of a split die mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DieRange {
    /// Bits of the full mask belonging to this range, relative to `offset`
    pub range: u32,
    /// Absolute position of the range's first bit
    pub offset: u32,
    /// Populated dies in this range, relative to `offset`
    pub effective_mask: u32,
    pub max_dies: u32,
}

impl DieRange {
    /// Absolute domain numbers of populated dies, ascending
    pub fn domains(&self) -> Vec<u8> {
        (0..self.max_dies)
            .filter(|bit| self.effective_mask & (1 << bit) != 0)
            .map(|bit| (bit + self.offset) as u8)
            .collect()
    }

    pub fn count(&self) -> u32 {
        self.effective_mask.count_ones()
    }
}

/// Die mask of a multi-die package split into I/O and compute ranges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DieMaskInfo {
    pub mask: u32,
    pub io: DieRange,
    pub compute: DieRange,
    pub status: ReadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DieKind {
    Compute,
    Io,
}

/// One populated die of a multi-die package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DieDescriptor {
    pub kind: Option<DieKind>,
    /// Logical index within its kind, zero based
    pub index: usize,
    /// Absolute domain number used to address the die
    pub domain: u8,
    pub core_mask: u64,
    pub core_mask_read: ReadStatus,
    pub slice_mask: u64,
    pub slice_count: u32,
    pub slice_read: ReadStatus,
    pub crashed_core_mask: u64,
}

impl DieDescriptor {
    pub fn new(kind: DieKind, index: usize, domain: u8) -> Self {
        Self {
            kind: Some(kind),
            index,
            domain,
            ..Default::default()
        }
    }

    pub fn is_compute(&self) -> bool {
        self.kind == Some(DieKind::Compute)
    }

    /// Document key for this die, e.g. `compute1` or `io0`
    pub fn key(&self) -> String {
        match self.kind {
            Some(DieKind::Io) => format!("io{}", self.index),
            _ => format!("compute{}", self.index),
        }
    }
}

/// Everything known about one processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CpuRecord {
    pub addr: u8,
    pub identity: CpuIdentity,
    pub core_mask: u64,
    pub core_mask_read: ReadStatus,
    pub slice_mask: u64,
    pub slice_count: u32,
    pub slice_read: ReadStatus,
    pub crashed_core_mask: u64,
    pub die_mask: Option<DieMaskInfo>,
    pub dies: Vec<DieDescriptor>,
    /// Sections enabled for this processor in the current run
    pub section_mask: u64,
    pub initial_wake: WakeState,
}

impl CpuRecord {
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    /// Socket slot on the bus, counted from the first client address
    pub fn socket(&self) -> usize {
        usize::from(self.addr.saturating_sub(MIN_CLIENT_ADDR))
    }

    /// Resolved model, if identity is valid
    pub fn model(&self) -> Option<Model> {
        if self.identity.status.valid {
            self.identity.model
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.model().is_some()
    }

    pub fn section_enabled(&self, bit: u32) -> bool {
        self.section_mask & (1u64 << bit) != 0
    }

    pub fn compute_dies(&self) -> impl Iterator<Item = &DieDescriptor> {
        self.dies.iter().filter(|d| d.is_compute())
    }

    pub fn io_dies(&self) -> impl Iterator<Item = &DieDescriptor> {
        self.dies.iter().filter(|d| d.kind == Some(DieKind::Io))
    }

    /// Total cores across the package
    pub fn core_count(&self) -> u32 {
        if self.dies.is_empty() {
            self.core_mask.count_ones()
        } else {
            self.dies.iter().map(|d| d.core_mask.count_ones()).sum()
        }
    }

    /// Total slices across the package
    pub fn total_slice_count(&self) -> u32 {
        if self.dies.is_empty() {
            self.slice_count
        } else {
            self.dies.iter().map(|d| d.slice_count).sum()
        }
    }
}
