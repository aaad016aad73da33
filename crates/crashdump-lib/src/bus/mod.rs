//! Sideband bus seam
//!
//! Every data point in a crash dump comes from an addressed bus transaction
//! that yields a transport status, a completion code and a payload. This
//! module defines the transport trait, the register selectors, and the one
//! place where completion codes are interpreted.

mod scripted;

pub use scripted::{BusScript, Reply, ScriptEntry, ScriptedBus};

use crate::error::BusError;
use serde::{Deserialize, Serialize};

/// Completion codes returned by the device alongside every response
pub mod cc {
    pub const SUCCESS: u8 = 0x40;
    pub const NEED_RETRY: u8 = 0x80;
    pub const OUT_OF_RESOURCE: u8 = 0x81;
    pub const UNAVAIL_RESOURCE: u8 = 0x82;
    pub const INVALID_REQ: u8 = 0x90;
    pub const MCA_ERROR: u8 = 0x91;
    pub const CATASTROPHIC_MCA_ERROR: u8 = 0x93;
    pub const FATAL_MCA_DETECTED: u8 = 0x94;
    pub const PARITY_ERROR_GPSB_OR_PMSB: u8 = 0x98;
    pub const PARITY_ERROR_GPSB_OR_PMSB_IERR: u8 = 0x99;
    pub const PARITY_ERROR_GPSB_OR_PMSB_MCA: u8 = 0x9A;
}

/// Lowest client address probed during discovery
pub const MIN_CLIENT_ADDR: u8 = 0x30;
/// Highest client address probed during discovery
pub const MAX_CLIENT_ADDR: u8 = 0x37;

/// Addressed device: a socket's bus address plus an optional die domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub addr: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<u8>,
}

impl Target {
    /// Whole-socket target with no die domain
    pub fn socket(addr: u8) -> Self {
        Self { addr, domain: None }
    }

    /// Target addressing a single die of a multi-die package
    pub fn die(addr: u8, domain: u8) -> Self {
        Self {
            addr,
            domain: Some(domain),
        }
    }
}

/// Register selector for a single bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Processor identification word
    Cpuid,
    /// Package configuration space, addressed by index and parameter
    PkgConfig { index: u8, param: u16 },
    /// Local PCI configuration space
    PciLocal {
        bus: u8,
        device: u8,
        function: u8,
        reg: u16,
    },
    /// Endpoint PCI configuration space behind a segment
    EndpointPci {
        seg: u8,
        bus: u8,
        device: u8,
        function: u8,
        reg: u16,
    },
    /// Telemetry discovery query
    TelemetryDiscovery { subopcode: u8, param: u8, index: u16 },
    /// One 64-bit sample of a crash-log agent's buffer
    CrashlogSample { agent: u16, sample: u16 },
    /// Telemetry configuration watcher register
    ConfigWatcher { watcher: u16, offset: u16 },
}

/// Device answer to a transaction that reached the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub cc: u8,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Completion {
    pub fn new(cc: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            cc,
            data: data.into(),
        }
    }

    /// Successful completion carrying `data`
    pub fn success(data: impl Into<Vec<u8>>) -> Self {
        Self::new(cc::SUCCESS, data)
    }

    pub fn class(&self) -> CcClass {
        classify_cc(self.cc)
    }

    /// Payload as little-endian u32, zero-padded when short
    pub fn u32_le(&self) -> u32 {
        let mut buf = [0u8; 4];
        let n = self.data.len().min(4);
        buf[..n].copy_from_slice(&self.data[..n]);
        u32::from_le_bytes(buf)
    }

    /// Payload as little-endian u64, zero-padded when short
    pub fn u64_le(&self) -> u64 {
        let mut buf = [0u8; 8];
        let n = self.data.len().min(8);
        buf[..n].copy_from_slice(&self.data[..n]);
        u64::from_le_bytes(buf)
    }
}

pub type BusResult = Result<Completion, BusError>;

/// Interpretation of a completion code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcClass {
    /// Data is valid
    Success,
    /// Device is busy or the resource is temporarily absent
    Unavailable,
    /// Device rejected or failed the request
    HardError,
}

/// Classify a completion code.
///
/// A fatal-MCA-detected code still carries valid data and counts as success.
pub fn classify_cc(code: u8) -> CcClass {
    match code {
        cc::SUCCESS | cc::FATAL_MCA_DETECTED => CcClass::Success,
        cc::NEED_RETRY | cc::OUT_OF_RESOURCE | cc::UNAVAIL_RESOURCE | cc::INVALID_REQ => {
            CcClass::Unavailable
        }
        _ => CcClass::HardError,
    }
}

/// Transport seam to the sideband bus.
///
/// Implementations must be safe to share across threads; the collector
/// issues transactions strictly sequentially within a run.
pub trait BusTransport: Send + Sync {
    /// Probe whether a client answers at `addr`
    fn ping(&self, addr: u8) -> Result<(), BusError>;

    /// Read `len` bytes from the selected register
    fn read(&self, target: Target, selector: Selector, len: usize) -> BusResult;

    /// Write `data` to the selected register
    fn write(&self, target: Target, selector: Selector, data: &[u8]) -> BusResult;
}

/// Folded outcome of one register read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Value { value: u64, cc: u8 },
    Unavailable { cc: u8 },
    HardError { cc: u8 },
    Transport(BusError),
}

impl Reading {
    pub fn from_result(result: BusResult) -> Self {
        match result {
            Ok(completion) => match completion.class() {
                CcClass::Success => Reading::Value {
                    value: completion.u64_le(),
                    cc: completion.cc,
                },
                CcClass::Unavailable => Reading::Unavailable { cc: completion.cc },
                CcClass::HardError => Reading::HardError { cc: completion.cc },
            },
            Err(e) => Reading::Transport(e),
        }
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            Reading::Value { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn cc(&self) -> Option<u8> {
        match self {
            Reading::Value { cc, .. } | Reading::Unavailable { cc } | Reading::HardError { cc } => {
                Some(*cc)
            }
            Reading::Transport(_) => None,
        }
    }

    pub fn transport_error(&self) -> Option<BusError> {
        match self {
            Reading::Transport(e) => Some(*e),
            _ => None,
        }
    }

    /// True for outcomes that count against a section's failure threshold
    pub fn is_failure(&self) -> bool {
        matches!(self, Reading::HardError { .. } | Reading::Transport(_))
    }

    /// Render the reading the way register values appear in a dump
    pub fn display(&self) -> String {
        match self {
            Reading::Value { value, .. } => format!("0x{:x}", value),
            Reading::Unavailable { cc } | Reading::HardError { cc } => format!("UA:0x{:x}", cc),
            Reading::Transport(e) => format!("DF:0x{:x}", e.code()),
        }
    }
}

/// Read a register and fold the outcome
pub fn read_register(
    bus: &dyn BusTransport,
    target: Target,
    selector: Selector,
    len: usize,
) -> Reading {
    Reading::from_result(bus.read(target, selector, len))
}
