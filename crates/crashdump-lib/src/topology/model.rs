//! Processor model identification and per-model register layout

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw processor identifiers as reported by the CPUID read, stepping masked
pub mod raw_id {
    pub const SKYLAKE: u32 = 0x50650;
    pub const ICELAKE: u32 = 0x606A0;
    pub const ICELAKE_D: u32 = 0x606C0;
    pub const SAPPHIRE_RAPIDS: u32 = 0x806F0;
    pub const EMERALD_RAPIDS: u32 = 0xC06F0;
    pub const GRANITE_RAPIDS: u32 = 0xA06D0;
    pub const SIERRA_FOREST: u32 = 0xA06F0;
}

const STEPPING_CLX: u8 = 6;
const STEPPING_CPX: u8 = 10;
const STEPPING_ICX2: u8 = 2;

/// Die mask assumed for a multi-die package when the live read is unavailable
const GNR_MAX_DIE_MASK: u32 = 0xE11;
const SRF_MAX_DIE_MASK: u32 = 0x611;

/// Supported processor models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Skx,
    Clx,
    Cpx,
    Icx,
    Icx2,
    Icxd,
    Spr,
    Emr,
    Gnr,
    Srf,
}

/// How per-core and per-slice registers are reached on a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLayout {
    /// Single local PCI register
    Legacy,
    /// Two local PCI registers composed into a 64-bit mask
    Split,
    /// Two endpoint PCI registers on segment 0
    Endpoint,
    /// Endpoint registers read separately on each compute die
    PerDie,
}

/// Order in which sections and processors are visited during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// Every section for one CPU before the next CPU
    BySection,
    /// Every CPU and die for one section before the next section
    ByDomain,
}

impl Model {
    /// Map a raw identifier and stepping to a model.
    ///
    /// Returns `None` for identifiers this collector does not know.
    pub fn classify(raw_id: u32, stepping: u8) -> Option<Model> {
        match raw_id {
            raw_id::SKYLAKE if stepping >= STEPPING_CPX => Some(Model::Cpx),
            raw_id::SKYLAKE if stepping >= STEPPING_CLX => Some(Model::Clx),
            raw_id::SKYLAKE => Some(Model::Skx),
            raw_id::ICELAKE if stepping >= STEPPING_ICX2 => Some(Model::Icx2),
            raw_id::ICELAKE => Some(Model::Icx),
            raw_id::ICELAKE_D => Some(Model::Icxd),
            raw_id::SAPPHIRE_RAPIDS => Some(Model::Spr),
            raw_id::EMERALD_RAPIDS => Some(Model::Emr),
            raw_id::GRANITE_RAPIDS => Some(Model::Gnr),
            raw_id::SIERRA_FOREST => Some(Model::Srf),
            _ => None,
        }
    }

    /// Short lowercase name used in input file names and logs
    pub fn name(&self) -> &'static str {
        match self {
            Model::Skx => "skx",
            Model::Clx => "clx",
            Model::Cpx => "cpx",
            Model::Icx => "icx",
            Model::Icx2 => "icx2",
            Model::Icxd => "icxd",
            Model::Spr => "spr",
            Model::Emr => "emr",
            Model::Gnr => "gnr",
            Model::Srf => "srf",
        }
    }

    /// Product type code embedded in section version stamps
    pub fn product_type(&self) -> u32 {
        match self {
            Model::Skx => 0x2A,
            Model::Clx => 0x2C,
            Model::Cpx => 0x34,
            Model::Icx | Model::Icx2 => 0x1A,
            Model::Icxd => 0x1B,
            Model::Spr | Model::Emr => 0x1C,
            Model::Gnr | Model::Srf => 0x2F,
        }
    }

    pub fn layout(&self) -> RegisterLayout {
        match self {
            Model::Skx | Model::Clx | Model::Cpx => RegisterLayout::Legacy,
            Model::Icx | Model::Icx2 | Model::Icxd => RegisterLayout::Split,
            Model::Spr | Model::Emr => RegisterLayout::Endpoint,
            Model::Gnr | Model::Srf => RegisterLayout::PerDie,
        }
    }

    /// Whether the package exposes multiple addressable dies
    pub fn has_die_mask(&self) -> bool {
        self.layout() == RegisterLayout::PerDie
    }

    /// Die mask to fall back on when the live read is unavailable at event time
    pub fn max_die_mask(&self) -> Option<u32> {
        match self {
            Model::Gnr => Some(GNR_MAX_DIE_MASK),
            Model::Srf => Some(SRF_MAX_DIE_MASK),
            _ => None,
        }
    }

    pub fn traversal(&self) -> Traversal {
        if self.has_die_mask() {
            Traversal::ByDomain
        } else {
            Traversal::BySection
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
