//! Section catalogue
//!
//! Fixed, ordered list of the sections a dump can contain. Each entry names
//! the section, its bit in the per-processor enable mask, the record type
//! used in its version stamp, and the handler(s) that produce it.

/// Record type codes embedded in version stamps
pub mod record_type {
    pub const CORE_CRASHLOG: u32 = 0x04;
    pub const UNCORE_STATUS_LOG: u32 = 0x08;
    pub const TOR_DUMP: u32 = 0x09;
    pub const METADATA: u32 = 0x0B;
    pub const PM_INFO: u32 = 0x0C;
    pub const ADDRESS_MAP: u32 = 0x0D;
    pub const BMC_AUTONOMOUS: u32 = 0x23;
    pub const MCA_LOG: u32 = 0x3E;
    pub const OEM: u32 = 0x99;
}

/// Default revision of a section's version stamp
pub const REVISION: u32 = 0x01;
/// Revision stamped by the uncore status sub-handler
pub const REVISION_UNCORE: u32 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionId {
    Uncore,
    Tor,
    PmInfo,
    AddressMap,
    BigCore,
    Mca,
    Crashlog,
    Metadata,
    Oem,
}

/// Handler implementations sections are built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerId {
    /// Register table from the section's `Registers` list
    Registers,
    /// Register table from the section's `SubRegisters` list
    SubRegisters,
    /// `SubRegisters` table that also stamps the section version
    UncoreStatus,
    /// Power-management sequence reads
    PowerManagement,
    /// Crash-log agent collection
    Crashlog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Simple(HandlerId),
    /// Two handlers writing into the same section object
    Composite {
        primary: HandlerId,
        secondary: HandlerId,
    },
    /// Per-processor metadata
    Metadata,
}

/// Where a section's output lands in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Under `crash_data.PROCESSORS.cpuN`
    Processors,
    /// Under `crash_data.METADATA.cpuN`
    Metadata,
    /// Under the vendor-specific tree
    Oem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub id: SectionId,
    pub name: &'static str,
    pub bit: u32,
    pub record_type: u32,
    pub kind: SectionKind,
    pub placement: Placement,
    /// The secondary handler stamps the version instead of the orchestrator
    pub self_versioned: bool,
}

impl SectionDescriptor {
    pub fn revision(&self) -> u32 {
        if self.self_versioned {
            REVISION_UNCORE
        } else {
            REVISION
        }
    }
}

/// All sections in collection order
pub const CATALOGUE: &[SectionDescriptor] = &[
    SectionDescriptor {
        id: SectionId::Uncore,
        name: "uncore",
        bit: 0,
        record_type: record_type::UNCORE_STATUS_LOG,
        kind: SectionKind::Composite {
            primary: HandlerId::Registers,
            secondary: HandlerId::UncoreStatus,
        },
        placement: Placement::Processors,
        self_versioned: true,
    },
    SectionDescriptor {
        id: SectionId::Tor,
        name: "TOR",
        bit: 1,
        record_type: record_type::TOR_DUMP,
        kind: SectionKind::Simple(HandlerId::Registers),
        placement: Placement::Processors,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::PmInfo,
        name: "PM_info",
        bit: 2,
        record_type: record_type::PM_INFO,
        kind: SectionKind::Simple(HandlerId::PowerManagement),
        placement: Placement::Processors,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::AddressMap,
        name: "address_map",
        bit: 3,
        record_type: record_type::ADDRESS_MAP,
        kind: SectionKind::Simple(HandlerId::Registers),
        placement: Placement::Processors,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::BigCore,
        name: "big_core",
        bit: 4,
        record_type: record_type::CORE_CRASHLOG,
        kind: SectionKind::Composite {
            primary: HandlerId::Registers,
            secondary: HandlerId::SubRegisters,
        },
        placement: Placement::Processors,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::Mca,
        name: "MCA",
        bit: 5,
        record_type: record_type::MCA_LOG,
        kind: SectionKind::Composite {
            primary: HandlerId::Registers,
            secondary: HandlerId::SubRegisters,
        },
        placement: Placement::Processors,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::Crashlog,
        name: "crashlog",
        bit: 6,
        record_type: record_type::METADATA,
        kind: SectionKind::Simple(HandlerId::Crashlog),
        placement: Placement::Processors,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::Metadata,
        name: "METADATA",
        bit: 7,
        record_type: record_type::METADATA,
        kind: SectionKind::Metadata,
        placement: Placement::Metadata,
        self_versioned: false,
    },
    SectionDescriptor {
        id: SectionId::Oem,
        name: "OEM",
        bit: 8,
        record_type: record_type::OEM,
        kind: SectionKind::Simple(HandlerId::Registers),
        placement: Placement::Oem,
        self_versioned: false,
    },
];

/// Look up a section by its catalogue name
pub fn by_name(name: &str) -> Option<&'static SectionDescriptor> {
    CATALOGUE.iter().find(|d| d.name == name)
}

pub fn descriptor(id: SectionId) -> Option<&'static SectionDescriptor> {
    CATALOGUE.iter().find(|d| d.id == id)
}

/// Enable mask with every catalogue bit set
pub fn all_sections_mask() -> u64 {
    CATALOGUE.iter().fold(0, |mask, d| mask | (1u64 << d.bit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bits_and_names_are_unique() {
        let bits: HashSet<u32> = CATALOGUE.iter().map(|d| d.bit).collect();
        let names: HashSet<&str> = CATALOGUE.iter().map(|d| d.name).collect();
        assert_eq!(bits.len(), CATALOGUE.len());
        assert_eq!(names.len(), CATALOGUE.len());
    }

    #[test]
    fn test_descriptor_lookup() {
        assert_eq!(descriptor(SectionId::Tor).map(|d| d.name), Some("TOR"));
        assert_eq!(descriptor(SectionId::Oem).map(|d| d.name), Some("OEM"));
        for desc in CATALOGUE {
            assert_eq!(descriptor(desc.id).map(|d| d.bit), Some(desc.bit));
        }
        assert_eq!(by_name("PM_info").map(|d| d.id), Some(SectionId::PmInfo));
        assert!(by_name("nope").is_none());
    }

    #[test]
    fn test_only_uncore_is_self_versioned() {
        let self_versioned: Vec<SectionId> = CATALOGUE
            .iter()
            .filter(|d| d.self_versioned)
            .map(|d| d.id)
            .collect();
        assert_eq!(self_versioned, vec![SectionId::Uncore]);
        assert_eq!(descriptor(SectionId::Uncore).map(|d| d.revision()), Some(0));
        assert_eq!(descriptor(SectionId::Mca).map(|d| d.revision()), Some(1));
    }

    #[test]
    fn test_all_sections_mask() {
        assert_eq!(all_sections_mask(), 0x1FF);
    }
}
