//! Die mask decoding for multi-die packages
//!
//! The die mask is a 32-bit word: bits [8:0] flag populated I/O dies and
//! bits [31:9] flag populated compute dies. A die's absolute bit position is
//! its bus domain number.

use super::record::{DieDescriptor, DieKind, DieMaskInfo, DieRange, ReadStatus};

/// Absolute bits of the mask covering I/O dies
pub const IO_RANGE: u32 = 0x1FF;
/// Absolute bits of the mask covering compute dies
pub const COMPUTE_RANGE: u32 = !IO_RANGE;

const IO_MAX_DIES: u32 = IO_RANGE.count_ones();
const COMPUTE_MAX_DIES: u32 = COMPUTE_RANGE.count_ones();

/// PCU device numbers by die role
const PCU_DEV_FIRST_IO: u8 = 5;
const PCU_DEV_COMPUTE: [u8; 3] = [6, 7, 8];
const PCU_DEV_OTHER_IO: u8 = 9;

/// Split a raw die mask into its I/O and compute ranges
pub fn split(mask: u32, status: ReadStatus) -> DieMaskInfo {
    let compute_offset = IO_RANGE.count_ones();
    DieMaskInfo {
        mask,
        io: DieRange {
            range: IO_RANGE,
            offset: 0,
            effective_mask: mask & IO_RANGE,
            max_dies: IO_MAX_DIES,
        },
        compute: DieRange {
            range: COMPUTE_RANGE >> compute_offset,
            offset: compute_offset,
            effective_mask: (mask & COMPUTE_RANGE) >> compute_offset,
            max_dies: COMPUTE_MAX_DIES,
        },
        status,
    }
}

/// Expand a split die mask into descriptors, I/O dies first
pub fn descriptors(info: &DieMaskInfo) -> Vec<DieDescriptor> {
    let io = info
        .io
        .domains()
        .into_iter()
        .enumerate()
        .map(|(index, domain)| DieDescriptor::new(DieKind::Io, index, domain));
    let compute = info
        .compute
        .domains()
        .into_iter()
        .enumerate()
        .map(|(index, domain)| DieDescriptor::new(DieKind::Compute, index, domain));
    io.chain(compute).collect()
}

/// Absolute bit position of the `n`-th (zero based) populated die inside `range`
pub fn map_die_number(mask: u32, n: u32, range: u32) -> Option<u8> {
    (0..32u32)
        .filter(|bit| (mask & range) & (1 << bit) != 0)
        .nth(n as usize)
        .map(|bit| bit as u8)
}

/// PCU device number for the die at absolute `domain`.
///
/// The first populated I/O die uses device 5 and any other I/O die device 9.
/// The first three populated compute dies use devices 6, 7 and 8; any other
/// compute domain has no device.
pub fn pcu_device(info: &DieMaskInfo, domain: u8) -> Option<u8> {
    let domain = u32::from(domain);
    if IO_RANGE & 1u32.checked_shl(domain).unwrap_or(0) != 0 {
        return match map_die_number(info.mask, 0, IO_RANGE) {
            Some(first) if u32::from(first) == domain => Some(PCU_DEV_FIRST_IO),
            _ => Some(PCU_DEV_OTHER_IO),
        };
    }

    (0..PCU_DEV_COMPUTE.len() as u32)
        .find(|n| map_die_number(info.mask, *n, COMPUTE_RANGE).map(u32::from) == Some(domain))
        .map(|n| PCU_DEV_COMPUTE[n as usize])
}
