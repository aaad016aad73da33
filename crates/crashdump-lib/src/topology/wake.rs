//! Bus wake control
//!
//! Processors that had the wake feature off before a run are switched on for
//! the duration of collection and switched back off afterwards. Processors
//! whose initial state could not be read are left alone.

use super::record::{CpuRecord, WakeState};
use crate::bus::{read_register, BusTransport, Reading, Selector, Target};
use tracing::{debug, warn};

const WAKE_INDEX: u8 = 5;
const WAKE_READ_PARAM: u16 = 1;
const WAKE_ON: u16 = 1;
const WAKE_OFF: u16 = 0;

fn read_wake(bus: &dyn BusTransport, addr: u8) -> Reading {
    read_register(
        bus,
        Target::socket(addr),
        Selector::PkgConfig {
            index: WAKE_INDEX,
            param: WAKE_READ_PARAM,
        },
        4,
    )
}

/// Record each valid processor's wake state before collection starts
pub fn save_wake_state(bus: &dyn BusTransport, records: &mut [CpuRecord]) {
    for record in records.iter_mut().filter(|r| r.is_valid()) {
        record.initial_wake = match read_wake(bus, record.addr).value() {
            Some(v) if v & 1 == 1 => WakeState::On,
            Some(_) => WakeState::Off,
            None => WakeState::Unknown,
        };
        debug!(addr = record.addr, wake = ?record.initial_wake, "Saved wake state");
    }
}

/// Switch wake on or off for processors that started with it off
pub fn set_wake_state(bus: &dyn BusTransport, records: &[CpuRecord], on: bool) {
    let value = if on { WAKE_ON } else { WAKE_OFF };
    for record in records
        .iter()
        .filter(|r| r.is_valid() && r.initial_wake == WakeState::Off)
    {
        let result = bus.write(
            Target::socket(record.addr),
            Selector::PkgConfig {
                index: WAKE_INDEX,
                param: value,
            },
            &u32::from(value).to_le_bytes(),
        );
        let reading = Reading::from_result(result);
        if reading.value().is_none() {
            warn!(
                addr = record.addr,
                on,
                reading = %reading.display(),
                "Failed to set wake state"
            );
        }
    }
}

/// Warn about processors whose wake state did not read back as on.
///
/// Returns the addresses that failed the check.
pub fn check_wake_state(bus: &dyn BusTransport, records: &[CpuRecord]) -> Vec<u8> {
    let mut failed = Vec::new();
    for record in records
        .iter()
        .filter(|r| r.is_valid() && r.initial_wake == WakeState::Off)
    {
        let reading = read_wake(bus, record.addr);
        if reading.value() != Some(1) {
            warn!(
                addr = record.addr,
                reading = %reading.display(),
                "Wake state did not read back as on"
            );
            failed.push(record.addr);
        }
    }
    failed
}
