//! Power-management section handler
//!
//! Reads each present core's C-state and VID-ratio registers through the
//! VCU mailbox. Each register read is a four-step sequence:
//! open, select core and register, read, close. Any transport failure
//! aborts the sequence and stops the section.

use super::{SectionContext, SectionHandler};
use crate::bus::{BusResult, BusTransport, Reading, Selector, Target};
use crate::document::Node;
use crate::ledger::BudgetCheck;
use crate::models::SectionStatus;
use tracing::warn;

const MBX_INDEX_VCU: u8 = 0x80;
const VCU_SET_PARAM: u16 = 0x0001;
const VCU_OPEN_SEQ: u16 = 0x0003;
const VCU_CLOSE_SEQ: u16 = 0x0004;
const VCU_ABORT_SEQ: u16 = 0x0005;
const VCU_PWR_MGT_SEQ: u32 = 0x1002a;
const PM_READ_PARAM: u16 = 0x1019;

const PM_CSTATE_PARAM: u32 = 0x4660B4;
const PM_VID_PARAM: u32 = 0x488004;
const PM_CORE_OFFSET: u32 = 24;

const CSTATE_KEY: &str = "c_state_reg";
const VID_KEY: &str = "vid_ratio_reg";

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerManagement;

fn vcu_write(bus: &dyn BusTransport, target: Target, param: u16, data: u32) -> BusResult {
    bus.write(
        target,
        Selector::PkgConfig {
            index: MBX_INDEX_VCU,
            param,
        },
        &data.to_le_bytes(),
    )
}

/// Run one mailbox read sequence for `core` and `register`
fn read_pm_register(bus: &dyn BusTransport, target: Target, core: u32, register: u32) -> Reading {
    let abort = |reading: Reading| {
        let _ = vcu_write(bus, target, VCU_ABORT_SEQ, VCU_PWR_MGT_SEQ);
        reading
    };

    if let Err(e) = vcu_write(bus, target, VCU_OPEN_SEQ, VCU_PWR_MGT_SEQ) {
        return abort(Reading::Transport(e));
    }
    if let Err(e) = vcu_write(bus, target, VCU_SET_PARAM, (core << PM_CORE_OFFSET) | register) {
        return abort(Reading::Transport(e));
    }
    let reading = Reading::from_result(bus.read(
        target,
        Selector::PkgConfig {
            index: MBX_INDEX_VCU,
            param: PM_READ_PARAM,
        },
        4,
    ));
    if let Reading::Transport(_) = reading {
        return abort(reading);
    }
    let _ = vcu_write(bus, target, VCU_CLOSE_SEQ, VCU_PWR_MGT_SEQ);
    reading
}

impl SectionHandler for PowerManagement {
    fn collect(&self, ctx: &SectionContext<'_>, out: &mut Node) -> SectionStatus {
        let mask = ctx.core_mask();
        let target = ctx.target();

        for core in (0..64u32).filter(|c| mask & (1u64 << c) != 0) {
            match ctx.budget.check() {
                BudgetCheck::Within => {}
                BudgetCheck::SectionExceeded => return SectionStatus::SectionTimeout,
                BudgetCheck::GlobalExceeded => return SectionStatus::GlobalTimeout,
            }

            let cstate = read_pm_register(ctx.bus, target, core, PM_CSTATE_PARAM);
            let vid = read_pm_register(ctx.bus, target, core, PM_VID_PARAM);

            let node = out.child(&format!("core{}", core));
            node.insert(CSTATE_KEY, cstate.display());
            node.insert(VID_KEY, vid.display());

            if cstate.transport_error().is_some() || vid.transport_error().is_some() {
                warn!(
                    cpu = ctx.cpu_index,
                    core,
                    "Power-management sequence failed, assuming reads are not permitted"
                );
                return SectionStatus::Failure;
            }
        }
        SectionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{descriptor, SectionId};
    use crate::bus::ScriptedBus;
    use crate::error::BusError;
    use crate::input::SectionConfig;
    use crate::ledger::RunTimeBudget;
    use crate::topology::{CpuRecord, Model, Provenance};

    fn record(core_mask: u64) -> CpuRecord {
        let mut record = CpuRecord::new(0x30);
        record.identity.model = Some(Model::Cpx);
        record.identity.status.mark_valid(Provenance::Startup);
        record.core_mask = core_mask;
        record
    }

    fn run(bus: &ScriptedBus, record: &CpuRecord) -> (SectionStatus, Node) {
        let config = SectionConfig::default();
        let budget = RunTimeBudget::unbounded();
        let ctx = SectionContext {
            bus,
            cpu_index: 0,
            record,
            die: None,
            config: &config,
            budget: &budget,
            descriptor: descriptor(SectionId::PmInfo).unwrap(),
        };
        let mut out = Node::object();
        let status = PowerManagement.collect(&ctx, &mut out);
        (status, out)
    }

    fn read_sel() -> Selector {
        Selector::PkgConfig {
            index: MBX_INDEX_VCU,
            param: PM_READ_PARAM,
        }
    }

    #[test]
    fn test_sequence_per_present_core() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        let t = Target::socket(0x30);
        bus.respond_ok(t, read_sel(), vec![0x11, 0, 0, 0]);
        bus.respond_ok(t, read_sel(), vec![0x22, 0, 0, 0]);

        let (status, out) = run(&bus, &record(0b10));
        assert_eq!(status, SectionStatus::Success);
        assert_eq!(out.path(&["core1", "c_state_reg"]).and_then(Node::as_str), Some("0x11"));
        assert_eq!(out.path(&["core1", "vid_ratio_reg"]).and_then(Node::as_str), Some("0x22"));

        let writes = bus.writes();
        let params: Vec<u16> = writes
            .iter()
            .map(|(_, s, _)| match s {
                Selector::PkgConfig { param, .. } => *param,
                _ => 0,
            })
            .collect();
        assert_eq!(params, vec![3, 1, 4, 3, 1, 4]);
        // core number in bits [29:24] of the set-parameter data
        assert_eq!(writes[1].2, ((1u32 << 24) | PM_CSTATE_PARAM).to_le_bytes().to_vec());
    }

    #[test]
    fn test_unavailable_codes_are_recorded() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        let (status, out) = run(&bus, &record(0b1));
        assert_eq!(status, SectionStatus::Success);
        assert_eq!(out.path(&["core0", "c_state_reg"]).and_then(Node::as_str), Some("UA:0x90"));
    }

    #[test]
    fn test_transport_failure_aborts_and_stops() {
        let bus = ScriptedBus::new().with_cpu(0x30);
        let t = Target::socket(0x30);
        bus.fail(t, read_sel(), BusError::DriverError);

        let (status, out) = run(&bus, &record(0b11));
        assert_eq!(status, SectionStatus::Failure);
        assert_eq!(out.keys(), vec!["core0"]);
        let aborts = bus
            .writes()
            .iter()
            .filter(|(_, s, _)| *s == Selector::PkgConfig { index: MBX_INDEX_VCU, param: VCU_ABORT_SEQ })
            .count();
        assert_eq!(aborts, 2);
    }
}
