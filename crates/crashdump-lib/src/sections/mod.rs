//! Section handlers
//!
//! A handler fills one section object for one processor (or one die of a
//! multi-die package) and reports an outcome. Handlers never fail the run:
//! every problem is folded into the returned [`SectionStatus`] and whatever
//! data was collected stays in the output node.

mod metadata;
mod power;
mod registers;

pub use metadata::fill_cpu_metadata;
pub use power::PowerManagement;
pub use registers::{RegisterList, RegisterTable};

use crate::bus::{BusTransport, Target};
use crate::catalogue::{HandlerId, SectionDescriptor};
use crate::crashlog::CrashlogSection;
use crate::document::{version_stamp, Node};
use crate::input::{IterationContext, SectionConfig};
use crate::ledger::RunTimeBudget;
use crate::models::SectionStatus;
use crate::topology::{dies, CpuRecord, DieDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a handler needs to know about the unit it is collecting
pub struct SectionContext<'a> {
    pub bus: &'a dyn BusTransport,
    pub cpu_index: usize,
    pub record: &'a CpuRecord,
    /// Set when collecting a single die of a multi-die package
    pub die: Option<&'a DieDescriptor>,
    pub config: &'a SectionConfig,
    pub budget: &'a RunTimeBudget,
    pub descriptor: &'static SectionDescriptor,
}

impl<'a> SectionContext<'a> {
    pub fn target(&self) -> Target {
        match self.die {
            Some(die) => Target::die(self.record.addr, die.domain),
            None => Target::socket(self.record.addr),
        }
    }

    pub fn core_mask(&self) -> u64 {
        match self.die {
            Some(die) => die.core_mask,
            None => self.record.core_mask,
        }
    }

    pub fn slice_count(&self) -> u32 {
        match self.die {
            Some(die) => die.slice_count,
            None => self.record.slice_count,
        }
    }

    pub fn pcu_device(&self) -> Option<u8> {
        let die = self.die?;
        let info = self.record.die_mask?;
        dies::pcu_device(&info, die.domain)
    }

    /// Placeholder values shared by every iteration of this unit
    pub fn iteration_base(&self) -> IterationContext {
        IterationContext {
            domain: self.die.map(|d| d.domain),
            pcu_device: self.pcu_device(),
            ..Default::default()
        }
    }

    /// Version stamp for this section on this processor
    pub fn version_stamp(&self, revision: u32) -> String {
        let product_type = self.record.model().map(|m| m.product_type()).unwrap_or(0);
        version_stamp(self.descriptor.record_type, product_type, revision)
    }
}

/// Produces one section's data
pub trait SectionHandler: Send + Sync {
    fn collect(&self, ctx: &SectionContext<'_>, out: &mut Node) -> SectionStatus;
}

/// Handlers by id, with the standard set preinstalled
#[derive(Clone)]
pub struct HandlerSet {
    handlers: HashMap<HandlerId, Arc<dyn SectionHandler>>,
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerSet {
    pub fn standard() -> Self {
        let mut handlers: HashMap<HandlerId, Arc<dyn SectionHandler>> = HashMap::new();
        handlers.insert(
            HandlerId::Registers,
            Arc::new(RegisterTable::new(RegisterList::Primary)),
        );
        handlers.insert(
            HandlerId::SubRegisters,
            Arc::new(RegisterTable::new(RegisterList::Secondary)),
        );
        handlers.insert(
            HandlerId::UncoreStatus,
            Arc::new(RegisterTable::new(RegisterList::Secondary).stamping_version()),
        );
        handlers.insert(HandlerId::PowerManagement, Arc::new(PowerManagement));
        handlers.insert(HandlerId::Crashlog, Arc::new(CrashlogSection));
        Self { handlers }
    }

    /// Replace the handler for `id`
    pub fn with(mut self, id: HandlerId, handler: Arc<dyn SectionHandler>) -> Self {
        self.handlers.insert(id, handler);
        self
    }

    pub fn get(&self, id: HandlerId) -> Option<&dyn SectionHandler> {
        self.handlers.get(&id).map(|h| h.as_ref())
    }
}
