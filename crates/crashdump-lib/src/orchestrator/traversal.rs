//! Section traversal for one run

use crate::bus::BusTransport;
use crate::catalogue::{HandlerId, Placement, SectionDescriptor, SectionKind, CATALOGUE};
use crate::document::{cpu_key, format_elapsed, keys, version_stamp, CrashdumpDocument, Node};
use crate::input::{InputConfigCache, LoadedInput, SectionConfig};
use crate::ledger::{BudgetCheck, FailureLedger, ResetContext, RunTimeBudget};
use crate::models::{SectionStatus, TriggerType};
use crate::observability::{CrashdumpMetrics, StructuredLogger};
use crate::sections::{fill_cpu_metadata, HandlerSet, SectionContext};
use crate::topology::{CpuRecord, DieDescriptor, Traversal};
use tracing::{debug, warn};

/// Mutable state of one collection run
pub(super) struct RunState<'a> {
    pub bus: &'a dyn BusTransport,
    pub handlers: &'a HandlerSet,
    pub inputs: &'a InputConfigCache,
    pub unique: bool,
    pub trigger: &'a TriggerType,
    pub reset: &'a ResetContext,
    pub ledger: &'a mut FailureLedger,
    pub budget: RunTimeBudget,
    pub document: CrashdumpDocument,
    pub metrics: &'a CrashdumpMetrics,
    pub logger: &'a StructuredLogger,
    pub global_timeout: bool,
}

fn product_type(record: &CpuRecord) -> u32 {
    record.model().map(|m| m.product_type()).unwrap_or(0)
}

/// Parent object and key a section's output is attached under
fn slot<'d>(
    document: &'d mut CrashdumpDocument,
    desc: &SectionDescriptor,
    cpu_index: usize,
    die: Option<&DieDescriptor>,
) -> (&'d mut Node, String) {
    match desc.placement {
        Placement::Metadata => (document.metadata(), cpu_key(cpu_index)),
        Placement::Processors => {
            let cpu = document.cpu(cpu_index);
            let parent = match die {
                Some(die) => cpu.child(&die.key()),
                None => cpu,
            };
            (parent, desc.name.to_string())
        }
        Placement::Oem => {
            let cpu = document.oem_processors().child(&cpu_key(cpu_index));
            let parent = match die {
                Some(die) => cpu.child(&die.key()),
                None => cpu,
            };
            (parent, desc.name.to_string())
        }
    }
}

/// Dies a section runs on; `None` means once for the whole package
fn units<'r>(
    record: &'r CpuRecord,
    desc: &SectionDescriptor,
    config: &SectionConfig,
) -> Vec<Option<&'r DieDescriptor>> {
    let loops = config.loop_on_io || config.loop_on_compute || config.loop_on_domain;
    if record.dies.is_empty() || matches!(desc.kind, SectionKind::Metadata) || !loops {
        return vec![None];
    }
    record
        .dies
        .iter()
        .filter(|d| {
            config.loop_on_domain
                || (config.loop_on_compute && d.is_compute())
                || (config.loop_on_io && !d.is_compute())
        })
        .map(Some)
        .collect()
}

fn invoke(
    handlers: &HandlerSet,
    id: HandlerId,
    ctx: &SectionContext<'_>,
    out: &mut Node,
) -> SectionStatus {
    match handlers.get(id) {
        Some(handler) => handler.collect(ctx, out),
        None => {
            warn!(handler = ?id, section = ctx.descriptor.name, "No handler installed");
            SectionStatus::Failure
        }
    }
}

impl<'a> RunState<'a> {
    /// Walk the catalogue over every processor in the order its model needs
    pub fn traverse(&mut self, cpus: &[(usize, &CpuRecord)]) {
        let by_domain = cpus
            .iter()
            .filter_map(|(_, r)| r.model())
            .any(|m| m.traversal() == Traversal::ByDomain);

        if by_domain {
            'sections: for desc in CATALOGUE {
                for &(index, record) in cpus {
                    if self.collect_section(index, record, desc) == SectionStatus::GlobalTimeout {
                        break 'sections;
                    }
                }
            }
        } else {
            'cpus: for &(index, record) in cpus {
                for desc in CATALOGUE {
                    if self.collect_section(index, record, desc) == SectionStatus::GlobalTimeout {
                        break 'cpus;
                    }
                }
            }
        }
    }

    /// Run one section for one processor, over the dies it selects
    fn collect_section(
        &mut self,
        cpu_index: usize,
        record: &CpuRecord,
        desc: &'static SectionDescriptor,
    ) -> SectionStatus {
        self.reset.update_current(cpu_index, desc.name);

        if !record.section_enabled(desc.bit) {
            let (parent, key) = slot(&mut self.document, desc, cpu_index, None);
            parent.child(&key).insert_if_absent(keys::RECORD_ENABLE, false);
            return SectionStatus::Disabled;
        }

        let input = record.model().and_then(|m| self.inputs.get(m));
        let fallback = SectionConfig::default();
        let config = input
            .as_ref()
            .and_then(|i| i.document.section(desc.name))
            .unwrap_or(&fallback);

        if self.trigger.is_post_reset() && !config.post_reset_data {
            debug!(cpu = cpu_index, section = desc.name, "Not collected after reset");
            return SectionStatus::Disabled;
        }

        let mut status = SectionStatus::Success;
        for die in units(record, desc, config) {
            let unit = self.collect_unit(cpu_index, record, die, desc, config, input.as_deref());
            status = status.worst(unit);
            if unit == SectionStatus::GlobalTimeout {
                self.global_timeout = true;
                break;
            }
        }
        status
    }

    /// Run one section on one unit and attach its output
    fn collect_unit(
        &mut self,
        cpu_index: usize,
        record: &CpuRecord,
        die: Option<&DieDescriptor>,
        desc: &'static SectionDescriptor,
        config: &SectionConfig,
        input: Option<&LoadedInput>,
    ) -> SectionStatus {
        self.budget.set_section_limit(config.max_time());
        if self.budget.check() == BudgetCheck::GlobalExceeded {
            warn!(
                cpu = cpu_index,
                section = desc.name,
                "Global time budget exceeded, stopping collection"
            );
            self.account(cpu_index, desc, SectionStatus::GlobalTimeout, 0.0);
            return SectionStatus::GlobalTimeout;
        }

        let mut node = Node::object();
        let status = {
            let ctx = SectionContext {
                bus: self.bus,
                cpu_index,
                record,
                die,
                config,
                budget: &self.budget,
                descriptor: desc,
            };
            match desc.kind {
                SectionKind::Simple(id) => invoke(self.handlers, id, &ctx, &mut node),
                SectionKind::Composite { primary, secondary } => {
                    let first = invoke(self.handlers, primary, &ctx, &mut node);
                    let second = invoke(self.handlers, secondary, &ctx, &mut node);
                    first.worst(second)
                }
                SectionKind::Metadata => {
                    fill_cpu_metadata(&mut node, record, input, self.unique);
                    SectionStatus::Success
                }
            }
        };
        let elapsed = self.budget.reset_section();
        self.account(cpu_index, desc, status, elapsed.as_secs_f64());

        if node.is_empty() {
            if !status.is_failure() {
                return status;
            }
            node.insert(keys::STATUS, keys::FAILED);
        } else if !desc.self_versioned && !matches!(desc.kind, SectionKind::Metadata) {
            node.insert_if_absent(
                keys::VERSION,
                version_stamp(desc.record_type, product_type(record), desc.revision()),
            );
        }
        match status {
            SectionStatus::SectionTimeout => node.insert(keys::TIMEOUT, "section"),
            SectionStatus::GlobalTimeout => node.insert(keys::TIMEOUT, "global"),
            _ => {}
        }
        node.insert(keys::TIME, format_elapsed(elapsed));

        let (parent, key) = slot(&mut self.document, desc, cpu_index, die);
        parent.insert(&key, node);
        status
    }

    fn account(
        &mut self,
        cpu_index: usize,
        desc: &SectionDescriptor,
        status: SectionStatus,
        elapsed_secs: f64,
    ) {
        match status {
            SectionStatus::SectionTimeout => self.metrics.inc_timeouts("section"),
            SectionStatus::GlobalTimeout => self.metrics.inc_timeouts("global"),
            _ => {}
        }
        if status.is_failure() {
            self.ledger.record_failure(self.trigger);
            self.metrics.inc_section_failures();
            self.logger
                .log_section_failed(cpu_index, desc.name, status.as_str());
        } else {
            self.logger
                .log_section_collected(cpu_index, desc.name, elapsed_secs);
        }
    }
}
