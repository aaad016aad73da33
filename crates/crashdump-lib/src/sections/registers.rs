//! Register-table section handler
//!
//! Executes the register list of a section from the input document, once
//! per unit or once per core / slice when the section asks to loop, and
//! records each value under the register's name.

use super::{SectionContext, SectionHandler};
use crate::bus::{read_register, Reading};
use crate::catalogue::REVISION_UNCORE;
use crate::document::{keys, Node};
use crate::input::{IterationContext, RegisterCommand};
use crate::ledger::BudgetCheck;
use crate::models::SectionStatus;
use tracing::{debug, warn};

const SKIPPED: &str = "N/A";

/// Which list of the section config a table executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterList {
    /// `Registers`
    Primary,
    /// `SubRegisters`
    Secondary,
}

#[derive(Debug, Clone, Copy)]
pub struct RegisterTable {
    list: RegisterList,
    stamps_version: bool,
}

impl RegisterTable {
    pub fn new(list: RegisterList) -> Self {
        Self {
            list,
            stamps_version: false,
        }
    }

    /// Stamp the section's version marker after collecting
    pub fn stamping_version(mut self) -> Self {
        self.stamps_version = true;
        self
    }

    fn commands<'c>(&self, ctx: &'c SectionContext<'_>) -> &'c [RegisterCommand] {
        match self.list {
            RegisterList::Primary => &ctx.config.registers,
            RegisterList::Secondary => &ctx.config.sub_registers,
        }
    }
}

/// Units of one pass over the register list: an optional child key and the
/// placeholder values for that pass
fn iterations(ctx: &SectionContext<'_>) -> Vec<(Option<String>, IterationContext)> {
    let base = ctx.iteration_base();
    if ctx.config.loop_on_core {
        let mask = ctx.core_mask();
        (0..64u32)
            .filter(|core| mask & (1u64 << core) != 0)
            .map(|core| {
                (
                    Some(format!("core{}", core)),
                    IterationContext {
                        core: Some(core),
                        ..base
                    },
                )
            })
            .collect()
    } else if ctx.config.loop_on_cha {
        (0..ctx.slice_count())
            .map(|cha| {
                (
                    Some(format!("cha{}", cha)),
                    IterationContext {
                        cha: Some(cha),
                        ..base
                    },
                )
            })
            .collect()
    } else {
        vec![(None, base)]
    }
}

impl SectionHandler for RegisterTable {
    fn collect(&self, ctx: &SectionContext<'_>, out: &mut Node) -> SectionStatus {
        let commands = self.commands(ctx);
        if commands.is_empty() {
            return SectionStatus::Success;
        }

        let target = ctx.target();
        let mut status = SectionStatus::Success;
        let mut reads = 0u32;
        let mut failures = 0u32;

        'units: for (key, iteration) in iterations(ctx) {
            let node: &mut Node = match &key {
                Some(k) => out.child(k),
                None => &mut *out,
            };
            let mut skip_rest = false;

            for command in commands {
                if skip_rest {
                    node.insert(&command.name, SKIPPED);
                    continue;
                }
                match ctx.budget.check() {
                    BudgetCheck::Within => {}
                    BudgetCheck::SectionExceeded => {
                        status = SectionStatus::SectionTimeout;
                        break 'units;
                    }
                    BudgetCheck::GlobalExceeded => {
                        status = SectionStatus::GlobalTimeout;
                        break 'units;
                    }
                }

                let selector = match command.selector(&iteration) {
                    Ok(selector) => selector,
                    Err(e) => {
                        warn!(
                            section = ctx.descriptor.name,
                            register = %command.name,
                            error = %e,
                            "Skipping malformed register command"
                        );
                        node.insert(&command.name, SKIPPED);
                        continue;
                    }
                };

                let reading = read_register(ctx.bus, target, selector, command.size);
                reads += 1;
                node.insert(&command.name, reading.display());

                if reading.is_failure() {
                    failures += 1;
                }
                if !matches!(reading, Reading::Value { .. }) && ctx.config.skip_on_fail {
                    debug!(
                        section = ctx.descriptor.name,
                        unit = ?key,
                        register = %command.name,
                        "Read failed, skipping rest of unit"
                    );
                    skip_rest = true;
                }
            }
        }

        let threshold = ctx.config.fail_threshold;
        if threshold > 0 {
            out.insert("_fail_count", u64::from(failures));
            if failures >= threshold {
                status = status.worst(SectionStatus::Failure);
            }
        } else if reads > 0 && failures == reads {
            status = status.worst(SectionStatus::Failure);
        }

        if self.stamps_version && !out.is_empty() {
            out.insert(keys::VERSION, ctx.version_stamp(REVISION_UNCORE));
        }
        status
    }
}
