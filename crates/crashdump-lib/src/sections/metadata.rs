//! Per-processor metadata

use crate::document::Node;
use crate::input::LoadedInput;
use crate::topology::CpuRecord;

/// Fill one processor's metadata object.
///
/// Input-file details are recorded per processor only when more than one
/// input document was used in the run.
pub fn fill_cpu_metadata(
    node: &mut Node,
    record: &CpuRecord,
    input: Option<&LoadedInput>,
    unique: bool,
) {
    let identity = &record.identity;
    node.insert("cpuid", format!("0x{:x}", identity.cpuid()));
    node.insert("_cpuid_source", identity.status.source.as_str());
    if let Some(model) = record.model() {
        node.insert("_model", model.name());
    }
    node.insert("peci_id", format!("0x{:x}", record.addr));

    if record.dies.is_empty() {
        if record.core_mask_read.valid {
            node.insert("core_mask", format!("0x{:x}", record.core_mask));
        } else {
            node.insert("core_mask", "N/A");
        }
        node.insert("_core_mask_source", record.core_mask_read.source.as_str());
        if record.slice_read.valid {
            node.insert("cha_count", format!("0x{:x}", record.slice_count));
        } else {
            node.insert("cha_count", "N/A");
        }
    } else {
        if let Some(info) = record.die_mask {
            node.insert("die_mask", format!("0x{:x}", info.mask));
            node.insert("_die_mask_source", info.status.source.as_str());
        }
        for die in record.compute_dies() {
            let die_node = node.child(&die.key());
            die_node.insert("core_mask", format!("0x{:x}", die.core_mask));
            die_node.insert("_core_mask_source", die.core_mask_read.source.as_str());
            die_node.insert("cha_count", format!("0x{:x}", die.slice_count));
        }
    }
    node.insert("core_count", format!("0x{:x}", record.core_count()));

    if !unique {
        if let Some(input) = input {
            node.insert("_input_file", input.path.display().to_string());
            if let Some(version) = &input.document.version {
                node.insert("_input_file_ver", version.as_str());
            }
        }
    }
}
