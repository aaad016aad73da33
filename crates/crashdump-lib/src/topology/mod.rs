//! Processor topology
//!
//! This module discovers the processors on the bus and caches what is known
//! about each of them: identity and model, enabled cores, slice count, and
//! on multi-die packages the die layout with per-die masks.

pub mod dies;
mod discovery;
mod model;
mod record;
mod wake;

pub use discovery::{
    backfill, discover_addresses, resolve_core_mask, resolve_die_mask, resolve_identity,
    resolve_slice_count, TopologyCache,
};
pub use model::{raw_id, Model, RegisterLayout, Traversal};
pub use record::{
    CpuIdentity, CpuRecord, DieDescriptor, DieKind, DieMaskInfo, DieRange, DiscoveryPhase,
    Provenance, ReadStatus, WakeState,
};
pub use wake::{check_wake_state, save_wake_state, set_wake_state};
