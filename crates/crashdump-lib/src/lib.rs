//! Host-side CPU crash-dump collection over a sideband bus
//!
//! This crate provides the core functionality for:
//! - Processor discovery and topology caching
//! - Input-driven register and crash-log collection per section
//! - Time budgets, failure accounting and reset tracking
//! - Crash-dump document assembly and stored-log management
//! - Health checks and observability

pub mod bus;
pub mod catalogue;
pub mod crashlog;
pub mod document;
pub mod error;
pub mod health;
pub mod input;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod sections;
pub mod store;
pub mod topology;

pub use bus::{BusTransport, ScriptedBus};
pub use document::CrashdumpDocument;
pub use error::{BusError, CommandError, InputError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use input::InputSearchPaths;
pub use ledger::{FailureLedger, ResetContext};
pub use models::*;
pub use observability::{CrashdumpMetrics, StructuredLogger};
pub use orchestrator::{format_timestamp, CollectionReport, Collector, CollectorBuilder, CollectorConfig};
pub use store::{LogKind, LogStore, StoredLog};
pub use topology::TopologyCache;
