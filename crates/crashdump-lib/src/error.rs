//! Error types shared across the collector

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failure reported by the bus provider.
///
/// A transport failure means the transaction never produced a device
/// answer. It is distinct from a completion code, which is the device's
/// own verdict on a transaction that did reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusError {
    #[error("invalid request")]
    InvalidRequest,
    #[error("hardware error")]
    HardwareError,
    #[error("driver error")]
    DriverError,
    #[error("cpu not present")]
    CpuNotPresent,
    #[error("memory error")]
    MemoryError,
    #[error("transaction timed out")]
    Timeout,
}

impl BusError {
    /// Numeric status code recorded in the document when a read fails in transport
    pub fn code(&self) -> u8 {
        match self {
            BusError::InvalidRequest => 1,
            BusError::HardwareError => 2,
            BusError::DriverError => 3,
            BusError::CpuNotPresent => 4,
            BusError::MemoryError => 5,
            BusError::Timeout => 6,
        }
    }
}

/// Failure to load an input document or a bus fixture from disk
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A register command from an input document that cannot be issued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{command} expects {expected} parameters, got {got}")]
    Arity {
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("parameter {0} cannot be resolved here")]
    Unresolved(String),
    #[error("parameter value 0x{value:x} does not fit {field}")]
    OutOfRange { field: &'static str, value: u64 },
}

/// Failure while managing stored crash-dump logs
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid log name: {0}")]
    InvalidName(String),
    #[error("log not found: {0}")]
    NotFound(String),
}
