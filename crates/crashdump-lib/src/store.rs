//! Stored crash-dump logs
//!
//! Crash dumps are kept as JSON files in one output directory:
//!
//! - `crashdump_<N>-<timestamp>.json` for event-triggered dumps. At most
//!   `max_stored` are kept; the first one ever stored is never rotated out.
//! - `crashdump_ondemand_<timestamp>.json` for the latest on-demand dump.
//! - `telemetry_<timestamp>.json` for the latest telemetry dump.

use crate::error::StoreError;
use crate::models::TriggerType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/crashdump/output";
pub const DEFAULT_MAX_STORED_LOGS: usize = 3;

const STORED_PREFIX: &str = "crashdump_";
const ON_DEMAND_PREFIX: &str = "crashdump_ondemand_";
const TELEMETRY_PREFIX: &str = "telemetry_";
const EXTENSION: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Numbered, rotated dump from an error or reset event
    Stored,
    OnDemand,
    Telemetry,
}

impl LogKind {
    pub fn for_trigger(trigger: &TriggerType) -> Self {
        match trigger {
            TriggerType::OnDemand => LogKind::OnDemand,
            TriggerType::Telemetry => LogKind::Telemetry,
            _ => LogKind::Stored,
        }
    }
}

/// One log file in the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLog {
    pub name: String,
    pub kind: LogKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub timestamp: String,
    pub size_bytes: u64,
}

/// Kind, sequence number and timestamp encoded in a log file name
fn parse_name(name: &str) -> Option<(LogKind, Option<u32>, &str)> {
    let stem = name.strip_suffix(EXTENSION)?;
    if let Some(ts) = stem.strip_prefix(ON_DEMAND_PREFIX) {
        return Some((LogKind::OnDemand, None, ts));
    }
    if let Some(ts) = stem.strip_prefix(TELEMETRY_PREFIX) {
        return Some((LogKind::Telemetry, None, ts));
    }
    let (index, ts) = stem.strip_prefix(STORED_PREFIX)?.split_once('-')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((LogKind::Stored, Some(index.parse().ok()?), ts))
}

fn file_name(kind: LogKind, index: u32, timestamp: &str) -> String {
    match kind {
        LogKind::Stored => format!("{}{}-{}{}", STORED_PREFIX, index, timestamp, EXTENSION),
        LogKind::OnDemand => format!("{}{}{}", ON_DEMAND_PREFIX, timestamp, EXTENSION),
        LogKind::Telemetry => format!("{}{}{}", TELEMETRY_PREFIX, timestamp, EXTENSION),
    }
}

#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    max_stored: usize,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, max_stored: usize) -> Self {
        Self {
            dir: dir.into(),
            max_stored: max_stored.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Every log in the directory: numbered logs by sequence, then the rest by name
    pub fn list(&self) -> Result<Vec<StoredLog>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir)(e)),
        };

        let mut logs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::io_error(&self.dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some((kind, index, timestamp)) = parse_name(&name) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            logs.push(StoredLog {
                kind,
                index,
                timestamp: timestamp.to_string(),
                size_bytes,
                name,
            });
        }
        logs.sort_by(|a, b| {
            (a.kind != LogKind::Stored, a.index, &a.name).cmp(&(
                b.kind != LogKind::Stored,
                b.index,
                &b.name,
            ))
        });
        Ok(logs)
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        std::fs::remove_file(&path).map_err(Self::io_error(&path))?;
        debug!(name = %name, "Removed stored log");
        Ok(())
    }

    /// Write a new log, rotating or replacing older ones of the same kind
    pub fn write(
        &self,
        kind: LogKind,
        timestamp: &str,
        contents: &str,
    ) -> Result<StoredLog, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let existing: Vec<StoredLog> = self
            .list()?
            .into_iter()
            .filter(|log| log.kind == kind)
            .collect();

        let index = match kind {
            LogKind::Stored => {
                let next = existing
                    .last()
                    .and_then(|log| log.index)
                    .map(|i| i + 1)
                    .unwrap_or(0);
                // keep the first log and the newest max_stored - 1, counting the new one
                let excess = (existing.len() + 1).saturating_sub(self.max_stored);
                for log in existing.iter().skip(1).take(excess) {
                    self.remove(&log.name)?;
                }
                next
            }
            LogKind::OnDemand | LogKind::Telemetry => {
                for log in &existing {
                    self.remove(&log.name)?;
                }
                0
            }
        };

        let name = file_name(kind, index, timestamp);
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!(".{}.tmp", name));
        std::fs::write(&tmp, contents).map_err(Self::io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(Self::io_error(&path))?;
        info!(name = %name, bytes = contents.len(), "Stored crash dump");

        Ok(StoredLog {
            name,
            kind,
            index: (kind == LogKind::Stored).then_some(index),
            timestamp: timestamp.to_string(),
            size_bytes: contents.len() as u64,
        })
    }

    /// Contents of a log by file name
    pub fn read(&self, name: &str) -> Result<String, StoreError> {
        if name.contains('/') || name.contains("..") || parse_name(name).is_none() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }

    /// Delete every log, returning how many were removed
    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let logs = self.list()?;
        for log in &logs {
            self.remove(&log.name)?;
        }
        info!(count = logs.len(), "Deleted all stored crash dumps");
        Ok(logs.len())
    }
}
