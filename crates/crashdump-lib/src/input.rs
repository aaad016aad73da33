//! Input configuration documents
//!
//! Each processor model has an optional JSON document that enables or
//! disables sections, sets time budgets, and lists the registers each
//! register-table section reads. Documents are looked up in an override
//! directory first, then in the default directory, and parsed once per
//! model per run.

use crate::bus::Selector;
use crate::catalogue::{self, CATALOGUE};
use crate::error::{CommandError, InputError};
use crate::topology::{CpuRecord, Model};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_INPUT_DIR: &str = "/usr/share/crashdump/input";
pub const OVERRIDE_INPUT_DIR: &str = "/tmp/crashdump/input";

const DEFAULT_REGISTER_LEN: usize = 4;

/// One register read listed in an input document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterCommand {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Command")]
    pub command: CommandKind,
    #[serde(rename = "Params", default)]
    pub params: Vec<Param>,
    #[serde(rename = "Size", default = "default_register_len")]
    pub size: usize,
}

fn default_register_len() -> usize {
    DEFAULT_REGISTER_LEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CommandKind {
    RdPkgConfig,
    RdPciConfigLocal,
    RdEndPointConfigPciLocal,
}

impl CommandKind {
    fn name(&self) -> &'static str {
        match self {
            CommandKind::RdPkgConfig => "RdPkgConfig",
            CommandKind::RdPciConfigLocal => "RdPciConfigLocal",
            CommandKind::RdEndPointConfigPciLocal => "RdEndPointConfigPciLocal",
        }
    }

    fn arity(&self) -> usize {
        match self {
            CommandKind::RdPkgConfig => 2,
            CommandKind::RdPciConfigLocal => 4,
            CommandKind::RdEndPointConfigPciLocal => 5,
        }
    }
}

/// Command parameter: a literal or a placeholder filled per iteration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Number(u64),
    Text(String),
}

/// Values available to placeholders while iterating a section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationContext {
    pub core: Option<u32>,
    pub cha: Option<u32>,
    pub domain: Option<u8>,
    pub pcu_device: Option<u8>,
}

impl Param {
    pub fn resolve(&self, ctx: &IterationContext) -> Result<u64, CommandError> {
        let text = match self {
            Param::Number(n) => return Ok(*n),
            Param::Text(text) => text.as_str(),
        };
        let resolved = match text {
            "Core" => ctx.core.map(u64::from),
            "CHA" => ctx.cha.map(u64::from),
            "DomainID" => ctx.domain.map(u64::from),
            "PCU" => ctx.pcu_device.map(u64::from),
            hex if hex.starts_with("0x") || hex.starts_with("0X") => {
                u64::from_str_radix(&hex[2..], 16).ok()
            }
            dec => dec.parse().ok(),
        };
        resolved.ok_or_else(|| CommandError::Unresolved(text.to_string()))
    }
}

fn narrow<T: TryFrom<u64>>(value: u64, field: &'static str) -> Result<T, CommandError> {
    T::try_from(value).map_err(|_| CommandError::OutOfRange { field, value })
}

impl RegisterCommand {
    /// Resolve the parameter list into a bus selector
    pub fn selector(&self, ctx: &IterationContext) -> Result<Selector, CommandError> {
        if self.params.len() != self.command.arity() {
            return Err(CommandError::Arity {
                command: self.command.name(),
                expected: self.command.arity(),
                got: self.params.len(),
            });
        }
        let v: Vec<u64> = self
            .params
            .iter()
            .map(|p| p.resolve(ctx))
            .collect::<Result<_, _>>()?;

        Ok(match self.command {
            CommandKind::RdPkgConfig => Selector::PkgConfig {
                index: narrow(v[0], "index")?,
                param: narrow(v[1], "param")?,
            },
            CommandKind::RdPciConfigLocal => Selector::PciLocal {
                bus: narrow(v[0], "bus")?,
                device: narrow(v[1], "device")?,
                function: narrow(v[2], "function")?,
                reg: narrow(v[3], "reg")?,
            },
            CommandKind::RdEndPointConfigPciLocal => Selector::EndpointPci {
                seg: narrow(v[0], "seg")?,
                bus: narrow(v[1], "bus")?,
                device: narrow(v[2], "device")?,
                function: narrow(v[3], "function")?,
                reg: narrow(v[4], "reg")?,
            },
        })
    }
}

/// Per-section settings from an input document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SectionConfig {
    #[serde(rename = "_record_enable")]
    pub record_enable: Option<bool>,
    #[serde(rename = "MaxTimeSec")]
    pub max_time_secs: Option<u64>,
    #[serde(rename = "PostResetData", default)]
    pub post_reset_data: bool,
    #[serde(rename = "LoopOnIO", default)]
    pub loop_on_io: bool,
    #[serde(rename = "LoopOnCompute", default)]
    pub loop_on_compute: bool,
    #[serde(rename = "LoopOnDomain", default)]
    pub loop_on_domain: bool,
    #[serde(rename = "LoopOnCore", default)]
    pub loop_on_core: bool,
    #[serde(rename = "LoopOnCHA", default)]
    pub loop_on_cha: bool,
    #[serde(rename = "SkipOnFail", default)]
    pub skip_on_fail: bool,
    #[serde(rename = "FailThreshold", default)]
    pub fail_threshold: u32,
    #[serde(rename = "Registers", default)]
    pub registers: Vec<RegisterCommand>,
    #[serde(rename = "SubRegisters", default)]
    pub sub_registers: Vec<RegisterCommand>,
    /// Crash-log agent unique id (hex string) to label
    #[serde(rename = "Agents", default)]
    pub agents: BTreeMap<String, String>,
}

impl SectionConfig {
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time_secs.map(Duration::from_secs)
    }

    /// Agent label table keyed by numeric unique id; malformed keys are skipped
    pub fn agent_labels(&self) -> HashMap<u32, String> {
        self.agents
            .iter()
            .filter_map(|(id, label)| {
                let hex = id.trim_start_matches("0x").trim_start_matches("0X");
                u32::from_str_radix(hex, 16)
                    .ok()
                    .map(|id| (id, label.clone()))
            })
            .collect()
    }
}

/// Parsed input document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InputDocument {
    #[serde(rename = "Version")]
    pub version: Option<String>,
    #[serde(rename = "DefaultState")]
    pub default_state: Option<String>,
    #[serde(rename = "MaxTimeInSec")]
    pub max_time_secs: Option<u64>,
    #[serde(rename = "crash_data", default)]
    pub sections: HashMap<String, SectionConfig>,
}

impl InputDocument {
    pub fn parse(raw: &str, path: &Path) -> Result<Self, InputError> {
        serde_json::from_str(raw).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn section(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.get(name)
    }

    pub fn max_time(&self) -> Option<Duration> {
        self.max_time_secs.map(Duration::from_secs)
    }

    /// Section enable bitmask for processors using this document
    pub fn enable_mask(&self) -> u64 {
        match self.default_state.as_deref() {
            Some("Disable") => return 0,
            Some("Enable") => {}
            other => warn!(
                default_state = ?other,
                "DefaultState missing or unrecognised, treating as enabled"
            ),
        }
        CATALOGUE.iter().fold(0u64, |mask, desc| {
            let enabled = self
                .section(desc.name)
                .and_then(|s| s.record_enable)
                .unwrap_or(true);
            if enabled {
                mask | (1u64 << desc.bit)
            } else {
                mask
            }
        })
    }
}

/// A document together with the file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedInput {
    pub path: PathBuf,
    pub document: InputDocument,
}

/// Which family of input files a run reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFileKind {
    Crashdump,
    Telemetry,
}

impl InputFileKind {
    pub fn file_name(&self, model: Model) -> String {
        match self {
            InputFileKind::Crashdump => format!("crashdump_input_{}.json", model.name()),
            InputFileKind::Telemetry => format!("telemetry_input_{}.json", model.name()),
        }
    }
}

/// Directories searched for input documents, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSearchPaths {
    pub override_dir: PathBuf,
    pub default_dir: PathBuf,
}

impl Default for InputSearchPaths {
    fn default() -> Self {
        Self {
            override_dir: PathBuf::from(OVERRIDE_INPUT_DIR),
            default_dir: PathBuf::from(DEFAULT_INPUT_DIR),
        }
    }
}

impl InputSearchPaths {
    /// Search only `dir`
    pub fn single(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            override_dir: dir.clone(),
            default_dir: dir,
        }
    }

    /// First existing candidate for a model's document
    pub fn find(&self, kind: InputFileKind, model: Model) -> Option<PathBuf> {
        let name = kind.file_name(model);
        [&self.override_dir, &self.default_dir]
            .into_iter()
            .map(|dir| dir.join(&name))
            .find(|p| p.is_file())
    }
}

/// Read and parse one input document
pub fn load_document(path: &Path) -> Result<InputDocument, InputError> {
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    InputDocument::parse(&raw, path)
}

/// Metadata value reported when an input document exists but cannot be used
pub const INPUT_FILE_ERROR: &str = "Error while reading input file";

/// Per-run cache of input documents, one per model
#[derive(Debug)]
pub struct InputConfigCache {
    paths: InputSearchPaths,
    kind: InputFileKind,
    entries: HashMap<Model, Option<Arc<LoadedInput>>>,
    /// Documents that were found but failed to read or parse
    failed: Vec<PathBuf>,
}

impl InputConfigCache {
    pub fn new(paths: InputSearchPaths, kind: InputFileKind) -> Self {
        Self {
            paths,
            kind,
            entries: HashMap::new(),
            failed: Vec::new(),
        }
    }

    /// Document for `model`, loading it on first use.
    ///
    /// A missing or unreadable document is cached as absent; an unreadable
    /// one is also remembered in [`InputConfigCache::load_errors`].
    pub fn load(&mut self, model: Model) -> Option<Arc<LoadedInput>> {
        let paths = &self.paths;
        let kind = self.kind;
        let failed = &mut self.failed;
        self.entries
            .entry(model)
            .or_insert_with(|| {
                let path = match paths.find(kind, model) {
                    Some(path) => path,
                    None => {
                        debug!(model = %model, "No input document, enabling all sections");
                        return None;
                    }
                };
                match load_document(&path) {
                    Ok(document) => {
                        debug!(model = %model, path = %path.display(), "Loaded input document");
                        Some(Arc::new(LoadedInput { path, document }))
                    }
                    Err(e) => {
                        warn!(model = %model, error = %e, "Failed to load input document");
                        failed.push(path);
                        None
                    }
                }
            })
            .clone()
    }

    /// Load the record's document and set its section enable mask
    pub fn load_config(&mut self, record: &mut CpuRecord) -> Option<Arc<LoadedInput>> {
        let model = record.model()?;
        let input = self.load(model);
        record.section_mask = input
            .as_ref()
            .map(|i| i.document.enable_mask())
            .unwrap_or_else(catalogue::all_sections_mask);
        input
    }

    /// Loaded document for `model`, without loading
    pub fn get(&self, model: Model) -> Option<Arc<LoadedInput>> {
        self.entries.get(&model).cloned().flatten()
    }

    /// Input documents that exist but could not be loaded
    pub fn load_errors(&self) -> &[PathBuf] {
        &self.failed
    }

    /// At most one distinct document was loaded
    pub fn is_unique(&self) -> bool {
        let distinct: HashSet<&PathBuf> = self
            .entries
            .values()
            .flatten()
            .map(|input| &input.path)
            .collect();
        distinct.len() <= 1
    }

    /// Any loaded document, for values reported once per dump
    pub fn first(&self) -> Option<Arc<LoadedInput>> {
        let mut loaded: Vec<&Arc<LoadedInput>> = self.entries.values().flatten().collect();
        loaded.sort_by(|a, b| a.path.cmp(&b.path));
        loaded.first().map(|input| Arc::clone(*input))
    }
}
