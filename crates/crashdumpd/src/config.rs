//! Daemon configuration

use anyhow::{Context, Result};
use crashdump_lib::input::{InputSearchPaths, DEFAULT_INPUT_DIR, OVERRIDE_INPUT_DIR};
use crashdump_lib::store::{LogStore, DEFAULT_MAX_STORED_LOGS, DEFAULT_OUTPUT_DIR};
use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration, read from `CRASHDUMP_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// API server port for the control surface, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding the shipped input documents
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory searched first for replacement input documents
    #[serde(default = "default_override_input_dir")]
    pub override_input_dir: PathBuf,

    /// Where crash-dump logs are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_max_stored_logs")]
    pub max_stored_logs: usize,

    /// Scripted bus description to answer transactions from
    #[serde(default)]
    pub bus_fixture: Option<PathBuf>,

    /// Reported as `platform_name` in every document
    #[serde(default = "default_platform_name")]
    pub platform_name: String,

    /// Discover processors at startup instead of on the first trigger
    #[serde(default = "default_startup_discovery")]
    pub startup_discovery: bool,
}

fn default_api_port() -> u16 {
    8080
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT_DIR)
}

fn default_override_input_dir() -> PathBuf {
    PathBuf::from(OVERRIDE_INPUT_DIR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_max_stored_logs() -> usize {
    DEFAULT_MAX_STORED_LOGS
}

fn default_platform_name() -> String {
    "unknown".to_string()
}

fn default_startup_discovery() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            input_dir: default_input_dir(),
            override_input_dir: default_override_input_dir(),
            output_dir: default_output_dir(),
            max_stored_logs: default_max_stored_logs(),
            bus_fixture: None,
            platform_name: default_platform_name(),
            startup_discovery: default_startup_discovery(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CRASHDUMP"))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("invalid CRASHDUMP_ configuration")
    }

    pub fn input_paths(&self) -> InputSearchPaths {
        InputSearchPaths {
            override_dir: self.override_input_dir.clone(),
            default_dir: self.input_dir.clone(),
        }
    }

    pub fn log_store(&self) -> LogStore {
        LogStore::new(&self.output_dir, self.max_stored_logs)
    }
}
