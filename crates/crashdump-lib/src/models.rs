//! Core data models for the crash-dump collector

use serde::{Deserialize, Serialize};
use std::fmt;

/// What caused a collection run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    OnDemand,
    PostReset,
    Ierr,
    Err2,
    Telemetry,
    Other(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::OnDemand => "On-Demand",
            TriggerType::PostReset => "PostReset",
            TriggerType::Ierr => "IERR",
            TriggerType::Err2 => "ERR2",
            TriggerType::Telemetry => "Telemetry",
            TriggerType::Other(s) => s,
        }
    }

    /// Whether this trigger only collects sections flagged for post-reset data
    pub fn is_post_reset(&self) -> bool {
        matches!(self, TriggerType::PostReset)
    }
}

impl From<&str> for TriggerType {
    fn from(s: &str) -> Self {
        match s {
            "On-Demand" => TriggerType::OnDemand,
            "PostReset" => TriggerType::PostReset,
            "IERR" => TriggerType::Ierr,
            "ERR2" => TriggerType::Err2,
            "Telemetry" => TriggerType::Telemetry,
            other => TriggerType::Other(other.to_string()),
        }
    }
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        TriggerType::from(s.as_str())
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one section for one processor or die
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Success,
    Failure,
    Disabled,
    SectionTimeout,
    GlobalTimeout,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Success => "success",
            SectionStatus::Failure => "failure",
            SectionStatus::Disabled => "disabled",
            SectionStatus::SectionTimeout => "section_timeout",
            SectionStatus::GlobalTimeout => "global_timeout",
        }
    }

    /// Whether the outcome counts against the run's failure ledger
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SectionStatus::Failure | SectionStatus::SectionTimeout | SectionStatus::GlobalTimeout
        )
    }

    fn severity(&self) -> u8 {
        match self {
            SectionStatus::Success | SectionStatus::Disabled => 0,
            SectionStatus::Failure => 1,
            SectionStatus::SectionTimeout => 2,
            SectionStatus::GlobalTimeout => 3,
        }
    }

    /// The more severe of two outcomes
    pub fn worst(self, other: SectionStatus) -> SectionStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Summary of a completed collection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub trigger: TriggerType,
    pub timestamp: String,
    pub cpus_collected: usize,
    pub section_failures: u32,
    pub global_timeout: bool,
    /// Whether the failures should be escalated as a collection failure
    pub collection_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,
}
