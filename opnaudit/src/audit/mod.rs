//! Audit report generation.
//!
//! A report is produced in one of three modes:
//!
//! - **standard** — descriptive inventory of the configuration
//! - **blue** — defensive review driven by the compliance plugins
//! - **red** — exposure and attack-surface enumeration
//!
//! [`controller::ModeController`] validates a [`ModeConfig`], builds an
//! empty [`Report`] and runs the analysis steps for the requested mode.
//! Reports borrow the configuration they describe; field names are the
//! contract with renderers and must stay stable.

pub mod analysis;
pub mod controller;

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use opnsense_model::OpnSenseDocument;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::compliance::{ComplianceResult, Finding};

/// Key under which blue mode stores the plugin compliance result.
pub const PLUGIN_COMPLIANCE_KEY: &str = "plugins";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    #[default]
    Standard,
    Blue,
    Red,
}

impl ReportMode {
    pub const ALL: [ReportMode; 3] = [ReportMode::Standard, ReportMode::Blue, ReportMode::Red];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Standard => "standard",
            ReportMode::Blue => "blue",
            ReportMode::Red => "red",
        }
    }
}

impl Display for ReportMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ReportMode::Standard),
            "blue" | "defensive" => Ok(ReportMode::Blue),
            "red" | "offensive" => Ok(ReportMode::Red),
            _ => Err(AuditError::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("unknown report mode '{0}' (expected standard, blue or red)")]
    UnknownMode(String),
    #[error("plugin names must not be empty or whitespace")]
    EmptyPluginName,
    #[error("plugin '{name}' is not registered (available: {available})")]
    UnknownPlugin { name: String, available: String },
}

/// A report request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeConfig {
    pub mode: ReportMode,
    /// Add red-team commentary (red mode only).
    pub blackhat: bool,
    /// Include per-item detail tables.
    pub comprehensive: bool,
    pub selected_plugins: Vec<String>,
    pub template_dir: Option<PathBuf>,
}

impl ModeConfig {
    pub fn new(mode: ReportMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_plugins<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_plugins = plugins.into_iter().map(Into::into).collect();
        self
    }
}

/// Split a comma-separated plugin selection, dropping blanks.
pub fn parse_plugin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub mode: ReportMode,
    pub blackhat: bool,
    pub comprehensive: bool,
    pub configuration: &'a OpnSenseDocument,
    pub findings: Vec<Finding>,
    pub compliance: BTreeMap<String, ComplianceResult>,
    pub metadata: BTreeMap<String, Value>,
}

impl<'a> Report<'a> {
    pub fn new(configuration: &'a OpnSenseDocument, config: &ModeConfig) -> Self {
        Self {
            mode: config.mode,
            blackhat: config.blackhat,
            comprehensive: config.comprehensive,
            configuration,
            findings: Vec::new(),
            compliance: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}
