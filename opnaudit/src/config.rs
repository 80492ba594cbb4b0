use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Audit defaults read from TOML. Command-line flags override each field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSettings {
    pub default_mode: String,
    pub plugins: Vec<String>,
    pub plugin_dir: Option<PathBuf>,
    pub template_dir: Option<PathBuf>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            default_mode: "standard".to_string(),
            plugins: vec!["firewall".to_string(), "stig".to_string(), "sans".to_string()],
            plugin_dir: None,
            template_dir: None,
        }
    }
}

/// Errors returned when loading settings files.
#[derive(Debug, Error)]
pub enum SettingsLoadError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load settings from a TOML file. Absent keys keep their defaults.
pub fn load_settings(path: &Path) -> Result<AuditSettings, SettingsLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| SettingsLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_settings(&raw, path.display().to_string())
}

/// Settings shipped with the binary.
pub fn default_settings() -> AuditSettings {
    let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/defaults.toml"));
    match parse_settings(embedded, "embedded defaults".to_string()) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "embedded defaults unusable, using built-in values");
            AuditSettings::default()
        }
    }
}

fn parse_settings(raw: &str, path: String) -> Result<AuditSettings, SettingsLoadError> {
    toml::from_str(raw).map_err(|source| SettingsLoadError::Parse { path, source })
}
