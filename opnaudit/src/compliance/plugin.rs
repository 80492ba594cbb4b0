use std::sync::Arc;

use opnsense_model::OpnSenseDocument;
use thiserror::Error;

use super::{Control, Finding, PluginInfo};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin '{plugin}' has no control '{id}'")]
    ControlNotFound { plugin: String, id: String },
    #[error("plugin '{plugin}' defines no controls")]
    NoControls { plugin: String },
    #[error("plugin '{plugin}' failed: {reason}")]
    External { plugin: String, reason: String },
}

/// A catalog of controls plus the logic that evaluates them.
///
/// `run_checks` must be a pure function of the document and must treat
/// missing sections conservatively. Built-in catalogs never return `Err`;
/// out-of-process plugins use it to report transport failures.
pub trait CompliancePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn description(&self) -> &str;
    fn run_checks(&self, doc: &OpnSenseDocument) -> Result<Vec<Finding>, PluginError>;
    fn controls(&self) -> &[Control];

    fn control_by_id(&self, id: &str) -> Result<&Control, PluginError> {
        self.controls()
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| PluginError::ControlNotFound {
                plugin: self.name().to_string(),
                id: id.to_string(),
            })
    }

    fn validate(&self) -> Result<(), PluginError> {
        if self.controls().is_empty() {
            return Err(PluginError::NoControls {
                plugin: self.name().to_string(),
            });
        }
        Ok(())
    }

    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
            controls: self.controls().to_vec(),
        }
    }
}

/// Link-time registration of a compiled-in plugin.
///
/// Each catalog submits one of these with `inventory::submit!`;
/// [`super::registry::PluginRegistry::with_builtin_plugins`] collects them.
pub struct BuiltinPlugin {
    pub name: &'static str,
    pub build: fn() -> Arc<dyn CompliancePlugin>,
}

inventory::collect!(BuiltinPlugin);

/// Every compiled-in plugin, sorted by name.
pub fn builtin_plugins() -> Vec<Arc<dyn CompliancePlugin>> {
    let mut entries = inventory::iter::<BuiltinPlugin>
        .into_iter()
        .collect::<Vec<_>>();
    entries.sort_by_key(|entry| entry.name);
    entries.into_iter().map(|entry| (entry.build)()).collect()
}
