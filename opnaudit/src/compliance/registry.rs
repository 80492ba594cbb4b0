//! Plugin registry and compliance check runs.
//!
//! The registry is the only shared mutable state in the engine. A single
//! `RwLock` guards the plugin map: check runs take the read side, and
//! registration (including directory loading) takes the write side.
//!
//! ## Check runs
//!
//! [`PluginRegistry::run_compliance_checks`] resolves every requested name
//! under one read guard before evaluating anything, so an unknown name
//! fails the whole call with no partial result. Each plugin then runs in
//! isolation: an `Err` or a panic is recorded in
//! [`ComplianceResult::plugin_errors`] and the remaining plugins still
//! report.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use opnsense_model::OpnSenseDocument;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::external::discover_external_plugins;
use super::plugin::{builtin_plugins, CompliancePlugin, PluginError};
use super::{ComplianceResult, ComplianceSummary, Finding};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin '{name}' is not registered (available: {available})")]
    NotFound { name: String, available: String },
    #[error("plugin '{name}' failed validation: {source}")]
    Validation { name: String, source: PluginError },
    #[error("plugin '{name}' is already registered")]
    Duplicate { name: String },
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, Arc<dyn CompliancePlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every compiled-in catalog.
    pub fn with_builtin_plugins() -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.register_all(builtin_plugins())?;
        Ok(registry)
    }

    /// Register plugins from an explicit startup list, stopping at the
    /// first rejection.
    pub fn register_all(
        &self,
        plugins: impl IntoIterator<Item = Arc<dyn CompliancePlugin>>,
    ) -> Result<(), RegistryError> {
        for plugin in plugins {
            self.register_plugin(plugin)?;
        }
        Ok(())
    }

    /// Add a plugin. Plugins without controls and duplicate names are
    /// rejected; an existing registration is never replaced.
    pub fn register_plugin(&self, plugin: Arc<dyn CompliancePlugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        plugin
            .validate()
            .map_err(|source| RegistryError::Validation {
                name: name.clone(),
                source,
            })?;

        let mut plugins = self.write();
        if plugins.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        debug!(plugin = %name, version = plugin.version(), "registered compliance plugin");
        plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get_plugin(&self, name: &str) -> Result<Arc<dyn CompliancePlugin>, RegistryError> {
        let plugins = self.read();
        lookup(&plugins, name)
    }

    /// Registered plugin names, sorted.
    pub fn list_plugins(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Register out-of-process plugins found in `dir`.
    ///
    /// Best effort: a missing directory means no plugins, and any candidate
    /// that fails to describe itself or to register is logged and skipped.
    /// Returns the number of plugins added.
    pub fn load_dynamic_plugins(&self, dir: &Path) -> usize {
        let mut loaded = 0;
        for plugin in discover_external_plugins(dir) {
            let name = plugin.name().to_string();
            let path = plugin.path().to_path_buf();
            match self.register_plugin(Arc::new(plugin)) {
                Ok(()) => {
                    info!(plugin = %name, path = %path.display(), "loaded external plugin");
                    loaded += 1;
                }
                Err(err) => warn!(plugin = %name, error = %err, "skipping external plugin"),
            }
        }
        loaded
    }

    /// Run the named plugins against `doc`.
    ///
    /// Every control starts compliant and flips when a finding references
    /// it. Unknown names fail the call before any plugin runs. A name listed
    /// twice runs once.
    pub fn run_compliance_checks(
        &self,
        doc: &OpnSenseDocument,
        names: &[String],
    ) -> Result<ComplianceResult, RegistryError> {
        let mut seen = BTreeSet::new();
        let selected = {
            let plugins = self.read();
            names
                .iter()
                .filter(|name| seen.insert(name.as_str()))
                .map(|name| lookup(&plugins, name))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut result = ComplianceResult::default();
        for plugin in selected {
            let name = plugin.name().to_string();
            result.plugin_info.insert(name.clone(), plugin.info());

            let findings = match run_isolated(plugin.as_ref(), doc) {
                Ok(findings) => findings,
                Err(reason) => {
                    warn!(plugin = %name, %reason, "compliance plugin failed");
                    result.plugin_errors.insert(name, reason);
                    continue;
                }
            };

            let mut controls = plugin
                .controls()
                .iter()
                .map(|c| (c.id.clone(), true))
                .collect::<BTreeMap<_, _>>();
            for finding in &findings {
                for id in &finding.references {
                    match controls.get_mut(id) {
                        Some(compliant) => *compliant = false,
                        None => debug!(plugin = %name, control = %id, "finding references unknown control"),
                    }
                }
            }
            result.compliance.insert(name, controls);
            result.findings.extend(findings);
        }

        result.summary = ComplianceSummary::compute(&result.findings, &result.compliance);
        Ok(result)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn CompliancePlugin>>> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn CompliancePlugin>>> {
        self.plugins.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lookup(
    plugins: &BTreeMap<String, Arc<dyn CompliancePlugin>>,
    name: &str,
) -> Result<Arc<dyn CompliancePlugin>, RegistryError> {
    plugins
        .get(name)
        .cloned()
        .ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
            available: plugins.keys().cloned().collect::<Vec<_>>().join(", "),
        })
}

fn run_isolated(plugin: &dyn CompliancePlugin, doc: &OpnSenseDocument) -> Result<Vec<Finding>, String> {
    match catch_unwind(AssertUnwindSafe(|| plugin.run_checks(doc))) {
        Ok(Ok(findings)) => Ok(findings),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return format!("panicked: {msg}");
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return format!("panicked: {msg}");
    }
    "panicked".to_string()
}
