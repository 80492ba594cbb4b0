//! Built-in compliance catalogs.
//!
//! Each catalog pairs a fixed list of [`Control`]s with one check per
//! control. Catalogs are built once when the plugin is constructed and
//! never change afterwards. They register themselves with `inventory`, so
//! linking this crate is enough for
//! [`crate::compliance::registry::PluginRegistry::with_builtin_plugins`]
//! to find them.

pub mod firewall;
pub mod sans;
pub mod stig;

use opnsense_model::OpnSenseDocument;

use crate::compliance::{Control, Finding};

/// Outcome of one control check: `Err` carries evidence for the finding.
pub(crate) type Verdict = Result<(), String>;

pub(crate) struct Check {
    pub control: Control,
    /// Section of the configuration the control concerns.
    pub component: &'static str,
    pub evaluate: fn(&OpnSenseDocument) -> Verdict,
}

pub(crate) struct Catalog {
    controls: Vec<Control>,
    checks: Vec<(&'static str, fn(&OpnSenseDocument) -> Verdict)>,
}

impl Catalog {
    pub fn new(checks: Vec<Check>) -> Self {
        let mut controls = Vec::with_capacity(checks.len());
        let mut evaluators = Vec::with_capacity(checks.len());
        for check in checks {
            controls.push(check.control);
            evaluators.push((check.component, check.evaluate));
        }
        Self {
            controls,
            checks: evaluators,
        }
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// One finding per failed control, in catalog order.
    pub fn evaluate(&self, doc: &OpnSenseDocument) -> Vec<Finding> {
        self.controls
            .iter()
            .zip(&self.checks)
            .filter_map(|(control, (component, evaluate))| {
                let evidence = evaluate(doc).err()?;
                let mut finding = Finding::for_control(control, component);
                if !evidence.is_empty() {
                    finding.description = format!("{} Evidence: {evidence}", control.description);
                }
                Some(finding)
            })
            .collect()
    }
}

/// `Ok` when `condition` holds, otherwise `Err(evidence)`.
pub(crate) fn require(condition: bool, evidence: impl FnOnce() -> String) -> Verdict {
    if condition {
        Ok(())
    } else {
        Err(evidence())
    }
}
