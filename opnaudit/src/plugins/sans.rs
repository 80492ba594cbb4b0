//! Vendor-neutral firewall checklist in the style of the SANS firewall
//! audit guidance.

use std::sync::Arc;

use opnsense_model::OpnSenseDocument;

use super::{require, Catalog, Check, Verdict};
use crate::compliance::plugin::{BuiltinPlugin, CompliancePlugin, PluginError};
use crate::compliance::rules::{
    has_default_deny, has_overly_permissive_rules, has_zone_separation, logging_status,
};
use crate::compliance::{Control, Finding, Severity};

pub const NAME: &str = "sans";

pub struct SansPlugin {
    catalog: Catalog,
}

impl SansPlugin {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(checks()),
        }
    }
}

impl Default for SansPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CompliancePlugin for SansPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Vendor-neutral firewall checklist controls"
    }

    fn run_checks(&self, doc: &OpnSenseDocument) -> Result<Vec<Finding>, PluginError> {
        Ok(self.catalog.evaluate(doc))
    }

    fn controls(&self) -> &[Control] {
        self.catalog.controls()
    }
}

fn build() -> Arc<dyn CompliancePlugin> {
    Arc::new(SansPlugin::new())
}

inventory::submit! {
    BuiltinPlugin { name: NAME, build }
}

fn checks() -> Vec<Check> {
    vec![
        Check {
            control: Control::new("SANS-FW-001", "Default Deny Policy", Severity::High)
                .with_category("Access Control")
                .with_description("Traffic not explicitly permitted must be denied.")
                .with_rationale("A deny-all baseline limits exposure to flows that were deliberately allowed.")
                .with_remediation("Finish each rule set with a block rule and remove any-to-any pass rules.")
                .with_tags(&["default-deny", "sans"]),
            component: "filter",
            evaluate: |doc| {
                require(has_default_deny(&doc.filter.rules), || {
                    "default-deny posture not established".to_string()
                })
            },
        },
        Check {
            control: Control::new("SANS-FW-002", "Explicit Rule Configuration", Severity::Medium)
                .with_category("Rule Management")
                .with_description("Every pass rule should name specific sources, destinations and ports.")
                .with_rationale("Explicit rules are reviewable; broad ones hide unintended access.")
                .with_remediation("Replace broad or port-less pass rules with specific ones.")
                .with_tags(&["firewall-rules", "sans"]),
            component: "filter",
            evaluate: |doc| {
                require(!has_overly_permissive_rules(&doc.filter.rules), || {
                    "at least one pass rule is overly permissive".to_string()
                })
            },
        },
        Check {
            control: Control::new("SANS-FW-003", "Network Zone Separation", Severity::High)
                .with_category("Network Segmentation")
                .with_description("External and internal networks must be separate zones with controlled paths between them.")
                .with_rationale("Flat networks let a single compromise spread unchecked.")
                .with_remediation("Use dedicated interfaces per zone and restrict WAN pass rules to specific ports.")
                .with_tags(&["segmentation", "zones", "sans"]),
            component: "interfaces",
            evaluate: zone_separation,
        },
        Check {
            control: Control::new("SANS-FW-004", "Comprehensive Logging", Severity::Medium)
                .with_category("Logging and Monitoring")
                .with_description("System and authentication events must reach central logging.")
                .with_rationale("Centralised logs are required for detection and forensics.")
                .with_remediation("Enable remote syslog including system and authentication events.")
                .with_tags(&["logging", "sans"]),
            component: "syslog",
            evaluate: |doc| {
                let status = logging_status(doc);
                require(status.is_compliant(), || {
                    format!("logging coverage is {}", status.as_str())
                })
            },
        },
    ]
}

fn zone_separation(doc: &OpnSenseDocument) -> Verdict {
    require(has_zone_separation(doc), || {
        let internal = doc
            .interfaces
            .iter()
            .filter(|i| !i.name.to_ascii_lowercase().starts_with("wan"))
            .count();
        if doc.interfaces.len() < 2 {
            format!("only {} interface(s) configured", doc.interfaces.len())
        } else if internal == 0 {
            "no internal network zone configured".to_string()
        } else {
            "a WAN pass rule reaches an internal network without port restriction".to_string()
        }
    })
}
