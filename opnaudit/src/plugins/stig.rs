//! DoD firewall STIG technical controls.

use std::sync::Arc;

use opnsense_model::OpnSenseDocument;

use super::{require, Catalog, Check, Verdict};
use crate::compliance::plugin::{BuiltinPlugin, CompliancePlugin, PluginError};
use crate::compliance::rules::{
    has_default_deny, is_overly_permissive, logging_status, unnecessary_services,
};
use crate::compliance::{Control, Finding, Severity};

pub const NAME: &str = "stig";

pub struct StigPlugin {
    catalog: Catalog,
}

impl StigPlugin {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(checks()),
        }
    }
}

impl Default for StigPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CompliancePlugin for StigPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Firewall Security Technical Implementation Guide technical controls"
    }

    fn run_checks(&self, doc: &OpnSenseDocument) -> Result<Vec<Finding>, PluginError> {
        Ok(self.catalog.evaluate(doc))
    }

    fn controls(&self) -> &[Control] {
        self.catalog.controls()
    }
}

fn build() -> Arc<dyn CompliancePlugin> {
    Arc::new(StigPlugin::new())
}

inventory::submit! {
    BuiltinPlugin { name: NAME, build }
}

fn checks() -> Vec<Check> {
    vec![
        Check {
            control: Control::new(
                "V-206694",
                "Firewall must deny network communications traffic by default",
                Severity::High,
            )
            .with_category("Default Deny Policy")
            .with_description(
                "The firewall must deny traffic by default and allow traffic by exception.",
            )
            .with_rationale("Permit-by-default leaves every unanticipated flow open.")
            .with_remediation(
                "Add an explicit block rule and remove any pass rule matching any source to any destination.",
            )
            .with_tags(&["default-deny", "firewall-rules", "stig"])
            .with_reference("SRG-NET-000202-FW-000039"),
            component: "filter",
            evaluate: default_deny,
        },
        Check {
            control: Control::new(
                "V-206674",
                "Firewall must filter traffic on specific packet attributes",
                Severity::High,
            )
            .with_category("Packet Filtering")
            .with_description(
                "Rules must restrict traffic by specific source, destination and port instead of broad ranges.",
            )
            .with_rationale("Broad rules defeat the purpose of a filtering boundary.")
            .with_remediation(
                "Narrow pass rules to specific networks and destination ports.",
            )
            .with_tags(&["packet-filtering", "firewall-rules", "stig"])
            .with_reference("SRG-NET-000364-FW-000031"),
            component: "filter",
            evaluate: specific_filtering,
        },
        Check {
            control: Control::new(
                "V-206690",
                "Firewall must prohibit unnecessary services",
                Severity::Medium,
            )
            .with_category("Unnecessary Services")
            .with_description(
                "Services not required for the firewall's mission must be disabled.",
            )
            .with_rationale("Every enabled service is an additional attack vector on the boundary device.")
            .with_remediation(
                "Disable SNMP communities, DNSSEC stripping, surplus DHCP scopes and unused load balancer monitors.",
            )
            .with_tags(&["services", "attack-surface", "stig"])
            .with_reference("SRG-NET-000131-FW-000019"),
            component: "services",
            evaluate: no_unnecessary_services,
        },
        Check {
            control: Control::new(
                "V-206682",
                "Firewall must generate traffic log entries",
                Severity::Medium,
            )
            .with_category("Logging")
            .with_description(
                "The firewall must send system and authentication events to central logging.",
            )
            .with_rationale("Without logs, incidents at the boundary cannot be detected or reconstructed.")
            .with_remediation(
                "Enable remote syslog with system and authentication categories.",
            )
            .with_tags(&["logging", "audit", "stig"])
            .with_reference("SRG-NET-000074-FW-000009"),
            component: "syslog",
            evaluate: comprehensive_logging,
        },
    ]
}

fn default_deny(doc: &OpnSenseDocument) -> Verdict {
    require(has_default_deny(&doc.filter.rules), || {
        "no explicit block rule, or a pass rule matches any to any".to_string()
    })
}

fn specific_filtering(doc: &OpnSenseDocument) -> Verdict {
    let offender = doc
        .filter
        .rules
        .iter()
        .filter(|r| r.is_allow())
        .position(is_overly_permissive);
    match offender {
        None => Ok(()),
        Some(idx) => Err(format!("pass rule #{} is overly permissive", idx + 1)),
    }
}

fn no_unnecessary_services(doc: &OpnSenseDocument) -> Verdict {
    let reasons = unnecessary_services(doc);
    require(reasons.is_empty(), || reasons.join("; "))
}

fn comprehensive_logging(doc: &OpnSenseDocument) -> Verdict {
    let status = logging_status(doc);
    require(status.is_compliant(), || {
        format!("logging coverage is {}", status.as_str())
    })
}
