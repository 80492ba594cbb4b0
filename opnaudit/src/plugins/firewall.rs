//! General firewall hardening catalog.

use std::sync::Arc;

use opnsense_model::{OpnSenseDocument, DEFAULT_HOSTNAME};

use super::{require, Catalog, Check, Verdict};
use crate::compliance::plugin::{BuiltinPlugin, CompliancePlugin, PluginError};
use crate::compliance::{Control, Finding, Severity};

pub const NAME: &str = "firewall";

pub struct FirewallPlugin {
    catalog: Catalog,
}

impl FirewallPlugin {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(checks()),
        }
    }
}

impl Default for FirewallPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CompliancePlugin for FirewallPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "General firewall hardening controls for OPNsense deployments"
    }

    fn run_checks(&self, doc: &OpnSenseDocument) -> Result<Vec<Finding>, PluginError> {
        Ok(self.catalog.evaluate(doc))
    }

    fn controls(&self) -> &[Control] {
        self.catalog.controls()
    }
}

fn build() -> Arc<dyn CompliancePlugin> {
    Arc::new(FirewallPlugin::new())
}

inventory::submit! {
    BuiltinPlugin { name: NAME, build }
}

fn checks() -> Vec<Check> {
    vec![
        Check {
            control: Control::new("FIREWALL-001", "SSH Warning Banner", Severity::Medium)
                .with_category("Access Control")
                .with_description("SSH access should present a warning banner before authentication.")
                .with_rationale("Banners establish the legal basis for monitoring and prosecuting misuse.")
                .with_remediation("Configure an SSH login banner under System > Settings > Administration.")
                .with_tags(&["ssh", "banner", "access-control"]),
            component: "system.ssh",
            evaluate: ssh_banner,
        },
        Check {
            control: Control::new("FIREWALL-002", "Auto Configuration Backup", Severity::Medium)
                .with_category("Backup and Recovery")
                .with_description("Configuration changes should be backed up automatically off-box.")
                .with_rationale("Without automatic backups a failed device cannot be rebuilt to its last known state.")
                .with_remediation("Enable an automatic backup provider (for example Google Drive or Nextcloud).")
                .with_tags(&["backup", "recovery"]),
            component: "backup",
            evaluate: auto_backup,
        },
        Check {
            control: Control::new("FIREWALL-003", "Message of the Day", Severity::Low)
                .with_category("Access Control")
                .with_description("Console and shell logins should display a message of the day.")
                .with_rationale("A login notice informs operators of acceptable use before they act.")
                .with_remediation("Set a message of the day in the system settings.")
                .with_tags(&["motd", "banner"]),
            component: "system.motd",
            evaluate: motd,
        },
        Check {
            control: Control::new("FIREWALL-004", "Hostname Configuration", Severity::Low)
                .with_category("System Configuration")
                .with_description("The device should carry a unique, non-default hostname.")
                .with_rationale("Default hostnames make logs and alerts ambiguous across a fleet.")
                .with_remediation("Set a descriptive hostname under System > Settings > General.")
                .with_tags(&["hostname", "identity"]),
            component: "system.hostname",
            evaluate: hostname,
        },
        Check {
            control: Control::new("FIREWALL-005", "DNS Server Configuration", Severity::Low)
                .with_category("Network Configuration")
                .with_description("Upstream DNS servers should be configured explicitly.")
                .with_rationale("Relying on servers handed out by the ISP leaves name resolution outside administrative control.")
                .with_remediation("Add trusted DNS servers under System > Settings > General.")
                .with_tags(&["dns", "network"]),
            component: "system.dns_servers",
            evaluate: dns_servers,
        },
        Check {
            control: Control::new("FIREWALL-006", "IPv6 Disablement", Severity::Medium)
                .with_category("Network Configuration")
                .with_description("IPv6 should be disabled unless the network requires it.")
                .with_rationale("An unused protocol stack is attack surface that rarely receives the same filtering attention.")
                .with_remediation("Untick 'Allow IPv6' under Firewall > Settings > Advanced if IPv6 is not used.")
                .with_tags(&["ipv6", "network"]),
            component: "system.ipv6_allow",
            evaluate: ipv6_disabled,
        },
        Check {
            control: Control::new("FIREWALL-007", "DNS Rebind Check", Severity::Low)
                .with_category("DNS Security")
                .with_description("The web interface should keep the DNS rebinding check enabled.")
                .with_rationale("The check blocks DNS rebinding attacks against the management interface.")
                .with_remediation("Clear 'Disable DNS Rebinding Checks' under System > Settings > Administration.")
                .with_tags(&["dns", "webgui"]),
            component: "system.webgui",
            evaluate: dns_rebind_check,
        },
        Check {
            control: Control::new("FIREWALL-008", "HTTPS Web Management", Severity::High)
                .with_category("Management Access")
                .with_description("The web interface should only be served over HTTPS.")
                .with_rationale("Plain HTTP exposes administrator credentials and session cookies on the wire.")
                .with_remediation("Set the web GUI protocol to HTTPS under System > Settings > Administration.")
                .with_tags(&["https", "webgui", "encryption"]),
            component: "system.webgui",
            evaluate: https_management,
        },
    ]
}

fn ssh_banner(doc: &OpnSenseDocument) -> Verdict {
    let ssh = &doc.system.ssh;
    require(!ssh.enabled || !ssh.banner.trim().is_empty(), || {
        "SSH is enabled without a login banner".to_string()
    })
}

fn auto_backup(doc: &OpnSenseDocument) -> Verdict {
    require(doc.backup.is_automatic(), || {
        "no automatic backup provider is enabled".to_string()
    })
}

fn motd(doc: &OpnSenseDocument) -> Verdict {
    require(!doc.system.motd.trim().is_empty(), String::new)
}

fn hostname(doc: &OpnSenseDocument) -> Verdict {
    let name = doc.system.hostname.trim();
    if name.is_empty() {
        return Err("no hostname is configured".to_string());
    }
    require(!name.eq_ignore_ascii_case(DEFAULT_HOSTNAME), || {
        format!("hostname is still the default '{name}'")
    })
}

fn dns_servers(doc: &OpnSenseDocument) -> Verdict {
    require(!doc.system.dns_servers.is_empty(), || {
        "no DNS servers are configured".to_string()
    })
}

fn ipv6_disabled(doc: &OpnSenseDocument) -> Verdict {
    require(!doc.system.ipv6_allow, || "IPv6 traffic is allowed".to_string())
}

fn dns_rebind_check(doc: &OpnSenseDocument) -> Verdict {
    require(!doc.system.webgui.no_dns_rebind_check, || {
        "DNS rebinding checks are disabled".to_string()
    })
}

fn https_management(doc: &OpnSenseDocument) -> Verdict {
    let protocol = doc.system.webgui.protocol.as_str();
    require(protocol == "https", || {
        if protocol.is_empty() {
            "web GUI protocol is not set".to_string()
        } else {
            format!("web GUI is served over {protocol}")
        }
    })
}
