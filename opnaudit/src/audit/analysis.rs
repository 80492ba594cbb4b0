//! Analysis steps that populate report metadata.
//!
//! Each step reads the borrowed configuration and writes a handful of
//! metadata keys. Standard steps only extract facts; blue and red steps
//! interpret them. Steps run in the fixed order of their step table.

use std::collections::{BTreeMap, BTreeSet};

use opnsense_model::{OpnSenseDocument, Rule};
use serde_json::{json, Value};

use super::Report;
use crate::compliance::rules::{
    has_default_deny, has_overly_permissive_rules, logging_status, unnecessary_services,
    LoggingStatus,
};
use crate::compliance::{AttackSurface, Finding, Severity};

pub type Step = fn(&mut Report<'_>);

pub const STANDARD_STEPS: &[(&str, Step)] = &[
    ("system_identity", system_identity),
    ("interfaces", interfaces),
    ("firewall_rules", firewall_rules),
    ("nat", nat),
    ("dhcp", dhcp),
    ("certificates", certificates),
    ("vpn", vpn),
    ("static_routes", static_routes),
    ("high_availability", high_availability),
];

/// Run after the compliance pass.
pub const BLUE_STEPS: &[(&str, Step)] = &[
    ("security_analysis", security_analysis),
    ("compliance_analysis", compliance_analysis),
    ("recommendations", recommendations),
    ("tables", tables),
];

pub const RED_STEPS: &[(&str, Step)] = &[
    ("exposure", exposure),
    ("attack_surface", attack_surface),
    ("enumeration", enumeration),
];

fn system_identity(report: &mut Report<'_>) {
    let doc = report.configuration;
    report.set("hostname", doc.system.hostname.as_str());
    report.set("domain", doc.system.domain.as_str());
    report.set("platform", doc.platform.as_str());
    report.set("version", doc.version.as_str());
    report.set("timezone", doc.system.timezone.as_str());
}

fn interfaces(report: &mut Report<'_>) {
    let doc = report.configuration;
    report.set("interface_count", doc.interfaces.len());
    report.set(
        "enabled_interface_count",
        doc.interfaces.iter().filter(|i| i.enabled).count(),
    );
    if report.comprehensive {
        let rows = doc
            .interfaces
            .iter()
            .map(|i| {
                json!({
                    "name": i.name,
                    "device": i.if_name,
                    "description": i.description,
                    "enabled": i.enabled,
                    "address": i.ip_address,
                    "subnet": i.subnet,
                })
            })
            .collect::<Vec<_>>();
        report.set("interface_table", rows);
    }
}

fn firewall_rules(report: &mut Report<'_>) {
    let doc = report.configuration;
    let rules = &doc.filter.rules;
    report.set("firewall_rule_count", rules.len());
    report.set("pass_rule_count", rules.iter().filter(|r| r.is_allow()).count());
    report.set("block_rule_count", rules.iter().filter(|r| r.is_block()).count());
    if report.comprehensive {
        let rows = rules.iter().map(rule_row).collect::<Vec<_>>();
        report.set("rule_table", rows);
    }
}

fn nat(report: &mut Report<'_>) {
    let doc = report.configuration;
    let nat = &doc.nat;
    let mode = if nat.outbound_mode.is_empty() {
        "automatic"
    } else {
        nat.outbound_mode.as_str()
    };
    report.set("nat_mode", mode);
    report.set("port_forward_count", nat.port_forwards);
}

fn dhcp(report: &mut Report<'_>) {
    let doc = report.configuration;
    let enabled = doc.dhcp_enabled_interfaces();
    report.set("dhcp_enabled", !enabled.is_empty());
    report.set("dhcp_interface_count", enabled.len());
    report.set(
        "dhcp_interfaces",
        enabled.into_iter().map(str::to_string).collect::<Vec<_>>(),
    );
}

fn certificates(report: &mut Report<'_>) {
    let doc = report.configuration;
    report.set("has_certificates", !doc.certificates.is_empty());
    report.set("certificate_count", doc.certificates.len());
    report.set("ca_count", doc.cas.len());
}

fn vpn(report: &mut Report<'_>) {
    let doc = report.configuration;
    let vpn = &doc.openvpn;
    report.set("vpn_server_count", vpn.servers.len());
    report.set("vpn_client_count", vpn.clients.len());
    report.set("has_vpn", !vpn.servers.is_empty() || !vpn.clients.is_empty());
}

fn static_routes(report: &mut Report<'_>) {
    report.set(
        "static_route_count",
        report.configuration.static_routes.len(),
    );
}

fn high_availability(report: &mut Report<'_>) {
    let doc = report.configuration;
    let ha = &doc.ha_sync;
    report.set("ha_sync_configured", ha.is_configured());
    if ha.is_configured() {
        report.set("ha_pfsync_interface", ha.pfsync_interface.as_str());
        report.set("ha_sync_peer", ha.sync_to_ip.as_str());
    }
}

fn security_analysis(report: &mut Report<'_>) {
    let doc = report.configuration;
    let status = logging_status(doc);
    report.set("default_deny", has_default_deny(&doc.filter.rules));
    report.set(
        "overly_permissive_rules",
        has_overly_permissive_rules(&doc.filter.rules),
    );
    report.set("logging_status", status.as_str());
    report.set("unnecessary_services", unnecessary_services(doc));
}

fn compliance_analysis(report: &mut Report<'_>) {
    let mut plugins = 0;
    let mut controls = 0;
    let mut flagged = Vec::new();
    for result in report.compliance.values() {
        plugins += result.summary.plugin_count;
        controls += result
            .summary
            .plugin_summaries
            .values()
            .map(|s| s.total_controls)
            .sum::<usize>();
        flagged.extend(
            result
                .non_compliant_controls()
                .into_iter()
                .map(|(plugin, id)| format!("{plugin}:{id}")),
        );
    }
    report.set("compliance_plugin_count", plugins);
    report.set("compliance_control_count", controls);
    report.set("non_compliant_control_count", flagged.len());
    report.set("non_compliant_controls", flagged);
}

fn recommendations(report: &mut Report<'_>) {
    let mut out = report
        .findings
        .iter()
        .map(|f| f.recommendation.trim())
        .filter(|r| !r.is_empty())
        .map(ToOwned::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    if logging_status(report.configuration) == LoggingStatus::UnableToDetermine {
        out.push(
            "Per-rule logging is not visible in the configuration model; review rule log flags manually."
                .to_string(),
        );
    }
    report.set("recommendations", out);
}

fn tables(report: &mut Report<'_>) {
    let mut by_severity = BTreeMap::new();
    for finding in &report.findings {
        let key = finding.severity.map_or("unrated", Severity::as_str);
        *by_severity.entry(key).or_insert(0usize) += 1;
    }
    report.set("findings_by_severity", json!(by_severity));

    if report.comprehensive {
        let mut rows = Vec::new();
        for result in report.compliance.values() {
            for (plugin, controls) in &result.compliance {
                let Some(info) = result.plugin_info.get(plugin) else {
                    continue;
                };
                for control in &info.controls {
                    rows.push(json!({
                        "plugin": plugin,
                        "id": control.id,
                        "title": control.title,
                        "severity": control.severity,
                        "compliant": controls.get(&control.id).copied().unwrap_or(true),
                    }));
                }
            }
        }
        report.set("control_table", rows);
    }
}

fn exposure(report: &mut Report<'_>) {
    let doc = report.configuration;
    let wan = doc
        .wan_interfaces()
        .into_iter()
        .map(|i| i.name.clone())
        .collect::<Vec<_>>();
    let inbound = wan_pass_rules(report).count();
    let blocks_private = doc.wan_interfaces().iter().all(|i| i.block_private);
    // Nothing to assert about private ranges without a WAN.
    if !wan.is_empty() {
        report.set("wan_blocks_private", blocks_private);
    }
    report.set("wan_interfaces", wan);
    report.set("wan_pass_rule_count", inbound);
}

/// One exposure finding per enabled pass rule on a WAN interface.
fn attack_surface(report: &mut Report<'_>) {
    let mut ports = BTreeSet::new();
    let findings = wan_pass_rules(report)
        .map(|rule| {
            let port = rule.destination.port.trim();
            let port = if port.is_empty() { "any" } else { port };
            ports.insert(port.to_string());
            exposure_finding(rule, port)
        })
        .collect::<Vec<_>>();
    report.set("exposed_ports", ports.into_iter().collect::<Vec<_>>());
    report.findings.extend(findings);
}

fn enumeration(report: &mut Report<'_>) {
    let doc = report.configuration;
    let mut services = Vec::new();
    if doc.system.ssh.enabled {
        services.push("ssh".to_string());
    }
    if !doc.system.webgui.protocol.is_empty() {
        services.push(format!("webgui/{}", doc.system.webgui.protocol));
    }
    if !doc.snmpd.ro_community.is_empty() {
        services.push("snmp".to_string());
    }
    if doc.unbound.enabled {
        services.push("dns-resolver".to_string());
    }
    if !doc.dhcp_enabled_interfaces().is_empty() {
        services.push("dhcp".to_string());
    }
    for server in &doc.openvpn.servers {
        services.push(format!("openvpn/{}", server.port));
    }
    if !doc.load_balancer.monitors.is_empty() {
        services.push("load-balancer".to_string());
    }
    report.set("enabled_services", services);
}

/// Red-team commentary for each exposure finding.
pub(crate) fn blackhat_commentary(report: &mut Report<'_>) {
    let mut notes = report
        .findings
        .iter()
        .filter_map(|f| f.attack_surface.as_ref().map(|surface| (f, surface)))
        .map(|(finding, surface)| {
            format!(
                "{}: {} reachable from outside. Start here.",
                finding.component,
                surface.services.join("/")
            )
        })
        .collect::<Vec<_>>();
    if report.configuration.system.webgui.protocol == "http" {
        notes.push("Web GUI speaks plain HTTP. Sniff the admin's session.".to_string());
    }
    if !report.configuration.snmpd.ro_community.is_empty() {
        notes.push(format!(
            "SNMP community '{}' is a free network map.",
            report.configuration.snmpd.ro_community
        ));
    }
    if notes.is_empty() {
        notes.push("Nothing obvious from the outside. Try harder.".to_string());
    }
    report.set("blackhat_commentary", notes);
}

fn wan_pass_rules<'r>(report: &Report<'r>) -> impl Iterator<Item = &'r Rule> + 'r {
    let doc: &'r OpnSenseDocument = report.configuration;
    doc.filter.rules.iter().filter(|r| {
        r.is_allow() && !r.disabled && r.interface.to_ascii_lowercase().starts_with("wan")
    })
}

fn exposure_finding(rule: &Rule, port: &str) -> Finding {
    let open_source = rule.source.is_any();
    let services = port_services(port);
    let vulnerabilities = if services.iter().any(|s| matches!(s.as_str(), "telnet" | "http")) {
        vec!["CWE-319".to_string()]
    } else {
        Vec::new()
    };
    Finding {
        kind: "exposure".to_string(),
        severity: Some(if open_source && port == "any" {
            Severity::Critical
        } else if open_source {
            Severity::High
        } else {
            Severity::Medium
        }),
        title: format!("Inbound access on {} port {port}", rule.interface),
        description: format!(
            "Pass rule '{}' admits {} to {} on port {port}.",
            if rule.description.is_empty() { "(unnamed)" } else { rule.description.as_str() },
            display_scope(rule.source.scope()),
            display_scope(rule.destination.scope()),
        ),
        recommendation: "Restrict the source to known addresses or remove the rule.".to_string(),
        component: format!("filter.{}", rule.interface),
        references: Vec::new(),
        tags: vec!["exposure".to_string(), "wan".to_string()],
        attack_surface: Some(AttackSurface {
            exposure_type: "inbound_rule".to_string(),
            ports: vec![port.to_string()],
            services,
            vulnerabilities,
        }),
    }
}

fn display_scope(scope: &str) -> &str {
    if scope.is_empty() {
        "any"
    } else {
        scope
    }
}

fn port_services(port: &str) -> Vec<String> {
    let name = match port {
        "21" => "ftp",
        "22" => "ssh",
        "23" => "telnet",
        "25" => "smtp",
        "53" => "dns",
        "80" => "http",
        "161" => "snmp",
        "443" => "https",
        "500" | "4500" => "ipsec",
        "1194" => "openvpn",
        "3389" => "rdp",
        "51820" => "wireguard",
        "any" => "all",
        _ => "unknown",
    };
    vec![name.to_string()]
}

fn rule_row(rule: &Rule) -> Value {
    json!({
        "type": rule.rule_type,
        "interface": rule.interface,
        "protocol": rule.protocol,
        "source": display_scope(rule.source.scope()),
        "destination": display_scope(rule.destination.scope()),
        "port": rule.destination.port,
        "description": rule.description,
        "disabled": rule.disabled,
        "log": rule.log,
    })
}
