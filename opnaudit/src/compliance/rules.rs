//! Rule-evaluation algorithms shared by the built-in catalogs.
//!
//! Every function here is a pure read of the document. Where the model
//! cannot support a confident answer the functions lean towards the
//! conservative reading, and [`logging_status`] says so explicitly with
//! [`LoggingStatus::UnableToDetermine`].

use opnsense_model::{OpnSenseDocument, Rule};
use serde::Serialize;

/// Source networks treated as "broad" by the permissive-rule check.
pub const BROAD_NETWORKS: &[&str] = &[
    "0.0.0.0/0",
    "::/0",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
];

/// More DHCP-serving interfaces than this counts as unnecessary exposure.
pub const MAX_DHCP_INTERFACES: usize = 2;

/// Logging coverage as far as the configuration model can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingStatus {
    NotConfigured,
    Comprehensive,
    Partial,
    /// Rules or a firewall exist but per-rule logging is not modelled.
    UnableToDetermine,
}

impl LoggingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoggingStatus::NotConfigured => "not_configured",
            LoggingStatus::Comprehensive => "comprehensive",
            LoggingStatus::Partial => "partial",
            LoggingStatus::UnableToDetermine => "unable_to_determine",
        }
    }

    /// Only comprehensive coverage satisfies a logging control.
    pub fn is_compliant(self) -> bool {
        self == LoggingStatus::Comprehensive
    }
}

/// Whether the rule set implements a default-deny posture.
///
/// An empty rule set is the implicit block-all behaviour and passes.
/// Otherwise an explicit block/reject rule must exist and no pass rule may
/// match any source to any destination.
pub fn has_default_deny(rules: &[Rule]) -> bool {
    if rules.is_empty() {
        return true;
    }
    let has_explicit_block = rules.iter().any(Rule::is_block);
    let has_any_any_allow = rules
        .iter()
        .any(|r| r.is_allow() && r.source.is_any() && r.destination.is_any());
    has_explicit_block && !has_any_any_allow
}

/// Whether any pass rule is broader than it needs to be.
pub fn has_overly_permissive_rules(rules: &[Rule]) -> bool {
    rules
        .iter()
        .filter(|r| r.is_allow())
        .any(is_overly_permissive)
}

/// A pass rule is overly permissive when it matches any-to-any, when a
/// broad source reaches an unrestricted or broad destination, or when it
/// leaves the destination port open.
pub fn is_overly_permissive(rule: &Rule) -> bool {
    let source = &rule.source;
    let destination = &rule.destination;
    if source.is_any() && destination.is_any() {
        return true;
    }

    let dest_scope = destination.scope();
    if is_broad_network(source.scope())
        && (dest_scope.is_empty() || destination.is_any() || is_broad_network(dest_scope))
    {
        return true;
    }

    let port = destination.port.trim();
    port.is_empty() || port.eq_ignore_ascii_case("any")
}

pub fn is_broad_network(value: &str) -> bool {
    let value = value.trim();
    BROAD_NETWORKS.iter().any(|net| *net == value)
}

/// Reasons the configuration runs services it probably should not.
pub fn unnecessary_services(doc: &OpnSenseDocument) -> Vec<String> {
    let mut out = Vec::new();
    if !doc.snmpd.ro_community.trim().is_empty() {
        out.push("SNMP read-only community string is configured".to_string());
    }
    if doc.unbound.enabled && doc.unbound.dnssec_stripped {
        out.push("DNS resolver strips DNSSEC data".to_string());
    }
    let dhcp = doc.dhcp_enabled_interfaces();
    if dhcp.len() > MAX_DHCP_INTERFACES {
        out.push(format!(
            "DHCP is served on {} interfaces (more than {MAX_DHCP_INTERFACES})",
            dhcp.len()
        ));
    }
    if !doc.load_balancer.monitors.is_empty() {
        out.push(format!(
            "{} load balancer health monitor(s) configured",
            doc.load_balancer.monitors.len()
        ));
    }
    out
}

pub fn has_unnecessary_services(doc: &OpnSenseDocument) -> bool {
    !unnecessary_services(doc).is_empty()
}

/// Classify logging coverage, most specific state first.
pub fn logging_status(doc: &OpnSenseDocument) -> LoggingStatus {
    let syslog = &doc.syslog;
    if syslog.enabled {
        if syslog.system && syslog.auth {
            return LoggingStatus::Comprehensive;
        }
        return LoggingStatus::Partial;
    }
    if doc.firewall_configured() {
        return LoggingStatus::UnableToDetermine;
    }
    LoggingStatus::NotConfigured
}

pub fn has_comprehensive_logging(doc: &OpnSenseDocument) -> bool {
    logging_status(doc).is_compliant()
}

/// At least two network zones, and no pass rule lets a WAN interface
/// reach an internal network without a port restriction.
pub fn has_zone_separation(doc: &OpnSenseDocument) -> bool {
    if doc.interfaces.len() < 2 {
        return false;
    }
    let internal = doc
        .interfaces
        .iter()
        .filter(|i| !i.name.to_ascii_lowercase().starts_with("wan"))
        .map(|i| i.name.to_ascii_lowercase())
        .collect::<Vec<_>>();
    if internal.is_empty() {
        return false;
    }

    !doc.filter.rules.iter().any(|rule| {
        let port = rule.destination.port.trim();
        rule.is_allow()
            && rule.interface.to_ascii_lowercase().starts_with("wan")
            && internal.contains(&rule.destination.scope().to_ascii_lowercase())
            && (port.is_empty() || port.eq_ignore_ascii_case("any"))
    })
}

#[cfg(test)]
mod tests {
    use opnsense_model::{
        DhcpScope, HealthMonitor, Interface, OpnSenseDocument, Rule, RuleEndpoint,
    };

    use super::*;

    fn rule(kind: &str, source: RuleEndpoint, destination: RuleEndpoint) -> Rule {
        Rule {
            rule_type: kind.to_string(),
            interface: "lan".to_string(),
            source,
            destination,
            ..Rule::default()
        }
    }

    fn iface(name: &str) -> Interface {
        Interface {
            name: name.to_string(),
            enabled: true,
            ..Interface::default()
        }
    }

    #[test]
    fn default_deny_passes_for_empty_rule_set() {
        assert!(has_default_deny(&[]));
    }

    #[test]
    fn default_deny_passes_with_single_block_rule() {
        let rules = [rule("block", RuleEndpoint::any(), RuleEndpoint::any())];
        assert!(has_default_deny(&rules));
    }

    #[test]
    fn default_deny_fails_with_any_any_allow() {
        let rules = [
            rule("block", RuleEndpoint::any(), RuleEndpoint::any()),
            rule("pass", RuleEndpoint::network("any"), RuleEndpoint::any()),
        ];
        assert!(!has_default_deny(&rules));
    }

    #[test]
    fn default_deny_requires_explicit_block() {
        let rules = [rule(
            "pass",
            RuleEndpoint::network("lan"),
            RuleEndpoint::network("10.0.0.0/24").with_port("443"),
        )];
        assert!(!has_default_deny(&rules));
    }

    #[test]
    fn reject_counts_as_explicit_block() {
        let rules = [rule("reject", RuleEndpoint::network("lan"), RuleEndpoint::any())];
        assert!(has_default_deny(&rules));
    }

    #[test]
    fn any_to_any_is_overly_permissive() {
        let rules = [rule("pass", RuleEndpoint::any(), RuleEndpoint::any())];
        assert!(has_overly_permissive_rules(&rules));
    }

    #[test]
    fn scoped_rule_with_port_is_not_permissive() {
        let rules = [rule(
            "pass",
            RuleEndpoint::network("192.168.1.0/24"),
            RuleEndpoint::network("10.0.0.0/24").with_port("80"),
        )];
        assert!(!has_overly_permissive_rules(&rules));
    }

    #[test]
    fn broad_source_to_any_destination_is_permissive() {
        let rules = [rule(
            "pass",
            RuleEndpoint::network("10.0.0.0/8"),
            RuleEndpoint::any().with_port("443"),
        )];
        assert!(has_overly_permissive_rules(&rules));
    }

    #[test]
    fn missing_destination_port_is_permissive() {
        let rules = [rule(
            "pass",
            RuleEndpoint::network("192.168.1.0/24"),
            RuleEndpoint::network("10.0.0.0/24"),
        )];
        assert!(has_overly_permissive_rules(&rules));
    }

    #[test]
    fn block_rules_are_never_permissive() {
        let rules = [rule("block", RuleEndpoint::any(), RuleEndpoint::any())];
        assert!(!has_overly_permissive_rules(&rules));
    }

    #[test]
    fn quiet_configuration_has_no_unnecessary_services() {
        assert!(!has_unnecessary_services(&OpnSenseDocument::default()));
    }

    #[test]
    fn each_service_condition_is_sufficient() {
        let mut snmp = OpnSenseDocument::default();
        snmp.snmpd.ro_community = "public".to_string();
        assert!(has_unnecessary_services(&snmp));

        let mut unbound = OpnSenseDocument::default();
        unbound.unbound.enabled = true;
        unbound.unbound.dnssec_stripped = true;
        assert!(has_unnecessary_services(&unbound));
        unbound.unbound.enabled = false;
        assert!(!has_unnecessary_services(&unbound));

        let mut lb = OpnSenseDocument::default();
        lb.load_balancer.monitors.push(HealthMonitor::default());
        assert!(has_unnecessary_services(&lb));
    }

    #[test]
    fn dhcp_threshold_counts_distinct_interfaces() {
        let scope = |name: &str| DhcpScope {
            interface: name.to_string(),
            enabled: true,
            ..DhcpScope::default()
        };
        let mut doc = OpnSenseDocument::default();
        doc.dhcp = vec![scope("lan"), scope("opt1"), scope("lan")];
        assert!(!has_unnecessary_services(&doc));
        doc.dhcp.push(scope("opt2"));
        assert!(has_unnecessary_services(&doc));
    }

    #[test]
    fn logging_states_follow_priority() {
        let mut doc = OpnSenseDocument::default();
        assert_eq!(logging_status(&doc), LoggingStatus::NotConfigured);

        doc.filter.rules.push(rule("pass", RuleEndpoint::any(), RuleEndpoint::any()));
        assert_eq!(logging_status(&doc), LoggingStatus::UnableToDetermine);

        doc.syslog.enabled = true;
        assert_eq!(logging_status(&doc), LoggingStatus::Partial);

        doc.syslog.system = true;
        assert_eq!(logging_status(&doc), LoggingStatus::Partial);

        doc.syslog.auth = true;
        assert_eq!(logging_status(&doc), LoggingStatus::Comprehensive);
        assert!(has_comprehensive_logging(&doc));
    }

    #[test]
    fn only_comprehensive_logging_is_compliant() {
        assert!(!LoggingStatus::NotConfigured.is_compliant());
        assert!(!LoggingStatus::Partial.is_compliant());
        assert!(!LoggingStatus::UnableToDetermine.is_compliant());
    }

    #[test]
    fn zone_separation_needs_two_zones_and_no_open_wan_path() {
        let mut doc = OpnSenseDocument::default();
        doc.interfaces = vec![iface("wan")];
        assert!(!has_zone_separation(&doc));

        doc.interfaces.push(iface("lan"));
        assert!(has_zone_separation(&doc));

        let mut open = rule("pass", RuleEndpoint::any(), RuleEndpoint::network("lan"));
        open.interface = "wan".to_string();
        doc.filter.rules.push(open);
        assert!(!has_zone_separation(&doc));
    }
}
