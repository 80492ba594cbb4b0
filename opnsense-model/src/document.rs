//! Typed, read-only view of a firewall configuration.
//!
//! [`OpnSenseDocument::from_xml`] is total: sections missing from the
//! export come back as empty lists, `false` or empty strings. Field names
//! are serialized as-is and consumed by report renderers, so keep them
//! stable.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::xml::{parse_file, ParseError, XmlNode};

/// Hostname shipped by the installer.
pub const DEFAULT_HOSTNAME: &str = "OPNsense";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpnSenseDocument {
    /// Root tag of the export (`opnsense` or `pfsense`).
    pub platform: String,
    pub version: String,
    pub system: System,
    pub interfaces: Vec<Interface>,
    pub filter: Filter,
    pub nat: Nat,
    pub dhcp: Vec<DhcpScope>,
    pub certificates: Vec<Certificate>,
    pub cas: Vec<Certificate>,
    pub openvpn: OpenVpn,
    pub static_routes: Vec<StaticRoute>,
    pub ha_sync: HaSync,
    pub snmpd: Snmpd,
    pub unbound: Unbound,
    pub syslog: Syslog,
    pub load_balancer: LoadBalancer,
    pub backup: Backup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub hostname: String,
    pub domain: String,
    pub dns_servers: Vec<String>,
    pub timezone: String,
    pub motd: String,
    pub ssh: Ssh,
    pub webgui: WebGui,
    pub ipv6_allow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ssh {
    pub enabled: bool,
    pub banner: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebGui {
    pub protocol: String,
    pub no_dns_rebind_check: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Logical name (`wan`, `lan`, `opt1`, ...).
    pub name: String,
    /// Device name (`em0`, `vtnet1`, ...).
    pub if_name: String,
    pub description: String,
    pub enabled: bool,
    pub ip_address: String,
    pub subnet: String,
    pub block_private: bool,
    pub block_bogons: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// `pass`, `block` or `reject`.
    pub rule_type: String,
    pub interface: String,
    pub ip_protocol: String,
    pub protocol: String,
    pub source: RuleEndpoint,
    pub destination: RuleEndpoint,
    pub description: String,
    pub disabled: bool,
    pub log: bool,
}

impl Rule {
    pub fn is_allow(&self) -> bool {
        self.rule_type.eq_ignore_ascii_case("pass")
    }

    pub fn is_block(&self) -> bool {
        self.rule_type.eq_ignore_ascii_case("block") || self.rule_type.eq_ignore_ascii_case("reject")
    }
}

/// Source or destination side of a filter rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEndpoint {
    /// `<any/>` was present.
    pub any: bool,
    /// Network token (`lan`, `wanip`, `10.0.0.0/8`, ...).
    pub network: String,
    pub address: String,
    pub port: String,
    /// Negated match.
    pub not: bool,
}

impl RuleEndpoint {
    pub fn any() -> Self {
        Self {
            any: true,
            ..Self::default()
        }
    }

    pub fn network(value: impl Into<String>) -> Self {
        Self {
            network: value.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Matches everything: `<any/>` or the literal `any` token.
    pub fn is_any(&self) -> bool {
        self.any
            || self.network.trim().eq_ignore_ascii_case("any")
            || self.address.trim().eq_ignore_ascii_case("any")
    }

    /// The address or network this side names, `any` for wildcards and
    /// empty when nothing was configured.
    pub fn scope(&self) -> &str {
        if self.is_any() {
            return "any";
        }
        let address = self.address.trim();
        if !address.is_empty() {
            return address;
        }
        self.network.trim()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nat {
    /// Outbound NAT mode (`automatic`, `hybrid`, `advanced`, `disabled`).
    pub outbound_mode: String,
    pub port_forwards: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpScope {
    pub interface: String,
    pub enabled: bool,
    pub range_from: String,
    pub range_to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub refid: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenVpn {
    pub servers: Vec<VpnInstance>,
    pub clients: Vec<VpnInstance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnInstance {
    pub vpn_id: String,
    pub description: String,
    pub protocol: String,
    pub port: String,
    pub interface: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub network: String,
    pub gateway: String,
    pub description: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaSync {
    pub pfsync_interface: String,
    pub pfsync_peer: String,
    pub sync_to_ip: String,
    pub username: String,
}

impl HaSync {
    pub fn is_configured(&self) -> bool {
        !self.pfsync_interface.is_empty() || !self.sync_to_ip.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snmpd {
    pub ro_community: String,
    pub sys_location: String,
    pub sys_contact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unbound {
    pub enabled: bool,
    pub dnssec_stripped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syslog {
    /// Central/remote logging is switched on.
    pub enabled: bool,
    pub remote_servers: Vec<String>,
    pub system: bool,
    pub auth: bool,
    pub filter: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub monitors: Vec<HealthMonitor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMonitor {
    pub name: String,
    pub monitor_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Names of automatic backup providers that are enabled.
    pub providers: Vec<String>,
}

impl Backup {
    pub fn is_automatic(&self) -> bool {
        !self.providers.is_empty()
    }
}

impl OpnSenseDocument {
    /// Build the document from a parsed XML root.
    pub fn from_xml(root: &XmlNode) -> Self {
        Self {
            platform: root.tag.to_ascii_lowercase(),
            version: root.string_at(&["version"]),
            system: system(root),
            interfaces: interfaces(root),
            filter: Filter {
                rules: root
                    .child("filter")
                    .map(|f| f.children_named("rule").map(rule).collect())
                    .unwrap_or_default(),
            },
            nat: nat(root),
            dhcp: dhcp(root),
            certificates: certificates(root, "cert"),
            cas: certificates(root, "ca"),
            openvpn: openvpn(root),
            static_routes: static_routes(root),
            ha_sync: HaSync {
                pfsync_interface: root.string_at(&["hasync", "pfsyncinterface"]),
                pfsync_peer: root.string_at(&["hasync", "pfsyncpeerip"]),
                sync_to_ip: root.string_at(&["hasync", "synchronizetoip"]),
                username: root.string_at(&["hasync", "username"]),
            },
            snmpd: Snmpd {
                ro_community: root.string_at(&["snmpd", "rocommunity"]),
                sys_location: root.string_at(&["snmpd", "syslocation"]),
                sys_contact: root.string_at(&["snmpd", "syscontact"]),
            },
            unbound: unbound(root),
            syslog: syslog(root),
            load_balancer: LoadBalancer {
                monitors: root
                    .child("load_balancer")
                    .map(|lb| {
                        lb.children_named("monitor_type")
                            .map(|m| HealthMonitor {
                                name: m.string_at(&["name"]),
                                monitor_type: m.string_at(&["type"]),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            backup: backup(root),
        }
    }

    /// A filter section with rules, or an interface with packet filtering.
    pub fn firewall_configured(&self) -> bool {
        !self.filter.rules.is_empty() || self.interfaces.iter().any(|i| i.enabled)
    }

    /// Distinct interface names with an enabled DHCP scope.
    pub fn dhcp_enabled_interfaces(&self) -> BTreeSet<&str> {
        self.dhcp
            .iter()
            .filter(|scope| scope.enabled)
            .map(|scope| scope.interface.as_str())
            .collect()
    }

    /// Interfaces that face the internet.
    pub fn wan_interfaces(&self) -> Vec<&Interface> {
        self.interfaces
            .iter()
            .filter(|i| i.name.to_ascii_lowercase().starts_with("wan"))
            .collect()
    }
}

/// Parse a configuration file straight into a document.
pub fn load_document(path: &Path) -> Result<OpnSenseDocument, ParseError> {
    let root = parse_file(path)?;
    Ok(OpnSenseDocument::from_xml(&root))
}

fn system(root: &XmlNode) -> System {
    let Some(sys) = root.child("system") else {
        return System::default();
    };
    System {
        hostname: sys.string_at(&["hostname"]),
        domain: sys.string_at(&["domain"]),
        dns_servers: sys
            .children_named("dnsserver")
            .filter_map(|n| n.text_at(&[]))
            .map(ToOwned::to_owned)
            .collect(),
        timezone: sys.string_at(&["timezone"]),
        motd: sys.string_at(&["motd"]),
        ssh: Ssh {
            enabled: sys.flag(&["ssh", "enabled"]) || sys.flag(&["enablesshd"]),
            banner: sys.string_at(&["ssh", "banner"]),
        },
        webgui: WebGui {
            protocol: sys.string_at(&["webgui", "protocol"]).to_ascii_lowercase(),
            no_dns_rebind_check: sys.flag(&["webgui", "nodnsrebindcheck"]),
        },
        ipv6_allow: sys.flag(&["ipv6allow"]),
    }
}

fn interfaces(root: &XmlNode) -> Vec<Interface> {
    let Some(section) = root.child("interfaces") else {
        return Vec::new();
    };
    section
        .children
        .iter()
        .map(|node| Interface {
            name: node.tag.clone(),
            if_name: node.string_at(&["if"]),
            description: node.string_at(&["descr"]),
            enabled: node.flag(&["enable"]),
            ip_address: node.string_at(&["ipaddr"]),
            subnet: node.string_at(&["subnet"]),
            block_private: node.flag(&["blockpriv"]),
            block_bogons: node.flag(&["blockbogons"]),
        })
        .collect()
}

fn rule(node: &XmlNode) -> Rule {
    Rule {
        rule_type: node.string_at(&["type"]).to_ascii_lowercase(),
        interface: node.string_at(&["interface"]),
        ip_protocol: node.string_at(&["ipprotocol"]),
        protocol: node.string_at(&["protocol"]),
        source: endpoint(node.child("source")),
        destination: endpoint(node.child("destination")),
        description: node.string_at(&["descr"]),
        disabled: node.flag(&["disabled"]),
        log: node.flag(&["log"]),
    }
}

fn endpoint(node: Option<&XmlNode>) -> RuleEndpoint {
    let Some(node) = node else {
        return RuleEndpoint::default();
    };
    RuleEndpoint {
        any: node.child("any").is_some(),
        network: node.string_at(&["network"]),
        address: node.string_at(&["address"]),
        port: node.string_at(&["port"]),
        not: node.child("not").is_some(),
    }
}

fn nat(root: &XmlNode) -> Nat {
    let Some(section) = root.child("nat") else {
        return Nat::default();
    };
    Nat {
        outbound_mode: section.string_at(&["outbound", "mode"]),
        port_forwards: section.children_named("rule").count(),
    }
}

fn dhcp(root: &XmlNode) -> Vec<DhcpScope> {
    let Some(section) = root.child("dhcpd") else {
        return Vec::new();
    };
    section
        .children
        .iter()
        .map(|node| DhcpScope {
            interface: node.tag.clone(),
            enabled: node.flag(&["enable"]),
            range_from: node.string_at(&["range", "from"]),
            range_to: node.string_at(&["range", "to"]),
        })
        .collect()
}

fn certificates(root: &XmlNode, tag: &str) -> Vec<Certificate> {
    root.children_named(tag)
        .map(|node| Certificate {
            refid: node.string_at(&["refid"]),
            description: node.string_at(&["descr"]),
        })
        .collect()
}

fn openvpn(root: &XmlNode) -> OpenVpn {
    let Some(section) = root.child("openvpn") else {
        return OpenVpn::default();
    };
    let instance = |node: &XmlNode| VpnInstance {
        vpn_id: node.string_at(&["vpnid"]),
        description: node.string_at(&["description"]),
        protocol: node.string_at(&["protocol"]),
        port: node.string_at(&["local_port"]),
        interface: node.string_at(&["interface"]),
    };
    OpenVpn {
        servers: section.children_named("openvpn-server").map(instance).collect(),
        clients: section.children_named("openvpn-client").map(instance).collect(),
    }
}

fn static_routes(root: &XmlNode) -> Vec<StaticRoute> {
    let Some(section) = root.child("staticroutes") else {
        return Vec::new();
    };
    section
        .children_named("route")
        .map(|node| StaticRoute {
            network: node.string_at(&["network"]),
            gateway: node.string_at(&["gateway"]),
            description: node.string_at(&["descr"]),
            disabled: node.flag(&["disabled"]),
        })
        .collect()
}

fn unbound(root: &XmlNode) -> Unbound {
    if let Some(section) = root.child("unbound") {
        return Unbound {
            enabled: section.flag(&["enable"]),
            dnssec_stripped: section.flag(&["dnssecstripped"]),
        };
    }
    match root.descend(&["OPNsense", "unboundplus", "general"]) {
        Some(general) => Unbound {
            enabled: general.flag(&["enabled"]),
            dnssec_stripped: general.flag(&["dnssecstripped"]),
        },
        None => Unbound::default(),
    }
}

fn syslog(root: &XmlNode) -> Syslog {
    let Some(section) = root.child("syslog") else {
        return Syslog::default();
    };
    let remote_servers = ["remoteserver", "remoteserver2", "remoteserver3"]
        .iter()
        .filter_map(|tag| section.text_at(&[tag]))
        .map(ToOwned::to_owned)
        .collect();
    Syslog {
        enabled: section.flag(&["enable"]),
        remote_servers,
        system: section.flag(&["system"]),
        auth: section.flag(&["auth"]),
        filter: section.flag(&["filter"]),
    }
}

fn backup(root: &XmlNode) -> Backup {
    let Some(section) = root.descend(&["OPNsense", "Backup"]) else {
        return Backup::default();
    };
    Backup {
        providers: section
            .children
            .iter()
            .filter(|provider| provider.flag(&["enabled"]))
            .map(|provider| provider.tag.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use std::fs;

    use tempfile::tempdir;

    use super::{load_document, OpnSenseDocument, RuleEndpoint};
    use crate::xml::{parse, ParseError};

    fn document(xml: &str) -> OpnSenseDocument {
        OpnSenseDocument::from_xml(&parse(xml.as_bytes()).expect("parse"))
    }

    #[test]
    fn extracts_system_and_rules() {
        let doc = document(
            r#"<opnsense>
                <version>24.7</version>
                <system>
                    <hostname>fw1</hostname><domain>example.lan</domain>
                    <dnsserver>9.9.9.9</dnsserver><dnsserver>1.1.1.1</dnsserver>
                    <webgui><protocol>HTTPS</protocol></webgui>
                </system>
                <interfaces>
                    <wan><if>em0</if><enable>1</enable><ipaddr>dhcp</ipaddr><blockpriv>1</blockpriv></wan>
                    <lan><if>em1</if><enable>1</enable><ipaddr>192.168.1.1</ipaddr><subnet>24</subnet></lan>
                </interfaces>
                <filter>
                    <rule>
                        <type>pass</type><interface>lan</interface>
                        <source><network>lan</network></source>
                        <destination><any/><port>443</port></destination>
                        <log/>
                    </rule>
                </filter>
            </opnsense>"#,
        );

        assert_eq!(doc.platform, "opnsense");
        assert_eq!(doc.version, "24.7");
        assert_eq!(doc.system.hostname, "fw1");
        assert_eq!(doc.system.dns_servers, vec!["9.9.9.9", "1.1.1.1"]);
        assert_eq!(doc.system.webgui.protocol, "https");
        assert_eq!(doc.interfaces.len(), 2);
        assert!(doc.interfaces[0].block_private);
        assert_eq!(doc.wan_interfaces().len(), 1);

        let rule = &doc.filter.rules[0];
        assert!(rule.is_allow());
        assert!(rule.log);
        assert_eq!(rule.source.scope(), "lan");
        assert!(rule.destination.is_any());
        assert_eq!(rule.destination.port, "443");
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let doc = document("<opnsense/>");
        assert_eq!(doc, OpnSenseDocument {
            platform: "opnsense".to_string(),
            ..OpnSenseDocument::default()
        });
        assert!(!doc.firewall_configured());
    }

    #[test]
    fn collects_services_and_counts_dhcp_interfaces_once() {
        let doc = document(
            r#"<opnsense>
                <dhcpd><lan><enable/></lan><opt1><enable>1</enable></opt1><opt2/></dhcpd>
                <snmpd><rocommunity>public</rocommunity></snmpd>
                <unbound><enable>1</enable><dnssecstripped>1</dnssecstripped></unbound>
                <syslog><enable/><system/><remoteserver>10.0.0.5</remoteserver></syslog>
                <load_balancer><monitor_type><name>ICMP</name><type>icmp</type></monitor_type></load_balancer>
                <OPNsense><Backup><GDrive><enabled>1</enabled></GDrive><Nextcloud><enabled>0</enabled></Nextcloud></Backup></OPNsense>
            </opnsense>"#,
        );

        assert_eq!(doc.dhcp_enabled_interfaces().len(), 2);
        assert_eq!(doc.snmpd.ro_community, "public");
        assert!(doc.unbound.enabled && doc.unbound.dnssec_stripped);
        assert!(doc.syslog.enabled && doc.syslog.system && !doc.syslog.auth);
        assert_eq!(doc.syslog.remote_servers, vec!["10.0.0.5"]);
        assert_eq!(doc.load_balancer.monitors.len(), 1);
        assert_eq!(doc.backup.providers, vec!["GDrive"]);
    }

    #[test]
    fn any_token_counts_as_wildcard() {
        assert!(RuleEndpoint::any().is_any());
        assert!(RuleEndpoint::network("any").is_any());
        assert!(!RuleEndpoint::network("lan").is_any());
        assert_eq!(RuleEndpoint::default().scope(), "");
    }

    #[test]
    fn loads_from_disk_and_reports_missing_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");
        fs::write(&path, "<pfsense><system><hostname>fw2</hostname></system></pfsense>")
            .expect("write");

        let doc = load_document(&path).expect("load");
        assert_eq!(doc.platform, "pfsense");
        assert_eq!(doc.system.hostname, "fw2");

        let err = load_document(&dir.path().join("absent.xml")).expect_err("missing");
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
