//! Read-only document model for OPNsense and pfSense configuration exports.
//!
//! [`xml`] turns a `config.xml` into a generic element tree; [`document`]
//! lifts that tree into the typed [`OpnSenseDocument`] consumed by audit
//! tooling. Nothing in this crate judges a configuration.

pub mod document;
pub mod xml;

pub use document::{
    load_document, Backup, Certificate, DhcpScope, Filter, HaSync, HealthMonitor, Interface,
    LoadBalancer, Nat, OpenVpn, OpnSenseDocument, Rule, RuleEndpoint, Snmpd, Ssh, StaticRoute,
    Syslog, System, Unbound, VpnInstance, WebGui, DEFAULT_HOSTNAME,
};
pub use xml::{parse, parse_file, ParseError, XmlNode};
