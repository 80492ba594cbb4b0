//! Compliance controls, findings and plugin orchestration.
//!
//! A compliance plugin owns a fixed catalog of [`Control`]s and evaluates
//! an [`opnsense_model::OpnSenseDocument`] against it, emitting one
//! [`Finding`] per failed control. The [`registry::PluginRegistry`] runs a
//! selection of plugins and folds their output into a [`ComplianceResult`].
//!
//! ## Layout
//!
//! - [`plugin`] — the [`plugin::CompliancePlugin`] contract
//! - [`registry`] — registration, lookup and check runs
//! - [`rules`] — rule-evaluation algorithms shared by the catalogs
//! - [`external`] — out-of-process plugins discovered in a directory
//!
//! ## Summary invariants
//!
//! [`ComplianceSummary`] is derived data. `total_findings` always equals
//! `findings.len()`, and for every plugin `compliant + non_compliant`
//! equals its control count.

pub mod external;
pub mod plugin;
pub mod registry;
pub mod rules;

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordinal control severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A single compliance requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub severity: Severity,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub remediation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Control {
    pub fn new(id: &str, title: &str, severity: Severity) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            category: String::new(),
            severity,
            rationale: String::new(),
            remediation: String::new(),
            tags: Vec::new(),
            references: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = rationale.to_string();
        self
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = remediation.to_string();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.references.push(reference.to_string());
        self
    }
}

/// Exposure details attached to offensive-mode findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSurface {
    #[serde(rename = "type")]
    pub exposure_type: String,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
}

/// Evidence that a configuration did not satisfy a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub component: String,
    /// Control ids this finding concerns.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_surface: Option<AttackSurface>,
}

impl Finding {
    /// The standard finding for a failed control.
    pub fn for_control(control: &Control, component: &str) -> Self {
        Self {
            kind: "compliance".to_string(),
            severity: Some(control.severity),
            title: control.title.clone(),
            description: control.description.clone(),
            recommendation: control.remediation.clone(),
            component: component.to_string(),
            references: vec![control.id.clone()],
            tags: control.tags.clone(),
            attack_surface: None,
        }
    }

    /// Originating control id, if any.
    pub fn control_id(&self) -> Option<&str> {
        self.references.first().map(String::as_str)
    }
}

/// Identity and catalog of a plugin that took part in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub compliant: usize,
    pub non_compliant: usize,
    pub total_controls: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceSummary {
    pub total_findings: usize,
    pub critical_findings: usize,
    pub high_findings: usize,
    pub medium_findings: usize,
    pub low_findings: usize,
    /// Findings that carry no severity.
    pub unrated_findings: usize,
    pub plugin_count: usize,
    pub plugin_summaries: BTreeMap<String, PluginSummary>,
}

impl ComplianceSummary {
    /// Recompute counts from raw findings and per-plugin compliance maps.
    pub fn compute(
        findings: &[Finding],
        compliance: &BTreeMap<String, BTreeMap<String, bool>>,
    ) -> Self {
        let mut summary = ComplianceSummary {
            total_findings: findings.len(),
            plugin_count: compliance.len(),
            ..ComplianceSummary::default()
        };
        for finding in findings {
            match finding.severity {
                Some(Severity::Critical) => summary.critical_findings += 1,
                Some(Severity::High) => summary.high_findings += 1,
                Some(Severity::Medium) => summary.medium_findings += 1,
                Some(Severity::Low) => summary.low_findings += 1,
                None => summary.unrated_findings += 1,
            }
        }
        for (plugin, controls) in compliance {
            let compliant = controls.values().filter(|ok| **ok).count();
            summary.plugin_summaries.insert(
                plugin.clone(),
                PluginSummary {
                    compliant,
                    non_compliant: controls.len() - compliant,
                    total_controls: controls.len(),
                },
            );
        }
        summary
    }
}

/// Output of one registry check run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceResult {
    pub findings: Vec<Finding>,
    /// plugin name -> control id -> compliant.
    pub compliance: BTreeMap<String, BTreeMap<String, bool>>,
    pub summary: ComplianceSummary,
    pub plugin_info: BTreeMap<String, PluginInfo>,
    /// Plugins whose check run failed, with the failure text.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_errors: BTreeMap<String, String>,
}

impl ComplianceResult {
    /// Controls that at least one finding flagged, per plugin.
    pub fn non_compliant_controls(&self) -> Vec<(&str, &str)> {
        self.compliance
            .iter()
            .flat_map(|(plugin, controls)| {
                controls
                    .iter()
                    .filter(|(_, ok)| !**ok)
                    .map(move |(id, _)| (plugin.as_str(), id.as_str()))
            })
            .collect()
    }
}
