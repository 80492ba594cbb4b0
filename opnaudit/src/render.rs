use colored::Colorize;
use serde_json::Value;

use crate::audit::Report;
use crate::compliance::{Finding, PluginInfo, Severity};

/// Render a report for terminal output.
pub fn render_report_text(report: &Report<'_>) -> String {
    let mut out = Vec::new();
    let doc = report.configuration;

    out.push(
        format!(
            "audit mode={} blackhat={} comprehensive={}",
            report.mode, report.blackhat, report.comprehensive
        )
        .bold()
        .to_string(),
    );
    out.push(format!(
        "host={} domain={} platform={} version={}",
        or_dash(&doc.system.hostname),
        or_dash(&doc.system.domain),
        or_dash(&doc.platform),
        or_dash(&doc.version)
    ));

    out.push(String::new());
    out.push("Metadata".cyan().to_string());
    for (key, value) in &report.metadata {
        if is_table(value) {
            continue;
        }
        out.push(format!("  {key}={}", scalar(value)));
    }

    out.push(String::new());
    out.push(format!("Findings ({})", report.findings.len()).cyan().to_string());
    if report.findings.is_empty() {
        out.push("  none".green().to_string());
    }
    for finding in &report.findings {
        out.push(render_finding(finding));
    }

    for (namespace, result) in &report.compliance {
        out.push(String::new());
        out.push(format!("Compliance ({namespace})").cyan().to_string());
        for (plugin, summary) in &result.summary.plugin_summaries {
            let line = format!(
                "  plugin={plugin} compliant={} non_compliant={} total={}",
                summary.compliant, summary.non_compliant, summary.total_controls
            );
            out.push(if summary.non_compliant == 0 {
                line.green().to_string()
            } else {
                line.yellow().to_string()
            });
        }
        for (plugin, error) in &result.plugin_errors {
            out.push(format!("  plugin={plugin} error={error}").red().to_string());
        }
    }

    out.join("\n")
}

/// Render registered plugins with their control catalogs.
pub fn render_plugin_list(plugins: &[PluginInfo]) -> String {
    let mut out = Vec::new();
    for plugin in plugins {
        out.push(format!(
            "{} {} controls={} {}",
            plugin.name.bold(),
            plugin.version,
            plugin.controls.len(),
            plugin.description
        ));
        for control in &plugin.controls {
            out.push(format!(
                "  {} [{}] {}",
                control.id, control.severity, control.title
            ));
        }
    }
    out.join("\n")
}

fn render_finding(finding: &Finding) -> String {
    let label = match finding.severity {
        Some(Severity::Critical) => "CRITICAL".red().bold(),
        Some(Severity::High) => "HIGH".red(),
        Some(Severity::Medium) => "MEDIUM".yellow(),
        Some(Severity::Low) => "LOW".blue(),
        None => "INFO".normal(),
    };
    let mut line = format!("  [{label}] {} component={}", finding.title, finding.component);
    if !finding.references.is_empty() {
        line.push_str(&format!(" refs={}", finding.references.join(",")));
    }
    if let Some(surface) = &finding.attack_surface {
        line.push_str(&format!(" ports={}", surface.ports.join(",")));
    }
    line
}

fn is_table(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().any(Value::is_object))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use opnsense_model::OpnSenseDocument;

    use super::render_report_text;
    use crate::audit::{ModeConfig, Report, ReportMode};
    use crate::compliance::{Control, Finding, Severity};

    #[test]
    fn text_lists_metadata_and_findings() {
        let mut doc = OpnSenseDocument::default();
        doc.system.hostname = "fw1".to_string();
        let mut report = Report::new(&doc, &ModeConfig::new(ReportMode::Blue));
        report.set("interface_count", 2);
        report.set("dhcp_interfaces", vec!["lan", "opt1"]);
        report.set("interface_table", vec![serde_json::json!({"name": "lan"})]);
        report.findings.push(Finding::for_control(
            &Control::new("V-1", "Deny by default", Severity::High),
            "filter",
        ));

        let text = render_report_text(&report);
        assert!(text.contains("host=fw1"));
        assert!(text.contains("interface_count=2"));
        assert!(text.contains("dhcp_interfaces=lan,opt1"));
        assert!(!text.contains("interface_table"));
        assert!(text.contains("Deny by default component=filter refs=V-1"));
    }
}
