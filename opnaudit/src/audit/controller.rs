use std::sync::Arc;

use opnsense_model::OpnSenseDocument;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::analysis::{blackhat_commentary, Step, BLUE_STEPS, RED_STEPS, STANDARD_STEPS};
use super::{AuditError, ModeConfig, Report, ReportMode, PLUGIN_COMPLIANCE_KEY};
use crate::compliance::registry::PluginRegistry;

/// Turns a configuration and a [`ModeConfig`] into a [`Report`].
///
/// Holds no per-report state; the registry is injected and shared.
pub struct ModeController {
    registry: Arc<PluginRegistry>,
}

impl ModeController {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Reject blank or unregistered plugin selections before any work is done.
    ///
    /// Names match registered plugins exactly, case included.
    pub fn validate(&self, config: &ModeConfig) -> Result<(), AuditError> {
        for name in &config.selected_plugins {
            if name.trim().is_empty() {
                return Err(AuditError::EmptyPluginName);
            }
            if !self.registry.contains(name) {
                return Err(AuditError::UnknownPlugin {
                    name: name.clone(),
                    available: self.registry.list_plugins().join(", "),
                });
            }
        }
        Ok(())
    }

    pub fn generate_report<'a>(
        &self,
        doc: &'a OpnSenseDocument,
        config: &ModeConfig,
    ) -> Result<Report<'a>, AuditError> {
        self.validate(config)?;
        info!(mode = %config.mode, plugins = config.selected_plugins.len(), "generating report");

        let mut report = Report::new(doc, config);
        report.set("mode", config.mode.as_str());
        if let Some(dir) = &config.template_dir {
            report.set("template_dir", dir.display().to_string());
        }

        match config.mode {
            ReportMode::Standard => run_steps(&mut report, STANDARD_STEPS),
            ReportMode::Blue => {
                run_steps(&mut report, STANDARD_STEPS);
                self.compliance_pass(&mut report, config);
                run_steps(&mut report, BLUE_STEPS);
            }
            ReportMode::Red => {
                run_steps(&mut report, STANDARD_STEPS);
                run_steps(&mut report, RED_STEPS);
                if config.blackhat {
                    blackhat_commentary(&mut report);
                }
            }
        }
        report.set("generated_at", timestamp());
        Ok(report)
    }

    /// Failures are recorded in metadata; the report still completes.
    ///
    /// Status is `completed`, `partial` when some selected plugins failed,
    /// or `failed` when all of them did or the run could not start.
    fn compliance_pass(&self, report: &mut Report<'_>, config: &ModeConfig) {
        if config.selected_plugins.is_empty() {
            report.set("compliance_check_status", "skipped");
            return;
        }

        match self
            .registry
            .run_compliance_checks(report.configuration, &config.selected_plugins)
        {
            Ok(result) => {
                let ran = result.plugin_info.len();
                let failed = result.plugin_errors.len();
                let status = match failed {
                    0 => "completed",
                    n if n == ran => "failed",
                    _ => "partial",
                };
                report.set("compliance_check_status", status);
                if failed > 0 {
                    warn!(failed, ran, "compliance plugins failed");
                    let error = result
                        .plugin_errors
                        .iter()
                        .map(|(name, reason)| format!("{name}: {reason}"))
                        .collect::<Vec<_>>()
                        .join("; ");
                    report.set("compliance_check_error", error);
                    report.set("compliance_check_time", timestamp());
                    report.set("compliance_plugin_errors", serde_json::json!(result.plugin_errors));
                }
                report.findings.extend(result.findings.iter().cloned());
                report
                    .compliance
                    .insert(PLUGIN_COMPLIANCE_KEY.to_string(), result);
            }
            Err(err) => {
                warn!(error = %err, "compliance checks failed");
                report.set("compliance_check_status", "failed");
                report.set("compliance_check_error", err.to_string());
                report.set("compliance_check_time", timestamp());
            }
        }
    }
}

fn run_steps(report: &mut Report<'_>, steps: &[(&str, Step)]) {
    for (name, step) in steps {
        debug!(step = name, "analysis step");
        step(report);
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use opnsense_model::{OpnSenseDocument, Rule, RuleEndpoint};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::ModeController;
    use crate::audit::{AuditError, ModeConfig, ReportMode, PLUGIN_COMPLIANCE_KEY};
    use crate::compliance::plugin::{CompliancePlugin, PluginError};
    use crate::compliance::registry::PluginRegistry;
    use crate::compliance::{Control, Finding, Severity};

    /// A plugin whose check run always errors or panics.
    struct BrokenPlugin {
        name: &'static str,
        panics: bool,
        controls: Vec<Control>,
    }

    impl BrokenPlugin {
        fn new(name: &'static str, panics: bool) -> Arc<dyn CompliancePlugin> {
            Arc::new(Self {
                name,
                panics,
                controls: vec![Control::new("BROKEN-1", "never evaluated", Severity::Low)],
            })
        }
    }

    impl CompliancePlugin for BrokenPlugin {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "0.0.1"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn run_checks(&self, _doc: &OpnSenseDocument) -> Result<Vec<Finding>, PluginError> {
            if self.panics {
                panic!("rule table corrupted");
            }
            Err(PluginError::External {
                plugin: self.name.to_string(),
                reason: "check exited with 1".to_string(),
            })
        }
        fn controls(&self) -> &[Control] {
            &self.controls
        }
    }

    fn controller() -> ModeController {
        ModeController::new(Arc::new(
            PluginRegistry::with_builtin_plugins().expect("builtins"),
        ))
    }

    fn fw1() -> OpnSenseDocument {
        let mut doc = OpnSenseDocument::default();
        doc.system.hostname = "fw1".to_string();
        doc.filter.rules = vec![Rule {
            rule_type: "pass".to_string(),
            interface: "wan".to_string(),
            source: RuleEndpoint::any(),
            destination: RuleEndpoint::any(),
            ..Rule::default()
        }];
        doc
    }

    #[test]
    fn every_mode_produces_its_own_report() {
        let ctl = controller();
        let doc = OpnSenseDocument::default();
        for mode in ReportMode::ALL {
            let report = ctl
                .generate_report(&doc, &ModeConfig::new(mode))
                .expect("report");
            assert_eq!(report.mode, mode);
            assert!(!report.metadata.is_empty());
            assert_eq!(report.get("mode"), Some(&json!(mode.as_str())));
        }
    }

    #[test]
    fn standard_mode_extracts_without_findings() {
        let doc = fw1();
        let report = controller()
            .generate_report(&doc, &ModeConfig::new(ReportMode::Standard))
            .expect("report");
        assert_eq!(report.get("hostname"), Some(&json!("fw1")));
        assert_eq!(report.get("firewall_rule_count"), Some(&json!(1)));
        assert!(report.findings.is_empty());
        assert!(report.compliance.is_empty());
    }

    #[test]
    fn blank_and_unknown_plugins_are_rejected() {
        let ctl = controller();
        let doc = OpnSenseDocument::default();

        let blank = ModeConfig::new(ReportMode::Blue).with_plugins(["stig", "  "]);
        assert!(matches!(
            ctl.generate_report(&doc, &blank),
            Err(AuditError::EmptyPluginName)
        ));

        let wrong_case = ModeConfig::new(ReportMode::Blue).with_plugins(["STIG"]);
        let err = ctl.validate(&wrong_case).expect_err("case sensitive");
        assert!(err.to_string().contains("'STIG'"));
        assert!(err.to_string().contains("stig"));
    }

    #[test]
    fn blue_mode_stores_compliance_and_copies_findings() {
        let doc = fw1();
        let config = ModeConfig::new(ReportMode::Blue).with_plugins(["stig", "sans"]);
        let report = controller().generate_report(&doc, &config).expect("report");

        let result = &report.compliance[PLUGIN_COMPLIANCE_KEY];
        assert_eq!(result.summary.plugin_count, 2);
        assert_eq!(report.findings.len(), result.findings.len());
        assert!(!result.compliance["stig"]["V-206694"]);
        assert_eq!(report.get("compliance_check_status"), Some(&json!("completed")));
        assert_eq!(report.get("default_deny"), Some(&json!(false)));
        assert_eq!(report.get("logging_status"), Some(&json!("unable_to_determine")));
    }

    #[test]
    fn blue_mode_without_plugins_skips_compliance() {
        let doc = fw1();
        let report = controller()
            .generate_report(&doc, &ModeConfig::new(ReportMode::Blue))
            .expect("report");
        assert!(report.compliance.is_empty());
        assert_eq!(report.get("compliance_check_status"), Some(&json!("skipped")));
    }

    #[test]
    fn red_mode_reports_exposure_and_commentary() {
        let doc = fw1();
        let mut config = ModeConfig::new(ReportMode::Red);
        config.blackhat = true;
        let report = controller().generate_report(&doc, &config).expect("report");

        assert_eq!(report.get("wan_pass_rule_count"), Some(&json!(1)));
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].attack_surface.is_some());
        assert!(report.get("blackhat_commentary").is_some());
    }

    #[test]
    fn blackhat_is_ignored_outside_red_mode() {
        let doc = fw1();
        let mut config = ModeConfig::new(ReportMode::Standard);
        config.blackhat = true;
        let report = controller().generate_report(&doc, &config).expect("report");
        assert!(report.get("blackhat_commentary").is_none());
    }

    #[test]
    fn every_plugin_failing_marks_compliance_failed() {
        let registry = PluginRegistry::new();
        registry
            .register_all([BrokenPlugin::new("erring", false), BrokenPlugin::new("panicky", true)])
            .expect("register");
        let ctl = ModeController::new(Arc::new(registry));
        let doc = fw1();
        let config = ModeConfig::new(ReportMode::Blue).with_plugins(["erring", "panicky"]);
        let report = ctl.generate_report(&doc, &config).expect("report");

        assert_eq!(report.get("compliance_check_status"), Some(&json!("failed")));
        assert!(report.get("compliance_check_time").is_some());
        let error = report
            .get("compliance_check_error")
            .and_then(|v| v.as_str())
            .expect("error text");
        assert!(error.contains("erring: "), "{error}");
        assert!(error.contains("rule table corrupted"), "{error}");
        let result = &report.compliance[PLUGIN_COMPLIANCE_KEY];
        assert!(result.compliance.is_empty());
        assert_eq!(result.plugin_errors.len(), 2);
    }

    #[test]
    fn some_plugins_failing_marks_compliance_partial() {
        let registry = PluginRegistry::with_builtin_plugins().expect("builtins");
        registry
            .register_plugin(BrokenPlugin::new("erring", false))
            .expect("register");
        let ctl = ModeController::new(Arc::new(registry));
        let doc = fw1();
        let config = ModeConfig::new(ReportMode::Blue).with_plugins(["stig", "erring"]);
        let report = ctl.generate_report(&doc, &config).expect("report");

        assert_eq!(report.get("compliance_check_status"), Some(&json!("partial")));
        assert!(report.get("compliance_check_time").is_some());
        let result = &report.compliance[PLUGIN_COMPLIANCE_KEY];
        assert!(result.compliance.contains_key("stig"));
        assert!(result.plugin_errors.contains_key("erring"));
        assert!(!report.findings.is_empty());
    }
}
