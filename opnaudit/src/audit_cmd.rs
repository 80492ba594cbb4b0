use anyhow::{Context, Result};
use opnaudit::audit::controller::ModeController;
use opnaudit::audit::{parse_plugin_list, ModeConfig, ReportMode};
use opnaudit::render::render_report_text;
use opnsense_model::load_document;

use crate::cli::{AuditArgs, OutputFormat};

pub fn run_audit(args: AuditArgs) -> Result<()> {
    let settings = crate::resolve_settings(args.config.as_deref());
    let mode_name = args.mode.as_deref().unwrap_or(settings.default_mode.as_str());
    let mode: ReportMode = mode_name.parse()?;

    let doc = load_document(&args.file)
        .with_context(|| format!("failed to parse {}", args.file.display()))?;
    let plugin_dir = args.plugin_dir.as_ref().or(settings.plugin_dir.as_ref());
    let controller = ModeController::new(crate::build_registry(plugin_dir)?);

    let selected = match (&args.plugins, mode) {
        (Some(raw), _) => parse_plugin_list(raw),
        (None, ReportMode::Blue) => settings.plugins.clone(),
        (None, _) => Vec::new(),
    };
    let config = ModeConfig {
        mode,
        blackhat: args.blackhat,
        comprehensive: args.comprehensive,
        selected_plugins: selected,
        template_dir: args.template_dir.or(settings.template_dir),
    };

    let report = controller.generate_report(&doc, &config)?;
    match args.format {
        OutputFormat::Text => println!("{}", render_report_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
