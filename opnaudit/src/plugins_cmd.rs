use anyhow::Result;
use opnaudit::compliance::plugin::CompliancePlugin;
use opnaudit::render::render_plugin_list;

use crate::cli::{OutputFormat, PluginsArgs};

pub fn run_plugins(args: PluginsArgs) -> Result<()> {
    let settings = crate::resolve_settings(args.config.as_deref());
    let plugin_dir = args.plugin_dir.as_ref().or(settings.plugin_dir.as_ref());
    let registry = crate::build_registry(plugin_dir)?;

    let plugins = registry
        .list_plugins()
        .iter()
        .map(|name| registry.get_plugin(name).map(|p| p.info()))
        .collect::<Result<Vec<_>, _>>()?;

    match args.format {
        OutputFormat::Text => println!("{}", render_plugin_list(&plugins)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plugins)?),
    }
    Ok(())
}
