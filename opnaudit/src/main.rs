use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use opnaudit::compliance::registry::PluginRegistry;
use opnaudit::config::{default_settings, load_settings, AuditSettings};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audit_cmd;
mod cli;
mod plugins_cmd;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Audit(args) => audit_cmd::run_audit(args),
        Command::Plugins(args) => plugins_cmd::run_plugins(args),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "debug".to_string()
    } else {
        std::env::var("OPNAUDIT_LOG").unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Settings from `path`, falling back to the embedded defaults when the
/// file cannot be used.
pub(crate) fn resolve_settings(path: Option<&Path>) -> AuditSettings {
    let Some(path) = path else {
        return default_settings();
    };
    match load_settings(path) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "using embedded settings");
            default_settings()
        }
    }
}

/// Built-in catalogs plus any external plugins in `plugin_dir`.
pub(crate) fn build_registry(plugin_dir: Option<&PathBuf>) -> Result<Arc<PluginRegistry>> {
    let registry =
        PluginRegistry::with_builtin_plugins().context("failed to register built-in plugins")?;
    if let Some(dir) = plugin_dir {
        registry.load_dynamic_plugins(dir);
    }
    Ok(Arc::new(registry))
}
