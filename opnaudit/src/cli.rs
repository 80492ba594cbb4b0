use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "opnaudit")]
#[command(about = "Audit firewall XML configurations for compliance and exposure")]
pub struct Cli {
    /// Raise log output to debug (overrides OPNAUDIT_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Generate an audit report for one config.
    Audit(AuditArgs),
    /// List registered compliance plugins and their controls.
    Plugins(PluginsArgs),
}

#[derive(Parser, Debug)]
pub struct AuditArgs {
    /// Config file to audit.
    pub file: PathBuf,
    /// Report mode: standard, blue (defensive) or red (offensive).
    #[arg(long)]
    pub mode: Option<String>,
    /// Add red-team commentary (red mode only).
    #[arg(long)]
    pub blackhat: bool,
    /// Include per-interface, per-rule and per-control detail tables.
    #[arg(long)]
    pub comprehensive: bool,
    /// Comma-separated compliance plugins to run in blue mode.
    #[arg(long)]
    pub plugins: Option<String>,
    /// Directory of external plugin executables.
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,
    /// Template directory hint recorded in the report.
    #[arg(long)]
    pub template_dir: Option<PathBuf>,
    /// Optional settings TOML file. Defaults to the embedded settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct PluginsArgs {
    /// Directory of external plugin executables.
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,
    /// Optional settings TOML file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
