//! Compliance and exposure audits for OPNsense and pfSense configurations.
//!
//! The library takes a parsed [`opnsense_model::OpnSenseDocument`] and
//! produces an in-memory [`audit::Report`] in one of three modes. It never
//! reads configuration files itself beyond its own settings, and never
//! persists anything.
//!
//! # Architecture
//!
//! - [`compliance`] — controls, findings, the plugin contract and registry
//! - [`plugins`] — the built-in control catalogs (`firewall`, `stig`, `sans`)
//! - [`audit`] — report modes, the mode controller and its analysis steps
//! - [`config`] — TOML settings with embedded defaults
//! - [`render`] — terminal-friendly coloured report output
//!
//! # Examples
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use opnaudit::audit::controller::ModeController;
//! use opnaudit::audit::{ModeConfig, ReportMode};
//! use opnaudit::compliance::registry::PluginRegistry;
//! use opnsense_model::load_document;
//!
//! let doc = load_document("config.xml".as_ref())?;
//! let registry = Arc::new(PluginRegistry::with_builtin_plugins()?);
//! let controller = ModeController::new(registry);
//! let config = ModeConfig::new(ReportMode::Blue).with_plugins(["stig", "sans"]);
//! let report = controller.generate_report(&doc, &config)?;
//! println!("{} findings", report.findings.len());
//! ```

pub mod audit;
pub mod compliance;
pub mod config;
pub mod plugins;
pub mod render;
