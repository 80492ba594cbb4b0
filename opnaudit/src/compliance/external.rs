//! Out-of-process compliance plugins.
//!
//! Shared-object loading is not portable, so extension plugins are
//! executables speaking a small JSON protocol over stdio:
//!
//! - `<exe> describe` prints a [`PluginDescriptor`] whose `protocol` field
//!   must equal [`PROTOCOL`].
//! - `<exe> check` reads an `OpnSenseDocument` as JSON on stdin and prints
//!   `{"findings": [...]}`.
//!
//! Every invocation is bounded by [`INVOCATION_TIMEOUT`]. Discovery never
//! fails: unreadable directories and misbehaving candidates are logged and
//! skipped.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use opnsense_model::OpnSenseDocument;
use serde::Deserialize;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::plugin::{CompliancePlugin, PluginError};
use super::{Control, Finding};

/// Handshake string an external plugin must report from `describe`.
pub const PROTOCOL: &str = "opnaudit-plugin/1";

pub const INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDescriptor {
    pub protocol: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub controls: Vec<Control>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    findings: Vec<Finding>,
}

#[derive(Debug)]
pub struct ExternalPlugin {
    path: PathBuf,
    descriptor: PluginDescriptor,
    timeout: Duration,
}

impl ExternalPlugin {
    /// Run the `describe` handshake against an executable.
    pub fn load(path: &Path) -> Result<Self, String> {
        let stdout = invoke(path, "describe", None, INVOCATION_TIMEOUT)?;
        let descriptor = parse_descriptor(&stdout)?;
        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            timeout: INVOCATION_TIMEOUT,
        })
    }

    /// Bound later `check` calls by `timeout` instead of the default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompliancePlugin for ExternalPlugin {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn version(&self) -> &str {
        &self.descriptor.version
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn run_checks(&self, doc: &OpnSenseDocument) -> Result<Vec<Finding>, PluginError> {
        let failure = |reason: String| PluginError::External {
            plugin: self.descriptor.name.clone(),
            reason,
        };
        let input = serde_json::to_vec(doc).map_err(|e| failure(e.to_string()))?;
        let stdout = invoke(&self.path, "check", Some(&input), self.timeout).map_err(failure)?;
        let response: CheckResponse = serde_json::from_str(&stdout)
            .map_err(|e| failure(format!("invalid check response: {e}")))?;
        Ok(response.findings)
    }

    fn controls(&self) -> &[Control] {
        &self.descriptor.controls
    }
}

/// Describe every executable in `dir`, skipping failures.
pub fn discover_external_plugins(dir: &Path) -> Vec<ExternalPlugin> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "no external plugin directory");
            return Vec::new();
        }
    };

    let mut candidates = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect::<Vec<_>>();
    candidates.sort();

    let mut out = Vec::new();
    for path in candidates {
        match ExternalPlugin::load(&path) {
            Ok(plugin) => out.push(plugin),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping external plugin candidate");
            }
        }
    }
    out
}

fn parse_descriptor(raw: &str) -> Result<PluginDescriptor, String> {
    let descriptor: PluginDescriptor =
        serde_json::from_str(raw).map_err(|e| format!("invalid describe response: {e}"))?;
    if descriptor.protocol != PROTOCOL {
        return Err(format!(
            "unsupported protocol '{}' (expected '{PROTOCOL}')",
            descriptor.protocol
        ));
    }
    if descriptor.name.trim().is_empty() {
        return Err("describe response has an empty plugin name".to_string());
    }
    Ok(descriptor)
}

fn invoke(
    path: &Path,
    verb: &str,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<String, String> {
    let mut child = Command::new(path)
        .arg(verb)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to start {}: {e}", path.display()))?;

    // Every pipe is serviced off the waiting thread so a plugin that stops
    // reading stdin or floods stderr cannot outlive the timeout.
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);
    let stdin_writer = child.stdin.take().map(|mut stdin| {
        let input = input.map(<[u8]>::to_vec).unwrap_or_default();
        thread::spawn(move || stdin.write_all(&input))
    });

    let status = match child
        .wait_timeout(timeout)
        .map_err(|e| format!("failed to wait for {}: {e}", path.display()))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            // Pipe threads stay detached: a forked grandchild may still
            // hold the pipes open.
            return Err(format!("{verb} timed out after {timeout:?}"));
        }
    };

    if let Some(Ok(Err(err))) = stdin_writer.map(JoinHandle::join) {
        debug!(path = %path.display(), error = %err, "plugin closed stdin early");
    }
    let stdout = collect(stdout_reader, "stdout")?;
    let stderr = collect(stderr_reader, "stderr")?;

    if !status.success() {
        return Err(format!(
            "{verb} exited with {}: {}",
            status.code().map_or("signal".to_string(), |c| c.to_string()),
            String::from_utf8_lossy(&stderr).trim()
        ));
    }
    String::from_utf8(stdout).map_err(|e| format!("plugin output is not UTF-8: {e}"))
}

fn drain<R: Read + Send + 'static>(mut source: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).map(|_| buf)
    })
}

fn collect(
    reader: Option<JoinHandle<io::Result<Vec<u8>>>>,
    stream: &str,
) -> Result<Vec<u8>, String> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| format!("{stream} reader panicked"))?
            .map_err(|e| format!("failed to read plugin {stream}: {e}")),
        None => Ok(Vec::new()),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    use opnsense_model::{OpnSenseDocument, Rule};
    use tempfile::tempdir;

    use super::{discover_external_plugins, parse_descriptor, ExternalPlugin, PROTOCOL};
    use crate::compliance::plugin::{CompliancePlugin, PluginError};
    use crate::compliance::registry::PluginRegistry;

    #[test]
    fn descriptor_requires_matching_protocol() {
        let raw = r#"{"protocol":"other/9","name":"x","version":"1","controls":[]}"#;
        let err = parse_descriptor(raw).expect_err("must fail");
        assert!(err.contains("unsupported protocol"));
    }

    #[test]
    fn descriptor_parses_controls() {
        let raw = format!(
            r#"{{"protocol":"{PROTOCOL}","name":"site","version":"0.2.0",
                "controls":[{{"id":"SITE-1","title":"Banner","severity":"low"}}]}}"#
        );
        let descriptor = parse_descriptor(&raw).expect("parse");
        assert_eq!(descriptor.name, "site");
        assert_eq!(descriptor.controls[0].id, "SITE-1");
    }

    #[test]
    fn garbage_is_a_contract_mismatch() {
        assert!(parse_descriptor("not json").is_err());
    }

    #[test]
    fn missing_directory_yields_no_plugins() {
        let dir = tempdir().expect("tempdir");
        assert!(discover_external_plugins(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn non_executable_files_are_ignored() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), "hello").expect("write");
        assert!(discover_external_plugins(dir.path()).is_empty());
    }

    #[cfg(unix)]
    fn write_plugin(dir: &Path, file: &str, describe: &str, check: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(file);
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ncase \"$1\" in\n  describe)\n{describe}\n    ;;\n  check)\n{check}\n    ;;\n  *) exit 2 ;;\nesac\n"
            ),
        )
        .expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        script
    }

    #[cfg(unix)]
    fn site_describe() -> String {
        format!(
            r#"    echo '{{"protocol":"{PROTOCOL}","name":"site","version":"1.0.0","description":"site rules","controls":[{{"id":"SITE-1","title":"Banner","severity":"low"}}]}}'"#
        )
    }

    #[cfg(unix)]
    #[test]
    fn shell_plugin_round_trip() {
        let dir = tempdir().expect("tempdir");
        write_plugin(
            dir.path(),
            "site-policy",
            &site_describe(),
            r#"    cat >/dev/null
    echo '{"findings":[{"type":"compliance","title":"Banner","references":["SITE-1"]}]}'"#,
        );

        let plugins = discover_external_plugins(dir.path());
        assert_eq!(plugins.len(), 1);
        let plugin = &plugins[0];
        assert_eq!(plugin.name(), "site");
        assert_eq!(plugin.path(), dir.path().join("site-policy"));
        let findings = plugin
            .run_checks(&OpnSenseDocument::default())
            .expect("check");
        assert_eq!(findings[0].control_id(), Some("SITE-1"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_candidate_is_skipped() {
        let dir = tempdir().expect("tempdir");
        write_plugin(dir.path(), "broken", "    exit 1", "    exit 1");
        assert!(discover_external_plugins(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn check_exit_status_is_reported() {
        let dir = tempdir().expect("tempdir");
        let script = write_plugin(
            dir.path(),
            "site",
            &site_describe(),
            "    cat >/dev/null\n    echo 'rules file missing' >&2\n    exit 3",
        );
        let plugin = ExternalPlugin::load(&script).expect("describe");
        let err = plugin
            .run_checks(&OpnSenseDocument::default())
            .expect_err("must fail");
        assert!(matches!(err, PluginError::External { ref plugin, .. } if plugin == "site"));
        let message = err.to_string();
        assert!(message.contains("exited with 3"), "{message}");
        assert!(message.contains("rules file missing"), "{message}");
    }

    #[cfg(unix)]
    #[test]
    fn malformed_check_response_is_reported() {
        let dir = tempdir().expect("tempdir");
        let script = write_plugin(
            dir.path(),
            "site",
            &site_describe(),
            "    cat >/dev/null\n    echo 'findings: none'",
        );
        let plugin = ExternalPlugin::load(&script).expect("describe");
        let err = plugin
            .run_checks(&OpnSenseDocument::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("invalid check response"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn stalled_check_is_killed_at_the_timeout() {
        let dir = tempdir().expect("tempdir");
        let script = write_plugin(dir.path(), "site", &site_describe(), "    exec sleep 10");
        let plugin = ExternalPlugin::load(&script)
            .expect("describe")
            .with_timeout(Duration::from_secs(1));

        // Far larger than a pipe buffer, and the plugin never reads it.
        let mut doc = OpnSenseDocument::default();
        doc.filter.rules.push(Rule {
            description: "x".repeat(512 * 1024),
            ..Rule::default()
        });

        let started = Instant::now();
        let err = plugin.run_checks(&doc).expect_err("must time out");
        assert!(err.to_string().contains("check timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn noisy_stderr_does_not_stall_describe() {
        let dir = tempdir().expect("tempdir");
        let describe = format!(
            "    head -c 262144 /dev/zero | tr '\\0' x >&2\n{}",
            site_describe()
        );
        let script = write_plugin(dir.path(), "site", &describe, "    exit 0");

        let started = Instant::now();
        let plugin = ExternalPlugin::load(&script).expect("describe");
        assert_eq!(plugin.name(), "site");
        assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn failing_external_check_lands_in_plugin_errors() {
        let dir = tempdir().expect("tempdir");
        write_plugin(
            dir.path(),
            "site",
            &site_describe(),
            "    cat >/dev/null\n    exit 1",
        );
        let registry = PluginRegistry::new();
        assert_eq!(registry.load_dynamic_plugins(dir.path()), 1);

        let result = registry
            .run_compliance_checks(&OpnSenseDocument::default(), &["site".to_string()])
            .expect("run");
        assert!(result.plugin_errors["site"].contains("exited with 1"));
        assert!(!result.compliance.contains_key("site"));
        assert!(result.plugin_info.contains_key("site"));
        assert_eq!(result.summary.plugin_count, 0);
    }
}
