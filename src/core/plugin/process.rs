//! Plugins as separate executables speaking JSON over stdin/stdout.
//!
//! Each call spawns the plugin, writes one request line and reads one
//! response document:
//!
//! ```text
//! -> {"protocol": 1, "method": "validate_check", "params": {"check": {...}}}
//! <- {"ok": true, "result": ...}
//! <- {"ok": false, "error": "url is required"}
//! ```

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::PluginController;
use crate::error::{Error, Result};
use crate::executor::{
    ConfigMap, ExecContext, Executor, PluginAction, PluginCheck, PluginComponent, PluginInfo,
};

/// Version of the request/response protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment exported to every plugin invocation.
pub mod env {
    pub const PROTOCOL: &str = "ROLLER_PROTOCOL_VERSION";
    /// Qualified stage path, empty outside stage execution.
    pub const STAGE: &str = "ROLLER_STAGE";
    /// `1` when the run is a dry run.
    pub const DRY_RUN: &str = "ROLLER_DRY_RUN";
    pub const PLUGIN_PATH: &str = "ROLLER_PLUGIN_PATH";
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    protocol: u32,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

pub struct ProcessExecutor {
    path: PathBuf,
    info: PluginInfo,
}

impl ProcessExecutor {
    /// Asks the executable for its info; fails if it does not speak the protocol.
    pub fn open(path: &Path) -> Result<Self> {
        let label = path.display().to_string();
        let value = call(path, &label, "get_info", Value::Null, None)?;
        let info: PluginInfo = serde_json::from_value(value)
            .map_err(|e| Error::plugin_protocol(&label, format!("invalid get_info result: {}", e)))?;
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    fn call(&self, method: &str, params: Value, ctx: Option<&ExecContext>) -> Result<Value> {
        call(&self.path, &self.info.name, method, params, ctx)
    }
}

fn call(
    path: &Path,
    plugin: &str,
    method: &str,
    params: Value,
    ctx: Option<&ExecContext>,
) -> Result<Value> {
    let request = Request {
        protocol: PROTOCOL_VERSION,
        method,
        params,
    };
    let mut payload = serde_json::to_string(&request)
        .map_err(|e| Error::internal_json(e.to_string(), Some(format!("encode {}", method))))?;
    payload.push('\n');

    let mut command = Command::new(path);
    command
        .env(env::PROTOCOL, PROTOCOL_VERSION.to_string())
        .env(env::PLUGIN_PATH, path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(ctx) = ctx {
        command
            .env(env::STAGE, &ctx.stage)
            .env(env::DRY_RUN, if ctx.dry_run { "1" } else { "0" });
    }

    debug!(plugin, method, "calling plugin process");
    let mut child = command
        .spawn()
        .map_err(|e| Error::plugin_protocol(plugin, format!("failed to spawn: {}", e)))?;

    // A plugin may answer and exit without reading its request; the response
    // on stdout still decides the call.
    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(payload.as_bytes()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(plugin, method, "plugin closed stdin before reading the request");
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::plugin_protocol(
                    plugin,
                    format!("failed to write request: {}", e),
                ));
            }
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::plugin_protocol(plugin, format!("failed to read response: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        debug!(plugin, method, stderr = %stderr.trim(), "plugin stderr");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let response: Response = serde_json::from_str(stdout.trim()).map_err(|e| {
        Error::plugin_protocol(
            plugin,
            format!(
                "invalid response to '{}' (exit status {}): {}",
                method, output.status, e
            ),
        )
    })?;

    if response.ok {
        Ok(response.result)
    } else {
        let message = response
            .error
            .unwrap_or_else(|| format!("'{}' failed without a message", method));
        Err(Error::plugin_error(plugin, method, message))
    }
}

fn map_value(raw: &ConfigMap) -> Value {
    Value::Object(raw.clone().into_iter().collect())
}

impl Executor for ProcessExecutor {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn get_component(&self, raw: &ConfigMap) -> Result<PluginComponent> {
        self.call("get_component", json!({ "config": map_value(raw) }), None)
            .map(PluginComponent::new)
    }

    fn validate_component(&self, component: &PluginComponent) -> Result<()> {
        self.call(
            "validate_component",
            json!({ "component": component.as_value() }),
            None,
        )
        .map(|_| ())
    }

    fn get_action(&self, raw: &ConfigMap) -> Result<PluginAction> {
        self.call("get_action", json!({ "action": map_value(raw) }), None)
            .map(PluginAction::new)
    }

    fn get_check(&self, raw: &ConfigMap) -> Result<PluginCheck> {
        self.call("get_check", json!({ "check": map_value(raw) }), None)
            .map(PluginCheck::new)
    }

    fn validate_action(&self, ctx: &ExecContext, action: &PluginAction) -> Result<()> {
        self.call(
            "validate_action",
            json!({ "action": action.as_value() }),
            Some(ctx),
        )
        .map(|_| ())
    }

    fn validate_check(&self, ctx: &ExecContext, check: &PluginCheck) -> Result<()> {
        self.call(
            "validate_check",
            json!({ "check": check.as_value() }),
            Some(ctx),
        )
        .map(|_| ())
    }

    fn execute_action(
        &self,
        ctx: &ExecContext,
        component: &PluginComponent,
        action: &PluginAction,
    ) -> Result<()> {
        self.call(
            "execute_action",
            json!({ "component": component.as_value(), "action": action.as_value() }),
            Some(ctx),
        )
        .map(|_| ())
    }

    fn execute_check(
        &self,
        ctx: &ExecContext,
        component: &PluginComponent,
        check: &PluginCheck,
    ) -> Result<bool> {
        let result = self.call(
            "execute_check",
            json!({ "component": component.as_value(), "check": check.as_value() }),
            Some(ctx),
        )?;
        match result {
            Value::Bool(passed) => Ok(passed),
            Value::Object(ref map) => map.get("passed").and_then(Value::as_bool).ok_or_else(|| {
                Error::plugin_protocol(&self.info.name, "execute_check result has no 'passed' flag")
            }),
            other => Err(Error::plugin_protocol(
                &self.info.name,
                format!("execute_check returned {} instead of a boolean", other),
            )),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Registers every executable in `dir` under the name it reports from
/// `get_info`. Files that do not speak the protocol are skipped with a
/// warning. A missing directory registers nothing.
pub fn load_plugin_dir(controller: &PluginController, dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        debug!(path = %dir.display(), "plugin directory does not exist");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read plugin dir {}", dir.display())))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_executable(path))
        .collect();
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        match ProcessExecutor::open(&path) {
            Ok(executor) => {
                let name = executor.info.name.clone();
                if controller.register(&name, Arc::new(executor)) {
                    info!(plugin = %name, path = %path.display(), "plugin loaded");
                    loaded.push(name);
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping plugin");
            }
        }
    }

    Ok(loaded)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const ECHO_PLUGIN: &str = r#"#!/bin/sh
read -r request
case "$request" in
  *'"get_info"'*) echo '{"ok":true,"result":{"name":"echo","version":"0.1.0","description":"test"}}' ;;
  *'"validate_check"'*) echo '{"ok":false,"error":"url is required"}' ;;
  *'"execute_check"'*) echo "{\"ok\":true,\"result\":{\"passed\":$([ "$ROLLER_DRY_RUN" = 0 ] && echo true || echo false)}}" ;;
  *'"get_check"'*) echo '{"ok":true,"result":{"url":"http://svc"}}' ;;
  *) echo '{"ok":true,"result":null}' ;;
esac
"#;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn open_reads_plugin_info() {
        let dir = TempDir::new().unwrap();
        let path = write_script(dir.path(), "echo-plugin", ECHO_PLUGIN);

        let executor = ProcessExecutor::open(&path).unwrap();
        assert_eq!(executor.info().name, "echo");
        assert_eq!(executor.info().version, "0.1.0");
    }

    #[test]
    fn plugin_reported_error_keeps_message() {
        let dir = TempDir::new().unwrap();
        let path = write_script(dir.path(), "echo-plugin", ECHO_PLUGIN);
        let executor = ProcessExecutor::open(&path).unwrap();

        let check = executor.get_check(&ConfigMap::new()).unwrap();
        let err = executor
            .validate_check(&ExecContext::new(false), &check)
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::PluginError);
        assert_eq!(err.message, "url is required");
    }

    #[test]
    fn execute_check_sees_context_environment() {
        let dir = TempDir::new().unwrap();
        let path = write_script(dir.path(), "echo-plugin", ECHO_PLUGIN);
        let executor = ProcessExecutor::open(&path).unwrap();
        let component = PluginComponent::new(Value::Null);
        let check = PluginCheck::new(Value::Null);

        assert!(executor
            .execute_check(&ExecContext::new(false), &component, &check)
            .unwrap());
        assert!(!executor
            .execute_check(&ExecContext::new(true), &component, &check)
            .unwrap());
    }

    #[test]
    fn response_counts_when_plugin_ignores_request() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            dir.path(),
            "mute",
            "#!/bin/sh\necho '{\"ok\":true,\"result\":{\"name\":\"mute\"}}'\n",
        );
        // Larger than a pipe buffer, so the write outlives the plugin.
        let params = json!({ "config": { "blob": "x".repeat(1024 * 1024) } });

        let result = call(&path, "mute", "get_component", params, None).unwrap();

        assert_eq!(result, json!({ "name": "mute" }));
    }

    #[test]
    fn load_plugin_dir_skips_non_plugins() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "echo-plugin", ECHO_PLUGIN);
        write_script(dir.path(), "broken", "#!/bin/sh\necho not-json\n");
        std::fs::write(dir.path().join("README.md"), "docs").unwrap();

        let controller = PluginController::without_installer();
        let loaded = load_plugin_dir(&controller, dir.path()).unwrap();

        assert_eq!(loaded, vec!["echo".to_string()]);
        assert!(controller.lookup("echo").is_some());
    }

    #[test]
    fn missing_plugin_dir_loads_nothing() {
        let controller = PluginController::without_installer();
        let loaded = load_plugin_dir(&controller, Path::new("/nonexistent/plugins")).unwrap();
        assert!(loaded.is_empty());
    }
}
