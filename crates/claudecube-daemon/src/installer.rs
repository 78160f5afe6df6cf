//! Installs the hook bridge into the agent's settings file.
//!
//! Installation is idempotent: hook entries whose command contains the
//! `claudecube` filename substring are replaced in place; hooks belonging
//! to anything else are preserved untouched.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;

const BRIDGE_FILENAME: &str = "claudecube-hook.sh";
const MARKER: &str = "claudecube";

/// Hook events registered by the installer, with per-event bridge timeouts
/// in seconds.
const HOOK_EVENTS: &[(&str, u64)] = &[
    ("PreToolUse", 120),
    ("Stop", 30),
    ("SessionStart", 5),
    ("SessionEnd", 5),
    ("Notification", 5),
];

/// Write the bridge script and register it for every hook event.
pub fn install(settings_path: &Path, bridge_dir: &Path, port: u16) -> Result<()> {
    let bridge_path = write_bridge_script(bridge_dir, port)?;

    let mut settings = read_settings(settings_path);
    let root = settings
        .as_object_mut()
        .context("settings file is not a JSON object")?;
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| json!({}));
    let hooks = hooks
        .as_object_mut()
        .context("settings 'hooks' is not a JSON object")?;

    for (event, timeout) in HOOK_EVENTS {
        let command = format!("{} {event}", bridge_path.display());
        upsert_hook(hooks, event, &command, *timeout);
    }

    write_settings(settings_path, &settings)?;
    info!(settings = %settings_path.display(), bridge = %bridge_path.display(), "hooks installed");
    Ok(())
}

/// Remove every hook whose command contains the marker; foreign hooks and
/// the rest of the file are untouched.
pub fn uninstall(settings_path: &Path) -> Result<()> {
    if !settings_path.exists() {
        return Ok(());
    }
    let mut settings = read_settings(settings_path);
    if let Some(hooks) = settings.get_mut("hooks").and_then(Value::as_object_mut) {
        for (_event, groups) in hooks.iter_mut() {
            if let Some(groups) = groups.as_array_mut() {
                for group in groups.iter_mut() {
                    if let Some(list) = group.get_mut("hooks").and_then(Value::as_array_mut) {
                        list.retain(|hook| !is_ours(hook));
                    }
                }
                groups.retain(|group| {
                    group
                        .get("hooks")
                        .and_then(Value::as_array)
                        .map(|l| !l.is_empty())
                        .unwrap_or(true)
                });
            }
        }
        hooks.retain(|_event, groups| {
            groups.as_array().map(|g| !g.is_empty()).unwrap_or(true)
        });
    }
    write_settings(settings_path, &settings)?;
    info!(settings = %settings_path.display(), "hooks removed");
    Ok(())
}

fn is_ours(hook: &Value) -> bool {
    hook.get("command")
        .and_then(Value::as_str)
        .map(|c| c.contains(MARKER))
        .unwrap_or(false)
}

fn upsert_hook(
    hooks: &mut serde_json::Map<String, Value>,
    event: &str,
    command: &str,
    timeout: u64,
) {
    let new_hook = json!({"type": "command", "command": command, "timeout": timeout});
    let groups = hooks.entry(event.to_string()).or_insert_with(|| json!([]));
    let Some(groups) = groups.as_array_mut() else {
        *groups = json!([{ "hooks": [new_hook] }]);
        return;
    };

    let mut replaced = false;
    for group in groups.iter_mut() {
        if let Some(list) = group.get_mut("hooks").and_then(Value::as_array_mut) {
            for hook in list.iter_mut() {
                if is_ours(hook) {
                    *hook = new_hook.clone();
                    replaced = true;
                }
            }
        }
    }
    if !replaced {
        if event == "PreToolUse" {
            groups.push(json!({"matcher": "*", "hooks": [new_hook]}));
        } else {
            groups.push(json!({"hooks": [new_hook]}));
        }
    }
}

fn read_settings(path: &Path) -> Value {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_else(|| json!({}))
}

fn write_settings(path: &Path, settings: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent dirs for {}", path.display()))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content)
        .with_context(|| format!("failed to write settings file {}", path.display()))?;
    Ok(())
}

/// Emit the shell bridge. The script has its own fast-path loop guard and
/// exits 0 on any failure so the agent is never blocked by a dead daemon.
fn write_bridge_script(bridge_dir: &Path, port: u16) -> Result<PathBuf> {
    fs::create_dir_all(bridge_dir)
        .with_context(|| format!("creating bridge dir {}", bridge_dir.display()))?;
    let path = bridge_dir.join(BRIDGE_FILENAME);
    let script = format!(
        r#"#!/bin/sh
# ClaudeCube hook bridge. Reads one hook JSON object from stdin, forwards
# it to the local daemon, and echoes the reply. Exits 0 on any failure so
# the agent proceeds unhindered when the daemon is down.
EVENT="$1"
PORT="${{CLAUDECUBE_PORT:-{port}}}"
INPUT="$(cat)"
case "$INPUT" in
  *'"stop_hook_active":true'*) printf '{{}}'; exit 0 ;;
esac
curl -s --max-time 60 -X POST "http://localhost:${{PORT}}/hooks/${{EVENT}}" \
  -H 'Content-Type: application/json' \
  -d "$INPUT" 2>/dev/null || true
exit 0
"#
    );
    fs::write(&path, script)
        .with_context(|| format!("failed to write bridge script {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}
