//! tmux adapter: pane discovery, label resolution, and key injection.
//!
//! Everything except `send_keys` is best-effort — a missing tmux server or
//! a failed subprocess just means no panes / no label.

use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::debug;

use claudecube_core::session::{Multiplexer, PaneInfo};

/// Pane commands treated as the agent CLI during discovery.
const AGENT_COMMANDS: &[&str] = &["claude", "node"];

const PANE_FORMAT: &str = "#{session_name}\t#{window_index}\t#{window_name}\t#{pane_index}\t#{pane_id}\t#{pane_current_path}\t#{pane_current_command}";

pub struct TmuxControl;

impl TmuxControl {
    pub fn new() -> Self {
        Self
    }

    /// `Some` only when a tmux server answers.
    pub fn detect() -> Option<Self> {
        match run_tmux(&["display-message", "-p", "ok"]) {
            Ok(_) => Some(Self),
            Err(e) => {
                debug!(error = %e, "tmux not reachable, running without pane control");
                None
            }
        }
    }
}

impl Default for TmuxControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for TmuxControl {
    fn list_panes(&self) -> Vec<PaneInfo> {
        let output = match run_tmux(&["list-panes", "-a", "-F", PANE_FORMAT]) {
            Ok(o) => o,
            Err(_) => return Vec::new(),
        };
        output
            .lines()
            .filter_map(parse_pane_line)
            .filter(|p| AGENT_COMMANDS.contains(&p.command.as_str()))
            .collect()
    }

    fn find_pane_for_cwd(&self, cwd: &str) -> Option<String> {
        self.list_panes()
            .into_iter()
            .find(|p| p.pane_cwd == cwd)
            .map(|p| p.pane_id)
    }

    fn send_keys(&self, pane_id: &str, text: &str) -> Result<()> {
        run_tmux(&["send-keys", "-t", pane_id, text, "Enter"]).map(|_| ())
    }

    fn resolve_label(&self, cwd: &str) -> Option<String> {
        self.list_panes()
            .into_iter()
            .find(|p| p.pane_cwd == cwd)
            .map(|p| p.window_name)
    }
}

fn run_tmux(args: &[&str]) -> Result<String> {
    let output = Command::new("tmux")
        .args(args)
        .output()
        .context("failed to spawn tmux")?;
    if !output.status.success() {
        bail!(
            "tmux {} failed: {}",
            args.first().unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_pane_line(line: &str) -> Option<PaneInfo> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 7 {
        return None;
    }
    Some(PaneInfo {
        session_name: fields[0].to_string(),
        window_index: fields[1].parse().ok()?,
        window_name: fields[2].to_string(),
        pane_index: fields[3].parse().ok()?,
        pane_id: fields[4].to_string(),
        pane_cwd: fields[5].to_string(),
        command: fields[6].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_pane_line() {
        let pane =
            parse_pane_line("main\t2\tmyproject\t0\t%7\t/home/user/proj\tclaude").unwrap();
        assert_eq!(pane.session_name, "main");
        assert_eq!(pane.window_index, 2);
        assert_eq!(pane.window_name, "myproject");
        assert_eq!(pane.pane_id, "%7");
        assert_eq!(pane.pane_cwd, "/home/user/proj");
        assert_eq!(pane.command, "claude");
    }

    #[test]
    fn malformed_lines_are_dropped() {
        assert!(parse_pane_line("too\tfew\tfields").is_none());
        assert!(parse_pane_line("main\tNaN\twin\t0\t%1\t/p\tclaude").is_none());
        assert!(parse_pane_line("").is_none());
    }
}
