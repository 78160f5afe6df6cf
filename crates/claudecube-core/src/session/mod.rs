//! Session tracking and the terminal-multiplexer seam.

mod registry;

pub use registry::{SessionInfo, SessionRegistry, SessionState, SYNTHETIC_PREFIX};

/// One pane as reported by the multiplexer, filtered to panes running the
/// agent CLI.
#[derive(Debug, Clone)]
pub struct PaneInfo {
    pub session_name: String,
    pub window_index: u32,
    pub window_name: String,
    pub pane_index: u32,
    pub pane_id: String,
    pub pane_cwd: String,
    pub command: String,
}

/// Control surface over the terminal multiplexer the agent sessions run in.
///
/// Every operation except `send_keys` is best-effort: failures come back as
/// empty/`None` rather than errors. `send_keys` propagates its error so the
/// reply handler can tell the user the injection did not land.
pub trait Multiplexer: Send + Sync {
    fn list_panes(&self) -> Vec<PaneInfo>;

    fn find_pane_for_cwd(&self, cwd: &str) -> Option<String>;

    /// Type `text` into the pane and press Enter.
    fn send_keys(&self, pane_id: &str, text: &str) -> anyhow::Result<()>;

    /// Window name of the pane whose working directory equals `cwd`.
    fn resolve_label(&self, cwd: &str) -> Option<String>;
}
