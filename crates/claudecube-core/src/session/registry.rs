//! In-memory session registry.
//!
//! Sessions appear either through hook events or through a startup scan of
//! the terminal multiplexer. The scan produces *synthetic* sessions
//! (`tmux_<paneId>`) that are merged into the real session the first time a
//! hook arrives for the same working directory, carrying over the label,
//! start time, and denial count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Multiplexer;

/// Prefix marking sessions discovered by the multiplexer scan.
pub const SYNTHETIC_PREFIX: &str = "tmux_";

/// Label fallback: leading characters of the session id.
const LABEL_ID_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Idle,
    PermissionPending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub cwd: String,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tool_name: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub denial_count: u32,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
}

/// The session table. One entry per session id; label is set once at
/// registration and never changes afterwards.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionInfo>>,
    tmux: Option<Arc<dyn Multiplexer>>,
}

impl SessionRegistry {
    pub fn new(tmux: Option<Arc<dyn Multiplexer>>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            tmux,
        }
    }

    /// Register a session. The label resolves from the multiplexer window
    /// whose working directory equals `cwd`, falling back to a session-id
    /// prefix. No-op if the id is already present.
    pub fn register(&self, session_id: &str, cwd: &str, transcript_path: Option<&str>) {
        // Resolve through tmux before taking the table lock.
        let label = self
            .tmux
            .as_ref()
            .and_then(|t| t.resolve_label(cwd))
            .unwrap_or_else(|| session_id.chars().take(LABEL_ID_PREFIX_LEN).collect());
        let pane_id = self.tmux.as_ref().and_then(|t| t.find_pane_for_cwd(cwd));

        let now = Utc::now();
        let mut sessions = self.lock();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionInfo {
                session_id: session_id.to_string(),
                cwd: cwd.to_string(),
                started_at: now,
                state: SessionState::Active,
                last_tool_name: None,
                last_activity: now,
                denial_count: 0,
                label,
                pane_id,
                transcript_path: transcript_path.map(str::to_string),
            });
    }

    pub fn deregister(&self, session_id: &str) -> Option<SessionInfo> {
        self.lock().remove(session_id)
    }

    /// Idempotent registration used by every hook handler.
    ///
    /// Known id: no-op, except that a transcript path arriving for the
    /// first time is recorded. Unknown id with a synthetic session at the
    /// same cwd: merge. Otherwise: plain registration.
    pub fn ensure_registered(&self, session_id: &str, cwd: &str, transcript_path: Option<&str>) {
        {
            let mut sessions = self.lock();
            if let Some(info) = sessions.get_mut(session_id) {
                if info.transcript_path.is_none() {
                    if let Some(path) = transcript_path {
                        info.transcript_path = Some(path.to_string());
                    }
                }
                return;
            }

            let synthetic_id = sessions
                .iter()
                .find(|(id, info)| id.starts_with(SYNTHETIC_PREFIX) && info.cwd == cwd)
                .map(|(id, _)| id.clone());
            if let Some(synthetic_id) = synthetic_id {
                if let Some(mut info) = sessions.remove(&synthetic_id) {
                    info.session_id = session_id.to_string();
                    info.last_activity = Utc::now();
                    if info.transcript_path.is_none() {
                        info.transcript_path = transcript_path.map(str::to_string);
                    }
                    sessions.insert(session_id.to_string(), info);
                }
                return;
            }
        }
        self.register(session_id, cwd, transcript_path);
    }

    /// Seed the table with synthetic sessions from a multiplexer scan.
    /// Panes whose cwd already has a session are skipped.
    pub fn register_from_tmux(&self) {
        let Some(tmux) = &self.tmux else {
            return;
        };
        let panes = tmux.list_panes();
        let now = Utc::now();
        let mut sessions = self.lock();
        for pane in panes {
            let already_tracked = sessions.values().any(|info| info.cwd == pane.pane_cwd);
            if already_tracked {
                continue;
            }
            let session_id = format!("{SYNTHETIC_PREFIX}{}", pane.pane_id);
            sessions.insert(
                session_id.clone(),
                SessionInfo {
                    session_id,
                    cwd: pane.pane_cwd,
                    started_at: now,
                    state: SessionState::Idle,
                    last_tool_name: None,
                    last_activity: now,
                    denial_count: 0,
                    label: pane.window_name,
                    pane_id: Some(pane.pane_id),
                    transcript_path: None,
                },
            );
        }
    }

    /// Silently no-ops on unknown ids, as do the other per-key updates.
    pub fn update_state(&self, session_id: &str, state: SessionState) {
        if let Some(info) = self.lock().get_mut(session_id) {
            info.state = state;
            info.last_activity = Utc::now();
        }
    }

    pub fn update_tool_use(&self, session_id: &str, tool_name: &str) {
        if let Some(info) = self.lock().get_mut(session_id) {
            info.last_tool_name = Some(tool_name.to_string());
            info.last_activity = Utc::now();
        }
    }

    /// Bump the denial counter, returning the new count when the session is
    /// known.
    pub fn record_denial(&self, session_id: &str) -> Option<u32> {
        self.lock().get_mut(session_id).map(|info| {
            info.denial_count += 1;
            info.denial_count
        })
    }

    /// Touch the activity timestamp (heartbeats).
    pub fn touch(&self, session_id: &str) {
        if let Some(info) = self.lock().get_mut(session_id) {
            info.last_activity = Utc::now();
        }
    }

    pub fn get_label(&self, session_id: &str) -> Option<String> {
        self.lock().get(session_id).map(|i| i.label.clone())
    }

    pub fn get_pane_id(&self, session_id: &str) -> Option<String> {
        self.lock().get(session_id).and_then(|i| i.pane_id.clone())
    }

    pub fn get_transcript_path(&self, session_id: &str) -> Option<String> {
        self.lock()
            .get(session_id)
            .and_then(|i| i.transcript_path.clone())
    }

    pub fn get_cwd(&self, session_id: &str) -> Option<String> {
        self.lock().get(session_id).map(|i| i.cwd.clone())
    }

    pub fn get_all(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        all
    }

    pub fn find_by_cwd(&self, cwd: &str) -> Option<SessionInfo> {
        self.lock().values().find(|i| i.cwd == cwd).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionInfo>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PaneInfo;

    /// Fixed-output multiplexer for registry tests.
    struct FakeTmux {
        panes: Vec<PaneInfo>,
    }

    impl FakeTmux {
        fn with_pane(cwd: &str, window: &str, pane_id: &str) -> Arc<Self> {
            Arc::new(Self {
                panes: vec![PaneInfo {
                    session_name: "main".to_string(),
                    window_index: 0,
                    window_name: window.to_string(),
                    pane_index: 0,
                    pane_id: pane_id.to_string(),
                    pane_cwd: cwd.to_string(),
                    command: "claude".to_string(),
                }],
            })
        }
    }

    impl Multiplexer for FakeTmux {
        fn list_panes(&self) -> Vec<PaneInfo> {
            self.panes.clone()
        }
        fn find_pane_for_cwd(&self, cwd: &str) -> Option<String> {
            self.panes
                .iter()
                .find(|p| p.pane_cwd == cwd)
                .map(|p| p.pane_id.clone())
        }
        fn send_keys(&self, _pane_id: &str, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn resolve_label(&self, cwd: &str) -> Option<String> {
            self.panes
                .iter()
                .find(|p| p.pane_cwd == cwd)
                .map(|p| p.window_name.clone())
        }
    }

    #[test]
    fn register_resolves_label_from_tmux() {
        let tmux = FakeTmux::with_pane("/proj", "myproject", "%3");
        let registry = SessionRegistry::new(Some(tmux));
        registry.register("sess-1", "/proj", None);
        assert_eq!(registry.get_label("sess-1").as_deref(), Some("myproject"));
        assert_eq!(registry.get_pane_id("sess-1").as_deref(), Some("%3"));
    }

    #[test]
    fn register_falls_back_to_id_prefix() {
        let registry = SessionRegistry::new(None);
        registry.register("abcdefghijklmnop", "/proj", None);
        assert_eq!(
            registry.get_label("abcdefghijklmnop").as_deref(),
            Some("abcdefghijkl")
        );
    }

    #[test]
    fn ensure_registered_is_idempotent_but_fills_transcript_path() {
        let registry = SessionRegistry::new(None);
        registry.ensure_registered("s1", "/proj", None);
        assert!(registry.get_transcript_path("s1").is_none());

        registry.ensure_registered("s1", "/proj", Some("/t/log.jsonl"));
        assert_eq!(
            registry.get_transcript_path("s1").as_deref(),
            Some("/t/log.jsonl")
        );

        // A later, different path does not overwrite the first one.
        registry.ensure_registered("s1", "/proj", Some("/t/other.jsonl"));
        assert_eq!(
            registry.get_transcript_path("s1").as_deref(),
            Some("/t/log.jsonl")
        );
    }

    #[test]
    fn synthetic_session_merges_into_real_one() {
        let tmux = FakeTmux::with_pane("/proj", "myproject", "%7");
        let registry = SessionRegistry::new(Some(tmux));
        registry.register_from_tmux();

        let synthetic = registry.find_by_cwd("/proj").unwrap();
        assert_eq!(synthetic.session_id, "tmux_%7");
        assert_eq!(synthetic.label, "myproject");

        registry.record_denial("tmux_%7");
        let started = synthetic.started_at;

        registry.ensure_registered("real-id", "/proj", Some("/t/x.jsonl"));

        // Exactly one entry for that cwd, under the real id, with the
        // synthetic label, start time, and denial count carried over.
        let all = registry.get_all();
        assert_eq!(all.len(), 1);
        let merged = &all[0];
        assert_eq!(merged.session_id, "real-id");
        assert_eq!(merged.label, "myproject");
        assert_eq!(merged.started_at, started);
        assert_eq!(merged.denial_count, 1);
        assert_eq!(merged.transcript_path.as_deref(), Some("/t/x.jsonl"));
        assert!(registry.get_label("tmux_%7").is_none());
    }

    #[test]
    fn merge_then_reensure_stays_single() {
        let tmux = FakeTmux::with_pane("/proj", "win", "%1");
        let registry = SessionRegistry::new(Some(tmux));
        registry.register_from_tmux();
        registry.ensure_registered("real", "/proj", None);
        registry.ensure_registered("real", "/proj", None);
        assert_eq!(registry.get_all().len(), 1);
    }

    #[test]
    fn scan_skips_cwds_already_tracked() {
        let tmux = FakeTmux::with_pane("/proj", "win", "%1");
        let registry = SessionRegistry::new(Some(tmux));
        registry.register("real", "/proj", None);
        registry.register_from_tmux();
        assert_eq!(registry.get_all().len(), 1);
        assert_eq!(registry.get_all()[0].session_id, "real");
    }

    #[test]
    fn updates_silently_ignore_unknown_sessions() {
        let registry = SessionRegistry::new(None);
        registry.update_state("ghost", SessionState::Active);
        registry.update_tool_use("ghost", "Bash");
        assert_eq!(registry.record_denial("ghost"), None);
        assert!(registry.get_all().is_empty());
    }

    #[test]
    fn denial_counter_increments() {
        let registry = SessionRegistry::new(None);
        registry.register("s1", "/p", None);
        assert_eq!(registry.record_denial("s1"), Some(1));
        assert_eq!(registry.record_denial("s1"), Some(2));
    }

    #[test]
    fn state_updates_apply() {
        let registry = SessionRegistry::new(None);
        registry.register("s1", "/p", None);
        registry.update_state("s1", SessionState::PermissionPending);
        assert_eq!(
            registry.get_all()[0].state,
            SessionState::PermissionPending
        );
        registry.update_tool_use("s1", "Bash");
        assert_eq!(registry.get_all()[0].last_tool_name.as_deref(), Some("Bash"));
    }

    #[test]
    fn deregister_removes_entry() {
        let registry = SessionRegistry::new(None);
        registry.register("s1", "/p", None);
        let removed = registry.deregister("s1").unwrap();
        assert_eq!(removed.session_id, "s1");
        assert!(registry.get_all().is_empty());
    }
}
