//! Hot-reload of the rules file.
//!
//! The live engine is published through [`RulesHandle`]: readers clone the
//! inner `Arc` once per request, the watcher replaces it in one store, so an
//! evaluation sees either the old engine or the new one, never a partial
//! build. A failed reload keeps the previous engine and logs a warning.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::engine::RuleEngine;
use super::loader::load_rules_file;

/// Quiescence window: file-change bursts within this window coalesce into
/// one reparse.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Shared handle to the live rule engine.
#[derive(Clone)]
pub struct RulesHandle {
    inner: Arc<RwLock<Arc<RuleEngine>>>,
}

impl RulesHandle {
    pub fn new(engine: RuleEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(engine))),
        }
    }

    /// Build a handle from the rules file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(load_rules_file(path)?))
    }

    /// Snapshot of the live engine. Cheap: one lock, one Arc clone.
    pub fn current(&self) -> Arc<RuleEngine> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publish a freshly built engine.
    pub fn replace(&self, engine: RuleEngine) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(engine);
    }

    /// Reparse `path` and publish. On failure the previous engine stays
    /// live and the error is returned for the caller to log.
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let engine = load_rules_file(path)?;
        let count = engine.rule_count();
        self.replace(engine);
        info!(rules = count, "rules reloaded");
        Ok(())
    }
}

/// Spawn the debounced file watcher for the rules file.
///
/// Watches the parent directory (editors replace files rather than writing
/// in place), coalesces change bursts, then reparses off the request path.
pub fn spawn_rules_watcher(path: PathBuf, handle: RulesHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use notify::{Event, EventKind, RecursiveMode, Watcher};

        let (tx, mut rx) = mpsc::channel::<()>(4);

        let mut watcher =
            match notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx.try_send(());
                    }
                }
            }) {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "failed to create rules file watcher");
                    return;
                }
            };

        let watch_dir = path.parent().unwrap_or_else(|| Path::new("."));
        if let Err(e) = watcher.watch(watch_dir, RecursiveMode::NonRecursive) {
            warn!(error = %e, "failed to watch rules directory");
            return;
        }

        info!(path = %path.display(), "watching rules file for changes");

        while rx.recv().await.is_some() {
            tokio::time::sleep(DEBOUNCE).await;
            while rx.try_recv().is_ok() {}

            if let Err(e) = handle.reload_from(&path) {
                warn!(error = %e, "rules reload failed, keeping previous rules");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{parse_rules_yaml, RuleAction};
    use serde_json::json;

    fn handle_from_yaml(yaml: &str) -> RulesHandle {
        RulesHandle::new(RuleEngine::build(&parse_rules_yaml(yaml).unwrap()).unwrap())
    }

    #[test]
    fn replace_swaps_the_engine_for_new_readers() {
        let handle = handle_from_yaml(
            "rules:\n  - name: Allow read\n    action: allow\n    tool: Read\n",
        );
        assert_eq!(
            handle.current().evaluate("Read", &json!({})).action,
            RuleAction::Allow
        );

        let next = RuleEngine::build(
            &parse_rules_yaml("defaults:\n  unmatched: deny\nrules: []\n").unwrap(),
        )
        .unwrap();
        handle.replace(next);
        assert_eq!(
            handle.current().evaluate("Read", &json!({})).action,
            RuleAction::Deny
        );
    }

    #[test]
    fn snapshot_outlives_a_swap() {
        let handle = handle_from_yaml(
            "rules:\n  - name: Allow read\n    action: allow\n    tool: Read\n",
        );
        let snapshot = handle.current();
        handle.replace(
            RuleEngine::build(
                &parse_rules_yaml("defaults:\n  unmatched: deny\nrules: []\n").unwrap(),
            )
            .unwrap(),
        );
        // A request that loaded the pointer before the swap keeps its engine.
        assert_eq!(
            snapshot.evaluate("Read", &json!({})).action,
            RuleAction::Allow
        );
    }

    #[test]
    fn failed_reload_keeps_previous_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(
            &path,
            "rules:\n  - name: Allow read\n    action: allow\n    tool: Read\n",
        )
        .unwrap();

        let handle = RulesHandle::load(&path).unwrap();
        assert_eq!(
            handle.current().evaluate("Read", &json!({})).action,
            RuleAction::Allow
        );

        // Invalid edit: reload errors, behaviour is unchanged.
        std::fs::write(&path, "rules:\n  - name: Bad\n    action: explode\n").unwrap();
        assert!(handle.reload_from(&path).is_err());
        assert_eq!(
            handle.current().evaluate("Read", &json!({})).action,
            RuleAction::Allow
        );

        // Valid edit: reload succeeds and the new rules take over.
        std::fs::write(&path, "defaults:\n  unmatched: deny\nrules: []\n").unwrap();
        handle.reload_from(&path).unwrap();
        assert_eq!(
            handle.current().evaluate("Read", &json!({})).action,
            RuleAction::Deny
        );
    }
}
