//! Persistent store for human-defined policies.
//!
//! Policies are free-text instructions the human gave through the approval
//! channel ("always allow npm install"). They are injected into future LLM
//! evaluation prompts, where they take precedence over the built-in
//! guidance. The list is append-only and not deduplicated.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One stored policy. `tool` may be pipe-separated; absent means global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<Policy>,
}

struct PolicyState {
    policies: Vec<Policy>,
    next_id: u64,
}

/// The policy list plus its YAML persistence.
pub struct PolicyStore {
    path: PathBuf,
    inner: Mutex<PolicyState>,
}

impl PolicyStore {
    /// Load the store from `path`, seeding the id counter past the highest
    /// `pol_<N>` already on disk. A missing file is an empty store.
    pub fn load(path: PathBuf) -> Result<Self> {
        let policies = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read policies file: {}", path.display()))?;
            let file: PolicyFile = serde_yaml_ng::from_str(&content)
                .with_context(|| format!("failed to parse policies file: {}", path.display()))?;
            file.policies
        } else {
            Vec::new()
        };

        let next_id = policies
            .iter()
            .filter_map(|p| p.id.strip_prefix("pol_"))
            .filter_map(|n| n.parse::<u64>().ok())
            .map(|n| n + 1)
            .max()
            .unwrap_or(0);

        Ok(Self {
            path,
            inner: Mutex::new(PolicyState { policies, next_id }),
        })
    }

    /// Add a policy and persist the whole file. Returns the stored policy.
    pub fn add(&self, description: &str, tool: Option<&str>) -> Result<Policy> {
        let mut state = self.lock();
        let policy = Policy {
            id: format!("pol_{}", state.next_id),
            description: description.to_string(),
            tool: tool.map(str::to_string),
            created_at: Utc::now().to_rfc3339(),
        };
        state.next_id += 1;
        state.policies.push(policy.clone());
        self.persist(&state.policies)?;
        Ok(policy)
    }

    pub fn all(&self) -> Vec<Policy> {
        self.lock().policies.clone()
    }

    /// Render the policies relevant to `tool` for an evaluation prompt:
    /// global policies plus those whose pipe-separated tool set contains
    /// the tool. Returns `None` when nothing applies.
    pub fn format_for_tool(&self, tool: &str) -> Option<String> {
        let state = self.lock();
        let mut lines = Vec::new();
        for policy in &state.policies {
            let applies = match &policy.tool {
                None => true,
                Some(selector) => selector.split('|').any(|t| t == tool),
            };
            if !applies {
                continue;
            }
            match &policy.tool {
                Some(selector) => lines.push(format!(
                    "- [{}] {} (applies to: {})",
                    policy.id, policy.description, selector
                )),
                None => lines.push(format!("- [{}] {}", policy.id, policy.description)),
            }
        }
        if lines.is_empty() {
            return None;
        }
        Some(format!("Human-defined policies:\n{}", lines.join("\n")))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PolicyState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write the full list through a temp file + rename so a crash never
    /// leaves a torn policies file.
    fn persist(&self, policies: &[Policy]) -> Result<()> {
        let file = PolicyFile {
            policies: policies.to_vec(),
        };
        let content = serde_yaml_ng::to_string(&file).context("failed to serialize policies")?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating parent dirs for {}", self.path.display()))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, PolicyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::load(dir.path().join("policies.yaml")).unwrap();
        (dir, store)
    }

    #[test]
    fn ids_are_sequential_from_zero() {
        let (_dir, store) = temp_store();
        let a = store.add("always allow npm install", Some("Bash")).unwrap();
        let b = store.add("never touch prod", None).unwrap();
        assert_eq!(a.id, "pol_0");
        assert_eq!(b.id, "pol_1");
    }

    #[test]
    fn counter_seeds_past_max_observed_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        std::fs::write(
            &path,
            r#"
policies:
  - id: pol_7
    description: old policy
    createdAt: "2025-01-01T00:00:00Z"
  - id: pol_2
    description: older policy
    createdAt: "2025-01-01T00:00:00Z"
"#,
        )
        .unwrap();
        let store = PolicyStore::load(path).unwrap();
        let p = store.add("new one", None).unwrap();
        assert_eq!(p.id, "pol_8");
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        {
            let store = PolicyStore::load(path.clone()).unwrap();
            store.add("allow git push", Some("Bash")).unwrap();
        }
        let store = PolicyStore::load(path).unwrap();
        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "allow git push");
        assert_eq!(all[0].tool.as_deref(), Some("Bash"));
    }

    #[test]
    fn format_for_tool_selects_scoped_and_global() {
        let (_dir, store) = temp_store();
        store.add("always allow npm install", Some("Bash")).unwrap();
        store.add("prefer small diffs", None).unwrap();
        store.add("edits need review", Some("Write|Edit")).unwrap();

        let rendered = store.format_for_tool("Bash").unwrap();
        assert_eq!(
            rendered,
            "Human-defined policies:\n- [pol_0] always allow npm install (applies to: Bash)\n- [pol_1] prefer small diffs"
        );

        let rendered = store.format_for_tool("Edit").unwrap();
        assert!(rendered.contains("pol_2"));
        assert!(!rendered.contains("pol_0"));
    }

    #[test]
    fn format_for_tool_empty_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.format_for_tool("Bash").is_none());

        store.add("edits only", Some("Edit")).unwrap();
        assert!(store.format_for_tool("Bash").is_none());
    }

    #[test]
    fn duplicates_are_kept() {
        let (_dir, store) = temp_store();
        store.add("same text", Some("Bash")).unwrap();
        store.add("same text", Some("Bash")).unwrap();
        assert_eq!(store.all().len(), 2);
    }
}
