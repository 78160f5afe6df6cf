//! Rules file parsing and the shipped default rule set.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::engine::RuleEngine;
use super::{PatternKind, PatternSpec, Rule, RuleAction, RuleDefaults, RulesConfig};

/// Parse a YAML rules document into a [`RulesConfig`].
pub fn parse_rules_yaml(content: &str) -> Result<RulesConfig> {
    let config: RulesConfig =
        serde_yaml_ng::from_str(content).context("failed to parse rules YAML")?;
    Ok(config)
}

/// Load and compile the rules file at `path`.
///
/// A missing file yields the shipped defaults. Parse errors and invalid
/// patterns are errors; the caller decides whether that is fatal (startup)
/// or a rejected reload (hot-reload).
pub fn load_rules_file(path: &Path) -> Result<RuleEngine> {
    if !path.exists() {
        debug!(path = %path.display(), "rules file missing, using shipped defaults");
        return RuleEngine::build(&default_rules());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file: {}", path.display()))?;
    let config = parse_rules_yaml(&content)?;
    let engine = RuleEngine::build(&config)?;
    debug!(rules = engine.rule_count(), path = %path.display(), "rules loaded");
    Ok(engine)
}

/// The rule set shipped when no rules file exists yet.
pub fn default_rules() -> RulesConfig {
    let regex = |p: &str| PatternSpec::Tagged {
        pattern: p.to_string(),
        kind: PatternKind::Regex,
    };

    let mut destructive = BTreeMap::new();
    destructive.insert(
        "command".to_string(),
        vec![
            regex(r"rm\s+-rf?\s+[/~]"),
            regex(r"mkfs\."),
            regex(r"dd\s+if=.*of=/dev/"),
            regex(r">\s*/dev/sd[a-z]"),
        ],
    );

    let mut system_paths = BTreeMap::new();
    system_paths.insert(
        "file_path".to_string(),
        vec![
            PatternSpec::Tagged {
                pattern: "/etc/**".to_string(),
                kind: PatternKind::Glob,
            },
            PatternSpec::Tagged {
                pattern: "**/.ssh/**".to_string(),
                kind: PatternKind::Glob,
            },
        ],
    );

    RulesConfig {
        version: 1,
        defaults: RuleDefaults {
            unmatched: RuleAction::Escalate,
        },
        rules: vec![
            Rule {
                name: "Block destructive commands".to_string(),
                action: RuleAction::Deny,
                tool_selector: "Bash".to_string(),
                match_fields: Some(destructive),
                reason: Some("Destructive filesystem command blocked".to_string()),
            },
            Rule {
                name: "Allow read-only tools".to_string(),
                action: RuleAction::Allow,
                tool_selector: "Read|Glob|Grep".to_string(),
                match_fields: None,
                reason: None,
            },
            Rule {
                name: "Escalate system file edits".to_string(),
                action: RuleAction::Escalate,
                tool_selector: "Write|Edit".to_string(),
                match_fields: Some(system_paths),
                reason: None,
            },
        ],
    }
}
