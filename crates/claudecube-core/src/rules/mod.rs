//! Deterministic rules: allow/deny/escalate decisions keyed on tool name
//! and tool-input fields, evaluated before any LLM is consulted.

pub mod engine;
pub mod loader;
pub mod matcher;
pub mod watcher;

pub use engine::RuleEngine;
pub use loader::{default_rules, load_rules_file, parse_rules_yaml};
pub use watcher::{spawn_rules_watcher, RulesHandle};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a matching rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Deny,
    Allow,
    Escalate,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Deny => write!(f, "deny"),
            RuleAction::Allow => write!(f, "allow"),
            RuleAction::Escalate => write!(f, "escalate"),
        }
    }
}

/// How a pattern string is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Literal,
    Regex,
    Glob,
}

/// A pattern as written in the rules file: either a bare string (literal)
/// or a `{pattern, kind}` mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    Bare(String),
    Tagged {
        pattern: String,
        #[serde(default)]
        kind: PatternKind,
    },
}

impl PatternSpec {
    pub fn pattern(&self) -> &str {
        match self {
            PatternSpec::Bare(p) => p,
            PatternSpec::Tagged { pattern, .. } => pattern,
        }
    }

    pub fn kind(&self) -> PatternKind {
        match self {
            PatternSpec::Bare(_) => PatternKind::Literal,
            PatternSpec::Tagged { kind, .. } => *kind,
        }
    }
}

/// A single rule as it appears in the rules file.
///
/// `tool` is a pipe-separated set of exact tool names. `match` maps dotted
/// field paths into lists of patterns; an absent `match` block means the
/// rule fires on every use of the named tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub action: RuleAction,
    #[serde(rename = "tool")]
    pub tool_selector: String,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_fields: Option<BTreeMap<String, Vec<PatternSpec>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Fallback behaviour for tool uses no rule matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefaults {
    #[serde(default = "default_unmatched")]
    pub unmatched: RuleAction,
}

fn default_unmatched() -> RuleAction {
    RuleAction::Escalate
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            unmatched: default_unmatched(),
        }
    }
}

/// The parsed rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub defaults: RuleDefaults,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_version() -> u32 {
    1
}

/// Outcome of evaluating one tool use against the rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub action: RuleAction,
    pub rule_name: Option<String>,
    pub reason: String,
}
