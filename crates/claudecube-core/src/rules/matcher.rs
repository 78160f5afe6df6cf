//! Pattern compilation and field extraction for rule matching.
//!
//! Patterns are compiled once at load time; an invalid pattern fails the
//! load rather than silently never matching.

use anyhow::{Context, Result};
use serde_json::Value;

use super::{PatternKind, PatternSpec};

/// Maximum compiled regex size (256 KB) so pathological patterns cannot
/// blow up the evaluation hot path.
const MAX_REGEX_SIZE: usize = 256 * 1024;

/// A single pattern compiled for repeated matching.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Literal(String),
    Regex(regex::Regex),
    Glob(glob::Pattern),
}

impl CompiledPattern {
    pub fn compile(spec: &PatternSpec) -> Result<Self> {
        match spec.kind() {
            PatternKind::Literal => Ok(Self::Literal(spec.pattern().to_string())),
            PatternKind::Regex => {
                let compiled = regex::RegexBuilder::new(spec.pattern())
                    .case_insensitive(true)
                    .size_limit(MAX_REGEX_SIZE)
                    .build()
                    .with_context(|| format!("invalid regex pattern: {}", spec.pattern()))?;
                Ok(Self::Regex(compiled))
            }
            PatternKind::Glob => {
                let compiled = glob::Pattern::new(spec.pattern())
                    .with_context(|| format!("invalid glob pattern: {}", spec.pattern()))?;
                Ok(Self::Glob(compiled))
            }
        }
    }

    /// Test a field value against this pattern.
    ///
    /// Literal is byte-for-byte equality; regex is a contains match; glob
    /// uses `require_literal_separator` so `*` stays within one path
    /// segment while `**` crosses directory boundaries.
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            CompiledPattern::Literal(lit) => lit == value,
            CompiledPattern::Regex(re) => re.is_match(value),
            CompiledPattern::Glob(pat) => {
                let opts = glob::MatchOptions {
                    require_literal_separator: true,
                    ..Default::default()
                };
                pat.matches_with(value, opts)
            }
        }
    }
}

/// Resolve a dotted field path (`"a.b"`) against a tool-input JSON tree.
///
/// An intermediate non-object, a missing key, or a non-string leaf all
/// count as "field absent".
pub fn extract_field<'a>(input: &'a Value, path: &str) -> Option<&'a str> {
    let mut current = input;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    current.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn literal(p: &str) -> CompiledPattern {
        CompiledPattern::compile(&PatternSpec::Bare(p.to_string())).unwrap()
    }

    fn tagged(p: &str, kind: PatternKind) -> CompiledPattern {
        CompiledPattern::compile(&PatternSpec::Tagged {
            pattern: p.to_string(),
            kind,
        })
        .unwrap()
    }

    #[test]
    fn literal_is_byte_exact() {
        let m = literal("git status");
        assert!(m.is_match("git status"));
        assert!(!m.is_match("git  status"));
        assert!(!m.is_match("Git Status"));
    }

    #[test]
    fn regex_is_case_insensitive_contains() {
        let m = tagged(r"rm\s+-rf", PatternKind::Regex);
        assert!(m.is_match("rm -rf /"));
        assert!(m.is_match("sudo RM -RF /tmp"));
        assert!(!m.is_match("rmdir /tmp"));
    }

    #[test]
    fn invalid_regex_fails_compilation() {
        let result = CompiledPattern::compile(&PatternSpec::Tagged {
            pattern: "[unclosed".to_string(),
            kind: PatternKind::Regex,
        });
        assert!(result.is_err());
    }

    #[test]
    fn glob_star_stays_in_one_segment() {
        let m = tagged("/project/*.rs", PatternKind::Glob);
        assert!(m.is_match("/project/main.rs"));
        assert!(!m.is_match("/project/src/main.rs"));
    }

    #[test]
    fn glob_double_star_crosses_segments() {
        let m = tagged("/project/**", PatternKind::Glob);
        assert!(m.is_match("/project/src/deep/file.rs"));
        assert!(!m.is_match("/other/src/file.rs"));
    }

    #[test]
    fn glob_question_mark_is_single_char() {
        let m = tagged("file?.txt", PatternKind::Glob);
        assert!(m.is_match("file1.txt"));
        assert!(!m.is_match("file12.txt"));
    }

    #[test]
    fn invalid_glob_fails_compilation() {
        let result = CompiledPattern::compile(&PatternSpec::Tagged {
            pattern: "[invalid".to_string(),
            kind: PatternKind::Glob,
        });
        assert!(result.is_err());
    }

    #[test]
    fn extract_simple_field() {
        let input = json!({"command": "ls -la"});
        assert_eq!(extract_field(&input, "command"), Some("ls -la"));
    }

    #[test]
    fn extract_dotted_path() {
        let input = json!({"options": {"cwd": "/tmp"}});
        assert_eq!(extract_field(&input, "options.cwd"), Some("/tmp"));
    }

    #[test]
    fn extract_missing_field_is_none() {
        let input = json!({"command": "ls"});
        assert_eq!(extract_field(&input, "file_path"), None);
    }

    #[test]
    fn extract_through_non_object_is_none() {
        let input = json!({"command": "ls"});
        assert_eq!(extract_field(&input, "command.nested"), None);
    }

    #[test]
    fn extract_non_string_leaf_is_none() {
        let input = json!({"timeout": 30, "flag": true});
        assert_eq!(extract_field(&input, "timeout"), None);
        assert_eq!(extract_field(&input, "flag"), None);
    }
}
