//! Agent transcript reading and formatting.
//!
//! Transcripts are JSON-lines files written by the agent CLI. The reader is
//! deliberately forgiving: a missing or unreadable file yields an empty
//! excerpt, and corrupt lines are skipped, so a broken transcript can never
//! take down a decision path.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;

/// Characters kept of a tool-use input summary.
const INPUT_SUMMARY_MAX: usize = 120;

/// Characters kept of a message when formatting recent activity.
const ACTIVITY_TEXT_MAX: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct TranscriptExcerpt {
    pub messages: Vec<TranscriptMessage>,
    /// Count over the whole file, regardless of any tail selection.
    pub total_messages: usize,
}

#[derive(Debug, Clone)]
pub struct TranscriptMessage {
    pub role: String,
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
}

#[derive(Debug, Clone)]
pub struct ToolUse {
    pub name: String,
    pub input_summary: String,
}

/// Read a transcript, keeping user/assistant messages. `last_n` limits the
/// returned messages to the tail; `total_messages` always reflects the full
/// count.
pub fn read_transcript(path: &Path, last_n: Option<usize>) -> TranscriptExcerpt {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return TranscriptExcerpt::default(),
    };
    let reader = BufReader::new(file);

    let mut messages = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else { continue };
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let line_type = value.get("type").and_then(Value::as_str).unwrap_or("");
        if line_type != "user" && line_type != "assistant" {
            continue;
        }
        let Some(message) = value.get("message") else {
            continue;
        };
        let role = message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or(line_type)
            .to_string();

        let mut text = String::new();
        let mut tool_uses = Vec::new();
        match message.get("content") {
            Some(Value::String(s)) => text.push_str(s),
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(t) = block.get("text").and_then(Value::as_str) {
                                if !text.is_empty() {
                                    text.push('\n');
                                }
                                text.push_str(t);
                            }
                        }
                        Some("tool_use") => {
                            let name = block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                                .to_string();
                            let input = block.get("input").cloned().unwrap_or(Value::Null);
                            tool_uses.push(ToolUse {
                                name,
                                input_summary: truncate_chars(
                                    &input.to_string(),
                                    INPUT_SUMMARY_MAX,
                                ),
                            });
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        messages.push(TranscriptMessage {
            role,
            text,
            tool_uses,
        });
    }

    let total_messages = messages.len();
    let messages = match last_n {
        Some(n) if messages.len() > n => messages.split_off(messages.len() - n),
        _ => messages,
    };
    TranscriptExcerpt {
        messages,
        total_messages,
    }
}

/// Short human-readable rendering of the last `max_messages` messages, for
/// inclusion in chat messages.
pub fn format_recent_activity(excerpt: &TranscriptExcerpt, max_messages: usize) -> String {
    if excerpt.messages.is_empty() {
        return "No recent activity.".to_string();
    }
    let start = excerpt.messages.len().saturating_sub(max_messages);
    let mut out = String::new();
    for msg in &excerpt.messages[start..] {
        let who = if msg.role == "user" { "User" } else { "Agent" };
        let text = truncate_chars(msg.text.trim(), ACTIVITY_TEXT_MAX);
        if !text.is_empty() {
            out.push_str(&format!("{who}: {text}\n"));
        }
        for tool in &msg.tool_uses {
            out.push_str(&format!("  [{}] {}\n", tool.name, tool.input_summary));
        }
    }
    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        "No recent activity.".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The last `max_tools` tool uses across the excerpt, one per line.
pub fn extract_recent_tools(excerpt: &TranscriptExcerpt, max_tools: usize) -> String {
    let tools: Vec<String> = excerpt
        .messages
        .iter()
        .flat_map(|m| m.tool_uses.iter())
        .map(|t| format!("{}: {}", t.name, t.input_summary))
        .collect();
    if tools.is_empty() {
        return "No recent tool use.".to_string();
    }
    let start = tools.len().saturating_sub(max_tools);
    tools[start..].join("\n")
}

/// Char-boundary-safe truncation.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
