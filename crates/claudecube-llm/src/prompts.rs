//! Prompt builders for the evaluator and the reply classifier, plus the
//! shared JSON extraction helper.

use serde_json::Value;

/// System prompt for the tool-call evaluator.
pub fn evaluator_system_prompt() -> String {
    "You are the permission evaluator for an automated coding agent. \
     You judge whether a single tool call should proceed.\n\n\
     Guidelines:\n\
     - Read-only operations (reading files, listing, searching) are generally safe.\n\
     - Edits under the project source tree are generally safe.\n\
     - Commands that modify the system, install software, touch credentials, \
     or reach outside the project deserve caution.\n\
     - Human-defined policies take precedence over these guidelines.\n\
     - When in doubt, set \"confident\": false.\n\n\
     Respond with a single JSON object and nothing else:\n\
     {\"allowed\": true|false, \"confident\": true|false, \"reason\": \"<short explanation>\"}"
        .to_string()
}

/// User prompt for the tool-call evaluator.
pub fn evaluator_user_prompt(
    tool_name: &str,
    tool_input: &Value,
    rules_context: &str,
    escalation_reason: &str,
    policies: Option<&str>,
) -> String {
    let input_json =
        serde_json::to_string_pretty(tool_input).unwrap_or_else(|_| "{}".to_string());
    let mut prompt = format!(
        "Tool: {tool_name}\nInput:\n{input_json}\n\nRules: {rules_context}\nEscalation reason: {escalation_reason}\n"
    );
    if let Some(policies) = policies {
        prompt.push('\n');
        prompt.push_str(policies);
        prompt.push('\n');
    }
    prompt.push_str("\nShould this tool call proceed?");
    prompt
}

/// System prompt for the reply classifier.
pub fn classifier_system_prompt() -> String {
    "You classify a human's reply to a pending tool-approval request from a \
     coding agent. Pick exactly one intent:\n\n\
     - \"approve\": the reply agrees, confirms, or says yes / ok / go ahead.\n\
     - \"deny\": the reply refuses or tells the agent not to do it.\n\
     - \"forward\": the reply is an instruction or alternative meant for the \
     agent itself (e.g. \"use npm ci instead\"). Put the exact text the agent \
     should receive in \"forwardText\".\n\
     - \"add_policy\": the reply states a standing preference (\"always allow \
     X\", \"never ask about Y\"). Put the policy wording in \"policyText\".\n\
     - \"add_rule\": the reply asks for a deterministic rule. Put a YAML list \
     item for the rules file in \"ruleYaml\", starting with \"  - name:\".\n\n\
     Short affirmations are approvals; short refusals are denials. Anything \
     that reads like advice for the agent is a forward.\n\n\
     Respond with a single JSON object and nothing else:\n\
     {\"intent\": \"...\", \"forwardText\": \"...\", \"policyText\": \"...\", \"ruleYaml\": \"...\"}\n\
     Omit fields that do not apply."
        .to_string()
}

/// User prompt for the reply classifier.
pub fn classifier_user_prompt(reply_text: &str, tool_name: &str, label: &str) -> String {
    format!(
        "Pending approval: tool \"{tool_name}\" in session \"{label}\".\n\nThe human replied:\n{reply_text}"
    )
}

/// System prompt for the transcript summariser.
pub fn summary_system_prompt() -> String {
    "Summarise this coding-agent session in 3-5 sentences: what the agent is \
     trying to do, what progress it has made, and where things stand now. \
     Plain prose, no lists."
        .to_string()
}

/// Extract the first complete `{ ... }` block from model output.
///
/// Scans from the first `{` and tracks brace depth, skipping braces inside
/// JSON strings, so prose before or after the object is tolerated.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
