//! The feedback loop: a human reply becomes a persistent policy that the
//! next LLM evaluation sees.

mod common;

use common::{build_harness, pre_tool_event, wait_until, HarnessOptions};
use serde_json::json;

#[tokio::test]
async fn add_policy_reply_persists_and_reaches_the_next_evaluation() {
    let h = build_harness(HarnessOptions::default());

    // First escalation: the LLM is unsure, the human answers with a policy.
    h.llm
        .push_text(r#"{"allowed": false, "confident": false, "reason": "not sure about installs"}"#);

    let state = h.state.clone();
    let task = tokio::spawn(async move {
        state
            .pre_tool
            .handle(pre_tool_event("Bash", json!({"command": "npm install"})))
            .await
    });
    let chat = h.chat.clone();
    wait_until(|| chat.sent_count() == 1, "escalation message").await;
    let mid = h.chat.last_sent().unwrap().0;

    h.llm
        .push_text(r#"{"intent": "add_policy", "policyText": "always allow npm install"}"#);
    h.approvals
        .clone()
        .unwrap()
        .handle_reply(mid, "add policy: always allow npm install")
        .await;

    let response = task.await.unwrap();
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["decision"], "approve");

    // The policy landed in the store, scoped to the tool, with auto id.
    let policies = h.policies.all();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].id, "pol_0");
    assert_eq!(policies[0].description, "always allow npm install");
    assert_eq!(policies[0].tool.as_deref(), Some("Bash"));

    // Second escalation for the same tool: the evaluator prompt carries
    // the rendered policy line.
    h.llm
        .push_text(r#"{"allowed": true, "confident": true, "reason": "matches policy"}"#);
    h.state
        .pre_tool
        .handle(pre_tool_event("Bash", json!({"command": "npm install lodash"})))
        .await;

    let calls = h.llm.calls();
    let last = calls.last().unwrap();
    assert!(last.user_prompt.contains(
        "Human-defined policies:\n- [pol_0] always allow npm install (applies to: Bash)"
    ));
}

#[tokio::test]
async fn policies_do_not_leak_across_tools() {
    let h = build_harness(HarnessOptions::default());
    h.policies
        .add("always allow npm install", Some("Bash"))
        .unwrap();

    // Escalation for a different tool must not see the Bash policy.
    h.llm
        .push_text(r#"{"allowed": true, "confident": true, "reason": "ok"}"#);
    h.state
        .pre_tool
        .handle(pre_tool_event(
            "WebFetch",
            json!({"url": "https://example.com"}),
        ))
        .await;

    let calls = h.llm.calls();
    assert!(!calls.last().unwrap().user_prompt.contains("pol_0"));
}
