//! Prompt shapes sent to the oracle.

use std::collections::BTreeMap;

use serde_json::Value;

/// Upper bound on page text embedded in action and verification prompts
pub const MAX_PAGE_BYTES: usize = 48_000;

/// Cut `text` to at most `max_bytes`, never splitting a character
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn memory_json(memory: &BTreeMap<String, Value>) -> String {
    serde_json::to_string_pretty(memory).unwrap_or_else(|_| "{}".to_string())
}

/// Ask for the browser actions that carry out one instruction
pub fn build_action_prompt(
    instruction: &str,
    page: &str,
    history: &[String],
    memory: &BTreeMap<String, Value>,
) -> String {
    let history = if history.is_empty() {
        "(none)".to_string()
    } else {
        history.join("\n")
    };

    format!(
        r#"You are driving a web browser to perform one step of an end-to-end test.

Current page snapshot (each interactive element carries a [ref=ID] marker):
{page}

Previous steps:
{history}

Stored memory:
{memory}

Instruction: {instruction}

Respond with a single JSON object and nothing else:
{{"actions": [ ... ]}}

Each action is one of:
- {{"type": "click", "element": "<human readable description>", "ref": "<ref id from the snapshot>"}}
- {{"type": "fill", "element": "<description>", "ref": "<ref id>", "value": "<text>"}}
- {{"type": "fill", "element": "<description>", "ref": "<ref id>", "memoryKey": "<key whose stored value to type>"}}
- {{"type": "navigate", "url": "<absolute url>"}}
- {{"type": "store", "key": "<memory key>", "value": "<value copied from the page>", "element": "<what the value is>"}}
- {{"type": "read", "key": "<memory key>"}}

Only use refs that appear in the snapshot above. Use an empty list when nothing needs to be done."#,
        page = truncate_to_bytes(page, MAX_PAGE_BYTES),
        history = history,
        memory = memory_json(memory),
        instruction = instruction,
    )
}

/// Ask for match / notMatch patterns describing an expected result
pub fn build_verification_prompt(
    expected: &str,
    page: &str,
    memory: &BTreeMap<String, Value>,
) -> String {
    format!(
        r#"You write verification criteria for an end-to-end test.

Expected result: {expected}

Current page snapshot:
{page}

Stored memory:
{memory}

Produce regular expressions that will be matched case-insensitively against future page snapshots of this same step.
- "match": patterns of which AT LEAST ONE must be found when the expectation holds
- "notMatch": patterns that must NOT be found (error messages, contradicting states)
- "memoryChecks": optional checks of stored memory, each {{"key": "...", "pattern": "<optional regex for the value>", "exists": true|false}}

Prefer stable text over dynamic values such as dates, counters or ids.
Respond with a single JSON object and nothing else:
{{"match": ["..."], "notMatch": ["..."], "memoryChecks": []}}"#,
        expected = expected,
        page = truncate_to_bytes(page, MAX_PAGE_BYTES),
        memory = memory_json(memory),
    )
}

/// Ask for a single value copied out of a page excerpt. Expects plain text back.
pub fn build_extraction_prompt(hint: &str, excerpt: &str) -> String {
    format!(
        "Extract exactly one value from the page text below.\n\
         Value to extract: {hint}\n\n\
         Page text:\n{excerpt}\n\n\
         Reply with the value only, no quotes, no JSON, no explanation.",
        hint = hint,
        excerpt = excerpt,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo";
        assert_eq!(truncate_to_bytes(text, 2), "h");
        assert_eq!(truncate_to_bytes(text, 3), "hé");
        assert_eq!(truncate_to_bytes(text, 100), "héllo");
    }

    #[test]
    fn test_action_prompt_includes_context() {
        let mut memory = BTreeMap::new();
        memory.insert("user".to_string(), json!("alice"));
        let prompt = build_action_prompt(
            "click \"Login\"",
            "- button \"Login\" [ref=e3]",
            &["go to https://example.test => navigated".to_string()],
            &memory,
        );
        assert!(prompt.contains("Instruction: click \"Login\""));
        assert!(prompt.contains("[ref=e3]"));
        assert!(prompt.contains("\"user\": \"alice\""));
        assert!(prompt.contains("navigated"));
    }

    #[test]
    fn test_action_prompt_without_history() {
        let prompt = build_action_prompt("open menu", "", &[], &BTreeMap::new());
        assert!(prompt.contains("Previous steps:\n(none)"));
    }

    #[test]
    fn test_extraction_prompt() {
        let prompt = build_extraction_prompt("the order number", "Order #123 confirmed");
        assert!(prompt.contains("Value to extract: the order number"));
        assert!(prompt.contains("Order #123 confirmed"));
    }
}
