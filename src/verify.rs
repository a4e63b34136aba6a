//! Verification patterns: obtained once from the oracle, evaluated locally.
//!
//! [`obtain_patterns`] turns a free-text expected result into a
//! [`VerificationSpec`]. [`evaluate`] checks a spec against one page snapshot
//! and the memory map without any I/O, so a learned spec can be replayed any
//! number of times without the oracle.
//!
//! Evaluation order is fixed: memory checks, then forbidden patterns, then
//! required patterns (any one suffices). An empty required list passes once
//! the forbidden patterns are clear.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::memory::value_text;
use crate::oracle::prompts::build_verification_prompt;
use crate::oracle::{Decoded, Oracle, OracleResult, decode_json};

/// Criteria for a step's expected result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSpec {
    /// At least one must match the page
    #[serde(default, rename = "match")]
    pub match_patterns: Vec<String>,
    /// None may match the page
    #[serde(default, rename = "notMatch")]
    pub not_match_patterns: Vec<String>,
    #[serde(default, rename = "memoryChecks")]
    pub memory_checks: Vec<MemoryCheck>,
}

/// A predicate over one memory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCheck {
    pub key: String,
    /// Regex the stored value must match
    #[serde(default, rename = "pattern", alias = "value", alias = "valuePattern")]
    pub value_pattern: Option<String>,
    /// Whether the key must exist (`true`) or must be absent (`false`)
    #[serde(default = "default_exists", alias = "shouldExist")]
    pub exists: bool,
}

fn default_exists() -> bool {
    true
}

impl VerificationSpec {
    /// Deterministic fallback: the expected text itself, matched literally
    pub fn literal(expected: &str) -> Self {
        Self {
            match_patterns: vec![regex::escape(expected.trim())],
            ..Self::default()
        }
    }
}

/// Outcome of evaluating a spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    /// Human-readable description of what was observed
    pub actual: String,
}

impl Verdict {
    fn pass(actual: impl Into<String>) -> Self {
        Self {
            success: true,
            actual: actual.into(),
        }
    }

    fn fail(actual: impl Into<String>) -> Self {
        Self {
            success: false,
            actual: actual.into(),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Obtain verification criteria for an expected result.
///
/// Falls back to [`VerificationSpec::literal`] when the oracle errors or its
/// answer cannot be decoded. Only fatal oracle errors are returned.
pub async fn obtain_patterns(
    oracle: &dyn Oracle,
    expected: &str,
    page: &str,
    memory: &BTreeMap<String, Value>,
) -> OracleResult<VerificationSpec> {
    let prompt = build_verification_prompt(expected, page, memory);
    let response = match oracle.complete(&prompt).await {
        Ok(response) => response,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(error = %e, "verification patterns unavailable, matching expected text literally");
            return Ok(VerificationSpec::literal(expected));
        }
    };

    match decode_json::<VerificationSpec>(&response) {
        Decoded::Parsed(spec) => {
            debug!(?spec, "verification patterns");
            Ok(spec)
        }
        Decoded::Failed(reason) => {
            warn!(%reason, "could not decode verification patterns, matching expected text literally");
            Ok(VerificationSpec::literal(expected))
        }
    }
}

/// Evaluate a spec against one page snapshot and the memory map
pub fn evaluate(spec: &VerificationSpec, page: &str, memory: &BTreeMap<String, Value>) -> Verdict {
    for check in &spec.memory_checks {
        if let Some(failure) = check_memory(check, memory) {
            return Verdict::fail(failure);
        }
    }

    for pattern in &spec.not_match_patterns {
        match compile(pattern) {
            Ok(re) if re.is_match(page) => {
                return Verdict::fail(format!("Found forbidden pattern: {}", pattern));
            }
            Ok(_) => {}
            Err(e) => warn!(%pattern, error = %e, "skipping invalid notMatch pattern"),
        }
    }

    if spec.match_patterns.is_empty() {
        return Verdict::pass("No forbidden patterns found");
    }

    for pattern in &spec.match_patterns {
        match compile(pattern) {
            Ok(re) if re.is_match(page) => {
                return Verdict::pass(format!("Matched pattern: {}", pattern));
            }
            Ok(_) => {}
            Err(e) => warn!(%pattern, error = %e, "skipping invalid match pattern"),
        }
    }

    Verdict::fail(format!(
        "None of the expected patterns matched: {}",
        spec.match_patterns.join(", ")
    ))
}

fn check_memory(check: &MemoryCheck, memory: &BTreeMap<String, Value>) -> Option<String> {
    let value = memory.get(&check.key);

    match (check.exists, value) {
        (true, None) => return Some(format!("Memory key not found: {}", check.key)),
        (false, Some(_)) => return Some(format!("Memory key should not exist: {}", check.key)),
        (false, None) => return None,
        (true, Some(_)) => {}
    }

    let (Some(pattern), Some(value)) = (&check.value_pattern, value) else {
        return None;
    };
    let text = value_text(value);
    let matches = match compile(pattern) {
        Ok(re) => re.is_match(&text),
        Err(e) => {
            warn!(%pattern, error = %e, "invalid memory pattern, comparing literally");
            text.eq_ignore_ascii_case(pattern)
        }
    };

    (!matches).then(|| {
        format!(
            "Memory value for {} does not match {}: got {}",
            check.key, pattern, text
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn spec(matches: &[&str], not_matches: &[&str]) -> VerificationSpec {
        VerificationSpec {
            match_patterns: matches.iter().map(|s| s.to_string()).collect(),
            not_match_patterns: not_matches.iter().map(|s| s.to_string()).collect(),
            memory_checks: vec![],
        }
    }

    fn no_memory() -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    #[test]
    fn test_not_match_takes_precedence() {
        let verdict = evaluate(&spec(&["welcome"], &["error"]), "welcome! error: bad", &no_memory());
        assert!(!verdict.success);
        assert!(verdict.actual.contains("error"));
    }

    #[test]
    fn test_empty_match_passes_when_clear() {
        let verdict = evaluate(&spec(&[], &["error"]), "all good", &no_memory());
        assert!(verdict.success);
        assert_eq!(verdict.actual, "No forbidden patterns found");
    }

    #[test]
    fn test_any_match_suffices() {
        let verdict = evaluate(&spec(&["foo", "bar"], &[]), "a bar walks in", &no_memory());
        assert!(verdict.success);
        assert!(verdict.actual.contains("bar"));
        assert!(!verdict.actual.contains("foo"));
    }

    #[test]
    fn test_no_match_lists_all_patterns() {
        let verdict = evaluate(&spec(&["foo", "bar"], &[]), "nothing", &no_memory());
        assert!(!verdict.success);
        assert!(verdict.actual.contains("foo, bar"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let verdict = evaluate(&spec(&["LOGIN FORM"], &[]), "the login form is open", &no_memory());
        assert!(verdict.success);
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let verdict = evaluate(&spec(&["(unclosed", "ok"], &["[bad"]), "ok", &no_memory());
        assert!(verdict.success);
        assert_eq!(verdict.actual, "Matched pattern: ok");
    }

    #[test]
    fn test_evaluate_is_repeatable() {
        let s = spec(&["ready"], &["fail"]);
        let first = evaluate(&s, "system ready", &no_memory());
        let second = evaluate(&s, "system ready", &no_memory());
        assert_eq!(first, second);
    }

    #[test]
    fn test_memory_checks_run_first() {
        let mut s = spec(&["anything"], &[]);
        s.memory_checks.push(MemoryCheck {
            key: "orderId".to_string(),
            value_pattern: None,
            exists: true,
        });
        let verdict = evaluate(&s, "anything", &no_memory());
        assert!(!verdict.success);
        assert_eq!(verdict.actual, "Memory key not found: orderId");
    }

    #[test]
    fn test_memory_absence_and_value_checks() {
        let mut memory = BTreeMap::new();
        memory.insert("orderId".to_string(), json!("A-1042"));

        let mut absent = spec(&[], &[]);
        absent.memory_checks.push(MemoryCheck {
            key: "orderId".to_string(),
            value_pattern: None,
            exists: false,
        });
        assert_eq!(
            evaluate(&absent, "", &memory).actual,
            "Memory key should not exist: orderId"
        );

        let mut shaped = spec(&[], &[]);
        shaped.memory_checks.push(MemoryCheck {
            key: "orderId".to_string(),
            value_pattern: Some(r"^a-\d+$".to_string()),
            exists: true,
        });
        assert!(evaluate(&shaped, "", &memory).success);

        shaped.memory_checks[0].value_pattern = Some(r"^B-".to_string());
        let verdict = evaluate(&shaped, "", &memory);
        assert!(!verdict.success);
        assert!(verdict.actual.contains("A-1042"));
    }

    #[test]
    fn test_spec_wire_format() {
        let decoded: VerificationSpec = serde_json::from_value(json!({
            "match": ["done"],
            "notMatch": ["error"],
            "memoryChecks": [{ "key": "token" }, { "key": "gone", "exists": false }]
        }))
        .unwrap();
        assert_eq!(decoded.match_patterns, vec!["done".to_string()]);
        assert!(decoded.memory_checks[0].exists);
        assert!(!decoded.memory_checks[1].exists);
    }

    #[test]
    fn test_literal_fallback_escapes() {
        let s = VerificationSpec::literal("Total: $5 (incl. tax)");
        assert!(evaluate(&s, "Total: $5 (incl. tax)", &no_memory()).success);
        assert!(!evaluate(&s, "Total: 5 incl tax", &no_memory()).success);
    }
}
