//! Element re-resolution against a page snapshot.
//!
//! Snapshot references (`[ref=e12]`) are not stable across runs, so a learned
//! action records a human-readable anchor instead: the element's role and
//! visible text. At replay the anchor is searched for in the current snapshot
//! and the live reference read back from the same line.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use once_cell::sync::Lazy;
use regex::Regex;

const REF_MARKER: &str = r"\[ref=([^\]\s]+)\]";

static LINE_ROLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-\s*([A-Za-z][\w-]*)").unwrap());
static QUOTED_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap());

/// Role and visible text captured for an element at learn time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAnchor {
    pub role: Option<String>,
    pub text: Option<String>,
}

/// What a recorded click or fill points at
#[derive(Debug, Clone, Copy)]
pub struct ElementTarget<'a> {
    pub description: &'a str,
    pub role: Option<&'a str>,
    pub text: Option<&'a str>,
}

/// Read the role and visible text of the element carrying `reference`
pub fn capture_anchor(snapshot: &str, reference: &str) -> Option<ElementAnchor> {
    let marker = format!("[ref={}]", reference);
    let line = snapshot.lines().find(|line| line.contains(&marker))?;

    let role = LINE_ROLE
        .captures(line)
        .map(|caps| caps[1].to_string())
        .filter(|role| role != "ref");
    let text = QUOTED_TEXT
        .captures(line)
        .map(|caps| caps[1].replace("\\\"", "\""))
        .filter(|text| !text.trim().is_empty());

    Some(ElementAnchor { role, text })
}

fn first_capture(pattern: &str, snapshot: &str) -> Option<String> {
    let re = RegexBuilder::new(pattern).case_insensitive(true).build().ok()?;
    re.captures(snapshot)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn text_patterns(text: &str) -> [String; 2] {
    [
        format!(r#"{}"?(?:\s*\[[^\]\n]*\])*?\s*{}"#, text, REF_MARKER),
        format!(r"{}.*?{}", REF_MARKER, text),
    ]
}

/// Find the live reference for a recorded element, or `None` if it is gone.
///
/// Strategies, first hit wins:
/// 1. role, anchor text and ref on one line (either order of text and ref)
/// 2. anchor text followed by a ref marker
/// 3. a ref marker followed by the anchor text
/// 4. strategies 2 and 3 with the description, when it differs from the anchor
pub fn resolve(target: &ElementTarget<'_>, snapshot: &str) -> Option<String> {
    let anchor = target
        .text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(target.description)
        .trim();
    if anchor.is_empty() {
        return None;
    }
    let text = regex::escape(anchor);

    let mut patterns = Vec::new();
    if let Some(role) = target.role.filter(|r| !r.trim().is_empty()) {
        let role = regex::escape(role.trim());
        patterns.push(format!(r"{}\b.*?{}.*?{}", role, text, REF_MARKER));
        patterns.push(format!(r"{}\b.*?{}.*?{}", role, REF_MARKER, text));
    }
    patterns.extend(text_patterns(&text));

    let description = target.description.trim();
    if !description.is_empty() && !description.eq_ignore_ascii_case(anchor) {
        patterns.extend(text_patterns(&regex::escape(description)));
    }

    patterns
        .iter()
        .find_map(|pattern| first_capture(pattern, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"- generic [ref=e1]:
  - heading "Welcome back" [level=1] [ref=e2]
  - textbox "Email" [ref=e5]
  - link "Login" [ref=e8] [cursor=pointer]:
    - /url: /login
  - button "Login" [ref=e9] [cursor=pointer]
  - text: [ref=e11] Forgot password?"#;

    fn target<'a>(description: &'a str, role: Option<&'a str>, text: Option<&'a str>) -> ElementTarget<'a> {
        ElementTarget {
            description,
            role,
            text,
        }
    }

    #[test]
    fn test_role_disambiguates() {
        let found = resolve(&target("Login button", Some("button"), Some("Login")), SNAPSHOT);
        assert_eq!(found.as_deref(), Some("e9"));

        let found = resolve(&target("Login link", Some("link"), Some("Login")), SNAPSHOT);
        assert_eq!(found.as_deref(), Some("e8"));
    }

    #[test]
    fn test_text_only_takes_first_occurrence() {
        let found = resolve(&target("Login", None, Some("Login")), SNAPSHOT);
        assert_eq!(found.as_deref(), Some("e8"));
    }

    #[test]
    fn test_text_after_attributes() {
        let found = resolve(&target("page title", None, Some("Welcome back")), SNAPSHOT);
        assert_eq!(found.as_deref(), Some("e2"));
    }

    #[test]
    fn test_ref_before_text() {
        let found = resolve(&target("reset link", None, Some("Forgot password?")), SNAPSHOT);
        assert_eq!(found.as_deref(), Some("e11"));
    }

    #[test]
    fn test_description_fallback() {
        let found = resolve(&target("Email", Some("textbox"), Some("E-mail address")), SNAPSHOT);
        assert_eq!(found.as_deref(), Some("e5"));
    }

    #[test]
    fn test_case_insensitive_and_escaped() {
        let snapshot = r#"- button "Save (draft)" [ref=e40]"#;
        let found = resolve(&target("save", Some("BUTTON"), Some("save (DRAFT)")), snapshot);
        assert_eq!(found.as_deref(), Some("e40"));
    }

    #[test]
    fn test_missing_element() {
        assert_eq!(resolve(&target("Logout", Some("button"), Some("Logout")), SNAPSHOT), None);
        assert_eq!(resolve(&target("", None, None), SNAPSHOT), None);
    }

    #[test]
    fn test_capture_anchor() {
        let anchor = capture_anchor(SNAPSHOT, "e9").unwrap();
        assert_eq!(anchor.role.as_deref(), Some("button"));
        assert_eq!(anchor.text.as_deref(), Some("Login"));

        let anchor = capture_anchor(SNAPSHOT, "e11").unwrap();
        assert_eq!(anchor.role.as_deref(), Some("text"));
        assert_eq!(anchor.text, None);

        assert!(capture_anchor(SNAPSHOT, "e99").is_none());
    }
}
