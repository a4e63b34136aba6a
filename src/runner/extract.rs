//! Dynamic value extraction for learned store-memory actions.
//!
//! A value copied from the page at learn time is different on every run, so
//! the plan keeps a capture regex built from the text surrounding it. The
//! regex is only kept if it reproduces the value on the page it was learned
//! from.

use regex::RegexBuilder;

use crate::oracle::prompts::truncate_to_bytes;

/// Characters of left context used to anchor a capture
const PREFIX_CHARS: usize = 24;
/// Characters of right context used to end a multi-word capture
const SUFFIX_CHARS: usize = 8;

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

fn head_chars(text: &str, n: usize) -> &str {
    let end = text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len());
    &text[..end]
}

/// Build a capture regex locating `value` on `page` by its left context
pub fn learn_extraction_regex(page: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let line = page.lines().find(|line| line.contains(value))?;
    let start = line.find(value)?;
    let prefix = tail_chars(&line[..start], PREFIX_CHARS).trim_start();
    if prefix.trim().is_empty() {
        return None;
    }
    let prefix = regex::escape(prefix);

    let pattern = if value.chars().all(|c| c.is_ascii_digit()) {
        format!(r"{}(\d+)", prefix)
    } else if !value.chars().any(char::is_whitespace) {
        format!(r#"{}([^\s"',;]+)"#, prefix)
    } else {
        let suffix = head_chars(&line[start + value.len()..], SUFFIX_CHARS);
        if suffix.is_empty() {
            format!(r"(?m){}(.+?)$", prefix)
        } else {
            format!(r"{}(.+?){}", prefix, regex::escape(suffix))
        }
    };

    (apply_extraction_regex(&pattern, page).as_deref() == Some(value)).then_some(pattern)
}

/// Run a learned capture regex, returning its first group
pub fn apply_extraction_regex(pattern: &str, page: &str) -> Option<String> {
    let re = RegexBuilder::new(pattern).case_insensitive(true).build().ok()?;
    re.captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Bounded slice of page text for the extraction prompt
pub fn excerpt(page: &str, max_bytes: usize) -> &str {
    truncate_to_bytes(page, max_bytes)
}

/// Clean up a plain-text extraction answer
pub fn clean_extracted(answer: &str) -> Option<String> {
    let line = answer.lines().map(str::trim).find(|line| !line.is_empty())?;
    let value = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_value() {
        let page = "- heading \"Order confirmed\"\n- text: Order number 48213 was placed";
        let pattern = learn_extraction_regex(page, "48213").unwrap();

        let next_run = "- heading \"Order confirmed\"\n- text: Order number 90001 was placed";
        assert_eq!(apply_extraction_regex(&pattern, next_run).as_deref(), Some("90001"));
    }

    #[test]
    fn test_token_value() {
        let page = "- text: \"Your code: AB-12x9\"";
        let pattern = learn_extraction_regex(page, "AB-12x9").unwrap();
        let next_run = "- text: \"Your code: ZZ-0001\"";
        assert_eq!(apply_extraction_regex(&pattern, next_run).as_deref(), Some("ZZ-0001"));
    }

    #[test]
    fn test_multi_word_value() {
        let page = "- cell \"Customer: Jane Q Public\" [ref=e4]";
        let pattern = learn_extraction_regex(page, "Jane Q Public").unwrap();
        let next_run = "- cell \"Customer: John Smith\" [ref=e4]";
        assert_eq!(apply_extraction_regex(&pattern, next_run).as_deref(), Some("John Smith"));
    }

    #[test]
    fn test_no_context_or_absent() {
        assert!(learn_extraction_regex("48213", "48213").is_none());
        assert!(learn_extraction_regex("- text: nothing here", "48213").is_none());
        assert!(learn_extraction_regex("anything", "  ").is_none());
    }

    #[test]
    fn test_clean_extracted() {
        assert_eq!(clean_extracted("\n  \"A-77\"  \n"), Some("A-77".to_string()));
        assert_eq!(clean_extracted("   "), None);
    }
}
