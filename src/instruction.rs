//! Scenario line parsing.
//!
//! A scenario line has the shape
//!
//! ```text
//! [*1 |*2 ]instruction [[delayMs]] [>>> expected result]
//! ```
//!
//! The parser splits it into the routing target, the settle delay, the plan
//! key and the verification requirement. Fixed-vocabulary instructions
//! (navigation, storage reset, scrolling) are classified once here so the
//! runner can execute them without the oracle.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between the instruction and its expected result
pub const EXPECTATION_SEPARATOR: &str = ">>>";

/// Settle delay applied when a line carries no `[[N]]` token
pub const DEFAULT_DELAY_MS: u64 = 200;

static BROWSER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*([12])(?:\s+|$)").unwrap());
static DELAY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(\d+)\]\]").unwrap());
static NAVIGATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:go\s+to|navigate\s+to)\s+(\S+)$").unwrap());
static RESET_STORAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:reset|clear)\s+(?:the\s+)?(?:session|storage|localstorage|local\s+storage)$")
        .unwrap()
});
static SCROLL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^scroll\s+(up|down)$").unwrap());

/// Which browser connection a step is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BrowserId {
    #[default]
    Primary,
    Secondary,
}

impl BrowserId {
    pub fn number(self) -> u8 {
        match self {
            BrowserId::Primary => 1,
            BrowserId::Secondary => 2,
        }
    }
}

impl From<BrowserId> for u8 {
    fn from(id: BrowserId) -> Self {
        id.number()
    }
}

impl TryFrom<u8> for BrowserId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BrowserId::Primary),
            2 => Ok(BrowserId::Secondary),
            other => Err(format!("unknown browser id {}", other)),
        }
    }
}

impl std::fmt::Display for BrowserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "browser {}", self.number())
    }
}

/// Scroll direction for the `scroll up|down` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Instructions the runner executes directly, without the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SpecialCommand {
    Navigate { url: String },
    ResetStorage,
    Scroll { direction: ScrollDirection },
}

/// What must hold after a step's actions ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// No expected-result clause: the step passes once its actions ran
    AutoPass,
    /// Free-text expected result
    Verify(String),
}

impl Expectation {
    pub fn text(&self) -> Option<&str> {
        match self {
            Expectation::AutoPass => None,
            Expectation::Verify(text) => Some(text),
        }
    }
}

/// One parsed scenario line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Plan lookup key: the instruction part with its routing prefix, delay token removed
    pub key: String,
    /// Target browser
    pub browser: BrowserId,
    /// Instruction text without prefix or delay token
    pub text: String,
    /// Settle delay in milliseconds
    pub delay_ms: u64,
    /// Verification requirement
    pub expectation: Expectation,
}

impl Instruction {
    /// Classify the instruction text as a special command, if it is one
    pub fn special_command(&self) -> Option<SpecialCommand> {
        parse_special_command(&self.text)
    }

    /// Whether the step passes without verification
    pub fn is_auto_pass(&self) -> bool {
        matches!(self.expectation, Expectation::AutoPass) || self.special_command().is_some()
    }
}

/// Strip a leading `*1 ` / `*2 ` routing token.
pub fn parse_browser_prefix(line: &str) -> (BrowserId, &str) {
    match BROWSER_PREFIX.captures(line) {
        Some(caps) => {
            let id = if &caps[1] == "2" {
                BrowserId::Secondary
            } else {
                BrowserId::Primary
            };
            let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (id, &line[end..])
        }
        None => (BrowserId::Primary, line),
    }
}

/// Strip a `[[N]]` delay token from the instruction portion of a line.
///
/// Only the part before `>>>` is searched; the separator and expected result
/// are returned untouched.
pub fn parse_delay(line: &str) -> (String, u64) {
    let (head, tail) = match line.find(EXPECTATION_SEPARATOR) {
        Some(idx) => line.split_at(idx),
        None => (line, ""),
    };

    let Some(caps) = DELAY_TOKEN.captures(head) else {
        return (line.to_string(), DEFAULT_DELAY_MS);
    };
    let delay = caps[1].parse().unwrap_or(DEFAULT_DELAY_MS);
    let stripped = DELAY_TOKEN.replace(head, "");
    let cleaned = stripped.trim();

    if tail.is_empty() {
        (cleaned.to_string(), delay)
    } else {
        (format!("{} {}", cleaned, tail), delay)
    }
}

/// Recognize the fixed command vocabulary. The whole text must match.
pub fn parse_special_command(text: &str) -> Option<SpecialCommand> {
    let text = text.trim();

    if let Some(caps) = NAVIGATE.captures(text) {
        let url = caps[1].trim_matches(|c| c == '"' || c == '\'').to_string();
        return Some(SpecialCommand::Navigate { url });
    }
    if RESET_STORAGE.is_match(text) {
        return Some(SpecialCommand::ResetStorage);
    }
    if let Some(caps) = SCROLL.captures(text) {
        let direction = if caps[1].eq_ignore_ascii_case("up") {
            ScrollDirection::Up
        } else {
            ScrollDirection::Down
        };
        return Some(SpecialCommand::Scroll { direction });
    }
    None
}

/// Parse one scenario line.
///
/// Returns `None` for blank lines and malformed lines (an empty instruction,
/// or a `>>>` with nothing after it).
pub fn parse_line(line: &str) -> Option<Instruction> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (line, delay_ms) = parse_delay(line);

    let (head, expectation) = match line.split_once(EXPECTATION_SEPARATOR) {
        Some((head, expected)) => {
            let expected = expected.trim();
            if expected.is_empty() {
                return None;
            }
            (head.trim(), Expectation::Verify(expected.to_string()))
        }
        None => (line.trim(), Expectation::AutoPass),
    };

    let (browser, text) = parse_browser_prefix(head);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(Instruction {
        key: head.to_string(),
        browser,
        text: text.to_string(),
        delay_ms,
        expectation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prefix_delay_and_expectation() {
        let parsed = parse_line("*2 click X [[500]] >>> Y").unwrap();
        assert_eq!(parsed.browser, BrowserId::Secondary);
        assert_eq!(parsed.text, "click X");
        assert_eq!(parsed.delay_ms, 500);
        assert_eq!(parsed.expectation, Expectation::Verify("Y".to_string()));
        assert_eq!(parsed.key, "*2 click X");
    }

    #[test]
    fn test_defaults() {
        let parsed = parse_line("click \"Login\"").unwrap();
        assert_eq!(parsed.browser, BrowserId::Primary);
        assert_eq!(parsed.delay_ms, DEFAULT_DELAY_MS);
        assert_eq!(parsed.expectation, Expectation::AutoPass);
        assert_eq!(parsed.key, "click \"Login\"");
    }

    #[test]
    fn test_browser_prefix_requires_separator() {
        assert_eq!(parse_browser_prefix("*1 open menu"), (BrowserId::Primary, "open menu"));
        assert_eq!(parse_browser_prefix("*2 open menu"), (BrowserId::Secondary, "open menu"));
        assert_eq!(parse_browser_prefix("*3 open menu"), (BrowserId::Primary, "*3 open menu"));
        assert_eq!(parse_browser_prefix("*2open"), (BrowserId::Primary, "*2open"));
    }

    #[test]
    fn test_delay_only_searched_before_separator() {
        let (line, delay) = parse_delay("submit >>> shows [[42]] items");
        assert_eq!(delay, DEFAULT_DELAY_MS);
        assert_eq!(line, "submit >>> shows [[42]] items");

        let (line, delay) = parse_delay("[[1500]] submit form");
        assert_eq!(delay, 1500);
        assert_eq!(line, "submit form");
    }

    #[test]
    fn test_delay_token_keeps_inner_whitespace() {
        let with_delay = parse_line("click  X [[500]] >>> Y").unwrap();
        let without = parse_line("click  X >>> Y").unwrap();
        assert_eq!(with_delay.key, "click  X");
        assert_eq!(with_delay.key, without.key);
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("click login >>>").is_none());
        assert!(parse_line(">>> something").is_none());
        assert!(parse_line("*2 >>> something").is_none());
    }

    #[test]
    fn test_special_commands() {
        assert_eq!(
            parse_special_command("go to https://example.test"),
            Some(SpecialCommand::Navigate {
                url: "https://example.test".to_string()
            })
        );
        assert_eq!(
            parse_special_command("Navigate To http://localhost:3000/login"),
            Some(SpecialCommand::Navigate {
                url: "http://localhost:3000/login".to_string()
            })
        );
        assert_eq!(parse_special_command("Clear LocalStorage"), Some(SpecialCommand::ResetStorage));
        assert_eq!(parse_special_command("reset session"), Some(SpecialCommand::ResetStorage));
        assert_eq!(
            parse_special_command("scroll DOWN"),
            Some(SpecialCommand::Scroll {
                direction: ScrollDirection::Down
            })
        );
    }

    #[test]
    fn test_special_commands_are_anchored() {
        assert_eq!(parse_special_command("go to the settings page and save"), None);
        assert_eq!(parse_special_command("please scroll down"), None);
        assert_eq!(parse_special_command("reset storage now"), None);
    }

    #[test]
    fn test_special_command_auto_passes_with_expectation() {
        let parsed = parse_line("scroll down [[800]] >>> footer visible").unwrap();
        assert!(parsed.is_auto_pass());
        assert_eq!(parsed.delay_ms, 800);
    }

    #[test]
    fn test_browser_id_serde() {
        assert_eq!(serde_json::to_string(&BrowserId::Secondary).unwrap(), "2");
        let id: BrowserId = serde_json::from_str("1").unwrap();
        assert_eq!(id, BrowserId::Primary);
        assert!(serde_json::from_str::<BrowserId>("3").is_err());
    }
}
