//! Mermaid rendering of the per-step state machine and a parsed scenario.

use std::fmt::Write;

use crate::instruction::Instruction;

const STATE_MACHINE: &str = "\
stateDiagram-v2
    [*] --> NotStarted
    NotStarted --> SpecialCommand: special command
    NotStarted --> Replay: learned plan step
    NotStarted --> OracleExecute: no plan step
    SpecialCommand --> Succeeded
    Replay --> LocalVerify
    Replay --> OracleExecute: resolution or action failed
    LocalVerify --> Succeeded
    LocalVerify --> OracleExecute: verification failed
    OracleExecute --> Succeeded: auto-pass
    OracleExecute --> Verify
    Verify --> Succeeded
    Verify --> Failed
    OracleExecute --> Failed: action failed
    Failed --> NotStarted: retry
    Failed --> [*]: retries exhausted
    Succeeded --> [*]
";

/// State machine followed by one line per scenario step
pub fn render(scenario: &str, steps: &[Instruction]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "```mermaid");
    out.push_str(STATE_MACHINE);
    let _ = writeln!(out, "```");
    let _ = writeln!(out);
    let _ = writeln!(out, "Scenario {} ({} steps)", scenario, steps.len());

    for (i, step) in steps.iter().enumerate() {
        let kind = if step.special_command().is_some() { "special" } else { "action" };
        let check = match step.expectation.text() {
            Some(expected) if step.special_command().is_none() => format!("verify \"{}\"", expected),
            _ => "auto-pass".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:>3}. [{}] {} | {} | {}ms | {}",
            i + 1,
            step.browser,
            kind,
            step.text,
            step.delay_ms,
            check
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_scenario_text;

    #[test]
    fn test_render_lists_steps() {
        let steps = parse_scenario_text("go to https://a.test\n*2 click Save [[500]] >>> Saved\n");
        let out = render("demo", &steps);
        assert!(out.starts_with("```mermaid\nstateDiagram-v2"));
        assert!(out.contains("1. [browser 1] special | go to https://a.test | 200ms | auto-pass"));
        assert!(out.contains("2. [browser 2] action | click Save | 500ms | verify \"Saved\""));
    }
}
