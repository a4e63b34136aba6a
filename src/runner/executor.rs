//! Step execution: plain, learning and plan replay.
//!
//! Per step the runner either asks the oracle for actions and verification
//! criteria (plain/learn), or replays a learned [`PlanStep`] with local
//! element resolution and local verification. A replay that cannot resolve
//! an element, hits a failing action, or fails verification falls back to
//! learning that one step and bumps its failure counter.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::actions::{ActionList, ProposedAction, enrich};
use super::extract::{apply_extraction_regex, clean_extracted, excerpt};
use super::types::{ExecutionMode, RunSummary, RunnerConfig, RunnerResult, TestResult};
use crate::browser::{
    BrowserError, BrowserPool, BrowserTransport, RESET_STORAGE_SCRIPT, scroll_script,
};
use crate::instruction::{Instruction, SpecialCommand};
use crate::memory::{MemoryStore, value_text};
use crate::oracle::prompts::{build_action_prompt, build_extraction_prompt};
use crate::oracle::{Decoded, Oracle, OracleError, decode_json};
use crate::plan::{ExecutionPlan, PlanAction, PlanStep, PlanStore, StepKind};
use crate::resolve::resolve;
use crate::verify::{Verdict, evaluate, obtain_patterns};

/// Per-step outcome that is not fatal to the run
type StepOutcome<T> = Result<T, String>;

/// Caps the number of oracle-proposed actions one step execution may run
struct ActionBudget {
    remaining: usize,
}

impl ActionBudget {
    fn new(limit: usize) -> Self {
        Self { remaining: limit }
    }

    fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Keep transport failures inside the step unless they are configuration errors
fn step_failure(e: BrowserError) -> RunnerResult<String> {
    if e.is_fatal() { Err(e.into()) } else { Ok(e.to_string()) }
}

fn oracle_failure(e: OracleError) -> RunnerResult<String> {
    if e.is_fatal() { Err(e.into()) } else { Ok(e.to_string()) }
}

/// Drives scenarios against one or two browsers
pub struct Runner {
    oracle: Arc<dyn Oracle>,
    browsers: BrowserPool,
    memory: MemoryStore,
    plans: Option<PlanStore>,
    config: RunnerConfig,
    history: Vec<String>,
}

impl Runner {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        browsers: BrowserPool,
        memory: MemoryStore,
        config: RunnerConfig,
    ) -> Self {
        Self {
            oracle,
            browsers,
            memory,
            plans: None,
            config,
            history: Vec::new(),
        }
    }

    /// Persist learned plans in `store`. Without one, every mode behaves as plain.
    pub fn with_plan_store(mut self, store: PlanStore) -> Self {
        self.plans = Some(store);
        self
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Clear persisted memory, as done at the start of a fresh browser session
    pub fn reset_memory(&mut self) -> RunnerResult<()> {
        self.memory.reset()?;
        Ok(())
    }

    /// Navigate every connected browser to the starting URL
    pub async fn open(&self, url: &str) -> RunnerResult<()> {
        for (id, browser) in self.browsers.connected() {
            info!(browser = %id, %url, "opening start page");
            browser.navigate(url).await?;
            match browser.list_tabs().await {
                Ok(tabs) => debug!(browser = %id, %tabs, "open tabs"),
                Err(e) => warn!(browser = %id, error = %e, "could not list tabs"),
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.browsers.close_all().await;
    }

    /// Run every step in order, halting at the first step that still fails
    /// after its retries.
    pub async fn run_scenario(
        &mut self,
        scenario: &str,
        steps: &[Instruction],
    ) -> RunnerResult<RunSummary> {
        self.memory.reload();
        self.history.clear();

        let mut plan = match (&self.plans, self.config.mode) {
            (Some(store), ExecutionMode::Learn | ExecutionMode::Replay) => Some(
                store
                    .load(scenario)?
                    .unwrap_or_else(|| ExecutionPlan::new(scenario)),
            ),
            _ => None,
        };

        info!(%scenario, steps = steps.len(), mode = ?self.config.mode, "scenario started");

        let mut results: Vec<TestResult> = Vec::new();
        for (index, step) in steps.iter().enumerate() {
            let mut attempt = 0;
            let passed = loop {
                if attempt > 0 {
                    info!(step = index + 1, attempt, "retrying step");
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                }
                results.retain(|result| result.step_index != index);

                let result = self.execute_step(index, step, plan.as_mut()).await?;
                let success = result.success;
                results.push(result);

                if success || attempt >= self.config.max_retries {
                    break success;
                }
                attempt += 1;
            };

            if !passed {
                warn!(step = index + 1, instruction = %step.key, "step failed after retries, halting scenario");
                break;
            }
        }

        let summary = RunSummary::from_results(scenario, self.config.mode, steps.len(), results);
        info!(
            %scenario,
            passed = summary.passed,
            failed = summary.failed,
            total = summary.total,
            "scenario finished"
        );
        Ok(summary)
    }

    /// Execute one step once, in the configured mode
    pub async fn execute_step(
        &mut self,
        index: usize,
        step: &Instruction,
        plan: Option<&mut ExecutionPlan>,
    ) -> RunnerResult<TestResult> {
        let browser = self.browsers.get(step.browser)?;
        info!(step = index + 1, browser = %step.browser, instruction = %step.text, "step started");

        if let Some(command) = step.special_command() {
            let result = self
                .run_special_command(index, step, &command, browser.as_ref())
                .await?;
            if let Some(plan) = plan.filter(|_| result.success) {
                self.record(plan, special_plan_step(step, command))?;
            }
            return Ok(result);
        }

        let Some(plan) = plan else {
            let (result, _) = self.drive(index, step, browser.as_ref(), None).await?;
            return Ok(result);
        };

        let existing = plan.find_step(&step.key).cloned();
        let previous_failures = existing.as_ref().map_or(0, |s| s.consecutive_failures);
        let learned = existing.filter(|learned| {
            let replayable = learned.kind == StepKind::Action && learned.is_replayable();
            let same_check = step.expectation.text().is_some() == learned.verification.is_some();
            if replayable && !same_check {
                debug!(step = index + 1, "expected result changed since learning, re-learning step");
            }
            replayable && same_check
        });

        if let (ExecutionMode::Replay, Some(learned)) = (self.config.mode, learned) {
            let reason = match self.replay(index, step, &learned, browser.as_ref()).await? {
                Ok(result) => return Ok(result),
                Err(reason) => reason,
            };

            warn!(step = index + 1, %reason, "replay failed, re-learning step");
            let failures = learned.consecutive_failures + 1;
            let (mut result, relearned) = self
                .drive(index, step, browser.as_ref(), Some(failures))
                .await?;
            result.actions.insert(0, format!("replay failed: {}", reason));

            let updated = relearned.unwrap_or(PlanStep {
                consecutive_failures: failures,
                ..learned
            });
            self.record(plan, updated)?;
            return Ok(result);
        }

        let (result, learned) = self
            .drive(index, step, browser.as_ref(), Some(previous_failures))
            .await?;
        if let Some(learned) = learned {
            self.record(plan, learned)?;
        }
        Ok(result)
    }

    fn record(&self, plan: &mut ExecutionPlan, step: PlanStep) -> RunnerResult<()> {
        debug!(instruction = %step.original_instruction, failures = step.consecutive_failures, "recording plan step");
        plan.upsert(step);
        if let Some(store) = &self.plans {
            store.save(plan)?;
        }
        Ok(())
    }

    fn remember(&mut self, step: &Instruction, trail: &[String]) {
        let outcome = if trail.is_empty() {
            "no actions".to_string()
        } else {
            trail.join("; ")
        };
        self.history.push(format!("{} => {}", step.key, outcome));
        let overflow = self.history.len().saturating_sub(self.config.history_len);
        self.history.drain(..overflow);
    }

    async fn run_special_command(
        &mut self,
        index: usize,
        step: &Instruction,
        command: &SpecialCommand,
        browser: &dyn BrowserTransport,
    ) -> RunnerResult<TestResult> {
        let (label, outcome) = match command {
            SpecialCommand::Navigate { url } => (format!("navigate {}", url), browser.navigate(url).await),
            SpecialCommand::ResetStorage => (
                "reset storage".to_string(),
                browser.evaluate(RESET_STORAGE_SCRIPT).await,
            ),
            SpecialCommand::Scroll { direction } => (
                format!("scroll {:?}", direction).to_lowercase(),
                browser.evaluate(scroll_script(*direction)).await,
            ),
        };

        let result = match outcome {
            Ok(_) => {
                tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
                let trail = vec![format!("{}: ok", label)];
                self.remember(step, &trail);
                test_result(index, step, true, format!("Executed {}", label), trail, false)
            }
            Err(e) => {
                let message = step_failure(e)?;
                test_result(
                    index,
                    step,
                    false,
                    format!("{} failed: {}", label, message),
                    vec![format!("{}: {}", label, message)],
                    false,
                )
            }
        };
        Ok(result)
    }

    /// Oracle-driven execution. With `record = Some(failures)` a successful
    /// run also yields the learned plan step carrying that failure count.
    async fn drive(
        &mut self,
        index: usize,
        step: &Instruction,
        browser: &dyn BrowserTransport,
        record: Option<u32>,
    ) -> RunnerResult<(TestResult, Option<PlanStep>)> {
        let mut trail = Vec::new();
        let fail = |actual: String, trail: Vec<String>| -> RunnerResult<(TestResult, Option<PlanStep>)> {
            Ok((test_result(index, step, false, actual, trail, false), None))
        };

        let mut snapshot = match browser.snapshot().await {
            Ok(page) => page,
            Err(e) => return fail(format!("Could not read page: {}", step_failure(e)?), trail),
        };

        let prompt = build_action_prompt(&step.text, &snapshot, &self.history, self.memory.entries());
        let response = match self.oracle.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => return fail(format!("Oracle error: {}", oracle_failure(e)?), trail),
        };

        let proposed = match decode_json::<ActionList>(&response).ok().map(ActionList::into_actions) {
            Some(Ok(actions)) => actions,
            Some(Err(reason)) => return fail(format!("Could not use proposed actions: {}", reason), trail),
            None => return fail("Could not parse proposed actions".to_string(), trail),
        };
        debug!(step = index + 1, actions = proposed.len(), "actions proposed");

        let mut budget = ActionBudget::new(self.config.max_actions_per_step);
        let mut recorded = Vec::new();
        let mut stale = false;

        for action in &proposed {
            if !budget.take() {
                return fail(
                    format!(
                        "Step exceeded {} actions",
                        self.config.max_actions_per_step
                    ),
                    trail,
                );
            }
            if stale && action.needs_snapshot() {
                snapshot = match browser.snapshot().await {
                    Ok(page) => page,
                    Err(e) => return fail(format!("Could not read page: {}", step_failure(e)?), trail),
                };
                stale = false;
            }

            match self.execute_proposed(action, browser).await? {
                Ok(line) => {
                    trail.push(line);
                    recorded.push(enrich(action, &snapshot));
                    stale |= action.touches_page();
                }
                Err(reason) => {
                    trail.push(format!("{} failed: {}", action.label(), reason));
                    return fail(format!("Action failed: {}", reason), trail);
                }
            }
        }
        self.remember(step, &trail);

        let (verdict, verification) = match step.expectation.text() {
            None => (
                Verdict {
                    success: true,
                    actual: "Actions executed".to_string(),
                },
                None,
            ),
            Some(expected) => {
                tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
                let page = match browser.snapshot().await {
                    Ok(page) => page,
                    Err(e) => return fail(format!("Could not read page: {}", step_failure(e)?), trail),
                };
                let spec =
                    obtain_patterns(self.oracle.as_ref(), expected, &page, self.memory.entries()).await?;
                (evaluate(&spec, &page, self.memory.entries()), Some(spec))
            }
        };

        let learned = record.filter(|_| verdict.success).map(|failures| PlanStep {
            original_instruction: step.key.clone(),
            kind: StepKind::Action,
            actions: recorded,
            special_command: None,
            verification,
            delay_ms: step.delay_ms,
            browser: step.browser,
            last_learned: Some(Utc::now()),
            consecutive_failures: failures,
        });

        let result = test_result(index, step, verdict.success, verdict.actual, trail, false);
        Ok((result, learned))
    }

    async fn execute_proposed(
        &mut self,
        action: &ProposedAction,
        browser: &dyn BrowserTransport,
    ) -> RunnerResult<StepOutcome<String>> {
        let outcome = match action {
            ProposedAction::Click { element, reference } => {
                browser.click(element, reference).await.map(|_| format!("clicked {}", element))
            }
            ProposedAction::Fill {
                element,
                reference,
                value,
                memory_key,
            } => {
                let text = match memory_key {
                    Some(key) => match self.memory.read_text(key) {
                        Some(text) => text,
                        None => return Ok(Err(format!("memory key not found: {}", key))),
                    },
                    None => value.as_ref().map(value_text).unwrap_or_default(),
                };
                browser
                    .type_text(element, reference, &text)
                    .await
                    .map(|_| format!("filled {}", element))
            }
            ProposedAction::Navigate { url } => {
                browser.navigate(url).await.map(|_| format!("navigated to {}", url))
            }
            ProposedAction::Store { key, value, .. } => {
                self.memory.store(key.clone(), value.clone())?;
                Ok(format!("stored {} = {}", key, value_text(value)))
            }
            ProposedAction::Read { key } => Ok(match self.memory.read_text(key) {
                Some(text) => format!("read {} = {}", key, text),
                None => format!("read {}: not set", key),
            }),
        };

        match outcome {
            Ok(line) => Ok(Ok(line)),
            Err(e) => Ok(Err(step_failure(e)?)),
        }
    }

    /// Replay a learned step without oracle calls for actions or verification.
    /// The inner error carries the reason a fallback to learning is needed.
    async fn replay(
        &mut self,
        index: usize,
        step: &Instruction,
        learned: &PlanStep,
        browser: &dyn BrowserTransport,
    ) -> RunnerResult<StepOutcome<TestResult>> {
        debug!(step = index + 1, actions = learned.actions.len(), "replaying plan step");
        let mut trail = Vec::new();
        let mut snapshot: Option<String> = None;

        for action in &learned.actions {
            let needs_page = matches!(
                action,
                PlanAction::Click { .. } | PlanAction::Fill { .. } | PlanAction::StoreMemory { value: None, .. }
            );
            if needs_page && snapshot.is_none() {
                match browser.snapshot().await {
                    Ok(page) => snapshot = Some(page),
                    Err(e) => return Ok(Err(format!("could not read page: {}", step_failure(e)?))),
                }
            }
            let page = snapshot.as_deref().unwrap_or_default();

            let outcome = match action {
                PlanAction::Click { element, .. } | PlanAction::Fill { element, .. } => {
                    let Some(target) = action.target() else {
                        continue;
                    };
                    let Some(reference) = resolve(&target, page) else {
                        return Ok(Err(format!("could not resolve element '{}'", element)));
                    };
                    let done = match action {
                        PlanAction::Fill {
                            value, memory_key, ..
                        } => {
                            let text = match memory_key {
                                Some(key) => match self.memory.read_text(key) {
                                    Some(text) => text,
                                    None => return Ok(Err(format!("memory key not found: {}", key))),
                                },
                                None => value.clone().unwrap_or_default(),
                            };
                            browser.type_text(element, &reference, &text).await
                        }
                        _ => browser.click(element, &reference).await,
                    };
                    done.map(|_| format!("{} [ref={}]", action.label(), reference))
                }
                PlanAction::Navigate { url } => {
                    browser.navigate(url).await.map(|_| action.label())
                }
                PlanAction::StoreMemory {
                    key,
                    value: Some(value),
                    ..
                } => {
                    self.memory.store(key.clone(), value.clone())?;
                    Ok(format!("stored {} = {}", key, value_text(value)))
                }
                PlanAction::StoreMemory {
                    key,
                    hint,
                    extraction_regex,
                    value: None,
                } => {
                    let value = match self.extract_value(page, hint, extraction_regex.as_deref()).await? {
                        Ok(value) => value,
                        Err(reason) => return Ok(Err(reason)),
                    };
                    self.memory.store(key.clone(), Value::String(value.clone()))?;
                    Ok(format!("stored {} = {}", key, value))
                }
                PlanAction::ReadMemory { key } => Ok(match self.memory.read_text(key) {
                    Some(text) => format!("read {} = {}", key, text),
                    None => format!("read {}: not set", key),
                }),
            };

            match outcome {
                Ok(line) => trail.push(line),
                Err(e) => return Ok(Err(format!("{} failed: {}", action.label(), step_failure(e)?))),
            }
            if matches!(
                action,
                PlanAction::Click { .. } | PlanAction::Fill { .. } | PlanAction::Navigate { .. }
            ) {
                snapshot = None;
            }
        }

        let actual = match &learned.verification {
            None => "Actions executed".to_string(),
            Some(spec) => {
                tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
                let page = match browser.snapshot().await {
                    Ok(page) => page,
                    Err(e) => return Ok(Err(format!("could not read page: {}", step_failure(e)?))),
                };
                let verdict = evaluate(spec, &page, self.memory.entries());
                if !verdict.success {
                    return Ok(Err(verdict.actual));
                }
                verdict.actual
            }
        };

        self.remember(step, &trail);
        Ok(Ok(test_result(index, step, true, actual, trail, true)))
    }

    /// Re-derive a dynamic value: learned regex first, then a bounded oracle call
    async fn extract_value(
        &self,
        page: &str,
        hint: &str,
        regex: Option<&str>,
    ) -> RunnerResult<StepOutcome<String>> {
        if let Some(value) = regex.and_then(|pattern| apply_extraction_regex(pattern, page)) {
            return Ok(Ok(value));
        }
        debug!(%hint, "extraction regex missed, asking oracle");

        let prompt = build_extraction_prompt(hint, excerpt(page, self.config.extraction_excerpt_bytes));
        let answer = match self.oracle.complete(&prompt).await {
            Ok(answer) => answer,
            Err(e) => return Ok(Err(format!("extraction failed: {}", oracle_failure(e)?))),
        };
        Ok(clean_extracted(&answer).ok_or_else(|| format!("could not extract {}", hint)))
    }
}

fn special_plan_step(step: &Instruction, command: SpecialCommand) -> PlanStep {
    PlanStep {
        original_instruction: step.key.clone(),
        kind: StepKind::SpecialCommand,
        actions: Vec::new(),
        special_command: Some(command),
        verification: None,
        delay_ms: step.delay_ms,
        browser: step.browser,
        last_learned: Some(Utc::now()),
        consecutive_failures: 0,
    }
}

fn test_result(
    index: usize,
    step: &Instruction,
    success: bool,
    actual: String,
    actions: Vec<String>,
    replayed: bool,
) -> TestResult {
    TestResult {
        step_index: index,
        instruction: step.key.clone(),
        expected: step.expectation.text().map(str::to_string),
        actual,
        success,
        actions,
        replayed,
        timestamp: Utc::now(),
    }
}
