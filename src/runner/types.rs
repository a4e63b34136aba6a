//! Types for test run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserError;
use crate::config;
use crate::memory::MemoryError;
use crate::oracle::OracleError;
use crate::plan::PlanError;

/// How steps are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Oracle-driven, nothing recorded
    Plain,
    /// Oracle-driven, every step re-learned and recorded
    Learn,
    /// Replay learned steps, learning the ones that are missing or fail
    #[default]
    Replay,
}

/// Execution policy for a run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mode: ExecutionMode,
    /// Extra attempts for a failing step
    pub max_retries: u32,
    /// Pause before each retry (milliseconds)
    pub retry_backoff_ms: u64,
    /// Cap on oracle-proposed actions within one step execution
    pub max_actions_per_step: usize,
    /// Page-text bytes handed to the extraction prompt
    pub extraction_excerpt_bytes: usize,
    /// Number of previous step outcomes passed to the action prompt
    pub history_len: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            mode: ExecutionMode::default(),
            max_retries: cfg.runner.max_retries,
            retry_backoff_ms: cfg.runner.retry_backoff_ms,
            max_actions_per_step: cfg.runner.max_actions_per_step,
            extraction_excerpt_bytes: cfg.runner.extraction_excerpt_bytes,
            history_len: 10,
        }
    }
}

impl RunnerConfig {
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn max_actions_per_step(mut self, max: usize) -> Self {
        self.max_actions_per_step = max;
        self
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Position of the step in the scenario (0-based)
    pub step_index: usize,
    pub instruction: String,
    /// Expected result text, `None` for auto-pass steps
    pub expected: Option<String>,
    /// What was observed
    pub actual: String,
    pub success: bool,
    /// Actions executed during the attempt and their outcomes
    pub actions: Vec<String>,
    /// Whether the result came from replaying a learned plan step
    #[serde(default)]
    pub replayed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Result of a complete scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scenario: String,
    pub mode: ExecutionMode,
    /// Steps in the scenario
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// One result per attempted step; later steps are absent after a halt
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn from_results(scenario: &str, mode: ExecutionMode, total: usize, results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            scenario: scenario.to_string(),
            mode,
            total,
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    /// Every step ran and passed
    pub fn success(&self) -> bool {
        self.failed == 0 && self.passed == self.total
    }
}

/// Result type for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),
    #[error("browser: {0}")]
    Browser(#[from] BrowserError),
    #[error("plan storage: {0}")]
    Plan(#[from] PlanError),
    #[error("memory storage: {0}")]
    Memory(#[from] MemoryError),
}
