//! Scenario runner.
//!
//! Executes parsed instructions against the browser pool, learning plan steps
//! from the oracle and replaying them on later runs.

pub mod actions;
pub mod executor;
pub mod extract;
pub mod types;

pub use executor::Runner;
pub use types::{ExecutionMode, RunSummary, RunnerConfig, RunnerError, RunnerResult, TestResult};
