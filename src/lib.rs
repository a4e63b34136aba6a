//! Scenario Pilot - natural-language end-to-end browser tests.
//!
//! This crate provides:
//! - A scenario format with includes, delays, expected results and browser routing
//! - An oracle-driven step executor talking to browsers over MCP
//! - Learned execution plans replayed without oracle calls
//! - Local regex verification and anchor-based element resolution
//! - A durable key/value memory shared by all steps of a run
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scenario_pilot::browser::{BrowserPool, McpBrowser};
//! use scenario_pilot::instruction::BrowserId;
//! use scenario_pilot::oracle::{OpenAiOracle, OracleConfig};
//! use scenario_pilot::{MemoryStore, PlanStore, Runner, RunnerConfig, load_scenario};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let steps = load_scenario("scenarios/login.txt")?;
//! let oracle = Arc::new(OpenAiOracle::new(OracleConfig::default())?);
//! let browser = McpBrowser::connect(BrowserId::Primary, "npx", &["@playwright/mcp@latest".into()]).await?;
//!
//! let mut runner = Runner::new(
//!     oracle,
//!     BrowserPool::new(Arc::new(browser)),
//!     MemoryStore::open("memory.json"),
//!     RunnerConfig::default(),
//! )
//! .with_plan_store(PlanStore::new("plans"));
//!
//! runner.open("http://localhost:3000").await?;
//! let summary = runner.run_scenario("login", &steps).await?;
//! println!("{}/{} passed", summary.passed, summary.total);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod diagram;
pub mod instruction;
pub mod loader;
pub mod memory;
pub mod oracle;
pub mod plan;
pub mod resolve;
pub mod runner;
pub mod session;
pub mod verify;

// Re-export scenario parsing
pub use instruction::{BrowserId, Expectation, Instruction, SpecialCommand, parse_line};
pub use loader::{LoaderError, LoaderResult, load_scenario, parse_scenario_text};

// Re-export stores
pub use memory::{MemoryError, MemoryResult, MemoryStore};
pub use plan::{ExecutionPlan, PlanAction, PlanError, PlanResult, PlanStep, PlanStore, StepKind};

// Re-export the runner
pub use runner::{ExecutionMode, RunSummary, Runner, RunnerConfig, RunnerError, RunnerResult, TestResult};

// Re-export verification and resolution
pub use resolve::{ElementAnchor, ElementTarget, capture_anchor, resolve};
pub use verify::{MemoryCheck, Verdict, VerificationSpec, evaluate};

// Re-export session management
pub use session::{Session, cleanup_old_sessions};
