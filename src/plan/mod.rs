//! Learned execution plans and their storage.

pub mod store;
pub mod types;

use std::path::PathBuf;
use thiserror::Error;

pub use store::PlanStore;
pub use types::{ExecutionPlan, PlanAction, PlanStep, StepKind};

/// Result type for plan storage operations
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised by the plan store
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("plan document {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize plan: {0}")]
    Serialization(#[from] serde_json::Error),
}
