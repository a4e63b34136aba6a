//! Language model oracle boundary.
//!
//! The runner consumes the model as a black box that turns a prompt into free
//! text. Three prompt shapes are used: action proposal, verification
//! patterns, and narrow value extraction (see [`prompts`]). Free text is
//! decoded with [`decode`], which never fails loudly.

pub mod client;
pub mod decode;
pub mod prompts;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use client::{OpenAiOracle, OracleConfig, check_health};
pub use decode::{Decoded, decode_json, extract_json_span};

/// Result type for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Errors that can occur while consulting the oracle
#[derive(Debug, Error)]
pub enum OracleError {
    /// No credential configured for the endpoint
    #[error("missing credentials: set SCENARIO_PILOT_LLM_API_KEY or OPENAI_API_KEY")]
    MissingCredentials,
    /// Failed to reach the endpoint
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Request did not complete in time
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// Endpoint answered with a non-success status
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl OracleError {
    /// Configuration problems abort a run instead of failing one step
    pub fn is_fatal(&self) -> bool {
        matches!(self, OracleError::MissingCredentials)
    }
}

/// Something that answers a prompt with free text
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> OracleResult<String>;
}
