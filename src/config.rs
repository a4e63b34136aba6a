//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Scenario Pilot, supporting:
//! - Environment variables for all configurable values
//! - Defaults suitable for a local development setup
//! - Per-section settings that can be built from the environment or from defaults
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SCENARIO_PILOT_LLM_ENDPOINT` | Chat completions endpoint URL | `https://api.openai.com/v1/chat/completions` |
//! | `SCENARIO_PILOT_LLM_MODEL` | Model name | `gpt-4o-mini` |
//! | `SCENARIO_PILOT_LLM_API_KEY` | Bearer credential (falls back to `OPENAI_API_KEY`) | none |
//! | `SCENARIO_PILOT_LLM_MAX_TOKENS` | Maximum tokens in a response | `1024` |
//! | `SCENARIO_PILOT_LLM_TIMEOUT` | Request timeout in seconds | `60` |
//! | `SCENARIO_PILOT_PLAN_DIR` | Directory holding learned plans | `./plans` |
//! | `SCENARIO_PILOT_MEMORY_FILE` | Durable memory document | `./memory.json` |
//! | `SCENARIO_PILOT_SESSION_DIR` | Base directory for run artifacts | `/tmp/scenario-pilot` |
//! | `SCENARIO_PILOT_DEFAULT_URL` | Starting URL for a run | `http://localhost:3000` |
//! | `SCENARIO_PILOT_MAX_RETRIES` | Extra attempts per failing step | `2` |
//! | `SCENARIO_PILOT_MCP_COMMAND` | Command launching the browser automation server | `npx @playwright/mcp@latest` |
//!
//! # Example
//!
//! ```bash
//! # Point at a local OpenAI-compatible server
//! export SCENARIO_PILOT_LLM_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export SCENARIO_PILOT_LLM_MODEL="qwen2.5"
//!
//! # Keep plans next to the scenarios
//! export SCENARIO_PILOT_PLAN_DIR="./scenarios/plans"
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default chat completions endpoint
pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model name
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default max tokens for oracle responses
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 1024;

/// Default oracle request timeout (seconds)
pub const DEFAULT_LLM_TIMEOUT: u64 = 60;

/// Default plan directory
pub const DEFAULT_PLAN_DIR: &str = "./plans";

/// Default memory document
pub const DEFAULT_MEMORY_FILE: &str = "./memory.json";

/// Default run-artifact base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/scenario-pilot";

/// Age after which old run sessions are removed (seconds)
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Default starting URL
pub const DEFAULT_START_URL: &str = "http://localhost:3000";

/// Default number of extra attempts for a failing step
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default pause before a retry (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Default cap on oracle-proposed actions within one step
pub const DEFAULT_MAX_ACTIONS_PER_STEP: usize = 25;

/// Default number of page-text bytes handed to the extraction prompt
pub const DEFAULT_EXTRACTION_EXCERPT_BYTES: usize = 4096;

/// Default command launching the browser automation server
pub const DEFAULT_MCP_COMMAND: &str = "npx @playwright/mcp@latest";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the oracle endpoint
pub const ENV_LLM_ENDPOINT: &str = "SCENARIO_PILOT_LLM_ENDPOINT";

/// Environment variable for the oracle model
pub const ENV_LLM_MODEL: &str = "SCENARIO_PILOT_LLM_MODEL";

/// Environment variable for the oracle credential
pub const ENV_LLM_API_KEY: &str = "SCENARIO_PILOT_LLM_API_KEY";

/// Environment variable for oracle max tokens
pub const ENV_LLM_MAX_TOKENS: &str = "SCENARIO_PILOT_LLM_MAX_TOKENS";

/// Environment variable for the oracle request timeout
pub const ENV_LLM_TIMEOUT: &str = "SCENARIO_PILOT_LLM_TIMEOUT";

/// Environment variable for the plan directory
pub const ENV_PLAN_DIR: &str = "SCENARIO_PILOT_PLAN_DIR";

/// Environment variable for the memory document
pub const ENV_MEMORY_FILE: &str = "SCENARIO_PILOT_MEMORY_FILE";

/// Environment variable for the session directory
pub const ENV_SESSION_DIR: &str = "SCENARIO_PILOT_SESSION_DIR";

/// Environment variable for the starting URL
pub const ENV_DEFAULT_URL: &str = "SCENARIO_PILOT_DEFAULT_URL";

/// Environment variable for the retry count
pub const ENV_MAX_RETRIES: &str = "SCENARIO_PILOT_MAX_RETRIES";

/// Environment variable for the browser automation server command
pub const ENV_MCP_COMMAND: &str = "SCENARIO_PILOT_MCP_COMMAND";

/// Widely used credential variable, read when the pilot-specific one is unset
pub const ENV_LLM_API_KEY_FALLBACK: &str = "OPENAI_API_KEY";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Scenario Pilot
#[derive(Debug, Clone)]
pub struct Config {
    /// Language model oracle configuration
    pub llm: LlmSettings,
    /// Plan, memory and session storage
    pub storage: StorageSettings,
    /// Step execution policy
    pub runner: RunnerSettings,
    /// Browser transport
    pub browser: BrowserSettings,
}

/// Oracle-related settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Bearer credential, if configured
    pub api_key: Option<String>,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Request timeout (seconds)
    pub timeout: u64,
}

/// Storage locations
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Directory holding one plan document per scenario
    pub plan_dir: String,
    /// Memory document path
    pub memory_file: String,
    /// Base directory for run sessions
    pub session_dir: String,
}

/// Step execution policy
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Extra attempts for a failing step
    pub max_retries: u32,
    /// Pause before each retry (milliseconds)
    pub retry_backoff_ms: u64,
    /// Cap on oracle-proposed actions in a single step
    pub max_actions_per_step: usize,
    /// Page-text bytes handed to the extraction prompt
    pub extraction_excerpt_bytes: usize,
    /// Starting URL for a run
    pub start_url: String,
}

/// Browser transport settings
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Command line launching the automation server (split on whitespace)
    pub mcp_command: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            llm: LlmSettings::from_env(),
            storage: StorageSettings::from_env(),
            runner: RunnerSettings::from_env(),
            browser: BrowserSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            llm: LlmSettings::defaults(),
            storage: StorageSettings::defaults(),
            runner: RunnerSettings::defaults(),
            browser: BrowserSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LlmSettings {
    /// Create oracle settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_LLM_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_LLM_ENDPOINT.to_string()),
            model: env::var(ENV_LLM_MODEL).unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            api_key: env::var(ENV_LLM_API_KEY)
                .or_else(|_| env::var(ENV_LLM_API_KEY_FALLBACK))
                .ok()
                .filter(|key| !key.trim().is_empty()),
            max_tokens: parse_env(ENV_LLM_MAX_TOKENS).unwrap_or(DEFAULT_LLM_MAX_TOKENS),
            timeout: parse_env(ENV_LLM_TIMEOUT).unwrap_or(DEFAULT_LLM_TIMEOUT),
        }
    }

    /// Create oracle settings with defaults
    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

impl StorageSettings {
    /// Create storage settings from environment variables
    pub fn from_env() -> Self {
        Self {
            plan_dir: env::var(ENV_PLAN_DIR).unwrap_or_else(|_| DEFAULT_PLAN_DIR.to_string()),
            memory_file: env::var(ENV_MEMORY_FILE)
                .unwrap_or_else(|_| DEFAULT_MEMORY_FILE.to_string()),
            session_dir: env::var(ENV_SESSION_DIR)
                .unwrap_or_else(|_| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    /// Create storage settings with defaults
    pub fn defaults() -> Self {
        Self {
            plan_dir: DEFAULT_PLAN_DIR.to_string(),
            memory_file: DEFAULT_MEMORY_FILE.to_string(),
            session_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

impl RunnerSettings {
    /// Create runner settings from environment variables
    pub fn from_env() -> Self {
        Self {
            max_retries: parse_env(ENV_MAX_RETRIES).unwrap_or(DEFAULT_MAX_RETRIES),
            start_url: env::var(ENV_DEFAULT_URL).unwrap_or_else(|_| DEFAULT_START_URL.to_string()),
            ..Self::defaults()
        }
    }

    /// Create runner settings with defaults
    pub fn defaults() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            max_actions_per_step: DEFAULT_MAX_ACTIONS_PER_STEP,
            extraction_excerpt_bytes: DEFAULT_EXTRACTION_EXCERPT_BYTES,
            start_url: DEFAULT_START_URL.to_string(),
        }
    }
}

impl BrowserSettings {
    /// Create browser settings from environment variables
    pub fn from_env() -> Self {
        Self {
            mcp_command: env::var(ENV_MCP_COMMAND)
                .unwrap_or_else(|_| DEFAULT_MCP_COMMAND.to_string()),
        }
    }

    /// Create browser settings with defaults
    pub fn defaults() -> Self {
        Self {
            mcp_command: DEFAULT_MCP_COMMAND.to_string(),
        }
    }

    /// Split the configured command into program and arguments
    pub fn command_parts(&self) -> Option<(String, Vec<String>)> {
        split_command(&self.mcp_command)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Split a command line on whitespace into (program, args)
fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Get the plan directory (convenience function)
pub fn plan_dir() -> String {
    get().storage.plan_dir.clone()
}

/// Get the memory document path (convenience function)
pub fn memory_file() -> String {
    get().storage.memory_file.clone()
}

/// Get the session base directory (convenience function)
pub fn session_base_dir() -> String {
    get().storage.session_dir.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("npx @playwright/mcp@latest --headless"),
            Some((
                "npx".to_string(),
                vec!["@playwright/mcp@latest".to_string(), "--headless".to_string()]
            ))
        );
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.llm.endpoint, DEFAULT_LLM_ENDPOINT);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.storage.plan_dir, DEFAULT_PLAN_DIR);
        assert_eq!(config.runner.max_retries, 2);
        assert_eq!(config.runner.retry_backoff_ms, 1000);
    }

    #[test]
    fn test_browser_command_parts() {
        let settings = BrowserSettings::defaults();
        let (program, args) = settings.command_parts().unwrap();
        assert_eq!(program, "npx");
        assert_eq!(args, vec!["@playwright/mcp@latest".to_string()]);
    }
}
