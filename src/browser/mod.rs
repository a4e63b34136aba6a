//! Browser automation transport boundary.
//!
//! The runner only needs a handful of operations from a browser connection:
//! navigate, evaluate a script, click, type, snapshot and list tabs. Every
//! operation returns the text content the automation server sent back.
//! [`McpBrowser`] implements them over the Model Context Protocol.

pub mod mcp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::instruction::{BrowserId, ScrollDirection};

pub use mcp::McpBrowser;

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors raised by a browser transport
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A step was routed to a browser that was never connected
    #[error("{0} is not connected")]
    NotConnected(BrowserId),
    /// Failed to start or reach the automation server
    #[error("connection failed: {0}")]
    Connection(String),
    /// The server rejected or failed a tool invocation
    #[error("tool {tool} failed: {message}")]
    Tool { tool: String, message: String },
    /// Transport used after it was closed
    #[error("transport already closed")]
    Closed,
}

impl BrowserError {
    /// Configuration problems abort a run instead of failing one step
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::NotConnected(_))
    }
}

/// Operations consumed from a live browser connection
#[async_trait]
pub trait BrowserTransport: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<String>;

    /// Evaluate a JavaScript function expression in the page
    async fn evaluate(&self, script: &str) -> BrowserResult<String>;

    async fn click(&self, element: &str, reference: &str) -> BrowserResult<String>;

    async fn type_text(&self, element: &str, reference: &str, text: &str) -> BrowserResult<String>;

    /// Structured, line-oriented page snapshot
    async fn snapshot(&self) -> BrowserResult<String>;

    async fn list_tabs(&self) -> BrowserResult<String>;

    async fn close(&self) -> BrowserResult<()>;
}

/// Clears local and session storage of the current origin
pub const RESET_STORAGE_SCRIPT: &str =
    "() => { localStorage.clear(); sessionStorage.clear(); return 'storage cleared'; }";

/// Script scrolling the window by one viewport
pub fn scroll_script(direction: ScrollDirection) -> &'static str {
    match direction {
        ScrollDirection::Up => "() => { window.scrollBy(0, -window.innerHeight); return 'scrolled up'; }",
        ScrollDirection::Down => "() => { window.scrollBy(0, window.innerHeight); return 'scrolled down'; }",
    }
}

/// One transport per browser id
#[derive(Clone)]
pub struct BrowserPool {
    primary: Arc<dyn BrowserTransport>,
    secondary: Option<Arc<dyn BrowserTransport>>,
}

impl BrowserPool {
    pub fn new(primary: Arc<dyn BrowserTransport>) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn BrowserTransport>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Transport for a browser id; an unconnected id is a configuration error
    pub fn get(&self, id: BrowserId) -> BrowserResult<Arc<dyn BrowserTransport>> {
        match id {
            BrowserId::Primary => Ok(Arc::clone(&self.primary)),
            BrowserId::Secondary => self
                .secondary
                .clone()
                .ok_or(BrowserError::NotConnected(id)),
        }
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Every connected transport with its id
    pub fn connected(&self) -> Vec<(BrowserId, Arc<dyn BrowserTransport>)> {
        let mut all = vec![(BrowserId::Primary, Arc::clone(&self.primary))];
        if let Some(secondary) = &self.secondary {
            all.push((BrowserId::Secondary, Arc::clone(secondary)));
        }
        all
    }

    pub async fn close_all(&self) {
        for (id, transport) in self.connected() {
            if let Err(e) = transport.close().await {
                tracing::warn!(browser = %id, error = %e, "failed to close browser transport");
            }
        }
    }
}
