//! MCP browser transport.
//!
//! Spawns a browser automation server (by default `@playwright/mcp`) as a
//! child process speaking MCP over stdio, and maps transport operations onto
//! its tools.

use async_trait::async_trait;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, RawContent},
    service::RunningService,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::{Value, json};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{BrowserError, BrowserResult, BrowserTransport};
use crate::instruction::BrowserId;

/// Browser connection backed by an MCP automation server
pub struct McpBrowser {
    id: BrowserId,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpBrowser {
    /// Launch the automation server and complete the MCP handshake
    pub async fn connect(id: BrowserId, program: &str, args: &[String]) -> BrowserResult<Self> {
        info!(browser = %id, %program, ?args, "starting browser automation server");

        let transport = TokioChildProcess::new(Command::new(program).configure(|cmd| {
            cmd.args(args);
        }))
        .map_err(|e| BrowserError::Connection(e.to_string()))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| BrowserError::Connection(e.to_string()))?;

        info!(browser = %id, "browser automation server connected");
        Ok(Self {
            id,
            service: Mutex::new(Some(service)),
        })
    }

    pub fn id(&self) -> BrowserId {
        self.id
    }

    async fn call(&self, tool: &str, arguments: Value) -> BrowserResult<String> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(BrowserError::Closed)?;

        debug!(browser = %self.id, %tool, %arguments, "tool call");
        let result = service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments: arguments.as_object().cloned(),
            })
            .await
            .map_err(|e| BrowserError::Tool {
                tool: tool.to_string(),
                message: e.to_string(),
            })?;

        let text = result
            .content
            .iter()
            .filter_map(|content| match &content.raw {
                RawContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(BrowserError::Tool {
                tool: tool.to_string(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl BrowserTransport for McpBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<String> {
        self.call("browser_navigate", json!({ "url": url })).await
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<String> {
        self.call("browser_evaluate", json!({ "function": script })).await
    }

    async fn click(&self, element: &str, reference: &str) -> BrowserResult<String> {
        self.call("browser_click", json!({ "element": element, "ref": reference }))
            .await
    }

    async fn type_text(&self, element: &str, reference: &str, text: &str) -> BrowserResult<String> {
        self.call(
            "browser_type",
            json!({ "element": element, "ref": reference, "text": text }),
        )
        .await
    }

    async fn snapshot(&self) -> BrowserResult<String> {
        self.call("browser_snapshot", json!({})).await
    }

    async fn list_tabs(&self) -> BrowserResult<String> {
        self.call("browser_tabs", json!({ "action": "list" })).await
    }

    async fn close(&self) -> BrowserResult<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        service
            .cancel()
            .await
            .map_err(|e| BrowserError::Connection(e.to_string()))?;
        info!(browser = %self.id, "browser automation server closed");
        Ok(())
    }
}
