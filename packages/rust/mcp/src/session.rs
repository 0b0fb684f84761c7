//! Stdio subprocess sessions speaking the Model Context Protocol.
//!
//! [`ToolLauncher`] and [`ToolSession`] are the seams the manager is built
//! on: production code uses [`StdioLauncher`] backed by `rmcp`; tests swap
//! in stub implementations.

use async_trait::async_trait;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParams;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use arxivist_shared::{ArxivistError, Result, ToolServer};

use crate::output::{self, ToolOutput};

/// A live, initialized connection to one tool subprocess.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Forward one tool invocation and return its raw content payload.
    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput>;

    /// Release the session, shutting its subprocess down.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launches tool subprocesses and performs the protocol handshake.
#[async_trait]
pub trait ToolLauncher: Send + Sync {
    /// Launch `server` and hand back an initialized session.
    async fn launch(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>>;
}

/// Production launcher: spawns the descriptor's command as a child process
/// and completes the initialize handshake over its stdio.
#[derive(Debug, Default)]
pub struct StdioLauncher;

#[async_trait]
impl ToolLauncher for StdioLauncher {
    async fn launch(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>> {
        let mut cmd = Command::new(&server.command);
        cmd.args(&server.args);
        if !server.env.is_empty() {
            cmd.envs(&server.env);
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| ArxivistError::connect(&server.name, format!("spawn failed: {e}")))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| ArxivistError::connect(&server.name, format!("handshake failed: {e}")))?;

        debug!(server = %server.name, command = %server.command, "session initialized");

        Ok(Box::new(StdioSession {
            server: server.name.clone(),
            service,
        }))
    }
}

/// Session backed by a running child-process service.
struct StdioSession {
    server: String,
    service: RunningService<RoleClient, ()>,
}

#[async_trait]
impl ToolSession for StdioSession {
    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(ArxivistError::tool_call(
                    &self.server,
                    tool,
                    format!("arguments must be a JSON object, got: {other}"),
                ));
            }
        };

        let params = CallToolRequestParams {
            name: tool.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = self
            .service
            .call_tool(params)
            .await
            .map_err(|e| ArxivistError::tool_call(&self.server, tool, e.to_string()))?;

        let value = serde_json::to_value(&result)
            .map_err(|e| ArxivistError::tool_call(&self.server, tool, e.to_string()))?;

        let payload = ToolOutput::from_result_value(&value);
        if output::result_is_error(&value) {
            return Err(ArxivistError::tool_call(
                &self.server,
                tool,
                payload.joined_text(),
            ));
        }

        Ok(payload)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.service
            .cancel()
            .await
            .map_err(|e| ArxivistError::release(&self.server, e.to_string()))?;
        Ok(())
    }
}
