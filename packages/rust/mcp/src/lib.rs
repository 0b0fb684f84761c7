//! Tool-server lifecycle and invocation layer.
//!
//! [`ToolManager`] owns one stdio subprocess per declared [`arxivist_shared::ToolServer`]:
//! it connects them sequentially with per-server handshake timeouts, exposes a
//! uniform [`ToolInvoker::call_tool`] facade over every live session, and
//! releases everything best-effort on teardown. Transport is MCP over child
//! process stdio via `rmcp`.

pub mod catalog;
pub mod manager;
pub mod output;
pub mod session;

pub use manager::{DisconnectReport, ToolInvoker, ToolManager};
pub use output::{OutputPart, ToolOutput};
pub use session::{StdioLauncher, ToolLauncher, ToolSession};
