//! Error types for Arxivist.
//!
//! Library crates use [`ArxivistError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Arxivist operations.
#[derive(Debug, thiserror::Error)]
pub enum ArxivistError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// No tool server is declared under the requested name.
    #[error("unknown tool server: {0}")]
    UnknownServer(String),

    /// Tool invocation against a server with no live session.
    #[error("tool server not connected: {0}")]
    NotConnected(String),

    /// Connect attempt against a server that already holds a live session.
    #[error("tool server already connected: {0}")]
    AlreadyConnected(String),

    /// Handshake or connect-phase deadline exceeded.
    #[error("connect timeout ({scope}): exceeded {seconds}s")]
    ConnectTimeout { scope: String, seconds: u64 },

    /// Subprocess launch or handshake failure other than a timeout.
    #[error("failed to connect {server}: {message}")]
    Connect { server: String, message: String },

    /// A forwarded tool invocation failed, in transport or tool-reported.
    #[error("tool call {tool} on {server} failed: {message}")]
    ToolCall {
        server: String,
        tool: String,
        message: String,
    },

    /// Invalid chunk size/overlap combination.
    #[error("chunking config error: {message}")]
    Chunking { message: String },

    /// Malformed payload from a collaborator.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Session release failure, recorded during cleanup and never propagated.
    #[error("failed to release {server}: {message}")]
    Release { server: String, message: String },

    /// Run cancelled by user interrupt.
    #[error("interrupted by user")]
    Interrupted,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArxivistError>;

impl ArxivistError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a chunking config error from any displayable message.
    pub fn chunking(msg: impl Into<String>) -> Self {
        Self::Chunking {
            message: msg.into(),
        }
    }

    /// Create a connect failure for a named server.
    pub fn connect(server: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connect {
            server: server.into(),
            message: msg.into(),
        }
    }

    /// Create a tool invocation failure.
    pub fn tool_call(
        server: impl Into<String>,
        tool: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            server: server.into(),
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a release failure for cleanup reports.
    pub fn release(server: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Release {
            server: server.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectTimeout { .. } => 2,
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}
