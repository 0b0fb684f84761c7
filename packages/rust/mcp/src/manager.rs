//! Subprocess lifecycle manager: ordered connects, uniform invocation,
//! best-effort teardown.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use arxivist_shared::{ArxivistError, Result, ToolServer};

use crate::output::ToolOutput;
use crate::session::{StdioLauncher, ToolLauncher, ToolSession};

/// Default per-server handshake timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-session release timeout during cleanup.
const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// The one-method invocation facade consumed by the pipeline orchestrators.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invoke `tool` on the named server with JSON object arguments.
    async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> Result<ToolOutput>;
}

/// Outcome of a cleanup sweep over all live sessions.
#[derive(Debug, Default)]
pub struct DisconnectReport {
    /// Servers whose sessions released cleanly, in release order.
    pub released: Vec<String>,
    /// Release failures as (server, message); recorded, never propagated.
    pub failures: Vec<(String, String)>,
}

/// Owns the full lifecycle of every external tool subprocess.
///
/// Descriptors are fixed at construction; sessions are keyed by server name
/// with at most one live session per name. Connects run strictly in declared
/// order and fail fast; teardown releases every session it can and reports
/// the rest.
pub struct ToolManager {
    servers: Vec<ToolServer>,
    launcher: Box<dyn ToolLauncher>,
    sessions: HashMap<String, Box<dyn ToolSession>>,
    connect_timeout: Duration,
    release_timeout: Duration,
}

impl ToolManager {
    /// Create a manager over the declared servers, launching real stdio
    /// subprocesses.
    pub fn new(servers: Vec<ToolServer>) -> Self {
        Self::with_launcher(servers, Box::new(StdioLauncher))
    }

    /// Create a manager with a custom launcher (tests, embedders).
    pub fn with_launcher(servers: Vec<ToolServer>, launcher: Box<dyn ToolLauncher>) -> Self {
        Self {
            servers,
            launcher,
            sessions: HashMap::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }

    /// Override the per-server handshake and per-session release timeouts.
    pub fn with_timeouts(mut self, connect: Duration, release: Duration) -> Self {
        self.connect_timeout = connect;
        self.release_timeout = release;
        self
    }

    /// Names of the declared servers, in connect order.
    pub fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    /// Whether a live session exists for `name`.
    pub fn is_connected(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Connect one server: launch its subprocess and complete the handshake,
    /// bounded by the per-server timeout.
    #[instrument(skip_all, fields(server = name))]
    pub async fn connect(&mut self, name: &str) -> Result<()> {
        let server = self
            .servers
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| ArxivistError::UnknownServer(name.to_string()))?;

        if self.sessions.contains_key(name) {
            return Err(ArxivistError::AlreadyConnected(name.to_string()));
        }

        let seconds = self.connect_timeout.as_secs();
        let session = timeout(self.connect_timeout, self.launcher.launch(&server))
            .await
            .map_err(|_| ArxivistError::ConnectTimeout {
                scope: name.to_string(),
                seconds,
            })??;

        self.sessions.insert(server.name, session);
        info!(server = name, "connected");
        Ok(())
    }

    /// Connect every declared server sequentially, in declared order.
    ///
    /// The first failure aborts the remaining connections and propagates;
    /// sessions established before the failure stay live for the caller to
    /// release.
    pub async fn connect_all(&mut self) -> Result<()> {
        for name in self.server_names() {
            self.connect(&name).await?;
        }
        info!(servers = self.sessions.len(), "all tool servers connected");
        Ok(())
    }

    /// Release every live session, each bounded by the release timeout.
    ///
    /// Failures are recorded in the report instead of propagating; the
    /// registry is left empty no matter what. Calling this with zero live
    /// sessions is a no-op.
    pub async fn disconnect_all(&mut self) -> DisconnectReport {
        let mut report = DisconnectReport::default();

        for name in self.server_names() {
            let Some(session) = self.sessions.remove(&name) else {
                continue;
            };

            match timeout(self.release_timeout, session.close()).await {
                Ok(Ok(())) => {
                    info!(server = %name, "released");
                    report.released.push(name);
                }
                Ok(Err(e)) => {
                    warn!(server = %name, error = %e, "release failed");
                    report.failures.push((name, e.to_string()));
                }
                Err(_) => {
                    let seconds = self.release_timeout.as_secs();
                    warn!(server = %name, seconds, "release timed out");
                    report
                        .failures
                        .push((name, format!("release timed out after {seconds}s")));
                }
            }
        }

        // Registry drained even if a session was somehow keyed off-catalog.
        self.sessions.clear();
        report
    }
}

#[async_trait]
impl ToolInvoker for ToolManager {
    async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> Result<ToolOutput> {
        let session = self
            .sessions
            .get(server)
            .ok_or_else(|| ArxivistError::NotConnected(server.to_string()))?;

        debug!(server, tool, "invoking tool");
        session.call(tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use serde_json::json;

    type CallLog = Arc<Mutex<Vec<(String, String, Value)>>>;

    struct StubSession {
        name: String,
        calls: CallLog,
        fail_close: bool,
        hang_close: bool,
    }

    #[async_trait]
    impl ToolSession for StubSession {
        async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((self.name.clone(), tool.to_string(), arguments));
            Ok(ToolOutput::text("{}"))
        }

        async fn close(self: Box<Self>) -> Result<()> {
            if self.hang_close {
                std::future::pending::<()>().await;
            }
            if self.fail_close {
                return Err(ArxivistError::release(&self.name, "session jammed"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubLauncher {
        attempts: Arc<Mutex<Vec<String>>>,
        calls: CallLog,
        fail_on: Option<String>,
        hang_on: Option<String>,
        fail_close_on: Vec<String>,
        hang_close_on: Vec<String>,
    }

    #[async_trait]
    impl ToolLauncher for StubLauncher {
        async fn launch(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>> {
            self.attempts.lock().unwrap().push(server.name.clone());
            if self.hang_on.as_deref() == Some(server.name.as_str()) {
                std::future::pending::<()>().await;
            }
            if self.fail_on.as_deref() == Some(server.name.as_str()) {
                return Err(ArxivistError::connect(&server.name, "spawn refused"));
            }
            Ok(Box::new(StubSession {
                name: server.name.clone(),
                calls: self.calls.clone(),
                fail_close: self.fail_close_on.contains(&server.name),
                hang_close: self.hang_close_on.contains(&server.name),
            }))
        }
    }

    fn descriptor(name: &str) -> ToolServer {
        ToolServer {
            name: name.into(),
            command: "stub".into(),
            args: vec![],
            env: Default::default(),
        }
    }

    fn manager_with(servers: &[&str], launcher: StubLauncher) -> ToolManager {
        ToolManager::with_launcher(
            servers.iter().map(|n| descriptor(n)).collect(),
            Box::new(launcher),
        )
    }

    #[tokio::test]
    async fn connect_rejects_unknown_server() {
        let mut manager = manager_with(&["arxiv"], StubLauncher::default());
        let err = manager.connect("warehouse").await.unwrap_err();
        assert!(matches!(err, ArxivistError::UnknownServer(name) if name == "warehouse"));
    }

    #[tokio::test]
    async fn call_tool_requires_live_session() {
        let manager = manager_with(&["arxiv"], StubLauncher::default());
        let err = manager
            .call_tool("arxiv", "search_papers", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ArxivistError::NotConnected(name) if name == "arxiv"));
    }

    #[tokio::test]
    async fn double_connect_is_rejected() {
        let mut manager = manager_with(&["arxiv"], StubLauncher::default());
        manager.connect("arxiv").await.unwrap();
        let err = manager.connect("arxiv").await.unwrap_err();
        assert!(matches!(err, ArxivistError::AlreadyConnected(name) if name == "arxiv"));
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test]
    async fn connect_all_aborts_on_first_failure() {
        let launcher = StubLauncher {
            fail_on: Some("pinecone".into()),
            ..Default::default()
        };
        let attempts = launcher.attempts.clone();
        let mut manager = manager_with(
            &["arxiv", "firecrawl", "pinecone", "notion", "filesystem"],
            launcher,
        );

        let err = manager.connect_all().await.unwrap_err();
        assert!(matches!(err, ArxivistError::Connect { ref server, .. } if server == "pinecone"));

        // Servers after the failed one were never attempted
        assert_eq!(
            *attempts.lock().unwrap(),
            vec!["arxiv", "firecrawl", "pinecone"]
        );
        assert_eq!(manager.session_count(), 2);

        // The sessions established before the failure are still releasable
        let report = manager.disconnect_all().await;
        assert_eq!(report.released, vec!["arxiv", "firecrawl"]);
        assert!(report.failures.is_empty());
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn handshake_timeout_is_reported_per_server() {
        let launcher = StubLauncher {
            hang_on: Some("notion".into()),
            ..Default::default()
        };
        let attempts = launcher.attempts.clone();
        let mut manager = manager_with(&["arxiv", "notion", "filesystem"], launcher)
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(50));

        let err = manager.connect_all().await.unwrap_err();
        assert!(matches!(
            err,
            ArxivistError::ConnectTimeout { ref scope, .. } if scope == "notion"
        ));
        assert_eq!(*attempts.lock().unwrap(), vec!["arxiv", "notion"]);
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_all_on_empty_registry_is_a_noop() {
        let mut manager = manager_with(&["arxiv"], StubLauncher::default());
        let report = manager.disconnect_all().await;
        assert!(report.released.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn release_failures_do_not_stop_the_sweep() {
        let launcher = StubLauncher {
            fail_close_on: vec!["arxiv".into()],
            ..Default::default()
        };
        let mut manager = manager_with(&["arxiv", "pinecone"], launcher);
        manager.connect_all().await.unwrap();

        let report = manager.disconnect_all().await;
        assert_eq!(report.released, vec!["pinecone"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "arxiv");
        assert!(report.failures[0].1.contains("session jammed"));
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn hung_release_is_bounded_and_recorded() {
        let launcher = StubLauncher {
            hang_close_on: vec!["filesystem".into()],
            ..Default::default()
        };
        let mut manager = manager_with(&["filesystem", "completion"], launcher)
            .with_timeouts(Duration::from_secs(30), Duration::from_millis(50));
        manager.connect_all().await.unwrap();

        let report = manager.disconnect_all().await;
        assert_eq!(report.released, vec!["completion"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "filesystem");
        assert!(report.failures[0].1.contains("timed out"));
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn call_tool_forwards_to_the_named_session() {
        let launcher = StubLauncher::default();
        let calls = launcher.calls.clone();
        let mut manager = manager_with(&["arxiv", "pinecone"], launcher);
        manager.connect_all().await.unwrap();

        let output = manager
            .call_tool("arxiv", "search_papers", json!({"query": "higgs"}))
            .await
            .unwrap();

        assert_eq!(output.first_text(), Some("{}"));
        let log = calls.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "arxiv");
        assert_eq!(log[0].1, "search_papers");
        assert_eq!(log[0].2, json!({"query": "higgs"}));
    }
}
