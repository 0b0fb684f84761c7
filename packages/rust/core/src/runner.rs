//! Run driver: one tool-manager lifecycle wrapped around the selected phases.

use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{info, instrument, warn};

use arxivist_mcp::ToolManager;
use arxivist_shared::{AppConfig, ArxivistError, Phase, Result, RunId};

use crate::ingest::{self, IngestionOutcome};
use crate::progress::ProgressReporter;
use crate::query::{self, QueryOutcome};

/// Question asked when the query phase runs without an explicit one.
pub const DEFAULT_QUERY: &str = "What are the latest techniques in LLM reasoning?";

/// Phase selection and query override for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Which phases to run.
    pub phase: Phase,
    /// Question for the query phase; [`DEFAULT_QUERY`] when absent.
    pub query: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            phase: Phase::Both,
            query: None,
        }
    }
}

/// Report over one completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Identifier correlating this run's log lines and artifacts.
    pub run_id: RunId,
    /// Ingestion outcome, when that phase ran.
    pub ingestion: Option<IngestionOutcome>,
    /// Query outcome, when that phase ran.
    pub query: Option<QueryOutcome>,
    /// Total elapsed time, connects and cleanup included.
    pub elapsed: Duration,
}

/// Drive the selected phases over one manager lifecycle.
///
/// All declared servers connect up front under the global connect budget,
/// then the selected phases run in order. Every live session is released on
/// the way out regardless of how the run ended. Ctrl-C cancels in-flight
/// work and maps to [`ArxivistError::Interrupted`] after cleanup.
#[instrument(skip_all, fields(phase = %options.phase))]
pub async fn run(
    mut tools: ToolManager,
    config: &AppConfig,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    let run_id = RunId::new();
    info!(%run_id, phase = %options.phase, "run starting");

    let result = tokio::select! {
        result = drive(&mut tools, config, options, progress) => result,
        _ = wait_for_interrupt() => {
            warn!("interrupt received, cleaning up");
            Err(ArxivistError::Interrupted)
        }
    };

    // Cleanup runs on every exit path; release failures are log-only.
    let cleanup = tools.disconnect_all().await;
    for (server, message) in &cleanup.failures {
        warn!(server = %server, error = %message, "session release failed during cleanup");
    }

    let (ingestion, query) = result?;

    let report = RunReport {
        run_id,
        ingestion,
        query,
        elapsed: start.elapsed(),
    };
    info!(run_id = %report.run_id, elapsed_ms = report.elapsed.as_millis(), "run complete");
    Ok(report)
}

/// Connect everything, then run the phases the options select.
async fn drive(
    tools: &mut ToolManager,
    config: &AppConfig,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<(Option<IngestionOutcome>, Option<QueryOutcome>)> {
    progress.phase("Connecting tool servers");
    let budget = Duration::from_secs(config.timeouts.connect_all_secs);
    timeout(budget, tools.connect_all())
        .await
        .map_err(|_| ArxivistError::ConnectTimeout {
            scope: "connect phase".to_string(),
            seconds: config.timeouts.connect_all_secs,
        })??;

    let mut ingestion = None;
    let mut query = None;

    if options.phase.includes_ingestion() {
        ingestion = Some(ingest::run_ingestion(&*tools, config, progress).await?);
    }

    if options.phase.includes_query() {
        let question = options.query.as_deref().unwrap_or(DEFAULT_QUERY);
        query = Some(query::run_query(&*tools, config, question, progress).await?);
    }

    Ok((ingestion, query))
}

/// Resolve when the user interrupts the run. When the signal listener cannot
/// register, the run proceeds uninterruptible rather than failing.
async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
